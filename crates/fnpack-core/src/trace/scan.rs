//! Specifier scanner for bundled JavaScript.
//!
//! Finds the module specifiers a file loads at runtime without parsing it:
//! static `import`/`export … from`, dynamic `import("…")` and
//! `require("…")`. Comments and string literals are skipped so code inside
//! them is never reported.

use std::collections::HashSet;

/// How a specifier is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecifierKind {
    Import,
    ReExport,
    DynamicImport,
    Require,
}

/// A module specifier found in source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub value: String,
    pub kind: SpecifierKind,
}

/// Upper bound on how far a single statement is searched for its specifier.
const STATEMENT_LIMIT: usize = 1000;

/// Scan source for runtime specifiers, in first-appearance order, deduplicated.
#[must_use]
pub fn scan_specifiers(source: &str) -> Vec<Specifier> {
    let mut scanner = Scanner::new(source);
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    while let Some(found) = scanner.next_specifier() {
        if !found.value.is_empty() && seen.insert(found.value.clone()) {
            out.push(found);
        }
    }

    out
}

struct Scanner<'s> {
    src: &'s str,
    bytes: &'s [u8],
    pos: usize,
}

impl<'s> Scanner<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn next_specifier(&mut self) -> Option<Specifier> {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];

            if b == b'/' && self.peek(1) == Some(b'/') {
                self.skip_line_comment();
            } else if b == b'/' && self.peek(1) == Some(b'*') {
                self.skip_block_comment();
            } else if is_quote(b) {
                self.read_string();
            } else if is_ident_start(b) {
                let after_dot = self.prev_significant() == Some(b'.');
                let word = self.read_word();
                if after_dot {
                    continue;
                }
                let found = match word {
                    "import" => self.after_import(),
                    "export" => self.after_export(),
                    "require" => self.after_require(),
                    _ => None,
                };
                if found.is_some() {
                    return found;
                }
            } else {
                self.pos += 1;
            }
        }
        None
    }

    fn after_import(&mut self) -> Option<Specifier> {
        self.skip_ws();
        match self.peek(0) {
            Some(b'(') => {
                self.pos += 1;
                self.call_argument(SpecifierKind::DynamicImport)
            }
            // import.meta
            Some(b'.') => None,
            _ => self.clause_source(SpecifierKind::Import, true),
        }
    }

    fn after_export(&mut self) -> Option<Specifier> {
        self.clause_source(SpecifierKind::ReExport, false)
    }

    fn after_require(&mut self) -> Option<Specifier> {
        self.skip_ws();
        if self.peek(0) != Some(b'(') {
            return None;
        }
        self.pos += 1;
        self.call_argument(SpecifierKind::Require)
    }

    /// `("spec")` with the opening paren already consumed. Non-literal
    /// arguments are ignored.
    fn call_argument(&mut self, kind: SpecifierKind) -> Option<Specifier> {
        self.skip_ws();
        if !self.peek(0).is_some_and(is_quote) {
            return None;
        }
        let value = self.read_string()?;
        self.skip_ws();
        if self.peek(0) != Some(b')') {
            return None;
        }
        self.pos += 1;
        Some(Specifier {
            value: value.to_string(),
            kind,
        })
    }

    /// Walk a statement looking for `from "spec"`. A bare string directly
    /// after `import` is a side-effect import.
    fn clause_source(&mut self, kind: SpecifierKind, bare_allowed: bool) -> Option<Specifier> {
        let limit = (self.pos + STATEMENT_LIMIT).min(self.bytes.len());
        let mut expect_source = bare_allowed;

        while self.pos < limit {
            self.skip_ws();
            let Some(b) = self.peek(0) else { break };

            if is_quote(b) {
                let value = self.read_string()?;
                if expect_source {
                    return Some(Specifier {
                        value: value.to_string(),
                        kind,
                    });
                }
            } else if is_ident_start(b) {
                expect_source = self.read_word() == "from";
            } else if matches!(b, b';' | b'=' | b'(') {
                return None;
            } else {
                expect_source = false;
                self.pos += 1;
            }
        }
        None
    }

    fn read_word(&mut self) -> &'s str {
        let start = self.pos;
        while self.pos < self.bytes.len() && is_ident_char(self.bytes[self.pos]) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    /// Read a quoted literal at the cursor, returning its raw contents.
    fn read_string(&mut self) -> Option<&'s str> {
        let quote = self.bytes[self.pos];
        self.pos += 1;
        let start = self.pos;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\\' => self.pos += 2,
                c if c == quote => {
                    let value = &self.src[start..self.pos];
                    self.pos += 1;
                    return Some(value);
                }
                b'\n' if quote != b'`' => return None,
                _ => self.pos += 1,
            }
        }
        None
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            } else if self.bytes[self.pos] == b'/' && self.peek(1) == Some(b'*') {
                self.skip_block_comment();
            } else if self.bytes[self.pos] == b'/' && self.peek(1) == Some(b'/') {
                self.skip_line_comment();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while self.pos + 1 < self.bytes.len()
            && !(self.bytes[self.pos] == b'*' && self.bytes[self.pos + 1] == b'/')
        {
            self.pos += 1;
        }
        self.pos = (self.pos + 2).min(self.bytes.len());
    }

    fn prev_significant(&self) -> Option<u8> {
        self.bytes[..self.pos]
            .iter()
            .rev()
            .copied()
            .find(|b| !b.is_ascii_whitespace())
    }
}

fn is_quote(b: u8) -> bool {
    matches!(b, b'"' | b'\'' | b'`')
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}
