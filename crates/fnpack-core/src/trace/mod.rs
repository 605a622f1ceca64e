//! Dependency tracing.
//!
//! A [`Tracer`] answers "which files does this entry need at runtime".
//! The bundled [`NodeTracer`] follows import specifiers through the
//! filesystem the way Node resolves them, keeping the nominal path of every
//! file it reaches so symlinked packages can be reproduced later.

mod resolve;
mod scan;

pub use resolve::{is_builtin, resolve_specifier, split_package_specifier, Resolution};
pub use scan::{scan_specifiers, Specifier, SpecifierKind};

use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Warning codes.
pub mod codes {
    pub const UNRESOLVED_IMPORT: &str = "TRACE_UNRESOLVED_IMPORT";
    pub const OUTSIDE_BASE: &str = "TRACE_OUTSIDE_BASE";
}

/// Extensions whose contents are scanned for further specifiers.
const SCANNABLE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "mts", "cts", "tsx"];

/// Non-fatal problem found while tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceWarning {
    pub code: &'static str,
    pub message: String,
    pub path: PathBuf,
}

impl TraceWarning {
    fn new(code: &'static str, message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            code,
            message: message.into(),
            path: path.into(),
        }
    }
}

impl std::fmt::Display for TraceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.code, self.message, self.path.display())
    }
}

/// Files required at runtime, relative to the trace base.
#[derive(Debug, Clone, Default)]
pub struct TraceResult {
    pub file_list: BTreeSet<PathBuf>,
    pub warnings: Vec<TraceWarning>,
}

/// Computes the runtime file set of a set of entry files.
pub trait Tracer: Send + Sync {
    /// Trace `entries`. Paths in the result are relative to `base`.
    ///
    /// # Errors
    /// Fails when an entry cannot be read. Unresolvable imports are
    /// reported as warnings.
    fn trace(&self, entries: &[PathBuf], base: &Path, cache: &mut TraceCache)
        -> Result<TraceResult>;
}

/// Modification stamp used to validate cached scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub mtime_ms: Option<u128>,
    pub len: u64,
}

impl FileStamp {
    fn of(meta: &fs::Metadata) -> Self {
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis());
        Self {
            mtime_ms,
            len: meta.len(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedScan {
    stamp: FileStamp,
    specifiers: Vec<String>,
}

/// Scan results shared across the traces of one build.
///
/// Keyed by real path; an entry whose stamp no longer matches is re-scanned.
#[derive(Debug, Default)]
pub struct TraceCache {
    scans: HashMap<PathBuf, CachedScan>,
    hits: u64,
    misses: u64,
}

impl TraceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Specifiers imported by the file at `real`.
    ///
    /// # Errors
    /// Returns the underlying IO error if the file cannot be read.
    pub fn specifiers(&mut self, real: &Path) -> std::io::Result<Vec<String>> {
        let stamp = FileStamp::of(&fs::metadata(real)?);

        if let Some(cached) = self.scans.get(real) {
            if cached.stamp == stamp {
                self.hits += 1;
                return Ok(cached.specifiers.clone());
            }
        }

        self.misses += 1;
        let bytes = fs::read(real)?;
        let source = String::from_utf8_lossy(&bytes);
        let specifiers: Vec<String> = scan_specifiers(&source)
            .into_iter()
            .map(|s| s.value)
            .collect();

        self.scans.insert(
            real.to_path_buf(),
            CachedScan {
                stamp,
                specifiers: specifiers.clone(),
            },
        );
        Ok(specifiers)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// Import-following tracer with Node resolution semantics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeTracer;

impl NodeTracer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Tracer for NodeTracer {
    fn trace(
        &self,
        entries: &[PathBuf],
        base: &Path,
        cache: &mut TraceCache,
    ) -> Result<TraceResult> {
        let base = dunce::canonicalize(base).map_err(|source| Error::Trace {
            path: base.to_path_buf(),
            source,
        })?;

        let mut queue = VecDeque::new();
        for entry in entries {
            let real = dunce::canonicalize(entry).map_err(|source| Error::Trace {
                path: entry.clone(),
                source,
            })?;
            queue.push_back(real);
        }

        let mut reached: BTreeSet<PathBuf> = BTreeSet::new();
        let mut scanned: HashSet<PathBuf> = HashSet::new();
        let mut warnings = Vec::new();

        while let Some(nominal) = queue.pop_front() {
            if !reached.insert(nominal.clone()) {
                continue;
            }

            let real = dunce::canonicalize(&nominal).map_err(|source| Error::Trace {
                path: nominal.clone(),
                source,
            })?;
            if real != nominal {
                reached.insert(real.clone());
            }

            if !is_scannable(&real) || !scanned.insert(real.clone()) {
                continue;
            }

            let specifiers = cache.specifiers(&real).map_err(|source| Error::Trace {
                path: real.clone(),
                source,
            })?;
            let Some(from_dir) = real.parent() else {
                continue;
            };

            for spec in specifiers {
                match resolve_specifier(&spec, from_dir) {
                    Resolution::External => {}
                    Resolution::File { path, package_json } => {
                        if let Some(manifest) = package_json {
                            queue.push_back(manifest);
                        }
                        queue.push_back(path);
                    }
                    Resolution::Unresolved => {
                        tracing::debug!(specifier = %spec, from = %real.display(), "unresolved import");
                        warnings.push(TraceWarning::new(
                            codes::UNRESOLVED_IMPORT,
                            format!("cannot resolve `{spec}`"),
                            &real,
                        ));
                    }
                }
            }
        }

        let mut file_list = BTreeSet::new();
        for path in reached {
            match path.strip_prefix(&base) {
                Ok(rel) => {
                    file_list.insert(rel.to_path_buf());
                }
                Err(_) => warnings.push(TraceWarning::new(
                    codes::OUTSIDE_BASE,
                    format!("outside trace base {}", base.display()),
                    path,
                )),
            }
        }

        Ok(TraceResult {
            file_list,
            warnings,
        })
    }
}

fn is_scannable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SCANNABLE_EXTENSIONS.contains(&ext))
}
