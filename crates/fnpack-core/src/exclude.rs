//! Dev-server request exclusion.
//!
//! Decides whether a request URL bypasses the application handler and falls
//! through to static/asset handling. Patterns are computed once per dev
//! server start.

use glob::{MatchOptions, Pattern};
use regex_lite::Regex;

/// A user-supplied exclusion: either a ready regex or a glob string.
#[derive(Debug, Clone)]
pub enum ExcludeSource {
    Regex(Regex),
    Glob(String),
}

impl From<Regex> for ExcludeSource {
    fn from(re: Regex) -> Self {
        Self::Regex(re)
    }
}

impl From<&str> for ExcludeSource {
    fn from(glob: &str) -> Self {
        Self::Glob(glob.to_string())
    }
}

impl From<String> for ExcludeSource {
    fn from(glob: String) -> Self {
        Self::Glob(glob)
    }
}

/// A compiled exclusion pattern.
#[derive(Debug, Clone)]
pub enum ExcludePattern {
    /// Matches when `matcher` matches and `unless` (if any) does not.
    Regex {
        matcher: Regex,
        unless: Option<Regex>,
    },
    /// Shell glob; `*` stays within one segment, `**` crosses segments.
    Glob(Pattern),
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl ExcludePattern {
    #[must_use]
    pub fn is_match(&self, url: &str) -> bool {
        match self {
            Self::Regex { matcher, unless } => {
                matcher.is_match(url) && !unless.as_ref().is_some_and(|u| u.is_match(url))
            }
            Self::Glob(pattern) => pattern.matches_with(url, GLOB_OPTIONS),
        }
    }
}

/// Data requests keep their extension but must reach the app handler.
const DATA_SUFFIX: &str = r"\.data(\?|$)";

/// Build the exclusion list for an application directory.
///
/// `app_dir` is relative to the project root (e.g. `src/app`). Files with an
/// extension and hidden directories under the app directory and its top-level
/// ancestor are excluded, except `.data` requests. User patterns follow in
/// order; globs that fail to compile are dropped.
#[must_use]
pub fn create_exclude_patterns<I, S>(app_dir: &str, user: I) -> Vec<ExcludePattern>
where
    I: IntoIterator<Item = S>,
    S: Into<ExcludeSource>,
{
    let app_path = normalize_app_dir(app_dir);
    let app_root = app_path.split('/').next().unwrap_or_default().to_string();

    let mut patterns = Vec::new();
    push_root_patterns(&mut patterns, &app_path);
    if app_root != app_path {
        push_root_patterns(&mut patterns, &app_root);
    }

    for source in user {
        match source.into() {
            ExcludeSource::Regex(re) => patterns.push(ExcludePattern::Regex {
                matcher: re,
                unless: None,
            }),
            ExcludeSource::Glob(glob) => {
                if let Ok(pattern) = Pattern::new(&glob) {
                    patterns.push(ExcludePattern::Glob(pattern));
                }
            }
        }
    }

    patterns
}

fn push_root_patterns(patterns: &mut Vec<ExcludePattern>, root: &str) {
    if root.is_empty() {
        return;
    }
    let prefix = regex_lite::escape(root);

    // Generated from escaped input, so these always compile.
    if let (Ok(asset), Ok(unless)) = (
        Regex::new(&format!(r"^/{prefix}/.*\.")),
        Regex::new(DATA_SUFFIX),
    ) {
        patterns.push(ExcludePattern::Regex {
            matcher: asset,
            unless: Some(unless),
        });
    }

    if let Ok(hidden) = Regex::new(&format!(r"^/{prefix}/.*/\..*/")) {
        patterns.push(ExcludePattern::Regex {
            matcher: hidden,
            unless: None,
        });
    }
}

fn normalize_app_dir(app_dir: &str) -> String {
    app_dir
        .replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether a request should skip the application handler.
#[must_use]
pub fn should_exclude(url: &str, patterns: &[ExcludePattern]) -> bool {
    if url.contains("/node_modules/") || url.starts_with("/@") || url.contains("?import") {
        return true;
    }

    patterns.iter().any(|p| p.is_match(url))
}
