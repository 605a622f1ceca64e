//! Dev-server request routing.
//!
//! Every incoming URL is classified once: a file in the public directory,
//! a request that bypasses the application (assets, tool paths, user
//! exclusions), or an application request.

use crate::config::PresetConfig;
use crate::exclude::{create_exclude_patterns, should_exclude, ExcludePattern, ExcludeSource};
use fnpack_util::path::to_slash;
use regex_lite::Regex;
use std::path::{Component, Path, PathBuf};

/// Prefix marking an `exclude` entry as a regular expression.
pub const REGEX_PREFIX: &str = "re:";

/// Where a dev request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// An existing file in the public directory.
    Public(PathBuf),
    /// Not for the application; served from the project as-is.
    Skip,
    App,
}

/// Request classifier for one dev-server run.
#[derive(Debug)]
pub struct DevRouter {
    root: PathBuf,
    public_dir: PathBuf,
    /// Server entry, relative to the project root.
    entry: String,
    patterns: Vec<ExcludePattern>,
}

impl DevRouter {
    #[must_use]
    pub fn new(root: &Path, config: &PresetConfig) -> Self {
        let app_dir = to_slash(&config.app_directory);
        let patterns = create_exclude_patterns(&app_dir, exclude_sources(&config.exclude));

        Self {
            root: root.to_path_buf(),
            public_dir: root.join(&config.public_dir),
            entry: to_slash(&config.app_directory.join(&config.entry_file)),
            patterns,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    #[must_use]
    pub fn patterns(&self) -> &[ExcludePattern] {
        &self.patterns
    }

    #[must_use]
    pub fn dispatch(&self, url: &str) -> Dispatch {
        if let Some(file) = self.public_file(url) {
            return Dispatch::Public(file);
        }
        if should_exclude(url, &self.patterns) {
            return Dispatch::Skip;
        }
        Dispatch::App
    }

    /// Check that the server entry exists and has a default export.
    ///
    /// # Errors
    /// Returns the message reported to the client when it does not.
    pub fn check_entry(&self) -> Result<(), String> {
        let missing = || format!("Failed to find default export from {}", self.entry);
        let source = std::fs::read_to_string(self.root.join(&self.entry)).map_err(|_| missing())?;
        if has_default_export(&source) {
            Ok(())
        } else {
            Err(missing())
        }
    }

    fn public_file(&self, url: &str) -> Option<PathBuf> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let rel = Path::new(path.trim_start_matches('/'));
        if rel.as_os_str().is_empty()
            || rel.components().any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        let file = self.public_dir.join(rel);
        file.is_file().then_some(file)
    }
}

/// Turn `exclude` config strings into sources; invalid regexes are dropped.
fn exclude_sources(exclude: &[String]) -> Vec<ExcludeSource> {
    exclude
        .iter()
        .filter_map(|entry| match entry.strip_prefix(REGEX_PREFIX) {
            Some(re) => match Regex::new(re) {
                Ok(re) => Some(ExcludeSource::Regex(re)),
                Err(e) => {
                    tracing::warn!(pattern = %re, error = %e, "ignoring invalid exclude regex");
                    None
                }
            },
            None => Some(ExcludeSource::Glob(entry.clone())),
        })
        .collect()
}

fn has_default_export(source: &str) -> bool {
    source.contains("export default")
        || Regex::new(r"export\s*\{[^}]*\bas\s+default\b")
            .map(|re| re.is_match(source))
            .unwrap_or(false)
}
