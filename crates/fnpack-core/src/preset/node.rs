//! Plain Node server output: the bundle stays in the build directory and
//! extra files are copied next to it.

use super::{BuildContext, BuiltBundle, BundleReport, Preset};
use crate::config::PresetKind;
use crate::routes::BundlePathEntry;
use crate::trace::TraceCache;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct NodePreset {
    /// `include_files` matches, relative to the project root.
    matched: Vec<PathBuf>,
}

impl Preset for NodePreset {
    fn kind(&self) -> PresetKind {
        PresetKind::Node
    }

    fn start(&mut self, ctx: &BuildContext<'_>, _routes: &[BundlePathEntry]) -> Result<()> {
        self.matched = match_include_files(&ctx.root, &ctx.config.include_files)?;
        Ok(())
    }

    fn bundle_end(
        &mut self,
        ctx: &BuildContext<'_>,
        bundle: &BuiltBundle,
        _routes: &[BundlePathEntry],
        _cache: &mut TraceCache,
    ) -> Result<BundleReport> {
        let server_dir = ctx.build_dir().join("server");
        let mut report = BundleReport::new(bundle);

        for rel in &self.matched {
            let from = ctx.root.join(rel);
            let to = server_dir.join(rel);
            copy_entry(&from, &to).map_err(|e| Error::pack(&from, e))?;
            report.files += 1;
        }

        Ok(report)
    }
}

/// Expand `patterns` against `root`, sorted and deduplicated.
pub(crate) fn match_include_files(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut matched = Vec::new();

    for pattern in patterns {
        let full = root.join(pattern);
        let paths = glob::glob(&full.to_string_lossy()).map_err(|e| {
            Error::ConfigInvalid(format!("includeFiles pattern `{pattern}`: {e}"))
        })?;

        let paths = paths.map(|entry| {
            entry.map_err(|e| {
                Error::pack(e.path(), std::io::Error::new(e.error().kind(), e.to_string()))
            })
        });
        push_relative(root, paths, &mut matched)?;
    }

    matched.sort();
    matched.dedup();
    Ok(matched)
}

/// Append root-relative forms of `paths`; the first unreadable match aborts.
fn push_relative(
    root: &Path,
    paths: impl Iterator<Item = Result<PathBuf>>,
    out: &mut Vec<PathBuf>,
) -> Result<()> {
    for path in paths {
        let path = path?;
        if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_path_buf());
        }
    }
    Ok(())
}

fn copy_entry(from: &Path, to: &Path) -> std::io::Result<()> {
    if from.is_dir() {
        return fnpack_util::fs::copy_dir_all(from, to);
    }
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from, to).map(|_| ())
}
