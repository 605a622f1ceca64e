use std::path::{Path, PathBuf};

/// Markers that identify a monorepo/workspace root.
const WORKSPACE_MARKERS: &[&str] = &["pnpm-workspace.yaml", "lerna.json"];

/// Find the project root by walking up from `cwd` looking for `package.json` or `.git`.
///
/// Returns the first directory containing either marker, or `None` if neither is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join("package.json").exists() || current.join(".git").exists() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Find the workspace root that contains `start`.
///
/// Walks upward looking for a workspace marker (`pnpm-workspace.yaml`,
/// `lerna.json`, or a `package.json` declaring `workspaces`). Without one,
/// the nearest directory holding a `package.json` is used, and failing that
/// `start`'s own directory.
#[must_use]
pub fn workspace_root(start: &Path) -> PathBuf {
    let start_dir = if start.is_dir() {
        start.to_path_buf()
    } else {
        start.parent().map_or_else(|| start.to_path_buf(), Path::to_path_buf)
    };

    let mut nearest_package: Option<PathBuf> = None;
    let mut current = Some(start_dir.as_path());

    while let Some(dir) = current {
        if WORKSPACE_MARKERS.iter().any(|m| dir.join(m).is_file()) {
            return dir.to_path_buf();
        }

        let pkg_json = dir.join("package.json");
        if pkg_json.is_file() {
            if has_workspaces_field(&pkg_json) {
                return dir.to_path_buf();
            }
            if nearest_package.is_none() {
                nearest_package = Some(dir.to_path_buf());
            }
        }

        current = dir.parent();
    }

    nearest_package.unwrap_or(start_dir)
}

fn has_workspaces_field(pkg_json: &Path) -> bool {
    std::fs::read_to_string(pkg_json)
        .ok()
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
        .is_some_and(|v| v.get("workspaces").is_some())
}
