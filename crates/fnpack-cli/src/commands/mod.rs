pub mod build;
pub mod dev;
pub mod pack;
pub mod routes;
pub mod version;

use fnpack_core::paths::project_root;
use fnpack_core::{BuildManifest, PresetConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Schema version of every `--json` document this CLI prints.
pub const JSON_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
pub struct ErrorJson {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorResult {
    schema_version: u32,
    ok: bool,
    error: ErrorJson,
}

/// Print a failed command result as JSON and exit with status 1.
pub fn exit_with_json_error(code: &str, message: impl Into<String>) -> ! {
    let result = ErrorResult {
        schema_version: JSON_SCHEMA_VERSION,
        ok: false,
        error: ErrorJson {
            code: code.to_string(),
            message: message.into(),
        },
    };
    println!("{}", serde_json::to_string(&result).unwrap());
    std::process::exit(1);
}

/// Resolve the project root for `cwd` and load its configuration.
pub fn load_project(cwd: &Path) -> fnpack_core::Result<(PathBuf, PresetConfig)> {
    if !cwd.is_dir() {
        return Err(fnpack_core::Error::ProjectNotFound {
            start: cwd.to_path_buf(),
        });
    }
    let root = project_root(cwd).unwrap_or_else(|| cwd.to_path_buf());
    let config = PresetConfig::load(&root)?;
    Ok((root, config))
}

/// Load the configured build manifest, or an empty one.
pub fn load_manifest(root: &Path, config: &PresetConfig) -> fnpack_core::Result<BuildManifest> {
    match &config.manifest {
        Some(path) => BuildManifest::load(&root.join(path)),
        None => Ok(BuildManifest::default()),
    }
}

/// Unwrap `result`, reporting failures as JSON or as a diagnostic.
pub fn or_report<T>(result: fnpack_core::Result<T>, json: bool) -> miette::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if json => exit_with_json_error(e.code(), e.to_string()),
        Err(e) => Err(miette::miette!(code = e.code(), "{e}")),
    }
}
