//! `fnpack pack` command implementation.
//!
//! Runs the packager on its own: trace a bundled server file and copy its
//! runtime closure into a directory.

use super::{load_project, or_report, JSON_SCHEMA_VERSION};
use fnpack_core::paths::workspace_root;
use fnpack_core::{pack_function, NodeTracer, PackOptions, TraceCache};
use fnpack_util::path::to_slash;
use miette::Result;
use serde::Serialize;
use std::path::PathBuf;

/// Pack command action.
#[derive(Debug, Clone)]
pub struct PackAction {
    pub cwd: PathBuf,
    pub bundle: PathBuf,
    pub out: PathBuf,
    pub base: Option<PathBuf>,
    pub exclude_siblings: Vec<String>,
}

#[derive(Serialize)]
struct PackResultJson {
    schema_version: u32,
    ok: bool,
    ancestor: String,
    entry: String,
    files: Vec<String>,
    links: Vec<String>,
}

/// Run the pack command.
pub fn run(action: PackAction, json: bool) -> Result<()> {
    let (root, _config) = or_report(load_project(&action.cwd), json)?;

    let absolute = |p: PathBuf| if p.is_absolute() { p } else { action.cwd.join(p) };
    let bundle = absolute(action.bundle);
    let out = absolute(action.out);
    let base = action
        .base
        .map_or_else(|| workspace_root(&root), absolute);

    let options = action
        .exclude_siblings
        .into_iter()
        .fold(PackOptions::new(&bundle, &out, &base), PackOptions::exclude_sibling);

    let mut cache = TraceCache::new();
    let packed = or_report(pack_function(&options, &NodeTracer::new(), &mut cache), json)?;

    if json {
        let result = PackResultJson {
            schema_version: JSON_SCHEMA_VERSION,
            ok: true,
            ancestor: to_slash(&packed.ancestor),
            entry: to_slash(&packed.entry_relative),
            files: packed.files.iter().map(|p| to_slash(p)).collect(),
            links: packed.links.iter().map(|p| to_slash(p)).collect(),
        };
        println!("{}", serde_json::to_string(&result).unwrap());
        return Ok(());
    }

    println!(
        "Packed {} into {} ({} files, {} links)",
        to_slash(&packed.entry_relative),
        out.display(),
        packed.files.len(),
        packed.links.len()
    );
    Ok(())
}
