//! `fnpack routes` command implementation.

use super::{load_manifest, load_project, or_report, JSON_SCHEMA_VERSION};
use fnpack_core::{partition, BundlePathEntry};
use miette::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct RoutesJson<'a> {
    schema_version: u32,
    ok: bool,
    routes: &'a [BundlePathEntry],
}

/// Print the URL prefix → bundle partition of the build manifest.
pub fn run(cwd: &Path, manifest: Option<PathBuf>, json: bool) -> Result<()> {
    let (root, mut config) = or_report(load_project(cwd), json)?;
    if let Some(manifest) = manifest {
        config = config.with_manifest(manifest);
    }

    let manifest = or_report(load_manifest(&root, &config), json)?;
    let routes = or_report(partition(&manifest), json)?;

    if json {
        let result = RoutesJson {
            schema_version: JSON_SCHEMA_VERSION,
            ok: true,
            routes: &routes,
        };
        println!("{}", serde_json::to_string(&result).unwrap());
        return Ok(());
    }

    let width = routes.iter().map(|r| display_path(r).len()).max().unwrap_or(0);
    for route in &routes {
        println!("{:<width$}  {}", display_path(route), route.bundle_id);
    }
    Ok(())
}

fn display_path(route: &BundlePathEntry) -> &str {
    if route.path.is_empty() {
        "/*"
    } else {
        &route.path
    }
}
