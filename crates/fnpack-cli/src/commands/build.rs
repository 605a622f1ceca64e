//! `fnpack build` command implementation.

use super::{exit_with_json_error, load_manifest, load_project, or_report, JSON_SCHEMA_VERSION};
use fnpack_core::preset::BundleReport;
use fnpack_core::{
    run_preset, BuildContext, BundlePathEntry, EsbuildBundler, NodeTracer, PresetKind,
};
use fnpack_util::path::to_slash;
use miette::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Build command action.
#[derive(Debug, Clone)]
pub struct BuildAction {
    pub cwd: PathBuf,
    pub preset: Option<PresetKind>,
    pub manifest: Option<PathBuf>,
    pub node_version: Option<u8>,
    pub regions: Vec<String>,
}

#[derive(Serialize)]
struct BuildResultJson<'a> {
    schema_version: u32,
    ok: bool,
    preset: PresetKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dir: Option<String>,
    duration_ms: u64,
    routes: &'a [BundlePathEntry],
    bundles: &'a [BundleReport],
}

/// Run the build command.
pub fn run(action: BuildAction, json: bool) -> Result<()> {
    let start = Instant::now();
    let (root, mut config) = or_report(load_project(&action.cwd), json)?;

    if let Some(preset) = action.preset {
        config = config.with_preset(preset);
    }
    if let Some(version) = action.node_version {
        config = config.with_node_version(version);
    }
    if let Some(manifest) = action.manifest {
        config = config.with_manifest(manifest);
    }
    if !action.regions.is_empty() {
        config = config.with_regions(action.regions);
    }

    let manifest = or_report(load_manifest(&root, &config), json)?;

    let bundler = match EsbuildBundler::locate(&root) {
        Ok(bundler) => bundler,
        Err(e) if json => exit_with_json_error(e.code, e.to_string()),
        Err(e) => return Err(miette::miette!(code = e.code, "{e}")),
    };
    let tracer = NodeTracer::new();

    let ctx = BuildContext {
        root: root.clone(),
        config: &config,
        manifest: &manifest,
        bundler: &bundler,
        tracer: &tracer,
    };

    let _span = tracing::info_span!("build", preset = config.preset.as_str()).entered();
    let report = or_report(run_preset(&ctx), json)?;
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    if json {
        let result = BuildResultJson {
            schema_version: JSON_SCHEMA_VERSION,
            ok: true,
            preset: report.preset,
            output_dir: report.output_dir.as_deref().map(|p| display(&root, p)),
            duration_ms,
            routes: &report.routes,
            bundles: &report.bundles,
        };
        println!("{}", serde_json::to_string(&result).unwrap());
        return Ok(());
    }

    for bundle in &report.bundles {
        match &bundle.function_dir {
            Some(dir) => println!(
                "  {} → {} ({} files, {} links)",
                bundle.id,
                display(&root, dir),
                bundle.files,
                bundle.links
            ),
            None => println!("  {} → {}", bundle.id, display(&root, &bundle.bundle_file)),
        }
    }
    match &report.output_dir {
        Some(dir) => println!(
            "Built {} bundle(s) for {} in {duration_ms}ms: {}",
            report.bundles.len(),
            report.preset.as_str(),
            display(&root, dir)
        ),
        None => println!(
            "Built {} bundle(s) for {} in {duration_ms}ms",
            report.bundles.len(),
            report.preset.as_str()
        ),
    }

    Ok(())
}

fn display(root: &Path, path: &Path) -> String {
    to_slash(path.strip_prefix(root).unwrap_or(path))
}
