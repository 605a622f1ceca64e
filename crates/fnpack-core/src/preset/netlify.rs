//! Netlify Frameworks API (`.netlify/v1`).

use super::{
    relative_import, write_json, BuildContext, BuiltBundle, BundleReport, Preset,
    IMMUTABLE_CACHE_CONTROL,
};
use crate::config::PresetKind;
use crate::pack::{pack_function, PackOptions};
use crate::paths::workspace_root;
use crate::routes::{paths_for_bundle, BundlePathEntry};
use crate::trace::TraceCache;
use crate::version::generator;
use crate::{Error, Result};
use fnpack_util::fs::{ensure_dir, write_atomic};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct NetlifyPreset {
    output: PathBuf,
}

impl NetlifyPreset {
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            output: root.join(".netlify").join("v1"),
        }
    }

    fn functions_dir(&self) -> PathBuf {
        self.output.join("functions")
    }
}

/// Render `.netlify/v1/config.json`.
#[must_use]
pub fn config_json(assets_dir: &str) -> serde_json::Value {
    json!({
        "headers": [{
            "for": format!("^/{assets_dir}/.*"),
            "values": { "Cache-Control": IMMUTABLE_CACHE_CONTROL }
        }]
    })
}

/// The `path` value of a function config: `"/*"` for a catch-all bundle,
/// otherwise each owned prefix and everything below it.
#[must_use]
pub fn path_pattern(paths: &[&str]) -> serde_json::Value {
    if paths.is_empty() || paths.contains(&"") {
        return json!("/*");
    }
    let patterns: Vec<String> = paths
        .iter()
        .flat_map(|p| [(*p).to_string(), format!("{p}/*")])
        .collect();
    json!(patterns)
}

/// Render the function wrapper module.
#[must_use]
pub fn function_module(bundle_id: &str, entry: &str, paths: &[&str], node_version: u8) -> String {
    let quote = |s: &str| serde_json::Value::from(s).to_string();
    format!(
        "export {{ default }} from {entry};\n\
         export const config = {{\n  \
           path: {path},\n  \
           displayName: {name},\n  \
           generator: {generator},\n  \
           preferStatic: true,\n  \
           nodeVersion: {node_version}\n\
         }};\n",
        entry = quote(entry),
        path = path_pattern(paths),
        name = quote(&format!("{bundle_id} server")),
        generator = quote(&generator()),
    )
}

impl Preset for NetlifyPreset {
    fn kind(&self) -> PresetKind {
        PresetKind::Netlify
    }

    fn output_dir(&self) -> Option<&Path> {
        Some(&self.output)
    }

    fn start(&mut self, ctx: &BuildContext<'_>, _routes: &[BundlePathEntry]) -> Result<()> {
        ensure_dir(&self.output, true).map_err(|e| Error::pack(&self.output, e))?;

        tracing::info!("Writing Netlify config file...");
        let config = config_json(&ctx.config.assets_dir);
        write_json(&self.output.join("config.json"), &config)?;

        let functions = self.functions_dir();
        ensure_dir(&functions, false).map_err(|e| Error::pack(&functions, e))
    }

    fn bundle_end(
        &mut self,
        ctx: &BuildContext<'_>,
        bundle: &BuiltBundle,
        routes: &[BundlePathEntry],
        cache: &mut TraceCache,
    ) -> Result<BundleReport> {
        tracing::info!("Copying Netlify function files for {}...", bundle.id);

        let functions = self.functions_dir();
        let options =
            PackOptions::new(&bundle.bundle_file, &functions, workspace_root(&ctx.root))
                .exclude_sibling(&ctx.config.server_build_file);
        let packed = pack_function(&options, ctx.tracer, cache)?;

        let entry = relative_import(&packed.entry_relative);
        let paths = paths_for_bundle(routes, &bundle.id);
        let module = function_module(&bundle.id, &entry, &paths, ctx.config.node_version);
        let wrapper = functions.join(format!("{}.mjs", bundle.id));
        write_atomic(&wrapper, module.as_bytes()).map_err(|e| Error::pack(&wrapper, e))?;

        Ok(BundleReport {
            function_dir: Some(functions),
            entry: Some(entry),
            files: packed.files.len(),
            links: packed.links.len(),
            ..BundleReport::new(bundle)
        })
    }
}
