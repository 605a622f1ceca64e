//! Vercel Build Output API (v3).

use super::{
    relative_import, write_json, BuildContext, BuiltBundle, BundleReport, Preset, IMMUTABLE_CACHE_CONTROL,
};
use crate::config::PresetKind;
use crate::pack::{pack_function, PackOptions};
use crate::paths::workspace_root;
use crate::routes::BundlePathEntry;
use crate::trace::TraceCache;
use crate::{Error, Result};
use fnpack_util::fs::{copy_dir_all, ensure_dir, remove_path, write_atomic};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Handler file Vercel invokes inside each function.
pub const HANDLER_FILE: &str = "index.mjs";

#[derive(Debug)]
pub struct VercelPreset {
    output: PathBuf,
}

impl VercelPreset {
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            output: root.join(".vercel").join("output"),
        }
    }

    fn function_dir(&self, bundle_id: &str) -> PathBuf {
        self.output
            .join("functions")
            .join(format!("{}.func", function_name(bundle_id)))
    }
}

/// Vercel function name for a bundle.
#[must_use]
pub fn function_name(bundle_id: &str) -> String {
    format!("_{bundle_id}")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionConfig<'a> {
    handler: &'a str,
    runtime: String,
    launcher_type: &'a str,
    supports_response_streaming: bool,
    regions: &'a [String],
}

/// Render `.vercel/output/config.json`.
#[must_use]
pub fn config_json(assets_dir: &str, routes: &[BundlePathEntry]) -> serde_json::Value {
    let mut entries = vec![
        json!({
            "src": format!("^/{assets_dir}/.*"),
            "headers": { "Cache-Control": IMMUTABLE_CACHE_CONTROL },
            "continue": true
        }),
        json!({ "handle": "filesystem" }),
    ];

    for route in routes {
        let src = if route.path.is_empty() {
            "^/.*$".to_string()
        } else {
            format!("^{}(?:/.*)?$", route.path)
        };
        entries.push(json!({ "src": src, "dest": function_name(&route.bundle_id) }));
    }

    json!({ "version": 3, "routes": entries })
}

impl Preset for VercelPreset {
    fn kind(&self) -> PresetKind {
        PresetKind::Vercel
    }

    fn output_dir(&self) -> Option<&Path> {
        Some(&self.output)
    }

    fn start(&mut self, ctx: &BuildContext<'_>, routes: &[BundlePathEntry]) -> Result<()> {
        ensure_dir(&self.output, true).map_err(|e| Error::pack(&self.output, e))?;

        tracing::info!("Copying assets...");
        let client = ctx.build_dir().join("client");
        let static_dir = self.output.join("static");
        ensure_dir(&static_dir, false).map_err(|e| Error::pack(&static_dir, e))?;
        if client.is_dir() {
            copy_dir_all(&client, &static_dir).map_err(|e| Error::pack(&client, e))?;
        }
        let vite_dir = static_dir.join(".vite");
        remove_path(&vite_dir).map_err(|e| Error::pack(&vite_dir, e))?;

        tracing::info!("Writing Vercel config file...");
        write_json(
            &self.output.join("config.json"),
            &config_json(&ctx.config.assets_dir, routes),
        )
    }

    fn bundle_end(
        &mut self,
        ctx: &BuildContext<'_>,
        bundle: &BuiltBundle,
        _routes: &[BundlePathEntry],
        cache: &mut TraceCache,
    ) -> Result<BundleReport> {
        let name = function_name(&bundle.id);
        tracing::info!("Copying Vercel function files for {name}...");

        let function_dir = self.function_dir(&bundle.id);
        ensure_dir(&function_dir, false).map_err(|e| Error::pack(&function_dir, e))?;

        let options = PackOptions::new(
            &bundle.bundle_file,
            &function_dir,
            workspace_root(&ctx.root),
        )
        .exclude_sibling(&ctx.config.server_build_file);
        let packed = pack_function(&options, ctx.tracer, cache)?;

        write_json(
            &function_dir.join(".vc-config.json"),
            &FunctionConfig {
                handler: HANDLER_FILE,
                runtime: format!("nodejs{}.x", ctx.config.node_version),
                launcher_type: "Nodejs",
                supports_response_streaming: true,
                regions: &ctx.config.regions,
            },
        )?;

        let entry = relative_import(&packed.entry_relative);
        let handler = function_dir.join(HANDLER_FILE);
        write_atomic(&handler, format!("export {{ default }} from \"{entry}\";\n").as_bytes())
            .map_err(|e| Error::pack(&handler, e))?;

        Ok(BundleReport {
            function_dir: Some(function_dir),
            entry: Some(entry),
            files: packed.files.len(),
            links: packed.links.len(),
            ..BundleReport::new(bundle)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::config::PresetConfig;
    use crate::manifest::{BuildManifest, RouteNode, ServerBundle};
    use crate::preset::run_preset;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_config_json_routes() {
        let routes = vec![
            BundlePathEntry::new("/blog", "bundle1"),
            BundlePathEntry::new("", "site"),
        ];
        let config = config_json("assets", &routes);

        assert_eq!(config["version"], 3);
        let entries = config["routes"].as_array().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0]["src"], "^/assets/.*");
        assert_eq!(
            entries[0]["headers"]["Cache-Control"],
            "public, max-age=31536000, immutable"
        );
        assert_eq!(entries[0]["continue"], true);
        assert_eq!(entries[1], json!({ "handle": "filesystem" }));
        assert_eq!(entries[2], json!({ "src": "^/blog(?:/.*)?$", "dest": "_bundle1" }));
        assert_eq!(entries[3], json!({ "src": "^/.*$", "dest": "_site" }));
    }

    #[test]
    fn test_vercel_output_layout() {
        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        project(&root);
        write(&root.join("build/server/chunk-1.js"), "");

        let config = PresetConfig {
            preset: PresetKind::Vercel,
            regions: vec!["iad1".into()],
            ..PresetConfig::default()
        };
        let manifest = BuildManifest::default();
        let bundler = FakeBundler::default();
        let ctx = BuildContext {
            root: root.clone(),
            config: &config,
            manifest: &manifest,
            bundler: &bundler,
            tracer: &EntryOnlyTracer,
        };

        let report = run_preset(&ctx).unwrap();
        let output = root.join(".vercel/output");
        assert_eq!(report.output_dir.as_deref(), Some(output.as_path()));

        assert!(output.join("static/assets/entry-abc.js").is_file());
        assert!(output.join("static/favicon.ico").is_file());
        assert!(!output.join("static/.vite").exists());

        let func = output.join("functions/_site.func");
        let vc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(func.join(".vc-config.json")).unwrap())
                .unwrap();
        assert_eq!(
            vc,
            json!({
                "handler": "index.mjs",
                "runtime": "nodejs22.x",
                "launcherType": "Nodejs",
                "supportsResponseStreaming": true,
                "regions": ["iad1"]
            })
        );

        assert_eq!(
            fs::read_to_string(func.join("index.mjs")).unwrap(),
            "export { default } from \"./server.mjs\";\n"
        );
        assert!(func.join("server.mjs").is_file());
        assert!(func.join("chunk-1.js").is_file());
        assert!(func.join("package.json").is_file());
        assert!(!func.join("index.js").exists());
        assert_eq!(report.bundles[0].entry.as_deref(), Some("./server.mjs"));
    }

    #[test]
    fn test_one_function_per_server_bundle() {
        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        project(&root);
        write(&root.join("build/server/bundle1/index.js"), "");
        write(&root.join("build/server/site/index.js"), "");

        let mut routes = BTreeMap::new();
        for node in [
            RouteNode::new("root", None, Some("")),
            RouteNode::new("routes/blog", Some("root"), Some("blog")),
            RouteNode::new("routes/home", Some("root"), None),
        ] {
            routes.insert(node.id.clone(), node);
        }
        let manifest = BuildManifest {
            routes,
            route_id_to_server_bundle_id: Some(
                [("routes/blog", "bundle1"), ("routes/home", "site")]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            server_bundles: Some(
                ["bundle1", "site"]
                    .into_iter()
                    .map(|id| {
                        (
                            id.to_string(),
                            ServerBundle {
                                id: id.to_string(),
                                file: PathBuf::from(format!("build/server/{id}/index.js")),
                            },
                        )
                    })
                    .collect(),
            ),
        };

        let config = PresetConfig {
            preset: PresetKind::Vercel,
            ..PresetConfig::default()
        };
        let bundler = FakeBundler::default();
        let ctx = BuildContext {
            root: root.clone(),
            config: &config,
            manifest: &manifest,
            bundler: &bundler,
            tracer: &EntryOnlyTracer,
        };

        let report = run_preset(&ctx).unwrap();
        let ids: Vec<&str> = report.bundles.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["bundle1", "site"]);

        let functions = root.join(".vercel/output/functions");
        assert!(functions.join("_bundle1.func/server.mjs").is_file());
        assert!(functions.join("_site.func/server.mjs").is_file());

        let config: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(root.join(".vercel/output/config.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(config["routes"][2]["dest"], "_bundle1");
        assert_eq!(config["routes"][2]["src"], "^/blog(?:/.*)?$");
    }
}
