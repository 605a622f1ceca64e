//! Build orchestration.
//!
//! [`run_preset`] walks every server bundle in key order: write the bundle's
//! `package.json`, bundle the server entry, drop what the bundle inlined,
//! then hand the result to the deployment preset for packaging.
//!
//! Bundles are processed one at a time. Later bundles reuse the trace cache
//! filled by earlier ones and may package into overlapping directories.

mod netlify;
mod node;
pub mod package;
mod vercel;

pub use netlify::NetlifyPreset;
pub use node::NodePreset;
pub use vercel::VercelPreset;

use crate::bundler::{BundleRequest, Bundler, SERVER_BUILD_MODULE};
use crate::config::{PresetConfig, PresetKind};
use crate::manifest::{BuildManifest, ServerBundle};
use crate::routes::{partition, BundlePathEntry};
use crate::trace::{TraceCache, Tracer};
use crate::{Error, Result};
use fnpack_util::path::to_slash;
use package::{dist_package_json, retained_dependencies, AppPackage};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the bundled server inside each bundle's build directory.
pub const BUNDLE_FILE_NAME: &str = "server.mjs";

/// Cache-Control for fingerprinted client assets.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Everything a build needs, fixed for its whole duration.
pub struct BuildContext<'a> {
    /// Project root; relative config paths resolve against it.
    pub root: PathBuf,
    pub config: &'a PresetConfig,
    pub manifest: &'a BuildManifest,
    pub bundler: &'a dyn Bundler,
    pub tracer: &'a dyn Tracer,
}

impl BuildContext<'_> {
    #[must_use]
    pub fn build_dir(&self) -> PathBuf {
        self.root.join(&self.config.build_directory)
    }

    #[must_use]
    pub fn server_bundles(&self) -> BTreeMap<String, ServerBundle> {
        self.manifest
            .server_bundles_or_default(&self.config.build_directory, &self.config.server_build_file)
    }
}

/// A server bundle that has been built and is ready for packaging.
#[derive(Debug, Clone)]
pub struct BuiltBundle {
    pub id: String,
    /// Directory holding the framework's server build for this bundle.
    pub build_path: PathBuf,
    /// The bundled server file.
    pub bundle_file: PathBuf,
}

/// Outcome for one bundle.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReport {
    pub id: String,
    pub bundle_file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    pub files: usize,
    pub links: usize,
}

impl BundleReport {
    fn new(bundle: &BuiltBundle) -> Self {
        Self {
            id: bundle.id.clone(),
            bundle_file: bundle.bundle_file.clone(),
            ..Self::default()
        }
    }
}

/// Outcome of a whole build.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub preset: PresetKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    pub routes: Vec<BundlePathEntry>,
    pub bundles: Vec<BundleReport>,
}

/// Deployment-specific stages around the shared bundle loop.
pub trait Preset {
    fn kind(&self) -> PresetKind;

    /// Directory the preset writes its deployment output to, if any.
    fn output_dir(&self) -> Option<&Path> {
        None
    }

    /// Runs once before any bundle is built.
    fn start(&mut self, _ctx: &BuildContext<'_>, _routes: &[BundlePathEntry]) -> Result<()> {
        Ok(())
    }

    /// Runs after each bundle is built.
    fn bundle_end(
        &mut self,
        ctx: &BuildContext<'_>,
        bundle: &BuiltBundle,
        routes: &[BundlePathEntry],
        cache: &mut TraceCache,
    ) -> Result<BundleReport>;
}

/// The preset configured for `ctx`.
#[must_use]
pub fn preset_for(ctx: &BuildContext<'_>) -> Box<dyn Preset> {
    match ctx.config.preset {
        PresetKind::Node => Box::new(NodePreset::default()),
        PresetKind::Vercel => Box::new(VercelPreset::new(&ctx.root)),
        PresetKind::Netlify => Box::new(NetlifyPreset::new(&ctx.root)),
    }
}

/// Build and package every server bundle with the configured preset.
///
/// # Errors
/// Stops at the first failing bundle; nothing after it is built.
pub fn run_preset(ctx: &BuildContext<'_>) -> Result<BuildReport> {
    run_with(ctx, preset_for(ctx).as_mut())
}

/// [`run_preset`] with an explicit preset.
///
/// # Errors
/// See [`run_preset`].
pub fn run_with(ctx: &BuildContext<'_>, preset: &mut dyn Preset) -> Result<BuildReport> {
    ctx.config.validate()?;

    let routes = partition(ctx.manifest)?;
    let app = AppPackage::load(&ctx.root)?;
    let dependencies = retained_dependencies(&app.dependencies, ctx.config.ssr_external.as_ref());

    tracing::info!(preset = preset.kind().as_str(), "Bundle server for production...");
    preset.start(ctx, &routes)?;

    let mut cache = TraceCache::new();
    let mut bundles = Vec::new();

    for bundle in ctx.server_bundles().values() {
        let built = build_bundle(ctx, bundle, &app, &dependencies)?;
        let report = preset.bundle_end(ctx, &built, &routes, &mut cache)?;
        bundles.push(report);
    }

    tracing::debug!(
        scanned = cache.len(),
        hits = cache.hits(),
        misses = cache.misses(),
        "trace cache"
    );

    Ok(BuildReport {
        preset: preset.kind(),
        output_dir: preset.output_dir().map(Path::to_path_buf),
        routes,
        bundles,
    })
}

/// Bundle one server bundle and remove the inputs the bundle replaced.
fn build_bundle(
    ctx: &BuildContext<'_>,
    bundle: &ServerBundle,
    app: &AppPackage,
    dependencies: &BTreeMap<String, String>,
) -> Result<BuiltBundle> {
    let config = ctx.config;
    let build_file = ctx.root.join(&bundle.file);
    let build_path = build_file
        .parent()
        .map_or_else(|| ctx.root.clone(), Path::to_path_buf);

    fnpack_util::fs::write_atomic(
        &build_path.join("package.json"),
        dist_package_json(app, dependencies, config.node_version).as_bytes(),
    )
    .map_err(|e| Error::pack(&build_path, e))?;

    tracing::info!("Bundle file for {}...", bundle.id);

    let bundle_file = build_path.join(BUNDLE_FILE_NAME);
    let request = bundle_request(ctx, &build_file, &bundle_file, dependencies);

    if let Err(source) = ctx.bundler.bundle(&request) {
        tracing::error!(bundle = %bundle.id, error = %source, "bundling failed");
        return Err(Error::Bundle {
            bundle_id: bundle.id.clone(),
            source,
        });
    }

    for leftover in [build_path.join(&config.assets_dir), build_file] {
        fnpack_util::fs::remove_path(&leftover).map_err(|e| Error::pack(&leftover, e))?;
    }

    Ok(BuiltBundle {
        id: bundle.id.clone(),
        build_path,
        bundle_file,
    })
}

/// Bundler invocation for one server bundle.
#[must_use]
pub fn bundle_request(
    ctx: &BuildContext<'_>,
    build_file: &Path,
    bundle_file: &Path,
    dependencies: &BTreeMap<String, String>,
) -> BundleRequest {
    let config = ctx.config;
    let entry = ctx.root.join(&config.app_directory).join(&config.entry_file);

    BundleRequest::new(entry, bundle_file, config.node_version)
        .alias(SERVER_BUILD_MODULE, build_file)
        .define_str("process.env.NODE_ENV", "production")
        .define_str("import.meta.env.NODE_ENV", "production")
        .define_str(
            "import.meta.env.RESOLID_BUILD_DIR",
            &to_slash(&config.build_directory),
        )
        .define_str("import.meta.env.RESOLID_ASSETS_DIR", &config.assets_dir)
        .defines(config.define.clone())
        .externals(std::iter::once("vite".to_string()).chain(dependencies.keys().cloned()))
        .loaders(config.bundle_loader.clone())
}

/// Write `value` as pretty-printed JSON.
pub(crate) fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::pack(path, std::io::Error::other(e)))?;
    fnpack_util::fs::write_atomic(path, text.as_bytes()).map_err(|e| Error::pack(path, e))
}

/// JS import specifier for a path relative to the importing file.
pub(crate) fn relative_import(path: &Path) -> String {
    let slashed = to_slash(path);
    if slashed.starts_with("../") {
        slashed
    } else {
        format!("./{slashed}")
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the preset tests.

    use super::*;
    use crate::bundler::BundleError;
    use crate::trace::TraceResult;
    use std::fs;
    use std::sync::Mutex;

    /// Writes a tiny ESM file instead of running a real bundler.
    #[derive(Default)]
    pub struct FakeBundler {
        pub requests: Mutex<Vec<BundleRequest>>,
        pub fail: bool,
    }

    impl Bundler for FakeBundler {
        fn bundle(&self, request: &BundleRequest) -> std::result::Result<(), BundleError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(BundleError::new(crate::bundler::codes::BUNDLE_FAILED, "boom"));
            }
            fs::write(&request.outfile, "export default {};\n").unwrap();
            Ok(())
        }
    }

    /// Reports only the entries themselves.
    pub struct EntryOnlyTracer;

    impl Tracer for EntryOnlyTracer {
        fn trace(
            &self,
            entries: &[PathBuf],
            base: &Path,
            _cache: &mut TraceCache,
        ) -> Result<TraceResult> {
            let base = dunce::canonicalize(base).unwrap();
            Ok(TraceResult {
                file_list: entries
                    .iter()
                    .map(|e| e.strip_prefix(&base).unwrap().to_path_buf())
                    .collect(),
                warnings: Vec::new(),
            })
        }
    }

    pub fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// A project with a built site bundle at `build/server/index.js`.
    pub fn project(root: &Path) {
        write(
            &root.join("package.json"),
            r#"{"name":"demo","type":"module","dependencies":{"pg":"^8.0.0"}}"#,
        );
        write(&root.join("app/server.ts"), "export default {}");
        write(&root.join("build/server/index.js"), "export const routes = {}");
        write(&root.join("build/server/assets/server-abc.css"), "");
        write(&root.join("build/client/assets/entry-abc.js"), "");
        write(&root.join("build/client/.vite/manifest.json"), "{}");
        write(&root.join("build/client/favicon.ico"), "");
    }
}
