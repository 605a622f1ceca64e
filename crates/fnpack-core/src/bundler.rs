//! Server bundling.
//!
//! Bundling itself is delegated: a [`Bundler`] turns the server entry into a
//! single ESM file. [`EsbuildBundler`] drives the `esbuild` binary installed
//! in the project.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Error codes.
pub mod codes {
    pub const BUNDLER_NOT_FOUND: &str = "BUNDLER_NOT_FOUND";
    pub const BUNDLER_SPAWN_FAILED: &str = "BUNDLER_SPAWN_FAILED";
    pub const BUNDLE_FAILED: &str = "BUNDLE_FAILED";
}

/// Module id the server entry imports the framework build from.
pub const SERVER_BUILD_MODULE: &str = "virtual:react-router/server-build";

/// Injected at the top of every bundle so CommonJS dependencies can `require`.
pub const REQUIRE_BANNER: &str =
    "import { createRequire } from 'module';const require = createRequire(import.meta.url);";

/// Extensions emitted as separate files instead of being inlined.
pub const FILE_LOADER_EXTENSIONS: &[&str] = &[
    ".aac", ".css", ".eot", ".flac", ".gif", ".jpeg", ".jpg", ".mp3", ".mp4", ".ogg", ".otf",
    ".png", ".svg", ".ttf", ".wav", ".webm", ".webp", ".woff", ".woff2",
];

/// Lines of bundler stderr kept in an error.
const STDERR_TAIL_LINES: usize = 20;

/// Bundler failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleError {
    pub code: &'static str,
    pub message: String,
    pub path: Option<String>,
}

impl BundleError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }
}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: {} ({})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for BundleError {}

/// Everything a bundler needs to produce one server bundle.
#[derive(Debug, Clone, Default)]
pub struct BundleRequest {
    pub entry: PathBuf,
    pub outfile: PathBuf,
    /// Module id → replacement path.
    pub alias: BTreeMap<String, PathBuf>,
    /// Identifier → JS expression.
    pub define: BTreeMap<String, String>,
    pub external: Vec<String>,
    /// Extension → loader name.
    pub loader: BTreeMap<String, String>,
    pub banner: Option<String>,
    pub node_version: u8,
}

impl BundleRequest {
    #[must_use]
    pub fn new(entry: impl Into<PathBuf>, outfile: impl Into<PathBuf>, node_version: u8) -> Self {
        Self {
            entry: entry.into(),
            outfile: outfile.into(),
            loader: default_loaders(),
            banner: Some(REQUIRE_BANNER.to_string()),
            node_version,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn alias(mut self, module: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.alias.insert(module.into(), path.into());
        self
    }

    /// Define `key` as the JSON string `value`.
    #[must_use]
    pub fn define_str(mut self, key: impl Into<String>, value: &str) -> Self {
        self.define
            .insert(key.into(), serde_json::Value::from(value).to_string());
        self
    }

    #[must_use]
    pub fn defines<I, K, V>(mut self, defines: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.define
            .extend(defines.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn externals<I, S>(mut self, external: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.external.extend(external.into_iter().map(Into::into));
        self
    }

    /// Override loaders; user entries win over the defaults.
    #[must_use]
    pub fn loaders<I, K, V>(mut self, loaders: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.loader
            .extend(loaders.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// `file` loader for every media, font and stylesheet extension.
#[must_use]
pub fn default_loaders() -> BTreeMap<String, String> {
    FILE_LOADER_EXTENSIONS
        .iter()
        .map(|ext| ((*ext).to_string(), "file".to_string()))
        .collect()
}

/// Produces a server bundle.
pub trait Bundler: Send + Sync {
    /// Build `request.entry` into `request.outfile`.
    ///
    /// # Errors
    /// Returns a [`BundleError`] if the bundle could not be produced.
    fn bundle(&self, request: &BundleRequest) -> Result<(), BundleError>;
}

/// Runs the project's `esbuild` binary.
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    binary: PathBuf,
    cwd: PathBuf,
}

impl EsbuildBundler {
    pub fn new(binary: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cwd: cwd.into(),
        }
    }

    /// Find `esbuild` in `node_modules/.bin` of `root` or any parent, then
    /// on `PATH`.
    ///
    /// # Errors
    /// Returns `BUNDLER_NOT_FOUND` if no binary exists.
    pub fn locate(root: &Path) -> Result<Self, BundleError> {
        let names: &[&str] = if cfg!(windows) {
            &["esbuild.cmd", "esbuild.exe", "esbuild"]
        } else {
            &["esbuild"]
        };

        for dir in root.ancestors() {
            let bin = dir.join("node_modules").join(".bin");
            if let Some(found) = names.iter().map(|n| bin.join(n)).find(|p| p.is_file()) {
                return Ok(Self::new(found, root));
            }
        }

        which::which("esbuild")
            .map(|found| Self::new(found, root))
            .map_err(|e| {
                BundleError::new(
                    codes::BUNDLER_NOT_FOUND,
                    format!("esbuild not found in node_modules/.bin or PATH: {e}"),
                )
                .with_path(root)
            })
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command-line arguments for `request`.
    #[must_use]
    pub fn args(request: &BundleRequest) -> Vec<String> {
        let mut args = vec![
            request.entry.display().to_string(),
            "--bundle".to_string(),
            format!("--outfile={}", request.outfile.display()),
            "--platform=node".to_string(),
            "--format=esm".to_string(),
            format!("--target=node{}", request.node_version),
            "--charset=utf8".to_string(),
            "--legal-comments=none".to_string(),
            "--log-level=warning".to_string(),
        ];

        for (module, path) in &request.alias {
            args.push(format!("--alias:{module}={}", path.display()));
        }
        for (key, value) in &request.define {
            args.push(format!("--define:{key}={value}"));
        }
        for external in &request.external {
            args.push(format!("--external:{external}"));
        }
        for (ext, loader) in &request.loader {
            args.push(format!("--loader:{ext}={loader}"));
        }
        if let Some(banner) = &request.banner {
            args.push(format!("--banner:js={banner}"));
        }

        args
    }
}

impl Bundler for EsbuildBundler {
    fn bundle(&self, request: &BundleRequest) -> Result<(), BundleError> {
        let args = Self::args(request);
        tracing::debug!(binary = %self.binary.display(), ?args, "running esbuild");

        let output = Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.cwd)
            .output()
            .map_err(|e| {
                BundleError::new(codes::BUNDLER_SPAWN_FAILED, format!("Failed to spawn: {e}"))
                    .with_path(&self.binary)
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
            let detail = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(BundleError::new(
                codes::BUNDLE_FAILED,
                format!("esbuild exited with {code}\n{detail}"),
            )
            .with_path(&request.entry));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request() -> BundleRequest {
        BundleRequest::new("/p/app/server.ts", "/p/build/server/server.mjs", 22)
            .alias(SERVER_BUILD_MODULE, "/p/build/server/index.js")
            .define_str("process.env.NODE_ENV", "production")
            .externals(["vite", "pg"])
    }

    #[test]
    fn test_default_loaders() {
        let loaders = default_loaders();
        assert_eq!(loaders.len(), 19);
        assert!(loaders.values().all(|l| l == "file"));
        assert!(loaders.contains_key(".woff2"));
    }

    #[test]
    fn test_user_loaders_override() {
        let req = request().loaders([(".svg", "text"), (".txt", "text")]);
        assert_eq!(req.loader[".svg"], "text");
        assert_eq!(req.loader[".txt"], "text");
        assert_eq!(req.loader[".png"], "file");
    }

    #[test]
    fn test_args() {
        let args = EsbuildBundler::args(&request());
        assert_eq!(args[0], "/p/app/server.ts");
        assert!(args.contains(&"--bundle".to_string()));
        assert!(args.contains(&"--outfile=/p/build/server/server.mjs".to_string()));
        assert!(args.contains(&"--target=node22".to_string()));
        assert!(args.contains(&"--format=esm".to_string()));
        assert!(args.contains(
            &"--alias:virtual:react-router/server-build=/p/build/server/index.js".to_string()
        ));
        assert!(args.contains(&"--define:process.env.NODE_ENV=\"production\"".to_string()));
        assert!(args.contains(&"--external:vite".to_string()));
        assert!(args.contains(&"--external:pg".to_string()));
        assert!(args.contains(&"--loader:.png=file".to_string()));
        assert!(args.contains(&format!("--banner:js={REQUIRE_BANNER}")));
    }

    #[test]
    fn test_display() {
        let err = BundleError::new(codes::BUNDLE_FAILED, "boom").with_path(Path::new("/a.ts"));
        assert_eq!(err.to_string(), "BUNDLE_FAILED: boom (/a.ts)");
    }

    #[test]
    fn test_locate_prefers_local_bin() {
        let dir = tempdir().unwrap();
        let bin = dir.path().join("node_modules/.bin");
        std::fs::create_dir_all(&bin).unwrap();
        let name = if cfg!(windows) { "esbuild.cmd" } else { "esbuild" };
        std::fs::write(bin.join(name), "").unwrap();
        let nested = dir.path().join("apps/site");
        std::fs::create_dir_all(&nested).unwrap();

        let bundler = EsbuildBundler::locate(&nested).unwrap();
        assert_eq!(bundler.binary(), bin.join(name));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_bundle_failed() {
        let dir = tempdir().unwrap();
        let bundler = EsbuildBundler::new("false", dir.path());
        let err = bundler.bundle(&request()).unwrap_err();
        assert_eq!(err.code, codes::BUNDLE_FAILED);
        assert_eq!(err.path.as_deref(), Some("/p/app/server.ts"));
    }
}
