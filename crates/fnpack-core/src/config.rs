use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project config file, read from the project root when present.
pub const CONFIG_FILE: &str = "fnpack.json";

/// Runtime configuration for the fnpack CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

/// Deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresetKind {
    #[default]
    Node,
    Vercel,
    Netlify,
}

impl PresetKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Vercel => "vercel",
            Self::Netlify => "netlify",
        }
    }

    /// Node.js major versions the platform can run.
    #[must_use]
    pub fn supported_node_versions(&self) -> &'static [u8] {
        match self {
            Self::Node => &[20, 22, 24],
            Self::Vercel | Self::Netlify => &[20, 22],
        }
    }

    /// Parse a preset name as given on the command line.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "node" => Some(Self::Node),
            "vercel" => Some(Self::Vercel),
            "netlify" => Some(Self::Netlify),
            _ => None,
        }
    }
}

/// Which package dependencies stay external to the server bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SsrExternal {
    /// `true` externalizes everything; nothing is listed in the dist package.json.
    All(bool),
    List(Vec<String>),
}

/// Preset configuration, constructed once per invocation and passed by
/// reference to every stage of the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresetConfig {
    pub preset: PresetKind,
    /// Application source directory, relative to the project root.
    pub app_directory: PathBuf,
    /// Framework build output directory, relative to the project root.
    pub build_directory: PathBuf,
    /// Server build file name inside each server bundle directory.
    pub server_build_file: String,
    /// Server entry, relative to `app_directory`.
    pub entry_file: String,
    pub assets_dir: String,
    /// Static files served as-is by the dev server.
    pub public_dir: PathBuf,
    pub node_version: u8,
    /// Vercel function regions.
    pub regions: Vec<String>,
    /// Extra files (globs, relative to the project root) shipped with the node preset.
    pub include_files: Vec<String>,
    /// Extra bundler loaders, keyed by extension (e.g. `".sql": "text"`).
    pub bundle_loader: BTreeMap<String, String>,
    /// Extra compile-time replacements.
    pub define: BTreeMap<String, String>,
    pub ssr_external: Option<SsrExternal>,
    /// Dev-server exclusions: globs, or regexes prefixed with `re:`.
    pub exclude: Vec<String>,
    /// Build manifest JSON, relative to the project root.
    pub manifest: Option<PathBuf>,
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            preset: PresetKind::default(),
            app_directory: PathBuf::from("app"),
            build_directory: PathBuf::from("build"),
            server_build_file: "index.js".to_string(),
            entry_file: "server.ts".to_string(),
            assets_dir: "assets".to_string(),
            public_dir: PathBuf::from("public"),
            node_version: 22,
            regions: Vec::new(),
            include_files: Vec::new(),
            bundle_loader: BTreeMap::new(),
            define: BTreeMap::new(),
            ssr_external: None,
            exclude: Vec::new(),
            manifest: None,
        }
    }
}

impl PresetConfig {
    /// Load `fnpack.json` from `root`, or defaults when the file is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| Error::ConfigParse { path, source })
    }

    /// Set preset.
    #[must_use]
    pub fn with_preset(mut self, preset: PresetKind) -> Self {
        self.preset = preset;
        self
    }

    /// Set node version.
    #[must_use]
    pub fn with_node_version(mut self, version: u8) -> Self {
        self.node_version = version;
        self
    }

    /// Set manifest path.
    #[must_use]
    pub fn with_manifest(mut self, manifest: PathBuf) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Replace regions.
    #[must_use]
    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    /// Check values that would otherwise fail late in the build.
    pub fn validate(&self) -> Result<()> {
        let supported = self.preset.supported_node_versions();
        if !supported.contains(&self.node_version) {
            return Err(Error::ConfigInvalid(format!(
                "nodeVersion {} is not supported by the {} preset (supported: {})",
                self.node_version,
                self.preset.as_str(),
                supported
                    .iter()
                    .map(u8::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        if self.entry_file.is_empty() {
            return Err(Error::ConfigInvalid("entryFile must not be empty".into()));
        }

        if self.assets_dir.is_empty() || self.assets_dir.contains("..") {
            return Err(Error::ConfigInvalid(format!(
                "assetsDir `{}` must be a plain relative directory",
                self.assets_dir
            )));
        }

        Ok(())
    }
}
