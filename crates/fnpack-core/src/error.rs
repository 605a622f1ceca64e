use crate::bundler::BundleError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for fnpack operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    ConfigInvalid(String),

    #[error("Failed to read build manifest at {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse build manifest at {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read package.json at {path}: {source}")]
    PackageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse package.json at {path}: {source}")]
    PackageParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Route `{id}` is referenced but missing from the manifest")]
    RouteNotFound { id: String },

    #[error("Route `{id}` has a cyclic parent chain")]
    RouteCycle { id: String },

    #[error("Failed to bundle server for `{bundle_id}`: {source}")]
    Bundle {
        bundle_id: String,
        #[source]
        source: BundleError,
    },

    #[error("Failed to trace {path}: {source}")]
    Trace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to package {path}: {source}")]
    Pack {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Project root not found from {start}")]
    ProjectNotFound { start: PathBuf },
}

impl Error {
    /// Stable machine-readable code for JSON output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO_ERROR",
            Self::ConfigRead { .. } | Self::ConfigParse { .. } | Self::ConfigInvalid(_) => {
                "CONFIG_INVALID"
            }
            Self::ManifestRead { .. } | Self::ManifestParse { .. } => "MANIFEST_INVALID",
            Self::PackageRead { .. } | Self::PackageParse { .. } => "PACKAGE_JSON_INVALID",
            Self::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            Self::RouteCycle { .. } => "ROUTE_CYCLE",
            Self::Bundle { source, .. } => source.code,
            Self::Trace { .. } => "TRACE_FAILED",
            Self::Pack { .. } => "PACK_FAILED",
            Self::ProjectNotFound { .. } => "PROJECT_NOT_FOUND",
        }
    }

    pub(crate) fn pack(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Pack {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
