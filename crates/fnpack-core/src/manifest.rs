//! Build manifest produced by the React Router build.
//!
//! Only the fields the packager needs are modelled; everything else in the
//! file is ignored.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A single route in the manifest forest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteNode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Path segment contributed by this route (`None` for layout/index routes).
    #[serde(default)]
    pub path: Option<String>,
}

impl RouteNode {
    #[must_use]
    pub fn new(id: impl Into<String>, parent_id: Option<&str>, path: Option<&str>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            path: path.map(str::to_string),
        }
    }
}

/// A server bundle emitted by the framework build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerBundle {
    pub id: String,
    /// Server build file, relative to the project root.
    pub file: PathBuf,
}

/// The build manifest: routes, their bundle assignment, and the bundles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildManifest {
    #[serde(default)]
    pub routes: BTreeMap<String, RouteNode>,
    #[serde(default)]
    pub route_id_to_server_bundle_id: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub server_bundles: Option<BTreeMap<String, ServerBundle>>,
}

impl BuildManifest {
    /// Load a manifest from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest: Self =
            serde_json::from_str(&content).map_err(|source| Error::ManifestParse {
                path: path.to_path_buf(),
                source,
            })?;

        for (key, route) in &mut manifest.routes {
            if route.id.is_empty() {
                route.id.clone_from(key);
            }
        }

        Ok(manifest)
    }

    /// Server bundles to build, falling back to the single `site` bundle
    /// at `<build_dir>/server/<server_build_file>` when the manifest has none.
    #[must_use]
    pub fn server_bundles_or_default(
        &self,
        build_dir: &Path,
        server_build_file: &str,
    ) -> BTreeMap<String, ServerBundle> {
        match &self.server_bundles {
            Some(bundles) if !bundles.is_empty() => bundles.clone(),
            _ => {
                let mut bundles = BTreeMap::new();
                bundles.insert(
                    crate::routes::DEFAULT_BUNDLE_ID.to_string(),
                    ServerBundle {
                        id: crate::routes::DEFAULT_BUNDLE_ID.to_string(),
                        file: build_dir.join("server").join(server_build_file),
                    },
                );
                bundles
            }
        }
    }
}
