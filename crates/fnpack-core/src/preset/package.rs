//! The app's `package.json` and the trimmed copy shipped with each bundle.

use crate::config::SsrExternal;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Framework packages that are always bundled, never installed at runtime.
pub const FRAMEWORK_PACKAGES: &[&str] = &[
    "react-router",
    "react-router-dom",
    "@react-router/architect",
    "@react-router/cloudflare",
    "@react-router/dev",
    "@react-router/express",
    "@react-router/node",
    "@react-router/serve",
];

/// The parts of the app's `package.json` the build reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppPackage {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub module_type: Option<String>,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl AppPackage {
    /// Read `<root>/package.json`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("package.json");
        let content = std::fs::read_to_string(&path).map_err(|source| Error::PackageRead {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| Error::PackageParse { path, source })
    }
}

/// Dependencies left external by the bundler and installed next to it.
///
/// Only dependencies named in an explicit `ssrExternal` list are kept;
/// `true` or an absent setting keeps none.
#[must_use]
pub fn retained_dependencies(
    dependencies: &BTreeMap<String, String>,
    ssr_external: Option<&SsrExternal>,
) -> BTreeMap<String, String> {
    let Some(SsrExternal::List(external)) = ssr_external else {
        return BTreeMap::new();
    };

    dependencies
        .iter()
        .filter(|(name, _)| {
            !FRAMEWORK_PACKAGES.contains(&name.as_str()) && external.iter().any(|e| e == *name)
        })
        .map(|(name, version)| (name.clone(), version.clone()))
        .collect()
}

#[derive(Serialize)]
struct DistScripts<'a> {
    postinstall: &'a str,
}

#[derive(Serialize)]
struct DistEngines {
    node: String,
}

#[derive(Serialize)]
struct DistPackage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    module_type: Option<&'a str>,
    scripts: DistScripts<'a>,
    dependencies: &'a BTreeMap<String, String>,
    engines: DistEngines,
}

/// Render the `package.json` written beside a server bundle.
#[must_use]
pub fn dist_package_json(
    app: &AppPackage,
    dependencies: &BTreeMap<String, String>,
    node_version: u8,
) -> String {
    let dist = DistPackage {
        name: app.name.as_deref(),
        module_type: app.module_type.as_deref(),
        scripts: DistScripts {
            postinstall: app.scripts.get("postinstall").map_or("", String::as_str),
        },
        dependencies,
        engines: DistEngines {
            node: format!("{node_version}.x"),
        },
    };
    // Serializing plain structs of strings cannot fail.
    serde_json::to_string_pretty(&dist).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn deps() -> BTreeMap<String, String> {
        [
            ("pg", "^8.0.0"),
            ("react-router", "^7.0.0"),
            ("@react-router/node", "^7.0.0"),
            ("hono", "^4.0.0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_retained_only_listed_non_framework() {
        let external = SsrExternal::List(vec![
            "pg".into(),
            "react-router".into(),
            "@react-router/node".into(),
            "not-installed".into(),
        ]);
        let kept = retained_dependencies(&deps(), Some(&external));
        assert_eq!(kept.keys().collect::<Vec<_>>(), vec!["pg"]);
        assert_eq!(kept["pg"], "^8.0.0");
    }

    #[test]
    fn test_retained_none_for_true_or_absent() {
        assert!(retained_dependencies(&deps(), None).is_empty());
        assert!(retained_dependencies(&deps(), Some(&SsrExternal::All(true))).is_empty());
    }

    #[test]
    fn test_dist_package_json() {
        let app = AppPackage {
            name: Some("my-app".into()),
            module_type: Some("module".into()),
            scripts: [("postinstall".to_string(), "prisma generate".to_string())]
                .into_iter()
                .collect(),
            dependencies: deps(),
        };
        let kept: BTreeMap<String, String> =
            [("pg".to_string(), "^8.0.0".to_string())].into_iter().collect();

        let json: serde_json::Value =
            serde_json::from_str(&dist_package_json(&app, &kept, 20)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "my-app",
                "type": "module",
                "scripts": { "postinstall": "prisma generate" },
                "dependencies": { "pg": "^8.0.0" },
                "engines": { "node": "20.x" }
            })
        );
    }

    #[test]
    fn test_dist_package_json_defaults() {
        let json: serde_json::Value = serde_json::from_str(&dist_package_json(
            &AppPackage::default(),
            &BTreeMap::new(),
            22,
        ))
        .unwrap();
        assert_eq!(json["scripts"]["postinstall"], "");
        assert!(json.get("name").is_none());
        assert_eq!(json["dependencies"], serde_json::json!({}));
    }

    #[test]
    fn test_load_missing_package_json() {
        let dir = tempdir().unwrap();
        let err = AppPackage::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::PackageRead { .. }));
    }
}
