//! Route partitioning.
//!
//! Reconstructs full URL paths from the flat route manifest and computes,
//! per server bundle, the minimal set of path prefixes that route requests
//! to it. The result is ordered most specific first so platform routers with
//! first-match semantics pick the longest prefix.

use crate::error::{Error, Result};
use crate::manifest::{BuildManifest, RouteNode};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Bundle id used when the build has no bundle assignment.
pub const DEFAULT_BUNDLE_ID: &str = "site";

/// Id of the root route, never partitioned.
pub const ROOT_ROUTE_ID: &str = "root";

/// One path prefix routed to one bundle.
///
/// An empty `path` matches every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlePathEntry {
    pub path: String,
    pub bundle_id: String,
}

impl BundlePathEntry {
    pub fn new(path: impl Into<String>, bundle_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            bundle_id: bundle_id.into(),
        }
    }
}

/// Memoized full-path resolution over a route forest.
pub struct RoutePaths<'a> {
    routes: &'a BTreeMap<String, RouteNode>,
    /// Route id -> segments of the route and its ancestors, root first,
    /// with pathless routes skipped.
    segments: HashMap<&'a str, Vec<String>>,
}

impl<'a> RoutePaths<'a> {
    #[must_use]
    pub fn new(routes: &'a BTreeMap<String, RouteNode>) -> Self {
        Self {
            routes,
            segments: HashMap::new(),
        }
    }

    /// Full URL path of a route: ancestor segments followed by its own.
    ///
    /// A route without a path of its own contributes an empty trailing
    /// segment, so an index route under `blog` resolves to `/blog/`.
    pub fn full_path(&mut self, id: &str) -> Result<String> {
        let routes = self.routes;
        let node = routes.get(id).ok_or_else(|| Error::RouteNotFound {
            id: id.to_string(),
        })?;

        let mut parts = match node.parent_id.as_deref() {
            Some(parent) => self.ancestor_segments(parent)?,
            None => Vec::new(),
        };
        parts.push(node.path.clone().unwrap_or_default());

        Ok(format!("/{}", parts.join("/")))
    }

    /// Segments contributed by `id` and everything above it.
    ///
    /// Walks root-ward iteratively until a memoized route or a route with no
    /// parent, then fills the memo top-down on the way back.
    fn ancestor_segments(&mut self, id: &str) -> Result<Vec<String>> {
        let routes = self.routes;
        let mut chain: Vec<&'a str> = Vec::new();
        let mut seen: HashSet<&'a str> = HashSet::new();
        let mut base: Vec<String> = Vec::new();
        let mut cursor: Option<&str> = Some(id);

        while let Some(current) = cursor {
            if let Some(known) = self.segments.get(current) {
                base.clone_from(known);
                break;
            }

            let (key, node) =
                routes
                    .get_key_value(current)
                    .ok_or_else(|| Error::RouteNotFound {
                        id: current.to_string(),
                    })?;

            if !seen.insert(key.as_str()) {
                return Err(Error::RouteCycle { id: key.clone() });
            }

            chain.push(key.as_str());
            cursor = node.parent_id.as_deref();
        }

        for key in chain.into_iter().rev() {
            if let Some(segment) = routes[key].path.as_deref().filter(|s| !s.is_empty()) {
                base.push(segment.to_string());
            }
            self.segments.insert(key, base.clone());
        }

        Ok(base)
    }
}

/// Partition the manifest's routes into per-bundle path prefixes.
///
/// Within a bundle, paths are considered shortest first and a path is kept
/// only if no kept path of the same bundle is a prefix of it. Pruning sees
/// the raw paths, so the index route `/blog/` does not swallow `/blogs`.
/// Trailing slashes are stripped when the bundles are merged; a stripped path
/// already claimed by an earlier bundle is dropped. The merged list is
/// ordered by descending length.
pub fn partition(manifest: &BuildManifest) -> Result<Vec<BundlePathEntry>> {
    let Some(assignment) = manifest.route_id_to_server_bundle_id.as_ref() else {
        return Ok(vec![BundlePathEntry::new("", DEFAULT_BUNDLE_ID)]);
    };

    let mut paths = RoutePaths::new(&manifest.routes);
    let mut by_bundle: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for (route_id, bundle_id) in assignment {
        if route_id == ROOT_ROUTE_ID {
            continue;
        }
        let path = paths.full_path(route_id)?;
        by_bundle.entry(bundle_id.as_str()).or_default().push(path);
    }

    let mut claimed: HashSet<String> = HashSet::new();
    let mut entries: Vec<BundlePathEntry> = Vec::new();

    for (bundle_id, mut bundle_paths) in by_bundle {
        bundle_paths.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

        let mut kept: Vec<String> = Vec::new();
        for path in bundle_paths {
            if kept.iter().any(|q| path.starts_with(q.as_str())) {
                continue;
            }
            kept.push(path);
        }

        for path in kept {
            let path = strip_trailing_slash(path);
            if claimed.insert(path.clone()) {
                entries.push(BundlePathEntry::new(path, bundle_id));
            }
        }
    }

    entries.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

    Ok(entries)
}

/// Paths routed to one bundle, in partition order.
#[must_use]
pub fn paths_for_bundle<'e>(entries: &'e [BundlePathEntry], bundle_id: &str) -> Vec<&'e str> {
    entries
        .iter()
        .filter(|e| e.bundle_id == bundle_id)
        .map(|e| e.path.as_str())
        .collect()
}

fn strip_trailing_slash(mut path: String) -> String {
    if path.ends_with('/') {
        path.pop();
    }
    path
}
