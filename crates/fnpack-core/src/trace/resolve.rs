//! Node-style specifier resolution used by the tracer.
//!
//! Resolution is deliberately runtime-shaped: it answers "which file would
//! Node load from this directory", honouring `exports`, `main` and index
//! probing, with the `node` condition preferred.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

/// Extensions tried for extensionless specifiers, in order.
const EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".json", ".node"];

/// Export conditions in preference order.
const CONDITIONS: &[&str] = &["node", "import", "require", "default"];

/// Nesting cap for conditional export objects.
const MAX_CONDITION_DEPTH: usize = 8;

/// Core modules provided by the runtime.
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Outcome of resolving one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Provided by the runtime or not a file (`node:`, URLs, `data:`).
    External,
    /// A file on disk. `package_json` is set when the file was reached
    /// through a package so its manifest ships alongside it.
    File {
        path: PathBuf,
        package_json: Option<PathBuf>,
    },
    Unresolved,
}

/// Whether a specifier names a runtime built-in module.
#[must_use]
pub fn is_builtin(spec: &str) -> bool {
    if spec.starts_with("node:") {
        return true;
    }
    let name = spec.split('/').next().unwrap_or(spec);
    NODE_BUILTINS.contains(&name)
}

/// Resolve `spec` as imported from a file inside `from_dir`.
#[must_use]
pub fn resolve_specifier(spec: &str, from_dir: &Path) -> Resolution {
    if is_builtin(spec) || spec.contains("://") || spec.starts_with("data:") {
        return Resolution::External;
    }

    if spec.starts_with("./") || spec.starts_with("../") || spec == "." || spec == ".." {
        return file_resolution(resolve_path(&from_dir.join(spec)), None);
    }

    if Path::new(spec).is_absolute() {
        return file_resolution(resolve_path(Path::new(spec)), None);
    }

    // Package-private `#imports` are not followed.
    if spec.starts_with('#') {
        return Resolution::Unresolved;
    }

    resolve_package(spec, from_dir)
}

fn file_resolution(path: Option<PathBuf>, package_json: Option<PathBuf>) -> Resolution {
    match path {
        Some(path) => Resolution::File { path, package_json },
        None => Resolution::Unresolved,
    }
}

/// Split a bare specifier into package name and optional subpath.
///
/// `@scope/pkg/sub` yields `("@scope/pkg", Some("sub"))`.
#[must_use]
pub fn split_package_specifier(spec: &str) -> (&str, Option<&str>) {
    let skip = usize::from(spec.starts_with('@'));
    let mut slashes = spec.match_indices('/').skip(skip);
    match slashes.next() {
        Some((idx, _)) => (&spec[..idx], Some(&spec[idx + 1..]).filter(|s| !s.is_empty())),
        None => (spec, None),
    }
}

fn resolve_package(spec: &str, from_dir: &Path) -> Resolution {
    let (name, subpath) = split_package_specifier(spec);

    for dir in from_dir.ancestors() {
        let pkg_dir = dir.join("node_modules").join(name);
        if !pkg_dir.is_dir() {
            continue;
        }

        let manifest_path = pkg_dir.join("package.json");
        let manifest = read_manifest(&manifest_path);
        let package_json = manifest.is_some().then(|| manifest_path.clone());

        if let Some(exports) = manifest.as_ref().and_then(|m| m.get("exports")) {
            let key = subpath.map_or_else(|| ".".to_string(), |s| format!("./{s}"));
            // A package with `exports` only exposes what it lists.
            let target = exports_target(exports, &key)
                .and_then(|t| validate_target(&t).map(str::to_string))
                .map(|t| pkg_dir.join(t))
                .filter(|p| p.is_file());
            return file_resolution(target, package_json);
        }

        let resolved = match subpath {
            Some(sub) => resolve_path(&pkg_dir.join(sub)),
            None => resolve_package_main(&pkg_dir, manifest.as_ref()),
        };
        return file_resolution(resolved, package_json);
    }

    Resolution::Unresolved
}

fn read_manifest(path: &Path) -> Option<Value> {
    let text = fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

fn resolve_package_main(pkg_dir: &Path, manifest: Option<&Value>) -> Option<PathBuf> {
    if let Some(main) = manifest.and_then(|m| m.get("main")).and_then(Value::as_str) {
        if let Some(found) = resolve_path(&pkg_dir.join(main)) {
            return Some(found);
        }
    }
    find_index(pkg_dir)
}

/// Resolve a filesystem path the way `require` does: exact file, then
/// appended extensions, then directory main/index.
fn resolve_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }

    for ext in EXTENSIONS {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    if path.is_dir() {
        let manifest = read_manifest(&path.join("package.json"));
        return resolve_package_main(path, manifest.as_ref());
    }

    None
}

fn find_index(dir: &Path) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("index{ext}")))
        .find(|p| p.is_file())
}

/// Pick the export target for `key` (`"."` or `"./sub"`).
fn exports_target(exports: &Value, key: &str) -> Option<String> {
    let has_subpaths = exports
        .as_object()
        .is_some_and(|obj| obj.keys().any(|k| k.starts_with('.')));

    if !has_subpaths {
        // String, array or root-level conditions only describe ".".
        return if key == "." {
            conditional_target(exports, 0)
        } else {
            None
        };
    }

    let obj = exports.as_object()?;
    if let Some(target) = obj.get(key) {
        return conditional_target(target, 0);
    }

    // Single-star patterns, most specific first.
    let mut best: Option<(&str, &Value, &str)> = None;
    for (pattern, target) in obj {
        let Some((prefix, suffix)) = pattern.split_once('*') else {
            continue;
        };
        if suffix.contains('*') || key.len() < prefix.len() + suffix.len() {
            continue;
        }
        if key.starts_with(prefix) && key.ends_with(suffix) {
            let star = &key[prefix.len()..key.len() - suffix.len()];
            if best.map_or(true, |(p, _, _)| pattern.len() > p.len()) {
                best = Some((pattern.as_str(), target, star));
            }
        }
    }

    let (_, target, star) = best?;
    conditional_target(target, 0).map(|t| t.replace('*', star))
}

fn conditional_target(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_CONDITION_DEPTH {
        return None;
    }
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(|v| conditional_target(v, depth + 1)),
        Value::Object(map) => CONDITIONS
            .iter()
            .filter_map(|c| map.get(*c))
            .find_map(|v| conditional_target(v, depth + 1)),
        _ => None,
    }
}

/// Export targets must stay inside the package.
fn validate_target(target: &str) -> Option<&str> {
    let rest = target.strip_prefix("./")?;
    if rest.split('/').any(|seg| seg == ".." || seg == "node_modules") {
        return None;
    }
    Some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_builtins_are_external() {
        let dir = tempdir().unwrap();
        assert_eq!(resolve_specifier("node:fs", dir.path()), Resolution::External);
        assert_eq!(resolve_specifier("fs/promises", dir.path()), Resolution::External);
        assert_eq!(resolve_specifier("path", dir.path()), Resolution::External);
        assert_eq!(
            resolve_specifier("https://example.com/x.js", dir.path()),
            Resolution::External
        );
    }

    #[test]
    fn test_split_package_specifier() {
        assert_eq!(split_package_specifier("pg"), ("pg", None));
        assert_eq!(split_package_specifier("pg/lib/x"), ("pg", Some("lib/x")));
        assert_eq!(split_package_specifier("@scope/pkg"), ("@scope/pkg", None));
        assert_eq!(
            split_package_specifier("@scope/pkg/sub"),
            ("@scope/pkg", Some("sub"))
        );
    }

    #[test]
    fn test_relative_with_extension_lookup() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("chunk.mjs"), "");
        write(&dir.path().join("lib/index.js"), "");

        assert_eq!(
            resolve_specifier("./chunk", dir.path()),
            Resolution::File {
                path: dir.path().join("chunk.mjs"),
                package_json: None
            }
        );
        assert_eq!(
            resolve_specifier("./lib", dir.path()),
            Resolution::File {
                path: dir.path().join("lib/index.js"),
                package_json: None
            }
        );
        assert_eq!(resolve_specifier("./missing", dir.path()), Resolution::Unresolved);
    }

    #[test]
    fn test_package_main_walks_up() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/left-pad");
        write(&pkg.join("package.json"), r#"{"main":"lib/pad"}"#);
        write(&pkg.join("lib/pad.js"), "");
        let nested = dir.path().join("build/server");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            resolve_specifier("left-pad", &nested),
            Resolution::File {
                path: pkg.join("lib/pad.js"),
                package_json: Some(pkg.join("package.json"))
            }
        );
    }

    #[test]
    fn test_exports_prefers_node_condition() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/dual");
        write(
            &pkg.join("package.json"),
            r#"{"exports":{".":{"browser":"./b.js","node":{"import":"./n.mjs","require":"./n.cjs"},"default":"./d.js"},"./utils/*":"./dist/utils/*.js"}}"#,
        );
        write(&pkg.join("n.mjs"), "");
        write(&pkg.join("dist/utils/str.js"), "");

        match resolve_specifier("dual", dir.path()) {
            Resolution::File { path, .. } => assert_eq!(path, pkg.join("n.mjs")),
            other => panic!("unexpected {other:?}"),
        }
        match resolve_specifier("dual/utils/str", dir.path()) {
            Resolution::File { path, .. } => assert_eq!(path, pkg.join("dist/utils/str.js")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(resolve_specifier("dual/hidden", dir.path()), Resolution::Unresolved);
    }

    #[test]
    fn test_exports_string_shorthand() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/@acme/one");
        write(&pkg.join("package.json"), r#"{"exports":"./main.js"}"#);
        write(&pkg.join("main.js"), "");

        match resolve_specifier("@acme/one", dir.path()) {
            Resolution::File { path, package_json } => {
                assert_eq!(path, pkg.join("main.js"));
                assert_eq!(package_json, Some(pkg.join("package.json")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejects_escaping_targets() {
        assert_eq!(validate_target("./dist/x.js"), Some("dist/x.js"));
        assert_eq!(validate_target("../x.js"), None);
        assert_eq!(validate_target("./a/../../x.js"), None);
        assert_eq!(validate_target("dist/x.js"), None);
    }
}
