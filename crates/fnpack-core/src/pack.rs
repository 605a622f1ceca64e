//! Function packaging.
//!
//! Copies the traced runtime closure of a bundled entry into a function
//! directory. The layout of every file relative to a single common ancestor
//! is preserved and symlinks are recreated as symlinks, so packages that
//! share a store (pnpm, workspaces) stay deduplicated.

use crate::trace::{TraceCache, Tracer};
use crate::{Error, Result};
use fnpack_util::path::{common_ancestor, relative_to};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Inputs for [`pack_function`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// The bundled server entry.
    pub entry: PathBuf,
    /// Function directory to populate.
    pub dest_dir: PathBuf,
    /// Directory the tracer resolves relative to, usually the workspace root.
    pub trace_base: PathBuf,
    /// File names in the entry's directory that must not ship.
    pub exclude_siblings: Vec<OsString>,
}

impl PackOptions {
    #[must_use]
    pub fn new(
        entry: impl Into<PathBuf>,
        dest_dir: impl Into<PathBuf>,
        trace_base: impl Into<PathBuf>,
    ) -> Self {
        Self {
            entry: entry.into(),
            dest_dir: dest_dir.into(),
            trace_base: trace_base.into(),
            exclude_siblings: Vec::new(),
        }
    }

    #[must_use]
    pub fn exclude_sibling(mut self, name: impl Into<OsString>) -> Self {
        self.exclude_siblings.push(name.into());
        self
    }
}

/// Result of packaging one function.
#[derive(Debug, Clone, Default)]
pub struct PackedFunction {
    /// Source directory that maps onto `dest_dir`.
    pub ancestor: PathBuf,
    /// Entry location inside the function directory.
    pub entry_relative: PathBuf,
    /// Files written, relative to the function directory.
    pub files: Vec<PathBuf>,
    /// Symlinks written, relative to the function directory.
    pub links: Vec<PathBuf>,
}

/// One planned write, keyed by its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PackOp {
    Copy { from: PathBuf },
    Link { target: PathBuf, is_dir: bool },
}

/// A symlink found while resolving an input path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkRecord {
    link: PathBuf,
    target: PathBuf,
}

/// Input path with its symlinks peeled off.
#[derive(Debug, Default)]
struct Resolved {
    links: Vec<LinkRecord>,
    real: PathBuf,
}

/// Package `options.entry` and everything it needs into `options.dest_dir`.
///
/// # Errors
/// Any trace or filesystem failure aborts packaging; the function directory
/// must then be considered unusable.
pub fn pack_function(
    options: &PackOptions,
    tracer: &dyn Tracer,
    cache: &mut TraceCache,
) -> Result<PackedFunction> {
    let entry = dunce::canonicalize(&options.entry).map_err(|e| Error::pack(&options.entry, e))?;
    let trace_base =
        dunce::canonicalize(&options.trace_base).map_err(|e| Error::pack(&options.trace_base, e))?;

    let traced = tracer.trace(std::slice::from_ref(&entry), &trace_base, cache)?;
    for warning in &traced.warnings {
        tracing::warn!(code = warning.code, path = %warning.path.display(), "{}", warning.message);
    }

    let mut inputs: BTreeSet<PathBuf> = traced
        .file_list
        .iter()
        .map(|rel| trace_base.join(rel))
        .filter(|path| *path != entry)
        .collect();
    inputs.extend(entry_siblings(&entry, &options.exclude_siblings)?);

    let mut resolved = Vec::with_capacity(inputs.len() + 1);
    resolved.push(Resolved {
        links: Vec::new(),
        real: entry.clone(),
    });
    for input in &inputs {
        resolved.push(resolve_components(input)?);
    }
    expand_directory_links(&mut resolved)?;

    // Seeded with the entry's directory so the ancestor is always a directory.
    let ancestor = common_ancestor(
        entry
            .parent()
            .into_iter()
            .chain(inputs.iter().map(PathBuf::as_path))
            .chain(resolved.iter().flat_map(|r| {
                r.links
                    .iter()
                    .flat_map(|l| [l.link.as_path(), l.target.as_path()])
                    .chain(std::iter::once(r.real.as_path()))
            })),
    )
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| filesystem_root(&entry));

    let ops = plan(&resolved, &ancestor, &options.dest_dir)?;
    tracing::debug!(
        entry = %entry.display(),
        ancestor = %ancestor.display(),
        ops = ops.len(),
        "packaging function"
    );
    execute(&ops)?;

    let mut packed = PackedFunction {
        entry_relative: relative_to(&ancestor, &entry),
        ancestor,
        ..PackedFunction::default()
    };
    for (dest, op) in &ops {
        let rel = dest
            .strip_prefix(&options.dest_dir)
            .map_or_else(|_| dest.clone(), Path::to_path_buf);
        match op {
            PackOp::Copy { .. } => packed.files.push(rel),
            PackOp::Link { .. } => packed.links.push(rel),
        }
    }
    Ok(packed)
}

/// Everything next to the entry, recursively, without following symlinks.
fn entry_siblings(entry: &Path, exclude: &[OsString]) -> Result<Vec<PathBuf>> {
    let Some(dir) = entry.parent() else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() > 1 || (e.path() != entry && !exclude.iter().any(|x| x == e.file_name()))
        });

    for item in walker {
        let item = item.map_err(|e| {
            let path = e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
            Error::pack(path, e.into())
        })?;
        out.push(item.into_path());
    }
    Ok(out)
}

/// Walk `path` one component at a time, replacing every symlink with its
/// canonical target and recording the link.
fn resolve_components(path: &Path) -> Result<Resolved> {
    let mut resolved = Resolved::default();
    let mut current = PathBuf::new();

    for component in path.components() {
        current.push(component);
        if !matches!(component, Component::Normal(_)) {
            continue;
        }

        let meta = fs::symlink_metadata(&current).map_err(|e| Error::pack(&current, e))?;
        if meta.file_type().is_symlink() {
            let target = dunce::canonicalize(&current).map_err(|e| Error::pack(&current, e))?;
            resolved.links.push(LinkRecord {
                link: current.clone(),
                target: target.clone(),
            });
            current = target;
        }
    }

    resolved.real = current;
    Ok(resolved)
}

/// Add the contents of every symlinked directory to `resolved`, so a packaged
/// link never dangles. Links found inside a walked directory are expanded in
/// turn; each target directory is walked once.
fn expand_directory_links(resolved: &mut Vec<Resolved>) -> Result<()> {
    let mut walked: BTreeSet<PathBuf> = BTreeSet::new();
    let mut next = 0;

    while next < resolved.len() {
        let targets: Vec<PathBuf> = resolved[next]
            .links
            .iter()
            .map(|l| l.target.clone())
            .filter(|t| t.is_dir())
            .collect();
        next += 1;

        for dir in targets {
            if !walked.insert(dir.clone()) {
                continue;
            }
            let walker = WalkDir::new(&dir)
                .min_depth(1)
                .follow_links(false)
                .sort_by_file_name();
            for item in walker {
                let item = item.map_err(|e| {
                    let path = e.path().map_or_else(|| dir.clone(), Path::to_path_buf);
                    Error::pack(path, e.into())
                })?;
                if item.file_type().is_dir() {
                    continue;
                }
                resolved.push(resolve_components(item.path())?);
            }
        }
    }

    Ok(())
}

fn plan(resolved: &[Resolved], ancestor: &Path, dest_dir: &Path) -> Result<BTreeMap<PathBuf, PackOp>> {
    let dest_of = |path: &Path| dest_dir.join(relative_to(ancestor, path));
    let mut ops = BTreeMap::new();

    for item in resolved {
        for link in &item.links {
            let dest = dest_of(&link.link);
            let parent = dest.parent().unwrap_or(dest_dir);
            let is_dir = link.target.is_dir();
            ops.entry(dest.clone()).or_insert_with(|| PackOp::Link {
                target: relative_to(parent, &dest_of(&link.target)),
                is_dir,
            });
        }

        let meta = fs::metadata(&item.real).map_err(|e| Error::pack(&item.real, e))?;
        if meta.is_dir() {
            continue;
        }
        ops.entry(dest_of(&item.real)).or_insert_with(|| PackOp::Copy {
            from: item.real.clone(),
        });
    }

    Ok(ops)
}

fn execute(ops: &BTreeMap<PathBuf, PackOp>) -> Result<()> {
    let parents: BTreeSet<&Path> = ops.keys().filter_map(|dest| dest.parent()).collect();
    for dir in parents {
        fs::create_dir_all(dir).map_err(|e| Error::pack(dir, e))?;
    }

    ops.par_iter().try_for_each(|(dest, op)| match op {
        PackOp::Copy { from } => fs::copy(from, dest)
            .map(|_| ())
            .map_err(|e| Error::pack(from, e)),
        PackOp::Link { target, is_dir } => {
            if fs::symlink_metadata(dest).is_ok() {
                return Ok(());
            }
            fnpack_util::fs::symlink(target, dest, *is_dir).map_err(|e| Error::pack(dest, e))
        }
    })
}

fn filesystem_root(path: &Path) -> PathBuf {
    path.ancestors()
        .last()
        .map_or_else(|| PathBuf::from("/"), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{TraceResult, TraceWarning};
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Reports a fixed list of base-relative files.
    struct FixedTracer(Vec<&'static str>);

    impl Tracer for FixedTracer {
        fn trace(
            &self,
            _entries: &[PathBuf],
            _base: &Path,
            _cache: &mut TraceCache,
        ) -> Result<TraceResult> {
            Ok(TraceResult {
                file_list: self.0.iter().map(PathBuf::from).collect(),
                warnings: Vec::<TraceWarning>::new(),
            })
        }
    }

    #[test]
    fn test_copies_entry_and_unreferenced_siblings() {
        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        write(&root.join("build/server/server.mjs"), "import './chunk-1.js'");
        write(&root.join("build/server/chunk-1.js"), "");
        write(&root.join("build/server/assets/logo-abc.png"), "png");
        write(&root.join("build/server/index.js"), "raw build");

        let tracer = FixedTracer(vec!["build/server/server.mjs"]);
        let dest = root.join("out/fn");
        let options = PackOptions::new(root.join("build/server/server.mjs"), &dest, &root)
            .exclude_sibling("index.js");

        let packed = pack_function(&options, &tracer, &mut TraceCache::new()).unwrap();

        assert_eq!(packed.ancestor, root.join("build/server"));
        assert_eq!(packed.entry_relative, PathBuf::from("server.mjs"));
        assert!(dest.join("server.mjs").is_file());
        assert!(dest.join("chunk-1.js").is_file());
        assert_eq!(fs::read_to_string(dest.join("assets/logo-abc.png")).unwrap(), "png");
        assert!(!dest.join("index.js").exists());
        assert!(packed.links.is_empty());
    }

    #[test]
    fn test_layout_relative_to_common_ancestor() {
        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        write(&root.join("build/server/server.mjs"), "");
        write(&root.join("node_modules/pg/package.json"), "{}");
        write(&root.join("node_modules/pg/index.js"), "pg");

        let tracer = FixedTracer(vec![
            "build/server/server.mjs",
            "node_modules/pg/package.json",
            "node_modules/pg/index.js",
        ]);
        let dest = root.join("out/fn");
        let options = PackOptions::new(root.join("build/server/server.mjs"), &dest, &root);

        let packed = pack_function(&options, &tracer, &mut TraceCache::new()).unwrap();

        assert_eq!(packed.ancestor, root);
        assert_eq!(packed.entry_relative, PathBuf::from("build/server/server.mjs"));
        assert_eq!(fs::read_to_string(dest.join("node_modules/pg/index.js")).unwrap(), "pg");
        assert!(dest.join("build/server/server.mjs").is_file());
    }

    #[test]
    fn test_missing_traced_file_is_fatal() {
        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        write(&root.join("server.mjs"), "");

        let tracer = FixedTracer(vec!["server.mjs", "gone.js"]);
        let options = PackOptions::new(root.join("server.mjs"), root.join("out"), &root);

        let err = pack_function(&options, &tracer, &mut TraceCache::new()).unwrap_err();
        assert!(matches!(err, Error::Pack { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_is_preserved() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        write(&root.join("app/build/server.mjs"), "");
        write(&root.join("store/dep@1/index.js"), "dep contents");
        fs::create_dir_all(root.join("app/node_modules")).unwrap();
        symlink(root.join("store/dep@1"), root.join("app/node_modules/dep")).unwrap();

        let tracer = FixedTracer(vec!["app/build/server.mjs", "app/node_modules/dep/index.js"]);
        let dest = root.join("out/fn");
        let options = PackOptions::new(root.join("app/build/server.mjs"), &dest, &root);

        let packed = pack_function(&options, &tracer, &mut TraceCache::new()).unwrap();

        assert_eq!(packed.ancestor, root);
        let link = dest.join("app/node_modules/dep");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("../../store/dep@1"));
        assert_eq!(
            fs::read_to_string(link.join("index.js")).unwrap(),
            "dep contents"
        );
        assert!(fs::symlink_metadata(dest.join("store/dep@1/index.js"))
            .unwrap()
            .is_file());
        assert_eq!(packed.links, vec![PathBuf::from("app/node_modules/dep")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_target_outside_trace_widens_ancestor() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        write(&root.join("shared/config.json"), "{}");
        write(&root.join("site/build/server.mjs"), "");
        symlink(root.join("shared/config.json"), root.join("site/build/config.json")).unwrap();

        let tracer = FixedTracer(vec!["build/server.mjs"]);
        let dest = root.join("out/fn");
        let options = PackOptions::new(root.join("site/build/server.mjs"), &dest, root.join("site"));

        let packed = pack_function(&options, &tracer, &mut TraceCache::new()).unwrap();

        assert_eq!(packed.ancestor, root);
        assert_eq!(packed.entry_relative, PathBuf::from("site/build/server.mjs"));
        let link = dest.join("site/build/config.json");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&link).unwrap(), "{}");
    }

    #[test]
    fn test_lone_entry_packs_into_its_directory() {
        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        write(&root.join("build/server/server.mjs"), "export default 1;");

        let tracer = FixedTracer(vec!["build/server/server.mjs"]);
        let dest = root.join("out/fn");
        fs::create_dir_all(&dest).unwrap();
        let options = PackOptions::new(root.join("build/server/server.mjs"), &dest, &root);

        let packed = pack_function(&options, &tracer, &mut TraceCache::new()).unwrap();

        assert_eq!(packed.ancestor, root.join("build/server"));
        assert_eq!(packed.entry_relative, PathBuf::from("server.mjs"));
        assert_eq!(packed.files, vec![PathBuf::from("server.mjs")]);
        assert_eq!(
            fs::read_to_string(dest.join("server.mjs")).unwrap(),
            "export default 1;"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_contents_are_packaged() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        write(&root.join("build/server/server.mjs"), "");
        write(&root.join("shared/data/a.txt"), "a");
        write(&root.join("shared/data/nested/b.txt"), "b");
        symlink(root.join("shared/data"), root.join("build/server/data")).unwrap();

        let tracer = FixedTracer(vec!["build/server/server.mjs"]);
        let dest = root.join("out/fn");
        let options = PackOptions::new(root.join("build/server/server.mjs"), &dest, &root);

        let packed = pack_function(&options, &tracer, &mut TraceCache::new()).unwrap();

        assert_eq!(packed.ancestor, root);
        assert_eq!(packed.links, vec![PathBuf::from("build/server/data")]);
        let link = dest.join("build/server/data");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(link.join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(link.join("nested/b.txt")).unwrap(), "b");
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_link_is_left_alone() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        write(&root.join("build/server.mjs"), "");
        write(&root.join("real/a.js"), "a");
        symlink(root.join("real/a.js"), root.join("build/a.js")).unwrap();

        let tracer = FixedTracer(vec!["build/server.mjs"]);
        let dest = root.join("out");
        let options = PackOptions::new(root.join("build/server.mjs"), &dest, &root);

        pack_function(&options, &tracer, &mut TraceCache::new()).unwrap();
        // Second run over the same destination must not fail on the link.
        pack_function(&options, &tracer, &mut TraceCache::new()).unwrap();
        assert_eq!(fs::read_to_string(dest.join("build/a.js")).unwrap(), "a");
    }
}
