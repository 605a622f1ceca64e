use std::path::{Component, Path, PathBuf};

/// Compute `to` relative to the directory `from`.
///
/// Both paths are expected to be absolute (or both relative to the same
/// base). Comparison is component-wise, so `/a/fo` is never treated as an
/// ancestor of `/a/foo`.
#[must_use]
pub fn relative_to(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();

    let shared = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in shared..from.len() {
        out.push("..");
    }
    for component in &to[shared..] {
        out.push(component.as_os_str());
    }
    out
}

/// Longest common component prefix of a set of paths.
///
/// Returns `None` for an empty input. Two absolute paths always share at
/// least the filesystem root.
pub fn common_ancestor<'a, I>(paths: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut iter = paths.into_iter();
    let first = iter.next()?;
    let mut prefix: Vec<Component<'a>> = first.components().collect();

    for path in iter {
        let shared = prefix
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        prefix.truncate(shared);
    }

    Some(prefix.into_iter().map(Component::as_os_str).collect())
}

/// Render a path with forward slashes, for use in URLs, JSON and JS imports.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::RootDir => Some(String::new()),
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::CurDir => None,
            Component::ParentDir => Some("..".to_string()),
            Component::Prefix(p) => Some(p.as_os_str().to_string_lossy().into_owned()),
        })
        .collect();

    if parts.len() == 1 && parts[0].is_empty() {
        return "/".to_string();
    }
    parts.join("/")
}
