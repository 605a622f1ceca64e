use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use walkdir::WalkDir;

/// Atomically write bytes to a file by writing to a temp file then renaming.
///
/// Parent directories are created when missing. Readers see either the old
/// or the new contents, never a partial write.
///
/// # Errors
/// Returns an error if the directory, write or rename fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id()
    ));

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    match fs::rename(&temp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Windows refuses to rename over an existing file.
            if cfg!(windows) {
                fs::copy(&temp_path, path)?;
                let _ = fs::remove_file(&temp_path);
                Ok(())
            } else {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }
}

/// Create `dir` (and parents), optionally wiping whatever was there first.
///
/// # Errors
/// Returns an error if removal or creation fails.
pub fn ensure_dir(dir: &Path, reset: bool) -> io::Result<()> {
    if reset {
        match fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    fs::create_dir_all(dir)
}

/// Remove a file or directory tree, ignoring a missing target.
///
/// Symlinks are removed, never followed.
///
/// # Errors
/// Returns an error if the target exists but cannot be removed.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Recursively copy `src` into `dst`, keeping symlinks as symlinks.
///
/// # Errors
/// Returns an error on the first entry that cannot be copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            let is_dir = entry.path().is_dir();
            remove_path(&target)?;
            symlink(&link, &target, is_dir)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Create a symlink at `link` pointing to `target`.
///
/// `target` is written verbatim, so relative targets are resolved against
/// the link's own directory. On Windows directory links become junctions
/// when a symlink cannot be created.
///
/// # Errors
/// Returns an error if the link cannot be created.
pub fn symlink(target: &Path, link: &Path, is_dir: bool) -> io::Result<()> {
    #[cfg(unix)]
    {
        let _ = is_dir;
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    {
        if is_dir {
            std::os::windows::fs::symlink_dir(target, link).or_else(|_| {
                let absolute = link.parent().unwrap_or(Path::new(".")).join(target);
                junction::create(absolute, link)
            })
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = is_dir;
        let resolved = link.parent().unwrap_or(Path::new(".")).join(target);
        fs::copy(resolved, link).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_atomic_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("config.json");

        write_atomic(&path, b"{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");

        write_atomic(&path, b"[]").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_ensure_dir_reset_clears_contents() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(out.join("stale")).unwrap();
        fs::write(out.join("stale").join("old.txt"), "old").unwrap();

        ensure_dir(&out, true).unwrap();

        assert!(out.is_dir());
        assert!(!out.join("stale").exists());
    }

    #[test]
    fn test_ensure_dir_keeps_contents_without_reset() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("keep.txt"), "keep").unwrap();

        ensure_dir(&out, false).unwrap();
        assert!(out.join("keep.txt").exists());
    }

    #[test]
    fn test_remove_path_missing_is_ok() {
        let dir = tempdir().unwrap();
        remove_path(&dir.path().join("nope")).unwrap();
    }

    #[test]
    fn test_copy_dir_all() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.txt"), "a").unwrap();
        fs::write(src.join("nested").join("b.txt"), "b").unwrap();

        let dst = dir.path().join("dst");
        copy_dir_all(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dst.join("nested").join("b.txt")).unwrap(), "b");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_dir_all_keeps_symlinks() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("real.txt"), "real").unwrap();
        symlink(Path::new("real.txt"), &src.join("link.txt"), false).unwrap();

        let dst = dir.path().join("dst");
        copy_dir_all(&src, &dst).unwrap();

        let meta = fs::symlink_metadata(dst.join("link.txt")).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(fs::read_to_string(dst.join("link.txt")).unwrap(), "real");
    }
}
