//! Filesystem utilities.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::core::error::{Error, Result};

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(|e| Error::io(path, e))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| Error::io(path, e))?;
    }
    Ok(())
}

/// Read a file to string, with the path attached to any error.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Write a file atomically: write to a temp file in the same directory, then rename.
///
/// A crash mid-write leaves the previous content in place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir(&parent)?;

    let mut temp = NamedTempFile::new_in(&parent).map_err(|e| Error::io(&parent, e))?;
    temp.write_all(contents).map_err(|e| Error::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::io(temp.path(), e))?;
    temp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// Lexically normalize a path, resolving `.` and `..` without touching the disk.
///
/// Leading `..` components that would climb above a relative path's start are kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize a path if it exists, otherwise normalize it lexically.
pub fn canonical_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| normalize_path(path))
}

/// Check whether `path` stays inside `root` once both are normalized.
pub fn is_within(path: &Path, root: &Path) -> bool {
    normalize_path(path).starts_with(normalize_path(root))
}

/// Join `relative` onto `base` and check the result stays inside `root`.
///
/// Returns the normalized joined path, or `None` when it escapes.
pub fn join_within(root: &Path, base: &Path, relative: &Path) -> Option<PathBuf> {
    if relative.is_absolute() {
        return None;
    }
    let joined = normalize_path(&base.join(relative));
    if joined.starts_with(normalize_path(root)) {
        Some(joined)
    } else {
        None
    }
}

/// Calculate the total size of a directory recursively.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Format a size in bytes to a human-readable string.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/ws/./a/../b/c")),
            PathBuf::from("/ws/b/c")
        );
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize_path(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[test]
    fn test_join_within() {
        let root = Path::new("/ws");
        assert_eq!(
            join_within(root, root, Path::new("./shared/types")),
            Some(PathBuf::from("/ws/shared/types"))
        );
        assert_eq!(join_within(root, root, Path::new("../../secrets")), None);
        assert_eq!(join_within(root, Path::new("/ws/a"), Path::new("../b")), Some(PathBuf::from("/ws/b")));
        assert_eq!(join_within(root, root, Path::new("/etc/passwd")), None);
    }

    #[test]
    fn test_is_within_rejects_sibling_prefix() {
        assert!(!is_within(Path::new("/ws-other/file"), Path::new("/ws")));
        assert!(is_within(Path::new("/ws/inner/../file"), Path::new("/ws")));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("model.lock");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_dir_size_and_format() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a"), vec![0u8; 1024]).unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/b"), vec![0u8; 1024]).unwrap();

        assert_eq!(dir_size(tmp.path()), 2048);
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(12), "12 B");
    }
}
