use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{FileSystemError, FileSystemResult};

/// Removes the specified file or directory safely.
///
/// If the path does not exist, this function returns `Ok(())` without error. If the path
/// points to a directory, it and all of its contents are removed recursively. If the path
/// points to a file, it is removed with [`std::fs::remove_file`].
///
/// # Errors
///
/// Returns a [`FileSystemError::File`] if the removal fails for any reason other than
/// the path not existing (e.g., permission denied).
///
/// # Example
///
/// ```no_run
/// use up_utils::error::FileSystemResult;
/// use up_utils::fs::safe_remove;
///
/// fn main() -> FileSystemResult<()> {
///     safe_remove("/tmp/some_path")?;
///     Ok(())
/// }
/// ```
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(());
    }

    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "remove",
            source: err,
        }
    })
}

/// Creates a directory structure if it doesn't exist.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| {
            FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            }
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Reads a file into memory, attaching the path to any error.
pub fn read_file<P: AsRef<Path>>(path: P) -> FileSystemResult<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "read",
            source: err,
        }
    })
}

/// Writes `contents` to `path`, creating or truncating the file.
pub fn write_file<P: AsRef<Path>>(path: P, contents: &[u8]) -> FileSystemResult<()> {
    let path = path.as_ref();
    fs::write(path, contents).map_err(|err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "write",
            source: err,
        }
    })
}

/// Lists the direct children of a directory, sorted by path.
///
/// A missing directory is reported as [`FileSystemError::Directory`] with an
/// [`std::io::ErrorKind::NotFound`] source, which callers can detect with
/// [`FileSystemError::is_not_found`].
pub fn read_dir_sorted<P: AsRef<Path>>(path: P) -> FileSystemResult<Vec<PathBuf>> {
    let path = path.as_ref();
    let dir_err = |err| {
        FileSystemError::Directory {
            path: path.to_path_buf(),
            action: "read",
            source: err,
        }
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(path).map_err(dir_err)? {
        entries.push(entry.map_err(dir_err)?.path());
    }
    entries.sort();
    Ok(entries)
}

/// Recursively walks `dir`, calling `action` on every regular file.
///
/// Directories are descended in sorted order so the visiting order is stable
/// across platforms. Returning `false` from `enter` skips a directory.
pub fn walk_files<P, E, F>(dir: P, enter: &mut E, action: &mut F) -> FileSystemResult<()>
where
    P: AsRef<Path>,
    E: FnMut(&Path) -> bool,
    F: FnMut(&Path) -> FileSystemResult<()>,
{
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    for path in read_dir_sorted(dir)? {
        if path.is_dir() {
            if enter(&path) {
                walk_files(&path, enter, action)?;
            }
        } else {
            action(&path)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_safe_remove_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_file.txt");
        fs::write(&file_path, "hello").unwrap();
        safe_remove(&file_path).unwrap();
        assert!(!file_path.exists());
    }

    #[test]
    fn test_safe_remove_dir() {
        let dir = tempdir().unwrap();
        let sub_dir = dir.path().join("sub");
        fs::create_dir(&sub_dir).unwrap();
        fs::write(sub_dir.join("nested"), "x").unwrap();
        safe_remove(&sub_dir).unwrap();
        assert!(!sub_dir.exists());
    }

    #[test]
    fn test_safe_remove_non_existent() {
        let dir = tempdir().unwrap();
        safe_remove(dir.path().join("non_existent.txt")).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists() {
        let dir = tempdir().unwrap();
        let new_dir = dir.path().join("a/b/c");
        ensure_dir_exists(&new_dir).unwrap();
        assert!(new_dir.is_dir());
        ensure_dir_exists(&new_dir).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists_file_collision() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("file.txt");
        fs::write(&file_path, "hello").unwrap();
        assert!(matches!(
            ensure_dir_exists(&file_path),
            Err(FileSystemError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_read_dir_sorted_missing() {
        let dir = tempdir().unwrap();
        let err = read_dir_sorted(dir.path().join("missing")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_walk_files_sorted_and_skips() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::create_dir_all(dir.path().join("skip")).unwrap();
        fs::write(dir.path().join("c.yaml"), "").unwrap();
        fs::write(dir.path().join("a.yaml"), "").unwrap();
        fs::write(dir.path().join("b/inner.yaml"), "").unwrap();
        fs::write(dir.path().join("skip/ignored.yaml"), "").unwrap();

        let mut seen = Vec::new();
        walk_files(
            dir.path(),
            &mut |p| !p.ends_with("skip"),
            &mut |p| {
                seen.push(p.strip_prefix(dir.path()).unwrap().to_path_buf());
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(
            seen,
            vec![
                PathBuf::from("a.yaml"),
                PathBuf::from("b/inner.yaml"),
                PathBuf::from("c.yaml"),
            ]
        );
    }
}
