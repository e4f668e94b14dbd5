//! Sources of the raw YAML stream a package is built from.

use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::debug;
use up_utils::{
    error::{FileSystemError, FileSystemResult},
    fs::{read_file, walk_files},
};

/// Produces a multi-document YAML stream.
pub trait Backend {
    fn init(&self) -> FileSystemResult<Vec<u8>>;
}

/// Reads every `*.yaml` / `*.yml` file below a directory.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
    skip: Vec<PathBuf>,
    ignore: Vec<String>,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skip: Vec::new(),
            ignore: Vec::new(),
        }
    }

    /// Excludes a directory (and everything below it) from the walk.
    pub fn skip(mut self, path: impl Into<PathBuf>) -> Self {
        self.skip.push(path.into());
        self
    }

    /// Excludes paths matching `pattern`, relative to the root.
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignore.push(pattern.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ignored(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let relative = relative.to_string_lossy();
        self.ignore
            .iter()
            .any(|pattern| fast_glob::glob_match(pattern, relative.as_ref()))
    }

    fn skipped(&self, path: &Path) -> bool {
        self.skip.iter().any(|skip| path.starts_with(skip)) || self.ignored(path)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    )
}

impl Backend for FsBackend {
    /// Concatenates the files in lexical path order, separated by `---`.
    ///
    /// A missing root is a [`FileSystemError`] whose
    /// [`is_not_found`](FileSystemError::is_not_found) is true.
    fn init(&self) -> FileSystemResult<Vec<u8>> {
        if !self.root.exists() {
            return Err(FileSystemError::Directory {
                path: self.root.clone(),
                action: "read",
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }

        let mut stream = Vec::new();
        walk_files(
            &self.root,
            &mut |dir| !self.skipped(dir),
            &mut |path| {
                if !is_yaml(path) || self.skipped(path) {
                    return Ok(());
                }
                debug!("adding {}", path.display());

                let content = read_file(path)?;
                if !stream.is_empty() {
                    if !stream.ends_with(b"\n") {
                        stream.push(b'\n');
                    }
                    stream.extend_from_slice(b"---\n");
                }
                stream.extend_from_slice(&content);
                Ok(())
            },
        )?;

        Ok(stream)
    }
}

/// Backend serving a fixed stream.
#[derive(Debug, Clone, Default)]
pub struct MemBackend(Vec<u8>);

impl MemBackend {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self(content.into())
    }
}

impl Backend for MemBackend {
    fn init(&self) -> FileSystemResult<Vec<u8>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_concatenates_in_lexical_order() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("apis/b")).unwrap();
        fs::write(dir.path().join("crossplane.yaml"), "kind: Configuration").unwrap();
        fs::write(dir.path().join("apis/b/comp.yml"), "kind: Composition\n").unwrap();
        fs::write(dir.path().join("apis/a.yaml"), "kind: A\n").unwrap();
        fs::write(dir.path().join("README.md"), "# readme").unwrap();

        let stream = FsBackend::new(dir.path()).init().unwrap();
        assert_eq!(
            String::from_utf8(stream).unwrap(),
            "kind: A\n---\nkind: Composition\n---\nkind: Configuration"
        );
    }

    #[test]
    fn test_skip_and_ignore() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("examples")).unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("crossplane.yaml"), "kind: Provider\n").unwrap();
        fs::write(dir.path().join("examples/claim.yaml"), "kind: Claim\n").unwrap();
        fs::write(dir.path().join("tests/case.yaml"), "kind: Test\n").unwrap();
        fs::write(dir.path().join("draft.yaml"), "kind: Draft\n").unwrap();

        let backend = FsBackend::new(dir.path())
            .skip(dir.path().join("examples"))
            .ignore("tests/**")
            .ignore("draft.yaml");
        assert_eq!(backend.init().unwrap(), b"kind: Provider\n");
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let dir = tempdir().unwrap();
        let err = FsBackend::new(dir.path().join("absent")).init().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_mem_backend() {
        assert_eq!(MemBackend::new("a: b").init().unwrap(), b"a: b");
    }
}
