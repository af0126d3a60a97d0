//! Scoped file access inside a checked-out repository.
//!
//! A [`LocalRepository`] is rooted at a directory, usually a scratch
//! directory it owns and deletes on [`LocalRepository::close`] or drop. Every
//! path argument is relative to that root; absolute paths and `..` components
//! are rejected so an updater cannot touch files outside the checkout.

use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use tempfile::TempDir;

use crate::encoding::TextEncoding;
use crate::error::{io_err, RepoError};

/// Version-control metadata directory, never returned by [`LocalRepository::find_files`].
const GIT_DIR: &str = ".git";

/// Matching options for [`LocalRepository::find_files`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobOptions {
    pub case_insensitive: bool,
}

/// Handle on a working tree.
#[derive(Debug)]
pub struct LocalRepository {
    root: PathBuf,
    scratch: Option<TempDir>,
}

impl LocalRepository {
    /// Create a repository handle over a fresh, empty scratch directory.
    pub fn create_scratch() -> Result<Self, RepoError> {
        let scratch = tempfile::Builder::new()
            .prefix("batchpr-")
            .tempdir()
            .map_err(|e| io_err(std::env::temp_dir(), e))?;
        Ok(Self {
            root: scratch.path().to_path_buf(),
            scratch: Some(scratch),
        })
    }

    /// Handle over an existing directory. The directory is never deleted.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scratch: None,
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Delete the scratch directory, if this handle owns one.
    pub async fn close(mut self) -> Result<(), RepoError> {
        let Some(scratch) = self.scratch.take() else {
            return Ok(());
        };
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scratch.close())
            .await
            .map_err(|e| io_err(&root, std::io::Error::other(e)))?
            .map_err(|e| io_err(&root, e))
    }

    /// Resolve `relative` against the root.
    pub fn full_path(&self, relative: impl AsRef<Path>) -> Result<PathBuf, RepoError> {
        let relative = relative.as_ref();
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || relative.as_os_str().is_empty() {
            return Err(RepoError::PathOutsideRepository {
                path: relative.to_path_buf(),
            });
        }
        Ok(self.root.join(relative))
    }

    /// True if `relative` names an existing file.
    pub async fn file_exists(&self, relative: impl AsRef<Path>) -> Result<bool, RepoError> {
        let path = self.full_path(relative)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    /// Read raw bytes.
    pub async fn read_file(&self, relative: impl AsRef<Path>) -> Result<Vec<u8>, RepoError> {
        let path = self.full_path(relative)?;
        tokio::fs::read(&path).await.map_err(|e| io_err(&path, e))
    }

    /// Read text, decoded with the encoding announced by the file's BOM.
    pub async fn read_file_text(
        &self,
        relative: impl AsRef<Path>,
    ) -> Result<(String, TextEncoding), RepoError> {
        let path = self.full_path(relative)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| io_err(&path, e))?;
        decode(&path, &bytes)
    }

    /// Apply `transform` to the file's bytes and write back only when the
    /// result differs. Returns whether a write happened.
    pub async fn update_file<F>(
        &self,
        relative: impl AsRef<Path>,
        transform: F,
    ) -> Result<bool, RepoError>
    where
        F: FnOnce(&[u8]) -> Vec<u8>,
    {
        self.try_update_file(relative, |bytes| {
            Ok::<_, std::convert::Infallible>(transform(bytes))
        })
        .await
    }

    /// Fallible form of [`LocalRepository::update_file`]. A failing
    /// transform leaves the file untouched.
    pub async fn try_update_file<F, E>(
        &self,
        relative: impl AsRef<Path>,
        transform: F,
    ) -> Result<bool, RepoError>
    where
        F: FnOnce(&[u8]) -> Result<Vec<u8>, E>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = self.full_path(relative)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| io_err(&path, e))?;
        let updated = transform(&bytes).map_err(|e| RepoError::Transform {
            path: path.clone(),
            source: e.into(),
        })?;
        if updated == bytes {
            return Ok(false);
        }
        tokio::fs::write(&path, &updated)
            .await
            .map_err(|e| io_err(&path, e))?;
        Ok(true)
    }

    /// Apply `transform` to the file's text.
    ///
    /// The text is decoded with the encoding detected from the BOM and
    /// re-encoded with that same encoding. Writes only on change.
    pub async fn update_file_text<F>(
        &self,
        relative: impl AsRef<Path>,
        transform: F,
    ) -> Result<bool, RepoError>
    where
        F: FnOnce(&str) -> String,
    {
        self.try_update_file_text(relative, |text| {
            Ok::<_, std::convert::Infallible>(transform(text))
        })
        .await
    }

    /// Fallible form of [`LocalRepository::update_file_text`].
    pub async fn try_update_file_text<F, E>(
        &self,
        relative: impl AsRef<Path>,
        transform: F,
    ) -> Result<bool, RepoError>
    where
        F: FnOnce(&str) -> Result<String, E>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = self.full_path(relative)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| io_err(&path, e))?;
        let (text, encoding) = decode(&path, &bytes)?;
        let updated = transform(&text).map_err(|e| RepoError::Transform {
            path: path.clone(),
            source: e.into(),
        })?;
        if updated == text {
            return Ok(false);
        }
        let encoded = encoding
            .encode(&updated)
            .map_err(|source| RepoError::Encoding {
                path: path.clone(),
                source,
            })?;
        tokio::fs::write(&path, &encoded)
            .await
            .map_err(|e| io_err(&path, e))?;
        Ok(true)
    }

    /// Create or overwrite a file, creating parent directories.
    pub async fn add_file(
        &self,
        relative: impl AsRef<Path>,
        content: impl AsRef<[u8]>,
    ) -> Result<(), RepoError> {
        let path = self.full_path(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }
        tokio::fs::write(&path, content.as_ref())
            .await
            .map_err(|e| io_err(&path, e))
    }

    /// Create or overwrite a text file with an explicit encoding.
    pub async fn add_file_text(
        &self,
        relative: impl AsRef<Path>,
        content: &str,
        encoding: TextEncoding,
    ) -> Result<(), RepoError> {
        let relative = relative.as_ref();
        let encoded = encoding
            .encode(content)
            .map_err(|source| RepoError::Encoding {
                path: relative.to_path_buf(),
                source,
            })?;
        self.add_file(relative, encoded).await
    }

    /// Absolute paths of every file under the root matching `pattern`.
    ///
    /// Patterns match the `/`-separated path relative to the root; `*` stays
    /// within one directory and `**` crosses directories. The `.git`
    /// directory is never entered. Each call walks the filesystem again, on
    /// the blocking thread pool.
    pub async fn find_files(
        &self,
        pattern: &str,
        options: GlobOptions,
    ) -> Result<Vec<PathBuf>, RepoError> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .case_insensitive(options.case_insensitive)
            .build()?
            .compile_matcher();

        let root = self.root.clone();
        tokio::task::spawn_blocking(move || walk_matching(&root, &matcher))
            .await
            .map_err(|e| io_err(&self.root, std::io::Error::other(e)))?
    }
}

fn walk_matching(root: &Path, matcher: &GlobMatcher) -> Result<Vec<PathBuf>, RepoError> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .filter_entry(|entry| entry.file_name() != GIT_DIR)
        .build();

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if matcher.is_match(to_slash(relative)) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

fn decode(path: &Path, bytes: &[u8]) -> Result<(String, TextEncoding), RepoError> {
    let encoding = TextEncoding::detect(bytes);
    let text = encoding
        .decode(bytes)
        .map_err(|source| RepoError::Encoding {
            path: path.to_path_buf(),
            source,
        })?;
    Ok((text, encoding))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_path_rejects_escapes() {
        let repo = LocalRepository::open("/srv/checkout");
        assert!(repo.full_path("../etc/passwd").is_err());
        assert!(repo.full_path("/etc/passwd").is_err());
        assert!(repo.full_path("").is_err());
        assert_eq!(
            repo.full_path("docs/README.md").unwrap(),
            PathBuf::from("/srv/checkout/docs/README.md")
        );
    }

    #[test]
    fn to_slash_joins_components() {
        assert_eq!(to_slash(Path::new("a/b/c.txt")), "a/b/c.txt");
    }

    #[tokio::test]
    async fn scratch_directory_removed_on_close() {
        let repo = LocalRepository::create_scratch().unwrap();
        let root = repo.root_path().to_path_buf();
        repo.add_file("nested/file.txt", "x").await.unwrap();
        assert!(root.join("nested/file.txt").exists());

        repo.close().await.unwrap();
        assert!(!root.exists());
    }
}
