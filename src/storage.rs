use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

const MAX_SEGMENT_LEN: usize = 255;

/// A read-only directory whose files are served verbatim.
#[derive(Clone, Debug)]
pub struct StaticRoot {
    root: PathBuf,
}

impl StaticRoot {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Resolves `relative` inside the root and checks that no component on
    /// the way is a symlink or a non-directory.
    pub async fn resolve_path_checked(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let target = self.resolve(relative)?;
        self.ensure_no_symlink_components(&target).await?;
        Ok(target)
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let mut normalized = PathBuf::new();
        let trimmed = relative.trim_start_matches(['/', '\\']);
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(segment) => normalized.push(segment),
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath);
                }
            }
        }
        // `\` is not a separator on unix, so `..\x` would survive as one segment.
        // NUL bytes and over-long names can never name a file on disk.
        if normalized.components().any(|c| {
            let segment = c.as_os_str().to_string_lossy();
            segment.contains(['\\', '\0']) || segment.len() > MAX_SEGMENT_LEN
        }) {
            return Err(StorageError::InvalidPath);
        }
        if normalized.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath);
        }

        Ok(self.root.join(normalized))
    }

    async fn ensure_no_symlink_components(&self, target: &Path) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidPath)?;
        let mut current = PathBuf::from(&self.root);
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            let metadata = fs::symlink_metadata(&current).await?;
            if metadata.file_type().is_symlink() {
                return Err(StorageError::InvalidPath);
            }
            if components.peek().is_some() && !metadata.is_dir() {
                return Err(StorageError::InvalidPath);
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
