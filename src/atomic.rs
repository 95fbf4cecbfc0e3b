//! Temp-file writes with atomic replacement of the target.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Temporary sibling of a target file, renamed over it on finalize.
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl AtomicFile {
    /// Creates the temp file in the target's directory.
    pub async fn new(target: &Path) -> io::Result<Self> {
        let parent = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory")
        })?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_name = format!(".{base}.tmp.{}", Uuid::new_v4());
        let temp_path = parent.join(temp_name);
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Drops the temp file without touching the target.
    pub async fn cleanup(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// Syncs the temp file and renames it over the target.
    pub async fn finalize(self) -> io::Result<()> {
        if let Err(err) = self.file.sync_all().await {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }
        drop(self.file);

        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            #[cfg(windows)]
            {
                if fs::remove_file(&self.target).await.is_ok() {
                    fs::rename(&self.temp_path, &self.target).await?;
                } else {
                    let _ = fs::remove_file(&self.temp_path).await;
                    return Err(err);
                }
            }
            #[cfg(not(windows))]
            {
                let _ = fs::remove_file(&self.temp_path).await;
                return Err(err);
            }
        }

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }

        Ok(())
    }
}

/// Writes `contents` to `target` through an [`AtomicFile`].
pub async fn write_atomic(target: &Path, contents: &[u8]) -> io::Result<()> {
    let mut atomic = AtomicFile::new(target).await?;
    if let Err(err) = atomic.file_mut().write_all(contents).await {
        atomic.cleanup().await;
        return Err(err);
    }
    atomic.finalize().await
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn replaces_existing_file_and_leaves_no_temp() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("state.json");
        std::fs::write(&target, b"old").expect("seed");

        write_atomic(&target, b"new").await.expect("write");

        assert_eq!(std::fs::read(&target).expect("read"), b"new");
        let leftovers = std::fs::read_dir(temp.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn cleanup_keeps_target_untouched() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("state.json");
        std::fs::write(&target, b"keep").expect("seed");

        let mut atomic = AtomicFile::new(&target).await.expect("create");
        atomic.file_mut().write_all(b"discard").await.expect("write");
        atomic.cleanup().await;

        assert_eq!(std::fs::read(&target).expect("read"), b"keep");
        assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 1);
    }
}
