//! JSON file backing the client's progress object.

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use std::io;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::ErrorKind;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::atomic::write_atomic;

/// Reads and replaces the progress file. Writes are serialized through an
/// internal mutex; the last writer wins.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProgressStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// File name offered to clients when exporting.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| crate::config::PROGRESS_FILE_NAME.to_string())
    }

    /// Returns the stored value, creating the file as `{}` if it is absent.
    pub async fn load(&self) -> Result<Value, ProgressError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let _guard = self.write_lock.lock().await;
                // Another request may have created it while we waited.
                if fs::try_exists(&self.path).await? {
                    let bytes = fs::read(&self.path).await?;
                    return Ok(serde_json::from_slice(&bytes)?);
                }
                let empty = Value::Object(Default::default());
                self.write_locked(&empty).await?;
                info!(path = %self.path.display(), "initialized empty progress file");
                Ok(empty)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the stored value entirely.
    pub async fn save(&self, value: &Value) -> Result<usize, ProgressError> {
        let _guard = self.write_lock.lock().await;
        self.write_locked(value).await
    }

    /// Parses `bytes` as JSON and stores the result. Nothing is written when
    /// parsing fails.
    pub async fn replace_from_slice(&self, bytes: &[u8]) -> Result<usize, ProgressError> {
        let value: Value = serde_json::from_slice(bytes)?;
        self.save(&value).await
    }

    /// Raw file contents, without creating the file.
    pub async fn read_raw(&self) -> Result<Vec<u8>, ProgressError> {
        Ok(fs::read(&self.path).await?)
    }

    async fn write_locked(&self, value: &Value) -> Result<usize, ProgressError> {
        let contents = to_pretty_json(value)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        write_atomic(&self.path, &contents).await?;
        debug!(path = %self.path.display(), bytes = contents.len(), "progress written");
        Ok(contents.len())
    }
}

/// Serializes with 4-space indentation.
fn to_pretty_json(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    Ok(out)
}

#[derive(Debug)]
pub enum ProgressError {
    InvalidJson(serde_json::Error),
    Io(io::Error),
}

impl From<io::Error> for ProgressError {
    fn from(err: io::Error) -> Self {
        ProgressError::Io(err)
    }
}

impl From<serde_json::Error> for ProgressError {
    fn from(err: serde_json::Error) -> Self {
        ProgressError::InvalidJson(err)
    }
}
