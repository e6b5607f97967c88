use std::{
    fmt,
    io::Error,
    path::{Path, PathBuf},
};

use rand::{Rng, distr::Alphanumeric};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::lock::FileLock;

#[derive(Debug)]
pub enum StoreError {
    IoError(Error),
    SerdeError(serde_json::Error),
    NotFound(String),
    Invalid(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::IoError(e) => write!(f, "storage I/O failed: {}", e),
            StoreError::SerdeError(e) => write!(f, "stored document is malformed: {}", e),
            StoreError::NotFound(what) => write!(f, "not found: {}", what),
            StoreError::Invalid(why) => write!(f, "{}", why),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        StoreError::IoError(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerdeError(err)
    }
}

/// Writes `contents` to a sibling temp file and renames it over `path`, so a
/// crash mid-write never leaves a truncated document behind.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent).await?;
    }

    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("store");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, suffix));

    async_fs::write(&tmp, contents).await?;
    if let Err(e) = async_fs::rename(&tmp, path).await {
        let _ = async_fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// Key-value JSON document persisted as a whole.
///
/// Every mutation re-reads the file under an advisory lock shared with other
/// processes, applies the change and persists atomically, so concurrent
/// writers never overwrite each other's keys. Reads always go to disk.
pub struct ConfigStore {
    path: PathBuf,
    lock_path: PathBuf,
    writer: Mutex<()>,
}

impl ConfigStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        // fail early on a malformed document
        load(&path).await?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("store");
        let lock_path = path.with_file_name(format!(".{}.lock", file_name));
        Ok(Self {
            path,
            lock_path,
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let doc = load(&self.path).await?;
        match doc.get(key) {
            Some(Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.update_document(|doc| {
            doc.insert(key.to_string(), value);
            Ok(())
        })
        .await
    }

    /// Read-modify-write of a single key. `f` returning an error leaves the
    /// stored document untouched.
    pub async fn update<T, R, F>(&self, key: &str, f: F) -> Result<R, StoreError>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> Result<R, StoreError>,
    {
        self.update_document(|doc| {
            let mut value: T = read_key(doc, key)?;
            let out = f(&mut value)?;
            doc.insert(key.to_string(), serde_json::to_value(&value)?);
            Ok(out)
        })
        .await
    }

    /// Read-modify-write spanning several keys of the document.
    pub async fn update_document<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Map<String, Value>) -> Result<R, StoreError>,
    {
        let _writer = self.writer.lock().await;
        let _lock = FileLock::exclusive(&self.lock_path).await?;

        let mut doc = load(&self.path).await?;
        let out = f(&mut doc)?;

        let json = serde_json::to_string_pretty(&doc)?;
        write_atomic(&self.path, json.as_bytes()).await?;
        Ok(out)
    }

    pub async fn snapshot(&self) -> Result<Map<String, Value>, StoreError> {
        load(&self.path).await
    }
}

/// The document at `path`; a missing or blank file is an empty document.
async fn load(path: &Path) -> Result<Map<String, Value>, StoreError> {
    match async_fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(Map::new()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
        Err(e) => Err(StoreError::IoError(e)),
    }
}

/// Deserializes `key` from a document, defaulting when absent or null.
pub fn read_key<T: DeserializeOwned + Default>(
    doc: &Map<String, Value>,
    key: &str,
) -> Result<T, StoreError> {
    match doc.get(key) {
        Some(Value::Null) | None => Ok(T::default()),
        Some(value) => Ok(serde_json::from_value(value.clone())?),
    }
}

pub fn write_key<T: Serialize>(
    doc: &mut Map<String, Value>,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    doc.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(())
}
