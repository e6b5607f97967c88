use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use fs2::FileExt;

/// Advisory lock on a file shared between processes; released on drop.
///
/// Locks are taken on their own file descriptor, so two holders inside one
/// process contend exactly like two processes do.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Waits until no other holder has the lock.
    pub async fn exclusive(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        blocking(move || {
            let file = open_lock_file(&path)?;
            FileExt::lock_exclusive(&file)?;
            Ok(Self { file, path })
        })
        .await
    }

    /// The exclusive lock if nobody else holds the file, `None` otherwise.
    pub async fn try_exclusive(path: impl Into<PathBuf>) -> io::Result<Option<Self>> {
        let path = path.into();
        blocking(move || {
            let file = open_lock_file(&path)?;
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => Ok(Some(Self { file, path })),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Waits only while someone holds the lock exclusively.
    pub async fn shared(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        blocking(move || {
            let file = open_lock_file(&path)?;
            FileExt::lock_shared(&file)?;
            Ok(Self { file, path })
        })
        .await
    }

    /// Trades an exclusive lock for a shared one on the same descriptor.
    pub async fn downgrade(self) -> io::Result<Self> {
        blocking(move || {
            FileExt::unlock(&self.file)?;
            FileExt::lock_shared(&self.file)?;
            Ok(self)
        })
        .await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exclusive_holder_blocks_try_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.lock");

        let held = FileLock::try_exclusive(&path).await.unwrap().unwrap();
        assert!(FileLock::try_exclusive(&path).await.unwrap().is_none());

        drop(held);
        assert!(FileLock::try_exclusive(&path).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn shared_holders_coexist_but_exclude_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.lock");

        let first = FileLock::try_exclusive(&path)
            .await
            .unwrap()
            .unwrap()
            .downgrade()
            .await
            .unwrap();
        let second = FileLock::shared(&path).await.unwrap();
        assert!(FileLock::try_exclusive(&path).await.unwrap().is_none());

        drop(first);
        assert!(FileLock::try_exclusive(&path).await.unwrap().is_none());
        drop(second);
        assert!(FileLock::try_exclusive(&path).await.unwrap().is_some());
    }
}
