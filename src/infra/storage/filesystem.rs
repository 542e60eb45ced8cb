//! Local directory object store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};

use crate::application::storage::{ObjectStore, StorageError};

/// Stores objects as files beneath `root`; locations are `{public_base_url}/{key}`.
#[derive(Debug)]
pub struct FilesystemObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FilesystemObjectStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf, public_base_url: impl Into<String>) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn location_for(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }

    /// Resolve the absolute filesystem path for a key.
    pub fn absolute_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let absolute = self.absolute_path(key)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        file.write_all(&body).await?;
        file.flush().await?;

        Ok(self.location_for(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let absolute = self.absolute_path(key)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FilesystemObjectStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = FilesystemObjectStore::new(dir.path().join("blobs"), "http://localhost/media/")
            .expect("store");
        (dir, store)
    }

    #[tokio::test]
    async fn put_writes_file_and_returns_public_location() {
        let (_dir, store) = store();

        let location = store
            .put("monsters/a_1_bulba.png", Bytes::from_static(b"png"), "image/png")
            .await
            .expect("put");

        assert_eq!(location, "http://localhost/media/monsters/a_1_bulba.png");
        let path = store.absolute_path("monsters/a_1_bulba.png").expect("path");
        assert_eq!(std::fs::read(path).expect("read"), b"png");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = store();
        store
            .put("monsters/x.png", Bytes::from_static(b"x"), "image/png")
            .await
            .expect("put");

        store.delete("monsters/x.png").await.expect("first delete");
        store.delete("monsters/x.png").await.expect("second delete");
        assert!(!store.absolute_path("monsters/x.png").expect("path").exists());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (_dir, store) = store();

        for key in ["../escape.png", "/etc/passwd", ""] {
            let err = store
                .put(key, Bytes::from_static(b"x"), "image/png")
                .await
                .expect_err("rejected");
            assert!(matches!(err, StorageError::InvalidKey(_)));
        }
    }
}
