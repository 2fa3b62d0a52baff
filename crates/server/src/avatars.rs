//! Avatar object storage.
//!
//! Keys are `{user_id}/{millis}.{ext}`. The public URL of an object is what
//! gets stored in `profiles.avatar_url`; deleting goes back through the key
//! recovered from that URL.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::StorageConfig;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("storage service returned {0}")]
    Upstream(reqwest::StatusCode),
}

#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Store an object and return its public URL.
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StoreError>;

    /// Remove an object. Missing objects are not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

pub fn from_config(
    storage: &StorageConfig,
    data_dir: &Path,
    public_url: &str,
) -> anyhow::Result<Arc<dyn AvatarStore>> {
    let store: Arc<dyn AvatarStore> = match storage {
        StorageConfig::Local => Arc::new(LocalAvatarStore::new(
            data_dir.join(LOCAL_AVATAR_DIR),
            format!("{public_url}/avatars"),
        )),
        StorageConfig::Hosted {
            url,
            bucket,
            service_key,
        } => Arc::new(HostedAvatarStore::new(
            url.clone(),
            bucket.clone(),
            service_key.clone(),
        )?),
    };
    Ok(store)
}

pub const LOCAL_AVATAR_DIR: &str = "avatars";

/// Keys come from `service::avatar_key` or from a stored URL; either way they
/// must stay inside the avatar directory.
fn check_key(key: &str) -> Result<(), StoreError> {
    let ok = !key.is_empty()
        && key
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != ".." && !seg.contains('\\'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Local disk
// ---------------------------------------------------------------------------

pub struct LocalAvatarStore {
    root: PathBuf,
    base_url: String,
}

impl LocalAvatarStore {
    pub fn new(root: PathBuf, base_url: String) -> Self {
        Self { root, base_url }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl AvatarStore for LocalAvatarStore {
    async fn put(&self, key: &str, _content_type: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        check_key(key)?;
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(format!("{}/{key}", self.base_url))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        match tokio::fs::remove_file(self.root.join(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Hosted object storage
// ---------------------------------------------------------------------------

pub struct HostedAvatarStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl HostedAvatarStore {
    pub fn new(base_url: String, bucket: String, service_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url,
            bucket,
            service_key,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{key}", self.base_url, self.bucket)
    }
}

#[async_trait]
impl AvatarStore for HostedAvatarStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        check_key(key)?;
        let resp = self
            .client
            .post(self.object_url(key))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(StoreError::Upstream(resp.status()));
        }
        Ok(format!(
            "{}/storage/v1/object/public/{}/{key}",
            self.base_url, self.bucket
        ))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        let resp = self
            .client
            .delete(self.object_url(key))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Ok(()),
            s => Err(StoreError::Upstream(s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_writes_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAvatarStore::new(dir.path().join("avatars"), "http://localhost:4000/avatars".into());

        let url = store.put("u1/100.png", "image/png", vec![1, 2, 3]).await.unwrap();
        assert_eq!(url, "http://localhost:4000/avatars/u1/100.png");
        let on_disk = store.root().join("u1/100.png");
        assert_eq!(std::fs::read(&on_disk).unwrap(), vec![1, 2, 3]);

        store.remove("u1/100.png").await.unwrap();
        assert!(!on_disk.exists());
        // Removing twice is fine.
        store.remove("u1/100.png").await.unwrap();
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAvatarStore::new(dir.path().to_path_buf(), "http://x/avatars".into());
        for key in ["../etc/passwd", "u1/../../x.png", "", "/abs.png"] {
            assert!(matches!(
                store.put(key, "image/png", vec![0]).await,
                Err(StoreError::InvalidKey(_))
            ));
        }
    }
}
