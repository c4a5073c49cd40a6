//! Persistent object storage
//!
//! Narrow interface: put bytes under a key, get back a public URL. The
//! HTTP implementation targets a bucket-style storage API; the in-memory
//! one backs tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use std::collections::HashMap;

use avatar_config::StorageSettings;

use crate::ImageGenError;

/// Object store seam.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under `key`, returning the public URL.
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ImageGenError>;
}

/// Bucket-style HTTP object store.
pub struct HttpObjectStore {
    client: Client,
    settings: StorageSettings,
}

impl HttpObjectStore {
    pub fn new(settings: StorageSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.public_base_url.trim_end_matches('/'),
            self.settings.bucket,
            key
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ImageGenError> {
        let url = format!(
            "{}/object/{}/{}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.bucket,
            key
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ImageGenError::Storage(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ImageGenError::Storage(format!(
                "upload rejected: HTTP {}",
                response.status()
            )));
        }

        Ok(self.public_url(key))
    }
}

/// In-memory object store for tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, ImageGenError> {
        self.objects.write().insert(key.to_string(), bytes);
        Ok(format!("memory://{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_returns_stable_url() {
        let store = MemoryObjectStore::new();
        let url = store
            .put("style-suggestions/p1/s1-1.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(url, "memory://style-suggestions/p1/s1-1.png");
        assert!(store.contains("style-suggestions/p1/s1-1.png"));
    }
}
