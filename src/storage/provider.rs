use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::models::{ListOptions, ObjectEntry};

/// Object store provider trait
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload data to storage
    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()>;

    /// Download data from storage
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Delete objects from storage
    async fn remove(&self, paths: &[String]) -> Result<()>;

    /// Check if an object exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// List objects under a prefix, ordered by path
    async fn list(&self, prefix: &str, opts: ListOptions) -> Result<Vec<ObjectEntry>>;

    /// Public URL for an object
    fn public_url(&self, path: &str) -> String;

    /// Get the storage type name
    fn store_type(&self) -> &'static str;
}
