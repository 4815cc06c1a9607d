use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ListOptions, ObjectEntry};
use crate::storage::ObjectStore;

/// Local file system object store
pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn relative_key(&self, full: &Path) -> Option<String> {
        full.strip_prefix(&self.root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, data: Bytes, _content_type: Option<&str>) -> Result<()> {
        let full_path = self.full_path(path);

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        tracing::debug!("Saved object to {:?}", full_path);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let full_path = self.full_path(path);

        let data = fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("Object not found: {}", path))
            } else {
                AppError::Download(format!("Failed to read object {}: {}", path, e))
            }
        })?;

        Ok(Bytes::from(data))
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        let mut failures = Vec::new();

        for path in paths {
            let full_path = self.full_path(path);
            if full_path.exists() {
                if let Err(e) = fs::remove_file(&full_path).await {
                    failures.push(format!("{}: {}", path, e));
                    continue;
                }
                tracing::debug!("Deleted object {:?}", full_path);

                // Try to remove empty parent directories
                let mut current_dir = full_path.parent().map(|p| p.to_path_buf());
                while let Some(dir) = current_dir {
                    if dir == self.root {
                        break;
                    }
                    // Pruning is best-effort; any read failure just stops the walk
                    match fs::read_dir(&dir).await {
                        Ok(mut entries) => match entries.next_entry().await {
                            Ok(Some(_)) => break, // Not empty
                            Ok(None) => {
                                let _ = fs::remove_dir(&dir).await;
                            }
                            Err(_) => break,
                        },
                        Err(_) => break,
                    }
                    current_dir = dir.parent().map(|p| p.to_path_buf());
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::storage(
                "remove_failed",
                format!("Failed to delete: {}", failures.join(", ")),
            ))
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path).exists())
    }

    async fn list(&self, prefix: &str, opts: ListOptions) -> Result<Vec<ObjectEntry>> {
        let start = self.full_path(prefix);
        let mut entries = Vec::new();

        if !start.exists() {
            return Ok(entries);
        }

        // Depth-first walk under the prefix
        let mut stack = vec![start];
        while let Some(dir) = stack.pop() {
            let mut read_dir = fs::read_dir(&dir).await.map_err(|e| {
                AppError::Download(format!("Failed to list {:?}: {}", dir, e))
            })?;

            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    stack.push(path);
                    continue;
                }

                let Some(key) = self.relative_key(&path) else {
                    continue;
                };
                let created_at: DateTime<Utc> = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                entries.push(ObjectEntry {
                    path: key,
                    size_bytes: meta.len(),
                    mime_type: None,
                    created_at,
                });
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let offset = opts.offset.min(entries.len());
        let mut page: Vec<ObjectEntry> = entries.into_iter().skip(offset).collect();
        if let Some(limit) = opts.limit {
            page.truncate(limit);
        }

        Ok(page)
    }

    fn public_url(&self, path: &str) -> String {
        format!("/objects/{}/{}", self.bucket, path)
    }

    fn store_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "gallery");

        store
            .put("gallery/u1/a.png", Bytes::from_static(b"abc"), None)
            .await
            .unwrap();
        assert!(store.exists("gallery/u1/a.png").await.unwrap());
        assert_eq!(store.get("gallery/u1/a.png").await.unwrap().as_ref(), b"abc");

        store.remove(&["gallery/u1/a.png".to_string()]).await.unwrap();
        assert!(!store.exists("gallery/u1/a.png").await.unwrap());
    }

    #[tokio::test]
    async fn remove_prunes_empty_dirs_and_keeps_occupied_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "gallery");

        store
            .put("gallery/u1/only.png", Bytes::from_static(b"x"), None)
            .await
            .unwrap();
        store
            .put("gallery/u2/kept.png", Bytes::from_static(b"x"), None)
            .await
            .unwrap();
        store
            .put("gallery/u2/gone.png", Bytes::from_static(b"x"), None)
            .await
            .unwrap();

        store
            .remove(&[
                "gallery/u1/only.png".to_string(),
                "gallery/u2/gone.png".to_string(),
            ])
            .await
            .unwrap();

        // u1 emptied out and was pruned; u2 still holds a file
        assert!(!dir.path().join("gallery/u1").exists());
        assert!(store.exists("gallery/u2/kept.png").await.unwrap());
    }

    #[tokio::test]
    async fn list_is_ordered_and_paginated() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "gallery");

        for name in ["c", "a", "b"] {
            store
                .put(
                    &format!("gallery/u1/{}.png", name),
                    Bytes::from_static(b"x"),
                    None,
                )
                .await
                .unwrap();
        }

        let all = store.list("gallery", ListOptions::default()).await.unwrap();
        let paths: Vec<_> = all.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["gallery/u1/a.png", "gallery/u1/b.png", "gallery/u1/c.png"]
        );

        let page = store
            .list(
                "gallery",
                ListOptions {
                    limit: Some(1),
                    offset: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].path, "gallery/u1/b.png");
    }

    #[tokio::test]
    async fn missing_object_maps_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "gallery");

        match store.get("gallery/u1/missing.png").await {
            Err(AppError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|b| b.len())),
        }
    }
}
