use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::models::ListOptions;
use crate::services::validate;
use crate::storage::ObjectStore;

const LIST_PAGE_SIZE: usize = 500;

/// One detected drift between the Object Store and the catalog
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    /// Object with no catalog row referencing it
    OrphanedFile { path: String },
    /// Catalog row whose storage_path no longer resolves
    DanglingRecord { asset_id: String, path: String },
}

#[derive(Debug, Serialize)]
pub struct ConsistencyReport {
    pub issues: Vec<ConsistencyIssue>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CleanupReport {
    pub attempted: usize,
    pub deleted: usize,
    pub errors: Vec<CleanupError>,
}

#[derive(Debug, Serialize)]
pub struct CleanupError {
    pub path: String,
    pub error: String,
}

/// Detects and repairs drift between the Object Store and the catalog.
/// No cross-store transaction exists, so orphans are expected after failed
/// compensations and crashes; sweeps are idempotent.
pub struct ConsistencyChecker {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
}

impl ConsistencyChecker {
    pub fn new(config: Arc<Config>, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    async fn referenced_paths(&self, db: &Database) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT storage_path FROM assets WHERE storage_path IS NOT NULL")
                .fetch_all(db.pool())
                .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    /// Objects under the managed prefix with no referencing catalog row.
    /// Objects younger than the grace period are skipped: an in-flight
    /// upload whose catalog commit has not landed yet is not an orphan.
    pub async fn find_orphaned_files(&self, db: &Database) -> Result<Vec<String>> {
        let referenced = self.referenced_paths(db).await?;
        let grace_cutoff =
            Utc::now() - Duration::minutes(self.config.storage.orphan_grace_minutes);
        let safety_limit = self.config.storage.list_safety_limit;

        let mut orphans = Vec::new();
        let mut offset = 0;
        let mut scanned = 0;

        loop {
            let page = self
                .store
                .list(
                    &self.config.storage.base_path,
                    ListOptions {
                        limit: Some(LIST_PAGE_SIZE.min(safety_limit - scanned)),
                        offset,
                    },
                )
                .await?;
            if page.is_empty() {
                break;
            }

            scanned += page.len();
            offset += page.len();

            for entry in page {
                if entry.created_at > grace_cutoff {
                    continue;
                }
                if !referenced.contains(&entry.path) {
                    orphans.push(entry.path);
                }
            }

            if scanned >= safety_limit {
                tracing::warn!(
                    "Orphan scan hit safety limit of {} objects; results may be partial",
                    safety_limit
                );
                break;
            }
        }

        Ok(orphans)
    }

    /// Delete every detected orphan, collecting per-path failures without
    /// aborting the sweep.
    pub async fn cleanup_orphaned_files(&self, db: &Database) -> Result<CleanupReport> {
        let orphans = self.find_orphaned_files(db).await?;
        let attempted = orphans.len();
        let mut deleted = 0;
        let mut errors = Vec::new();

        for path in orphans {
            match self.store.remove(std::slice::from_ref(&path)).await {
                Ok(()) => {
                    deleted += 1;
                    // The orphan's derived thumbnail lives outside the managed
                    // prefix and would otherwise leak; best-effort removal.
                    let thumb =
                        validate::thumbnail_path(&self.config.storage.base_path, &path);
                    if let Err(e) = self.store.remove(std::slice::from_ref(&thumb)).await {
                        tracing::warn!("Failed to delete orphan thumbnail {}: {}", thumb, e);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to delete orphan {}: {}", path, e);
                    errors.push(CleanupError {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Orphan cleanup: {} attempted, {} deleted, {} errors",
            attempted,
            deleted,
            errors.len()
        );
        Ok(CleanupReport {
            attempted,
            deleted,
            errors,
        })
    }

    /// Full drift report: orphaned objects plus catalog rows whose
    /// storage_path does not resolve.
    pub async fn check_consistency(&self, db: &Database) -> Result<ConsistencyReport> {
        let mut issues: Vec<ConsistencyIssue> = self
            .find_orphaned_files(db)
            .await?
            .into_iter()
            .map(|path| ConsistencyIssue::OrphanedFile { path })
            .collect();

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, storage_path FROM assets WHERE storage_path IS NOT NULL",
        )
        .fetch_all(db.pool())
        .await?;

        for (asset_id, path) in rows {
            match self.store.exists(&path).await {
                Ok(true) => {}
                Ok(false) => issues.push(ConsistencyIssue::DanglingRecord { asset_id, path }),
                Err(e) => {
                    // Read failures are not proof of drift; report nothing
                    // but leave a trace for the operator.
                    tracing::warn!("Existence check failed for {}: {}", path, e);
                }
            }
        }

        let count = issues.len();
        Ok(ConsistencyReport { issues, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalObjectStore;
    use bytes::Bytes;

    async fn setup(grace_minutes: i64) -> (Database, ConsistencyChecker, tempfile::TempDir) {
        let db = Database::new(":memory:").await.unwrap();
        db.run_migrations().await.unwrap();

        let mut config = Config::default();
        config.storage.orphan_grace_minutes = grace_minutes;
        let config = Arc::new(config);

        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path(), "gallery"));
        let checker = ConsistencyChecker::new(config, store);
        (db, checker, dir)
    }

    async fn put(checker: &ConsistencyChecker, path: &str) {
        checker
            .store
            .put(path, Bytes::from_static(b"x"), None)
            .await
            .unwrap();
    }

    async fn reference(db: &Database, id: &str, path: &str) {
        sqlx::query("INSERT INTO assets (id, title, storage_path, created_by) VALUES (?, 't', ?, 'u1')")
            .bind(id)
            .bind(path)
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn orphans_are_the_set_difference() {
        let (db, checker, _dir) = setup(0).await;

        for name in ["a", "b", "c"] {
            put(&checker, &format!("gallery/u1/{}.png", name)).await;
        }
        reference(&db, "1", "gallery/u1/a.png").await;
        reference(&db, "2", "gallery/u1/c.png").await;

        let orphans = checker.find_orphaned_files(&db).await.unwrap();
        assert_eq!(orphans, vec!["gallery/u1/b.png".to_string()]);
    }

    #[tokio::test]
    async fn grace_period_hides_fresh_objects() {
        let (db, checker, _dir) = setup(60).await;

        // Just written, well within the 60 minute grace window
        put(&checker, "gallery/u1/fresh.png").await;

        let orphans = checker.find_orphaned_files(&db).await.unwrap();
        assert!(orphans.is_empty());
    }

    #[tokio::test]
    async fn cleanup_converges_to_zero() {
        let (db, checker, _dir) = setup(0).await;

        put(&checker, "gallery/u1/orphan1.png").await;
        put(&checker, "gallery/u1/orphan2.png").await;
        put(&checker, "gallery/u1/kept.png").await;
        reference(&db, "1", "gallery/u1/kept.png").await;

        let report = checker.cleanup_orphaned_files(&db).await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.deleted, 2);
        assert!(report.errors.is_empty());

        // Idempotent: a second sweep finds nothing
        let report = checker.cleanup_orphaned_files(&db).await.unwrap();
        assert_eq!(report.attempted, 0);
        assert!(checker.store.exists("gallery/u1/kept.png").await.unwrap());
    }

    #[tokio::test]
    async fn cleanup_sweeps_derived_thumbnails() {
        let (db, checker, _dir) = setup(0).await;

        // Crash between thumbnail write and catalog commit leaves both the
        // object and its thumbnail behind.
        put(&checker, "gallery/u1/lost.png").await;
        put(&checker, "gallery_thumbs/u1/lost.png").await;

        let report = checker.cleanup_orphaned_files(&db).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(!checker.store.exists("gallery/u1/lost.png").await.unwrap());
        assert!(!checker
            .store
            .exists("gallery_thumbs/u1/lost.png")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn dangling_records_are_reported() {
        let (db, checker, _dir) = setup(0).await;

        put(&checker, "gallery/u1/live.png").await;
        reference(&db, "live", "gallery/u1/live.png").await;
        reference(&db, "gone", "gallery/u1/gone.png").await;

        let report = checker.check_consistency(&db).await.unwrap();
        assert_eq!(report.count, 1);
        match &report.issues[0] {
            ConsistencyIssue::DanglingRecord { asset_id, path } => {
                assert_eq!(asset_id, "gone");
                assert_eq!(path, "gallery/u1/gone.png");
            }
            other => panic!("expected dangling record, got {:?}", other),
        }
    }
}
