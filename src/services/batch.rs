use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::models::{BatchItemResult, BatchSummary, CurrentUser, UploadFile};
use crate::services::pipeline::{CreateAssetOptions, UploadPipeline};
use crate::services::quota::QuotaService;
use crate::services::ratelimit::RateLimiter;

/// Drives the upload pipeline over a batch of files.
///
/// Items run sequentially, never concurrently: this bounds Object Store load
/// and keeps the per-item quota re-check meaningful. Quota and rate limit are
/// evaluated fresh for every item rather than snapshotted at batch start.
pub struct BatchCoordinator {
    config: Arc<Config>,
    pipeline: Arc<UploadPipeline>,
    limiter: Arc<RateLimiter>,
}

impl BatchCoordinator {
    pub fn new(
        config: Arc<Config>,
        pipeline: Arc<UploadPipeline>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            config,
            pipeline,
            limiter,
        }
    }

    /// Process every item, isolating per-item failures. `results` keeps the
    /// input order and carries the original file name for correlation.
    pub async fn process_batch(
        &self,
        db: &Database,
        files: Vec<UploadFile>,
        user: &CurrentUser,
        options: &CreateAssetOptions,
    ) -> Result<BatchSummary> {
        let total = files.len();
        let mut results = Vec::with_capacity(total);

        for file in files {
            let outcome = self.process_item(db, &file, user, options).await;
            results.push(match outcome {
                Ok(asset) => BatchItemResult {
                    file_name: file.name,
                    success: true,
                    asset: Some(asset),
                    error: None,
                },
                Err(e) => BatchItemResult {
                    file_name: file.name,
                    success: false,
                    asset: None,
                    error: Some(e.to_string()),
                },
            });
        }

        let successful = results.iter().filter(|r| r.success).count();
        Ok(BatchSummary {
            total,
            successful,
            failed: total - successful,
            results,
        })
    }

    async fn process_item(
        &self,
        db: &Database,
        file: &UploadFile,
        user: &CurrentUser,
        options: &CreateAssetOptions,
    ) -> Result<crate::models::AssetResponse> {
        self.limiter.check_upload(&self.config.rate_limit, &user.id)?;

        // Re-read usage per item: earlier items in this batch have already
        // committed bytes.
        let quota = QuotaService::check(db, &user.id, file.size() as i64).await?;
        if !quota.allowed {
            return Err(crate::error::AppError::BadRequest(format!(
                "quota exceeded: {} of {} bytes used, incoming {} bytes",
                quota.used_bytes,
                quota.quota_bytes,
                file.size()
            )));
        }

        self.pipeline.create_asset(db, file, &user.id, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::storage::{LocalObjectStore, ObjectStore};
    use bytes::Bytes;

    async fn setup(max_file_size: u64, quota: i64) -> (Database, BatchCoordinator, tempfile::TempDir) {
        let db = Database::new(":memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        sqlx::query(
            "INSERT INTO user_profiles (id, display_name, role, quota_bytes, used_bytes) VALUES ('u1', 'U', 'contributor', ?, 0)",
        )
        .bind(quota)
        .execute(db.pool())
        .await
        .unwrap();

        let mut config = Config::default();
        config.storage.max_file_size = max_file_size;
        let config = Arc::new(config);

        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path(), "gallery"));
        let pipeline = Arc::new(UploadPipeline::new(config.clone(), store, None));
        let coordinator =
            BatchCoordinator::new(config, pipeline, Arc::new(RateLimiter::default()));
        (db, coordinator, dir)
    }

    fn user() -> CurrentUser {
        CurrentUser {
            id: "u1".to_string(),
            role: Role::Contributor,
        }
    }

    fn png(name: &str, len: usize) -> UploadFile {
        UploadFile {
            name: name.to_string(),
            mime: "image/png".to_string(),
            data: Bytes::from(vec![1u8; len]),
        }
    }

    #[tokio::test]
    async fn oversized_item_fails_in_place_without_aborting() {
        // Limit of 10 bytes; the middle item is over it.
        let (db, coordinator, _dir) = setup(10, 1_000_000).await;

        let files = vec![png("ok1.png", 2), png("big.png", 25), png("ok2.png", 3)];
        let summary = coordinator
            .process_batch(&db, files, &user(), &CreateAssetOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);

        // Input order preserved, names carried through
        let names: Vec<_> = summary.results.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["ok1.png", "big.png", "ok2.png"]);
        assert!(summary.results[0].success);
        assert!(!summary.results[1].success);
        assert!(summary.results[2].success);

        let error = summary.results[1].error.as_ref().unwrap();
        assert!(error.contains("size"), "error should mention size: {}", error);
    }

    #[tokio::test]
    async fn quota_is_rechecked_per_item() {
        // Quota 10: first 6-byte file fits, second one must be denied based
        // on the usage the first item just committed.
        let (db, coordinator, _dir) = setup(1024, 10).await;

        let files = vec![png("a.png", 6), png("b.png", 6)];
        let summary = coordinator
            .process_batch(&db, files, &user(), &CreateAssetOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.results[1]
            .error
            .as_ref()
            .unwrap()
            .contains("quota exceeded"));
    }

    #[tokio::test]
    async fn rate_limited_items_fail_individually() {
        let (db, coordinator, _dir) = {
            let (db, _, dir) = setup(1024, 1_000_000).await;
            let mut config = Config::default();
            config.rate_limit.upload_limit = 2;
            let config = Arc::new(config);
            let store: Arc<dyn ObjectStore> =
                Arc::new(LocalObjectStore::new(dir.path(), "gallery"));
            let pipeline = Arc::new(UploadPipeline::new(config.clone(), store, None));
            (
                db,
                BatchCoordinator::new(config, pipeline, Arc::new(RateLimiter::default())),
                dir,
            )
        };

        let files = vec![png("a.png", 1), png("b.png", 1), png("c.png", 1)];
        let summary = coordinator
            .process_batch(&db, files, &user(), &CreateAssetOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.successful, 2);
        assert!(summary.results[2]
            .error
            .as_ref()
            .unwrap()
            .contains("rate limit"));
    }
}
