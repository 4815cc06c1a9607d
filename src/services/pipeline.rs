use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{AssetRecord, AssetResponse, PipelineSteps, StepOutcome, UploadFile, Uploaded};
use crate::services::audit::AuditLog;
use crate::services::image::ImageProcessor;
use crate::services::quota::{QuotaService, UsageOp};
use crate::services::validate;
use crate::storage::ObjectStore;

/// Progress callback, invoked with monotonically increasing percentages
pub type ProgressFn<'a> = &'a mut (dyn FnMut(u8) + Send);

/// Optional catalog fields accompanying an upload
#[derive(Debug, Default, Clone)]
pub struct CreateAssetOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub event_id: Option<String>,
    pub partner_id: Option<String>,
}

/// Sequential upload pipeline: validate, transform (best effort), write to
/// the Object Store, record metadata, thumbnail (best effort), audit.
pub struct UploadPipeline {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
    processor: Option<Arc<dyn ImageProcessor>>,
}

impl UploadPipeline {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ObjectStore>,
        processor: Option<Arc<dyn ImageProcessor>>,
    ) -> Self {
        Self {
            config,
            store,
            processor,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Run the pipeline for one file. No catalog row is written here; see
    /// `create_asset` for the commit + compensation flow.
    pub async fn upload(
        &self,
        db: &Database,
        file: &UploadFile,
        user_id: &str,
        mut on_progress: Option<ProgressFn<'_>>,
    ) -> Result<Uploaded> {
        let mut report = |pct: u8| {
            if let Some(cb) = on_progress.as_mut() {
                cb(pct);
            }
        };

        // 1. Validate: fail closed, nothing has touched storage yet.
        let validation = validate::validate(&file.name, &file.mime, file.size(), &self.config.storage);
        if !validation.valid {
            return Err(AppError::Validation(validation.errors));
        }
        report(10);

        // 2. Optimize and watermark are best-effort: a failure keeps the
        //    unmodified payload and is recorded in the step outcomes.
        let (data, optimize) = self.apply_transform(&file.data, &file.mime, Transform::Optimize);
        let (data, watermark) = self.apply_transform(&data, &file.mime, Transform::Watermark);
        report(30);

        // 3. Object Store write. Failure aborts; no compensation needed
        //    because the catalog has not been touched.
        let path = validate::generate_path(&self.config.storage.base_path, user_id, &file.name);
        self.store
            .put(&path, data.clone(), Some(&file.mime))
            .await
            .map_err(|e| AppError::Upload(format!("object store write failed: {}", e)))?;
        report(70);

        // 4. Metadata
        let metadata = serde_json::json!({
            "size": data.len(),
            "mime": file.mime,
            "original_name": file.name,
            "uploaded_by": user_id,
            "uploaded_at": Utc::now().to_rfc3339(),
        });
        report(85);

        // 5. Thumbnail, best effort
        let (thumbnail_url, thumbnail) = self.generate_thumbnail(&data, &file.mime, &path).await;
        report(95);

        // 6. Audit, fire-and-forget
        let audit = AuditLog::record(db, "upload", &path, metadata.clone(), true, None).await;
        report(100);

        Ok(Uploaded {
            url: self.store.public_url(&path),
            path,
            thumbnail_url,
            metadata,
            steps: PipelineSteps {
                optimize,
                watermark,
                thumbnail,
                audit,
            },
        })
    }

    fn apply_transform(&self, data: &Bytes, mime: &str, which: Transform) -> (Bytes, StepOutcome) {
        let Some(processor) = &self.processor else {
            return (
                data.clone(),
                StepOutcome::Skipped("no image processor configured".to_string()),
            );
        };

        let result = match which {
            Transform::Optimize => processor.optimize(data, mime),
            Transform::Watermark => processor.watermark(data, mime),
        };

        match result {
            Ok(out) => (out, StepOutcome::Applied),
            Err(e) => {
                tracing::warn!("{:?} step failed, continuing with original: {}", which, e);
                (data.clone(), StepOutcome::Failed(e.to_string()))
            }
        }
    }

    async fn generate_thumbnail(
        &self,
        data: &Bytes,
        mime: &str,
        path: &str,
    ) -> (Option<String>, StepOutcome) {
        let Some(processor) = &self.processor else {
            return (
                None,
                StepOutcome::Skipped("no image processor configured".to_string()),
            );
        };

        let thumb = match processor.thumbnail(
            data,
            mime,
            self.config.storage.thumbnail_width,
            self.config.storage.thumbnail_height,
        ) {
            Ok(thumb) => thumb,
            Err(e) => {
                tracing::warn!("Thumbnail generation failed for {}: {}", path, e);
                return (None, StepOutcome::Failed(e.to_string()));
            }
        };

        let thumb_path = validate::thumbnail_path(&self.config.storage.base_path, path);
        match self.store.put(&thumb_path, thumb, Some(mime)).await {
            Ok(()) => (
                Some(self.store.public_url(&thumb_path)),
                StepOutcome::Applied,
            ),
            Err(e) => {
                tracing::warn!("Thumbnail write failed for {}: {}", thumb_path, e);
                (None, StepOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Upload plus catalog commit. If the insert fails after a successful
    /// object write, the object is deleted again (compensating action); a
    /// failed compensation is logged and left for the reconciler.
    pub async fn create_asset(
        &self,
        db: &Database,
        file: &UploadFile,
        user_id: &str,
        options: &CreateAssetOptions,
    ) -> Result<AssetResponse> {
        let id = Uuid::new_v4().to_string();
        self.create_asset_with_id(db, file, user_id, options, &id)
            .await
    }

    pub async fn create_asset_with_id(
        &self,
        db: &Database,
        file: &UploadFile,
        user_id: &str,
        options: &CreateAssetOptions,
        id: &str,
    ) -> Result<AssetResponse> {
        let uploaded = self.upload(db, file, user_id, None).await?;
        let size = uploaded.metadata["size"].as_i64().unwrap_or(0);
        let now = Utc::now().to_rfc3339();

        let title = options
            .title
            .clone()
            .unwrap_or_else(|| file.name.clone());
        let category = options
            .category
            .clone()
            .unwrap_or_else(|| "uncategorized".to_string());

        let insert = sqlx::query(
            r#"
            INSERT INTO assets (
                id, title, description, storage_path, public_url, thumbnail_url,
                category, tags, status, display_order, event_id, partner_id,
                size_bytes, mime_type, metadata, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, '[]', 'draft', 0, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&title)
        .bind(&options.description)
        .bind(&uploaded.path)
        .bind(&uploaded.url)
        .bind(&uploaded.thumbnail_url)
        .bind(&category)
        .bind(&options.event_id)
        .bind(&options.partner_id)
        .bind(size)
        .bind(&file.mime)
        .bind(uploaded.metadata.to_string())
        .bind(user_id)
        .bind(&now)
        .bind(&now)
        .execute(db.pool())
        .await;

        if let Err(e) = insert {
            self.compensate(db, &uploaded).await;
            return Err(e.into());
        }

        QuotaService::update_usage(db, user_id, size, UsageOp::Add).await?;

        let asset: AssetRecord = sqlx::query_as("SELECT * FROM assets WHERE id = ?")
            .bind(id)
            .fetch_one(db.pool())
            .await?;

        Ok(AssetResponse::from(asset))
    }

    /// Replace an asset's file: write the new object, commit the new path,
    /// then best-effort delete the old object. A failed commit compensates
    /// by deleting the new object instead.
    pub async fn replace_asset_file(
        &self,
        db: &Database,
        asset: &AssetRecord,
        file: &UploadFile,
        user_id: &str,
    ) -> Result<AssetResponse> {
        // Quota is checked on the growth only; the old object's bytes are
        // released once the swap lands.
        let growth = file.size() as i64 - asset.size_bytes;
        if growth > 0 {
            let quota = QuotaService::check(db, user_id, growth).await?;
            if !quota.allowed {
                return Err(AppError::BadRequest(format!(
                    "quota exceeded: {} of {} bytes used, incoming {} more bytes",
                    quota.used_bytes, quota.quota_bytes, growth
                )));
            }
        }

        let uploaded = self.upload(db, file, user_id, None).await?;
        let size = uploaded.metadata["size"].as_i64().unwrap_or(0);
        let now = Utc::now().to_rfc3339();

        let update = sqlx::query(
            r#"
            UPDATE assets
            SET storage_path = ?, public_url = ?, thumbnail_url = ?,
                size_bytes = ?, mime_type = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&uploaded.path)
        .bind(&uploaded.url)
        .bind(&uploaded.thumbnail_url)
        .bind(size)
        .bind(&file.mime)
        .bind(uploaded.metadata.to_string())
        .bind(&now)
        .bind(&asset.id)
        .execute(db.pool())
        .await;

        if let Err(e) = update {
            self.compensate(db, &uploaded).await;
            return Err(e.into());
        }

        // Old object and thumbnail are now unreferenced; best-effort delete,
        // the reconciler catches anything left behind.
        if let Some(old_path) = &asset.storage_path {
            let mut old = vec![old_path.clone()];
            old.push(validate::thumbnail_path(
                &self.config.storage.base_path,
                old_path,
            ));
            if let Err(e) = self.store.remove(&old).await {
                tracing::warn!("Failed to delete replaced object {}: {}", old_path, e);
            }
        }

        let delta = size - asset.size_bytes;
        if delta > 0 {
            QuotaService::update_usage(db, user_id, delta, UsageOp::Add).await?;
        } else if delta < 0 {
            QuotaService::update_usage(db, user_id, -delta, UsageOp::Remove).await?;
        }

        let updated: AssetRecord = sqlx::query_as("SELECT * FROM assets WHERE id = ?")
            .bind(&asset.id)
            .fetch_one(db.pool())
            .await?;

        Ok(AssetResponse::from(updated))
    }

    /// Compensating delete after a failed catalog commit. Never retried
    /// inline; a failure here is the reconciler's problem.
    async fn compensate(&self, db: &Database, uploaded: &Uploaded) {
        let mut paths = vec![uploaded.path.clone()];
        if uploaded.thumbnail_url.is_some() {
            paths.push(validate::thumbnail_path(
                &self.config.storage.base_path,
                &uploaded.path,
            ));
        }

        match self.store.remove(&paths).await {
            Ok(()) => {
                tracing::warn!(
                    "Catalog commit failed; compensating delete removed {}",
                    uploaded.path
                );
            }
            Err(e) => {
                tracing::error!(
                    "Compensating delete failed for {}; leaving orphan for reconciliation: {}",
                    uploaded.path,
                    e
                );
            }
        }

        AuditLog::record(
            db,
            "upload_compensation",
            &uploaded.path,
            serde_json::json!({}),
            true,
            Some("catalog commit failed"),
        )
        .await;
    }
}

#[derive(Debug, Clone, Copy)]
enum Transform {
    Optimize,
    Watermark,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListOptions;
    use crate::services::image::PassthroughProcessor;
    use crate::storage::LocalObjectStore;

    struct BrokenProcessor;

    impl ImageProcessor for BrokenProcessor {
        fn optimize(&self, _data: &Bytes, _mime: &str) -> Result<Bytes> {
            Err(AppError::Internal("codec exploded".to_string()))
        }

        fn watermark(&self, data: &Bytes, _mime: &str) -> Result<Bytes> {
            Ok(data.clone())
        }

        fn thumbnail(&self, _data: &Bytes, _mime: &str, _w: u32, _h: u32) -> Result<Bytes> {
            Err(AppError::Internal("no thumbs today".to_string()))
        }
    }

    async fn setup(
        processor: Option<Arc<dyn ImageProcessor>>,
    ) -> (Database, UploadPipeline, tempfile::TempDir) {
        let db = Database::new(":memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        sqlx::query(
            "INSERT INTO user_profiles (id, display_name, role, quota_bytes, used_bytes) VALUES ('u1', 'U', 'contributor', 1000000, 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path(), "gallery"));
        let pipeline = UploadPipeline::new(Arc::new(Config::default()), store, processor);
        (db, pipeline, dir)
    }

    fn png(name: &str, len: usize) -> UploadFile {
        UploadFile {
            name: name.to_string(),
            mime: "image/png".to_string(),
            data: Bytes::from(vec![7u8; len]),
        }
    }

    #[tokio::test]
    async fn upload_writes_object_and_reports_progress() {
        let (db, pipeline, _dir) = setup(None).await;

        let mut seen: Vec<u8> = Vec::new();
        let mut cb = |pct: u8| seen.push(pct);
        let uploaded = pipeline
            .upload(&db, &png("a.png", 16), "u1", Some(&mut cb))
            .await
            .unwrap();

        assert!(pipeline.store().exists(&uploaded.path).await.unwrap());
        assert_eq!(uploaded.url, format!("/objects/gallery/{}", uploaded.path));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*seen.last().unwrap(), 100);
        assert!(matches!(uploaded.steps.optimize, StepOutcome::Skipped(_)));
        assert!(uploaded.steps.audit.is_applied());
    }

    #[tokio::test]
    async fn invalid_file_leaves_no_side_effects() {
        let (db, pipeline, _dir) = setup(None).await;

        let bad = UploadFile {
            name: "x.pdf".to_string(),
            mime: "application/pdf".to_string(),
            data: Bytes::from_static(b"%PDF"),
        };
        assert!(matches!(
            pipeline.upload(&db, &bad, "u1", None).await,
            Err(AppError::Validation(_))
        ));

        let entries = pipeline
            .store()
            .list("", ListOptions::default())
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn broken_processor_degrades_without_failing() {
        let (db, pipeline, _dir) = setup(Some(Arc::new(BrokenProcessor))).await;

        let uploaded = pipeline
            .upload(&db, &png("a.png", 16), "u1", None)
            .await
            .unwrap();

        assert!(matches!(uploaded.steps.optimize, StepOutcome::Failed(_)));
        assert!(uploaded.steps.watermark.is_applied());
        assert!(matches!(uploaded.steps.thumbnail, StepOutcome::Failed(_)));
        assert!(uploaded.thumbnail_url.is_none());

        // Payload survived untouched
        let data = pipeline.store().get(&uploaded.path).await.unwrap();
        assert_eq!(data.len(), 16);
    }

    #[tokio::test]
    async fn create_asset_commits_row_and_quota() {
        let (db, pipeline, _dir) = setup(Some(Arc::new(PassthroughProcessor))).await;

        let asset = pipeline
            .create_asset(&db, &png("a.png", 32), "u1", &CreateAssetOptions::default())
            .await
            .unwrap();

        let path = asset.storage_path.clone().unwrap();
        assert!(pipeline.store().exists(&path).await.unwrap());
        assert_eq!(asset.size_bytes, 32);
        assert_eq!(asset.status, "draft");
        assert!(asset.thumbnail_url.is_some());

        let (used,): (i64,) =
            sqlx::query_as("SELECT used_bytes FROM user_profiles WHERE id = 'u1'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(used, 32);
    }

    #[tokio::test]
    async fn failed_commit_fires_compensating_delete() {
        let (db, pipeline, _dir) = setup(None).await;

        // Occupy the primary key so the catalog insert fails after the
        // object write succeeds.
        sqlx::query("INSERT INTO assets (id, title, created_by) VALUES ('dup', 't', 'u1')")
            .execute(db.pool())
            .await
            .unwrap();

        let result = pipeline
            .create_asset_with_id(
                &db,
                &png("a.png", 8),
                "u1",
                &CreateAssetOptions::default(),
                "dup",
            )
            .await;
        assert!(matches!(result, Err(AppError::Database(_))));

        // Compensation removed the freshly written object
        let entries = pipeline
            .store()
            .list("gallery", ListOptions::default())
            .await
            .unwrap();
        assert!(entries.is_empty(), "leftover objects: {:?}", entries);

        // Quota untouched
        let (used,): (i64,) =
            sqlx::query_as("SELECT used_bytes FROM user_profiles WHERE id = 'u1'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(used, 0);
    }

    #[tokio::test]
    async fn replace_that_would_exceed_quota_is_rejected() {
        let (db, pipeline, _dir) = setup(None).await;
        sqlx::query("UPDATE user_profiles SET quota_bytes = 20 WHERE id = 'u1'")
            .execute(db.pool())
            .await
            .unwrap();

        let created = pipeline
            .create_asset(&db, &png("a.png", 10), "u1", &CreateAssetOptions::default())
            .await
            .unwrap();
        let old_path = created.storage_path.clone().unwrap();

        let asset: AssetRecord = sqlx::query_as("SELECT * FROM assets WHERE id = ?")
            .bind(&created.id)
            .fetch_one(db.pool())
            .await
            .unwrap();

        // Growth of 30 bytes over a 20 byte quota with 10 already used
        let result = pipeline
            .replace_asset_file(&db, &asset, &png("b.png", 40), "u1")
            .await;
        match result {
            Err(AppError::BadRequest(msg)) => assert!(msg.contains("quota exceeded")),
            other => panic!("expected quota rejection, got {:?}", other.map(|a| a.id)),
        }

        // Nothing changed: old object intact, usage untouched
        assert!(pipeline.store().exists(&old_path).await.unwrap());
        let (used,): (i64,) =
            sqlx::query_as("SELECT used_bytes FROM user_profiles WHERE id = 'u1'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(used, 10);
    }

    #[tokio::test]
    async fn replace_swaps_object_and_drops_old_one() {
        let (db, pipeline, _dir) = setup(None).await;

        let created = pipeline
            .create_asset(&db, &png("a.png", 10), "u1", &CreateAssetOptions::default())
            .await
            .unwrap();
        let old_path = created.storage_path.clone().unwrap();

        let asset: AssetRecord = sqlx::query_as("SELECT * FROM assets WHERE id = ?")
            .bind(&created.id)
            .fetch_one(db.pool())
            .await
            .unwrap();

        let replaced = pipeline
            .replace_asset_file(&db, &asset, &png("b.png", 24), "u1")
            .await
            .unwrap();
        let new_path = replaced.storage_path.clone().unwrap();

        assert_ne!(old_path, new_path);
        assert!(!pipeline.store().exists(&old_path).await.unwrap());
        assert!(pipeline.store().exists(&new_path).await.unwrap());

        let (used,): (i64,) =
            sqlx::query_as("SELECT used_bytes FROM user_profiles WHERE id = 'u1'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(used, 24);
    }
}
