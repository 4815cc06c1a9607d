use chrono::Utc;
use sqlx::QueryBuilder;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    AssetRecord, AssetResponse, AssetStatus, Capability, CurrentUser, GalleryStats, ListQuery,
    PagedResponse, UpdateAssetRequest,
};
use crate::services::audit::AuditLog;
use crate::services::permission::PermissionGate;
use crate::services::quota::{QuotaService, UsageOp};
use crate::services::validate;
use crate::storage::ObjectStore;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Catalog-facing asset operations
pub struct AssetService;

impl AssetService {
    pub async fn get_asset(db: &Database, asset_id: &str) -> Result<AssetRecord> {
        let asset: AssetRecord = sqlx::query_as("SELECT * FROM assets WHERE id = ?")
            .bind(asset_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset not found: {}", asset_id)))?;

        Ok(asset)
    }

    /// Paginated listing with category/status filters and a free-text search
    /// over title, description and tags.
    pub async fn list_assets(
        db: &Database,
        query: &ListQuery,
    ) -> Result<PagedResponse<AssetResponse>> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * limit;

        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM assets WHERE 1=1");
        let mut list_builder = QueryBuilder::new("SELECT * FROM assets WHERE 1=1");

        for builder in [&mut count_builder, &mut list_builder] {
            if let Some(category) = &query.category {
                builder.push(" AND category = ").push_bind(category.clone());
            }
            if let Some(status) = &query.status {
                builder.push(" AND status = ").push_bind(status.clone());
            }
            if let Some(search) = &query.search {
                let pattern = format!("%{}%", search);
                builder
                    .push(" AND (title LIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR description LIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR tags LIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let (total,): (i64,) = count_builder.build_query_as().fetch_one(db.pool()).await?;

        list_builder
            .push(" ORDER BY display_order ASC, created_at DESC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset as i64);
        let assets: Vec<AssetRecord> =
            list_builder.build_query_as().fetch_all(db.pool()).await?;

        let total_pages = ((total as u32) + limit - 1) / limit;
        Ok(PagedResponse {
            data: assets.into_iter().map(AssetResponse::from).collect(),
            total,
            page,
            limit,
            total_pages,
        })
    }

    /// Update catalog fields. Status changes go through the state machine:
    /// forward-only unless the actor holds manage.
    pub async fn update_asset(
        db: &Database,
        user: &CurrentUser,
        asset_id: &str,
        req: &UpdateAssetRequest,
    ) -> Result<AssetResponse> {
        let asset = Self::get_asset(db, asset_id).await?;

        let decision = PermissionGate::decide(&asset, user, Capability::Edit);
        if !decision.allowed {
            return Err(AppError::Forbidden(
                decision.reason.unwrap_or_else(|| "access denied".to_string()),
            ));
        }

        let new_status = match &req.status {
            Some(s) => {
                let to = AssetStatus::from_str(s)
                    .ok_or_else(|| AppError::BadRequest(format!("Unknown status: {}", s)))?;
                let from = asset.get_status();
                if from != to && !from.can_transition(to, user.can(Capability::Manage)) {
                    return Err(AppError::BadRequest(format!(
                        "status cannot move from '{}' to '{}'",
                        from.as_str(),
                        to.as_str()
                    )));
                }
                Some(to.as_str().to_string())
            }
            None => None,
        };

        let tags_json = match &req.tags {
            Some(tags) => Some(serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())),
            None => None,
        };

        sqlx::query(
            r#"
            UPDATE assets
            SET title = COALESCE(?, title),
                description = COALESCE(?, description),
                category = COALESCE(?, category),
                tags = COALESCE(?, tags),
                display_order = COALESCE(?, display_order),
                status = COALESCE(?, status),
                event_id = COALESCE(?, event_id),
                partner_id = COALESCE(?, partner_id),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&req.title)
        .bind(&req.description)
        .bind(&req.category)
        .bind(&tags_json)
        .bind(req.display_order)
        .bind(&new_status)
        .bind(&req.event_id)
        .bind(&req.partner_id)
        .bind(Utc::now().to_rfc3339())
        .bind(asset_id)
        .execute(db.pool())
        .await?;

        let updated = Self::get_asset(db, asset_id).await?;
        Ok(AssetResponse::from(updated))
    }

    /// Delete an asset: permission gate, object delete (best effort; a
    /// leftover object becomes an orphan for the reconciler), row delete,
    /// quota release, audit.
    pub async fn delete_asset(
        db: &Database,
        store: &Arc<dyn ObjectStore>,
        config: &Config,
        user: &CurrentUser,
        asset_id: &str,
    ) -> Result<()> {
        let asset = Self::get_asset(db, asset_id).await?;

        let decision = PermissionGate::decide(&asset, user, Capability::Delete);
        if !decision.allowed {
            return Err(AppError::Forbidden(
                decision.reason.unwrap_or_else(|| "access denied".to_string()),
            ));
        }

        let mut removed_object = true;
        if let Some(path) = &asset.storage_path {
            let mut paths = vec![path.clone()];
            paths.push(validate::thumbnail_path(&config.storage.base_path, path));
            if let Err(e) = store.remove(&paths).await {
                // Row still goes away; the object is now an orphan and the
                // reconciler will sweep it.
                tracing::warn!("Object delete failed for {}: {}", path, e);
                removed_object = false;
            }
        }

        sqlx::query("DELETE FROM assets WHERE id = ?")
            .bind(asset_id)
            .execute(db.pool())
            .await?;

        if asset.size_bytes > 0 {
            QuotaService::update_usage(db, &asset.created_by, asset.size_bytes, UsageOp::Remove)
                .await?;
        }

        AuditLog::record(
            db,
            "delete",
            asset.storage_path.as_deref().unwrap_or(""),
            serde_json::json!({ "asset_id": asset_id, "object_removed": removed_object }),
            true,
            None,
        )
        .await;

        Ok(())
    }

    /// Aggregate gallery statistics
    pub async fn stats(db: &Database) -> Result<GalleryStats> {
        let (total_files, total_size): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM assets")
                .fetch_one(db.pool())
                .await?;

        let category_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT category, COUNT(*) FROM assets GROUP BY category")
                .fetch_all(db.pool())
                .await?;
        let status_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM assets GROUP BY status")
                .fetch_all(db.pool())
                .await?;

        let recent: Vec<AssetRecord> =
            sqlx::query_as("SELECT * FROM assets ORDER BY created_at DESC LIMIT 5")
                .fetch_all(db.pool())
                .await?;

        Ok(GalleryStats {
            total_files,
            total_size,
            by_category: category_rows.into_iter().collect::<HashMap<_, _>>(),
            by_status: status_rows.into_iter().collect::<HashMap<_, _>>(),
            recent_uploads: recent.into_iter().map(AssetResponse::from).collect(),
        })
    }
}
