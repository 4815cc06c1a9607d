use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Extension, Json,
};
use bytes::Bytes;

use crate::error::{ApiResponse, AppError, Result};
use crate::models::{
    AssetResponse, BatchSummary, Capability, CurrentUser, GalleryStats, ListQuery, PagedResponse,
    UpdateAssetRequest, UploadFile,
};
use crate::services::consistency::{CleanupReport, ConsistencyReport};
use crate::services::permission::PermissionGate;
use crate::services::pipeline::CreateAssetOptions;
use crate::services::quota::QuotaCheck;
use crate::services::{AssetService, QuotaService};
use crate::AppState;

fn require(user: &CurrentUser, capability: Capability) -> Result<()> {
    if user.can(capability) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' lacks the '{}' capability",
            user.role.as_str(),
            capability.as_str()
        )))
    }
}

/// Read file parts and optional catalog fields out of a multipart body
async fn read_multipart(
    multipart: &mut Multipart,
) -> Result<(Vec<UploadFile>, CreateAssetOptions)> {
    let mut files = Vec::new();
    let mut options = CreateAssetOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to process multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "files" | "files[]" | "file" => {
                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unnamed".to_string());
                let mime = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let data: Bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {}", e)))?;

                files.push(UploadFile {
                    name: file_name,
                    mime,
                    data,
                });
            }
            "title" => options.title = non_empty(field.text().await.unwrap_or_default()),
            "description" => {
                options.description = non_empty(field.text().await.unwrap_or_default())
            }
            "category" => options.category = non_empty(field.text().await.unwrap_or_default()),
            "event_id" => options.event_id = non_empty(field.text().await.unwrap_or_default()),
            "partner_id" => options.partner_id = non_empty(field.text().await.unwrap_or_default()),
            _ => {}
        }
    }

    Ok((files, options))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Upload one or more files
/// POST /api/v1/gallery/upload
pub async fn upload(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<BatchSummary>>> {
    require(&current_user, Capability::Upload)?;

    let (files, options) = read_multipart(&mut multipart).await?;
    if files.is_empty() {
        return Err(AppError::BadRequest("No files provided".to_string()));
    }

    let summary = state
        .batch
        .process_batch(&state.db, files, &current_user, &options)
        .await?;

    Ok(Json(ApiResponse::success(summary)))
}

/// List gallery items
/// GET /api/v1/gallery/items?page&limit&category&status&search
pub async fn list_items(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PagedResponse<AssetResponse>>>> {
    require(&current_user, Capability::View)?;

    let page = AssetService::list_assets(&state.db, &query).await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Get a single item
/// GET /api/v1/gallery/items/:id
pub async fn get_item(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AssetResponse>>> {
    require(&current_user, Capability::View)?;

    let asset = AssetService::get_asset(&state.db, &id).await?;
    Ok(Json(ApiResponse::success(AssetResponse::from(asset))))
}

/// Update catalog fields of an item
/// PATCH /api/v1/gallery/items/:id
pub async fn update_item(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAssetRequest>,
) -> Result<Json<ApiResponse<AssetResponse>>> {
    let updated = AssetService::update_asset(&state.db, &current_user, &id, &req).await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Replace an item's file
/// PUT /api/v1/gallery/items/:id/file
pub async fn replace_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<AssetResponse>>> {
    let asset = AssetService::get_asset(&state.db, &id).await?;

    let decision = PermissionGate::decide(&asset, &current_user, Capability::Edit);
    if !decision.allowed {
        return Err(AppError::Forbidden(
            decision.reason.unwrap_or_else(|| "access denied".to_string()),
        ));
    }

    // Replacements write a new object and count against the upload window
    state
        .limiter
        .check_upload(&state.config.rate_limit, &current_user.id)?;

    let (mut files, _) = read_multipart(&mut multipart).await?;
    let file = files
        .pop()
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    let updated = state
        .pipeline
        .replace_asset_file(&state.db, &asset, &file, &current_user.id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Download an item's file
/// GET /api/v1/gallery/items/:id/download
pub async fn download_item(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Response> {
    require(&current_user, Capability::View)?;

    let asset = AssetService::get_asset(&state.db, &id).await?;
    let path = asset
        .storage_path
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Asset has no stored file".to_string()))?;

    let data = state.store.get(path).await?;

    let content_type = asset
        .mime_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let fallback_name = asset.title.replace(['"', '\\'], "_");
    let encoded_name = urlencoding::encode(&asset.title);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"; filename*=UTF-8''{}",
                fallback_name, encoded_name
            ),
        )
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

/// Delete an item
/// DELETE /api/v1/gallery/items/:id
pub async fn delete_item(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    AssetService::delete_asset(&state.db, &state.store, &state.config, &current_user, &id).await?;
    Ok(Json(ApiResponse::<()>::success_message("Asset deleted")))
}

/// Gallery statistics
/// GET /api/v1/gallery/stats
pub async fn stats(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<GalleryStats>>> {
    require(&current_user, Capability::View)?;

    let stats = AssetService::stats(&state.db).await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// Drift report between the Object Store and the catalog
/// GET /api/v1/gallery/consistency
pub async fn consistency(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<ConsistencyReport>>> {
    require(&current_user, Capability::Manage)?;

    let report = state.checker.check_consistency(&state.db).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Delete orphaned objects
/// POST /api/v1/gallery/consistency/cleanup
pub async fn cleanup(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<CleanupReport>>> {
    require(&current_user, Capability::Manage)?;

    let report = state.checker.cleanup_orphaned_files(&state.db).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Current user's quota and usage
/// GET /api/v1/gallery/quota
pub async fn quota(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<QuotaCheck>>> {
    let check = QuotaService::check(&state.db, &current_user.id, 0).await?;
    Ok(Json(ApiResponse::success(check)))
}
