use serde::Serialize;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{AssetRecord, AssetStatus, Capability, CurrentUser};

/// Decision for one item; `reason` is set when denied
#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AccessDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Batch partition: ids the action may proceed on, and rejected ids with a
/// per-id reason.
#[derive(Debug, Serialize)]
pub struct BatchAccess {
    pub valid_items: Vec<String>,
    pub invalid_items: Vec<RejectedItem>,
}

#[derive(Debug, Serialize)]
pub struct RejectedItem {
    pub id: String,
    pub reason: String,
}

/// Role/ownership checks consulted before every mutating operation
pub struct PermissionGate;

impl PermissionGate {
    async fn fetch_asset(db: &Database, item_id: &str) -> Result<AssetRecord> {
        let asset: AssetRecord = sqlx::query_as("SELECT * FROM assets WHERE id = ?")
            .bind(item_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset not found: {}", item_id)))?;

        Ok(asset)
    }

    /// Ownership- and status-aware check for a single item. Returns a
    /// decision for permission outcomes; a missing item is a `NotFound`
    /// error, kept distinct from denial.
    pub async fn validate_item_access(
        db: &Database,
        item_id: &str,
        user: &CurrentUser,
        action: Capability,
    ) -> Result<AccessDecision> {
        let asset = Self::fetch_asset(db, item_id).await?;
        Ok(Self::decide(&asset, user, action))
    }

    pub fn decide(asset: &AssetRecord, user: &CurrentUser, action: Capability) -> AccessDecision {
        if !user.can(action) {
            return AccessDecision::deny(format!(
                "role '{}' lacks the '{}' capability",
                user.role.as_str(),
                action.as_str()
            ));
        }

        let mutating = matches!(action, Capability::Edit | Capability::Delete);

        if mutating && asset.created_by != user.id && !user.can(Capability::Manage) {
            return AccessDecision::deny(format!(
                "item is owned by another user and role '{}' lacks 'manage'",
                user.role.as_str()
            ));
        }

        if mutating
            && asset.get_status() == AssetStatus::Archived
            && !user.can(Capability::Manage)
        {
            return AccessDecision::deny("archived items can only be modified by managers");
        }

        AccessDecision::allow()
    }

    /// Partition a batch of ids. Individual failures (including missing ids)
    /// never fail the whole call.
    pub async fn validate_batch(
        db: &Database,
        item_ids: &[String],
        user: &CurrentUser,
        action: Capability,
    ) -> Result<BatchAccess> {
        let mut valid_items = Vec::new();
        let mut invalid_items = Vec::new();

        for id in item_ids {
            match Self::validate_item_access(db, id, user, action).await {
                Ok(decision) if decision.allowed => valid_items.push(id.clone()),
                Ok(decision) => invalid_items.push(RejectedItem {
                    id: id.clone(),
                    reason: decision
                        .reason
                        .unwrap_or_else(|| "access denied".to_string()),
                }),
                Err(AppError::NotFound(_)) => invalid_items.push(RejectedItem {
                    id: id.clone(),
                    reason: "not found".to_string(),
                }),
                Err(e) => return Err(e),
            }
        }

        Ok(BatchAccess {
            valid_items,
            invalid_items,
        })
    }
}
