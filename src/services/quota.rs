use serde::Serialize;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::UserProfile;

/// Direction of a usage adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageOp {
    Add,
    Remove,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub quota_bytes: i64,
    pub used_bytes: i64,
}

/// Per-user byte budget over stored assets.
///
/// check/update is read-then-write with no lock or transaction across
/// requests; concurrent uploads from one user can both pass the check. Known
/// race, kept as documented behavior.
pub struct QuotaService;

impl QuotaService {
    pub async fn get_profile(db: &Database, user_id: &str) -> Result<UserProfile> {
        let profile: UserProfile = sqlx::query_as("SELECT * FROM user_profiles WHERE id = ?")
            .bind(user_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User profile not found: {}", user_id)))?;

        Ok(profile)
    }

    /// Would `incoming_bytes` more fit under the user's quota?
    pub async fn check(db: &Database, user_id: &str, incoming_bytes: i64) -> Result<QuotaCheck> {
        let profile = Self::get_profile(db, user_id).await?;

        Ok(QuotaCheck {
            allowed: profile.used_bytes + incoming_bytes <= profile.quota_bytes,
            quota_bytes: profile.quota_bytes,
            used_bytes: profile.used_bytes,
        })
    }

    /// Adjust recorded usage; removal clamps at zero.
    pub async fn update_usage(
        db: &Database,
        user_id: &str,
        bytes: i64,
        op: UsageOp,
    ) -> Result<()> {
        let delta = match op {
            UsageOp::Add => bytes,
            UsageOp::Remove => -bytes,
        };

        sqlx::query(
            r#"
            UPDATE user_profiles
            SET used_bytes = MAX(0, used_bytes + ?),
                updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(delta)
        .bind(user_id)
        .execute(db.pool())
        .await?;

        Ok(())
    }
}
