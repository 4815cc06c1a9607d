use uuid::Uuid;

use crate::db::Database;
use crate::models::StepOutcome;

/// Audit trail writer. Fire-and-forget: a failed write is logged and
/// swallowed, never surfaced to the caller.
pub struct AuditLog;

impl AuditLog {
    pub async fn record(
        db: &Database,
        action: &str,
        path: &str,
        metadata: serde_json::Value,
        success: bool,
        error: Option<&str>,
    ) -> StepOutcome {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_log (id, action, path, metadata, success, error)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(action)
        .bind(path)
        .bind(metadata.to_string())
        .bind(success)
        .bind(error)
        .execute(db.pool())
        .await;

        match result {
            Ok(_) => StepOutcome::Applied,
            Err(e) => {
                tracing::warn!("Audit log write failed for action {}: {}", action, e);
                StepOutcome::Failed(e.to_string())
            }
        }
    }
}
