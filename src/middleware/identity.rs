use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::models::{CurrentUser, Role};
use crate::AppState;

/// Identity middleware.
///
/// Authentication itself is an external concern; this service trusts the
/// `X-User-Id` header set by the gateway and resolves it against the local
/// profile table for role and quota data.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = request
        .headers()
        .get("x-user-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing X-User-Id header".to_string()))?;

    let role: (String,) = sqlx::query_as("SELECT role FROM user_profiles WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(state.db.pool())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown user".to_string()))?;

    let current_user = CurrentUser {
        id: user_id,
        role: Role::from_str(&role.0),
    };

    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}
