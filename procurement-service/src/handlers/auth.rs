//! Login endpoint. Authentication is by IIN lookup; credential checking is
//! delegated to the national identity gateway upstream of this service.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use tracing::info;
use validator::Validate;

use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(equal = 12, message = "IIN must be exactly 12 digits"))]
    pub iin: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    req.validate()?;
    if !req.iin.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "IIN must contain only digits"
        )));
    }

    let user = state
        .db
        .find_user_by_iin(&req.iin)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Unknown IIN")))?;

    state.db.touch_last_login(user.user_id).await?;
    let access_token = state.jwt.issue(&user.iin)?;

    info!(user_id = %user.user_id, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}
