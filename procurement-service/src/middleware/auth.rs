//! Bearer-token authentication. The middleware verifies the JWT, resolves
//! the user behind it and stores the full `User` in request extensions;
//! handlers receive it through the `AuthUser` extractor.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::models::User;
use crate::startup::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or malformed Authorization header"))
        })?;

    let claims = state.jwt.verify(token)?;

    let user = state
        .db
        .find_user_by_iin(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Unknown or inactive user")))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Extractor for the authenticated user placed by `auth_middleware`.
pub struct AuthUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Authentication context missing"))
            })
    }
}
