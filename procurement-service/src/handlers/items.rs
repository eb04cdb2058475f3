//! Item endpoints. Creation lives under the plan routes; everything
//! addressed by item id is here.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::middleware::AuthUser;
use crate::models::{ItemEditData, PlanItem, UpdateItemRequest};
use crate::startup::AppState;

pub async fn get_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<Json<PlanItem>, AppError> {
    let item = state.items.get_item(&user, item_id).await?;
    Ok(Json(item))
}

pub async fn get_item_edit_data(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ItemEditData>, AppError> {
    let data = state.items.get_edit_data(&user, item_id).await?;
    Ok(Json(data))
}

pub async fn update_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<PlanItem>, AppError> {
    let item = state.items.update_item(&user, item_id, req).await?;
    Ok(Json(item))
}

pub async fn delete_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.items.delete_item(&user, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
