//! Plan and version endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

use crate::middleware::AuthUser;
use crate::models::{
    CreateItemRequest, CreatePlanRequest, PlanDetail, PlanItem, PlanPage, PlanStatus, PlanVersion,
    ProcurementPlanWithVersions, VersionDetail,
};
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: PlanStatus,
}

pub async fn create_plan(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<ProcurementPlanWithVersions>), AppError> {
    let plan = state.plans.create_plan(&user, req).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn list_plans(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(page): Query<PlanPage>,
) -> Result<Json<Vec<ProcurementPlanWithVersions>>, AppError> {
    let plans = state.plans.list_plans(&user, page.skip, page.limit).await?;
    Ok(Json(plans))
}

pub async fn get_plan(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<PlanDetail>, AppError> {
    let detail = state.plans.get_plan_detail(&user, plan_id).await?;
    Ok(Json(detail))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(plan_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.plans.delete_plan(&user, plan_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_version(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(plan_id): Path<Uuid>,
) -> Result<(StatusCode, Json<PlanVersion>), AppError> {
    let version = state
        .plans
        .create_new_version_for_editing(&user, plan_id)
        .await?;
    Ok((StatusCode::CREATED, Json(version)))
}

pub async fn update_active_version_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(plan_id): Path<Uuid>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<PlanVersion>, AppError> {
    let version = state
        .plans
        .transition_status(&user, plan_id, req.status)
        .await?;
    Ok(Json(version))
}

pub async fn delete_latest_version(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<PlanVersion>, AppError> {
    let promoted = state.plans.delete_latest_version(&user, plan_id).await?;
    Ok(Json(promoted))
}

pub async fn get_version(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((plan_id, version_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<VersionDetail>, AppError> {
    let detail = state
        .plans
        .get_version_detail(&user, plan_id, version_id)
        .await?;
    Ok(Json(detail))
}

pub async fn add_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(plan_id): Path<Uuid>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<PlanItem>), AppError> {
    let item = state.items.append_item(&user, plan_id, req).await?;
    Ok((StatusCode::CREATED, Json(item)))
}
