//! KATO territorial tree navigation.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

use crate::models::KatoNode;
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    pub parent_id: Option<i32>,
}

/// Children of a node; without `parent_id` (or with 0) the top-level regions.
pub async fn children(
    State(state): State<AppState>,
    Query(query): Query<ChildrenQuery>,
) -> Result<Json<Vec<KatoNode>>, AppError> {
    let parent_id = query.parent_id.filter(|id| *id != 0);
    Ok(Json(state.db.kato_children(parent_id).await?))
}

pub async fn by_id(
    State(state): State<AppState>,
    Path(kato_id): Path<i32>,
) -> Result<Json<KatoNode>, AppError> {
    let node = state
        .db
        .kato_by_id(kato_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("KATO entry not found")))?;
    Ok(Json(node))
}

/// Ancestor chain of a node, root first. Useful for rebuilding the cascade
/// of selects when editing a saved item.
pub async fn parents(
    State(state): State<AppState>,
    Path(kato_id): Path<i32>,
) -> Result<Json<Vec<KatoNode>>, AppError> {
    Ok(Json(state.db.kato_parents(kato_id).await?))
}
