//! Reference registry search endpoints. All of them accept an optional `q`
//! and cap results at 50 rows.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::models::{CostItem, FundingSource, Kato, OriginCategory, ProductCode, UnitOfMeasure};
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckKtpResponse {
    pub is_ktp: bool,
}

pub async fn units(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UnitOfMeasure>>, AppError> {
    Ok(Json(state.db.search_units(query.q.as_deref()).await?))
}

pub async fn kato(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Kato>>, AppError> {
    Ok(Json(state.db.search_kato(query.q.as_deref()).await?))
}

pub async fn origin_categories(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<OriginCategory>>, AppError> {
    Ok(Json(
        state
            .db
            .search_origin_categories(query.q.as_deref())
            .await?,
    ))
}

pub async fn cost_items(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<CostItem>>, AppError> {
    Ok(Json(state.db.search_cost_items(query.q.as_deref()).await?))
}

pub async fn funding_sources(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<FundingSource>>, AppError> {
    Ok(Json(
        state.db.search_funding_sources(query.q.as_deref()).await?,
    ))
}

pub async fn product_codes(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ProductCode>>, AppError> {
    Ok(Json(state.db.search_product_codes(query.q.as_deref()).await?))
}

#[derive(Debug, Deserialize)]
pub struct CheckKtpQuery {
    pub product_code: String,
}

/// Whether a product code appears in the domestic-producer registry.
pub async fn check_ktp(
    State(state): State<AppState>,
    Query(query): Query<CheckKtpQuery>,
) -> Result<Json<CheckKtpResponse>, AppError> {
    let is_ktp = state.db.is_ktp_registered(&query.product_code).await?;
    Ok(Json(CheckKtpResponse { is_ktp }))
}
