//! Procurement plan model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::{PlanVersion, VersionDetail};

/// Top-level procurement container for one fiscal year. The plan itself
/// carries no line items; they live on its versions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcurementPlan {
    pub plan_id: Uuid,
    pub name: String,
    pub year: i16,
    pub created_by: Uuid,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: Option<DateTime<Utc>>,
}

/// Request body for creating a plan. Version 1 (draft, active) is created
/// together with the plan.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePlanRequest {
    #[validate(length(min = 1, max = 500, message = "Plan name must be 1-500 characters"))]
    pub name: String,
    #[validate(range(min = 2000, max = 2100, message = "Year out of range"))]
    pub year: i16,
}

/// Plan with its full version history, newest last.
#[derive(Debug, Clone, Serialize)]
pub struct ProcurementPlanWithVersions {
    #[serde(flatten)]
    pub plan: ProcurementPlan,
    pub versions: Vec<PlanVersion>,
}

/// Plan with its active version fully expanded.
#[derive(Debug, Clone, Serialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub plan: ProcurementPlan,
    pub active_version: VersionDetail,
}

/// Pagination parameters for plan listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanPage {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}
