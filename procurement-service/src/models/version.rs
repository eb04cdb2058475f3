//! Plan version model and approval status state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::PlanItemDetail;

/// Approval status of a plan version.
///
/// Statuses only move forward: draft -> pre_approved -> approved. A version
/// is editable only while it is the plan's active draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    PreApproved,
    Approved,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::PreApproved => "pre_approved",
            PlanStatus::Approved => "approved",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pre_approved" => PlanStatus::PreApproved,
            "approved" => PlanStatus::Approved,
            _ => PlanStatus::Draft,
        }
    }

    /// A request for the current status is an idempotent no-op; everything
    /// else must follow the forward chain one step at a time.
    pub fn can_transition_to(self, target: PlanStatus) -> bool {
        self == target
            || matches!(
                (self, target),
                (PlanStatus::Draft, PlanStatus::PreApproved)
                    | (PlanStatus::PreApproved, PlanStatus::Approved)
            )
    }
}

/// One revision of a plan's line items, with aggregate metrics derived from
/// the non-deleted items it owns.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanVersion {
    pub version_id: Uuid,
    pub plan_id: Uuid,
    pub version_number: i32,
    pub status: String,
    pub is_active: bool,
    pub total_amount: Decimal,
    pub ktp_percentage: Decimal,
    pub import_percentage: Decimal,
    pub created_by: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl PlanVersion {
    pub fn status(&self) -> PlanStatus {
        PlanStatus::from_string(&self.status)
    }
}

/// Version metadata plus its ordered, non-deleted items with resolved
/// registry display fields. This is the payload the export renderer consumes.
#[derive(Debug, Clone, Serialize)]
pub struct VersionDetail {
    #[serde(flatten)]
    pub version: PlanVersion,
    pub items: Vec<PlanItemDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_allowed() {
        assert!(PlanStatus::Draft.can_transition_to(PlanStatus::PreApproved));
        assert!(PlanStatus::PreApproved.can_transition_to(PlanStatus::Approved));
    }

    #[test]
    fn same_status_is_noop_success() {
        assert!(PlanStatus::Draft.can_transition_to(PlanStatus::Draft));
        assert!(PlanStatus::PreApproved.can_transition_to(PlanStatus::PreApproved));
        assert!(PlanStatus::Approved.can_transition_to(PlanStatus::Approved));
    }

    #[test]
    fn skipping_and_reverse_transitions_rejected() {
        assert!(!PlanStatus::Draft.can_transition_to(PlanStatus::Approved));
        assert!(!PlanStatus::PreApproved.can_transition_to(PlanStatus::Draft));
        assert!(!PlanStatus::Approved.can_transition_to(PlanStatus::Draft));
        assert!(!PlanStatus::Approved.can_transition_to(PlanStatus::PreApproved));
    }

    #[test]
    fn unknown_status_string_falls_back_to_draft() {
        assert_eq!(PlanStatus::from_string("bogus"), PlanStatus::Draft);
        assert_eq!(PlanStatus::from_string("approved"), PlanStatus::Approved);
    }
}
