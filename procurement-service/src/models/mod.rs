//! Domain models for procurement-service.

mod item;
mod plan;
mod reference;
mod user;
mod version;

pub use item::{
    CreateItemRequest, ItemEditData, NeedCategory, PlanItem, PlanItemDetail, ReferencedEntries,
    UpdateItemRequest,
};
pub use plan::{CreatePlanRequest, PlanDetail, PlanPage, ProcurementPlan, ProcurementPlanWithVersions};
pub use reference::{
    CostItem, FundingSource, Kato, KatoNode, KtpRegistryEntry, OriginCategory, ProductCode,
    UnitOfMeasure,
};
pub use user::User;
pub use version::{PlanStatus, PlanVersion, VersionDetail};
