//! Plan line item model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{
    CostItem, FundingSource, Kato, OriginCategory, ProductCode, UnitOfMeasure,
};

/// Need category derived from the product-code registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedCategory {
    Goods,
    Works,
    Services,
}

impl NeedCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NeedCategory::Goods => "goods",
            NeedCategory::Works => "works",
            NeedCategory::Services => "services",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "works" => NeedCategory::Works,
            "services" => NeedCategory::Services,
            _ => NeedCategory::Goods,
        }
    }
}

/// One procurement line belonging to exactly one plan version.
///
/// `total_amount` is always `quantity * unit_price`; it is recomputed on
/// every mutation that touches either factor. Soft-deleted rows keep their
/// item_number so numbers are never reused within a version.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanItem {
    pub item_id: Uuid,
    pub version_id: Uuid,
    pub item_number: i32,
    pub need_category: String,
    pub product_code: String,
    pub additional_specs: Option<String>,
    pub unit_id: Option<i32>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub cost_item_id: i32,
    pub funding_source_id: i32,
    pub origin_category_code: Option<String>,
    pub kato_purchase_id: Option<i32>,
    pub kato_delivery_id: Option<i32>,
    pub is_ktp: bool,
    pub is_resident: bool,
    pub is_deleted: bool,
    pub created_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: Option<DateTime<Utc>>,
}

/// Item row joined with display fields from the registries it references.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlanItemDetail {
    pub item_id: Uuid,
    pub version_id: Uuid,
    pub item_number: i32,
    pub need_category: String,
    pub product_code: String,
    pub product_name_ru: Option<String>,
    pub additional_specs: Option<String>,
    pub unit_id: Option<i32>,
    pub unit_code: Option<String>,
    pub unit_name_ru: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub cost_item_id: i32,
    pub cost_item_name_ru: Option<String>,
    pub funding_source_id: i32,
    pub funding_source_name_ru: Option<String>,
    pub origin_category_code: Option<String>,
    pub kato_purchase_id: Option<i32>,
    pub kato_purchase_name_ru: Option<String>,
    pub kato_delivery_id: Option<i32>,
    pub kato_delivery_name_ru: Option<String>,
    pub is_ktp: bool,
    pub is_resident: bool,
}

/// Request body for appending an item to the active draft version.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateItemRequest {
    pub product_code: String,
    pub additional_specs: Option<String>,
    pub unit_id: Option<i32>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub cost_item_id: i32,
    pub funding_source_id: i32,
    pub origin_category_code: Option<String>,
    pub kato_purchase_id: Option<i32>,
    pub kato_delivery_id: Option<i32>,
    #[serde(default)]
    pub is_ktp: bool,
    #[serde(default)]
    pub is_resident: bool,
}

/// Partial update: only supplied fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateItemRequest {
    pub product_code: Option<String>,
    pub additional_specs: Option<String>,
    pub unit_id: Option<i32>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub cost_item_id: Option<i32>,
    pub funding_source_id: Option<i32>,
    pub origin_category_code: Option<String>,
    pub kato_purchase_id: Option<i32>,
    pub kato_delivery_id: Option<i32>,
    pub is_ktp: Option<bool>,
    pub is_resident: Option<bool>,
}

/// Full registry rows referenced by an item, for pre-filling edit forms.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ReferencedEntries {
    pub product_code: Option<ProductCode>,
    pub unit: Option<UnitOfMeasure>,
    pub cost_item: Option<CostItem>,
    pub funding_source: Option<FundingSource>,
    pub origin_category: Option<OriginCategory>,
    pub kato_purchase: Option<Kato>,
    pub kato_delivery: Option<Kato>,
}

/// Item plus the registry rows it references.
#[derive(Debug, Clone, Serialize)]
pub struct ItemEditData {
    pub item: PlanItem,
    pub initial_options: ReferencedEntries,
}
