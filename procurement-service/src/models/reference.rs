//! Read-only government reference registries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// MKEI unit of measure.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UnitOfMeasure {
    pub unit_id: i32,
    pub code: String,
    pub name_kz: String,
    pub name_ru: String,
}

/// KATO territorial code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Kato {
    pub kato_id: i32,
    pub parent_id: Option<i32>,
    pub code: String,
    pub name_kz: String,
    pub name_ru: String,
}

/// KATO node annotated for tree navigation.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct KatoNode {
    pub kato_id: i32,
    pub parent_id: Option<i32>,
    pub code: String,
    pub name_kz: String,
    pub name_ru: String,
    pub has_children: bool,
}

/// AGSK category of origin.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OriginCategory {
    pub category_id: i32,
    pub group_name: String,
    pub code: String,
    pub name_ru: String,
    pub standard: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CostItem {
    pub cost_item_id: i32,
    pub name_ru: String,
    pub name_kz: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FundingSource {
    pub funding_source_id: i32,
    pub name_ru: String,
    pub name_kz: String,
}

/// ENS TRU product/work/service code. `need_category` classifies plan items
/// that reference this code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductCode {
    pub product_code_id: i32,
    pub code: String,
    pub name_ru: String,
    pub name_kz: String,
    pub need_category: String,
    pub specs_ru: Option<String>,
    pub specs_kz: Option<String>,
}

/// Domestic-producer (KTP) registry entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KtpRegistryEntry {
    pub entry_id: i32,
    pub bin_iin: String,
    pub full_name: String,
    pub kato_code: String,
    pub product_name_ru: Option<String>,
    pub product_code: String,
    pub origin_category_code: Option<String>,
    pub localization_level: Option<i32>,
    pub registered_on: Option<NaiveDate>,
}
