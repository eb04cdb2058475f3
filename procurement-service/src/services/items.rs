//! Line item service.
//!
//! Items are only mutable while their version is the plan's active draft.
//! Every mutation locks the plan row first (the same lock the lifecycle
//! operations take), applies the change, then recomputes the version's
//! aggregate metrics inside the same transaction.

use crate::models::{
    CreateItemRequest, ItemEditData, NeedCategory, PlanItem, PlanStatus, ProductCode,
    ReferencedEntries, UpdateItemRequest, User,
};
use crate::services::database::Database;
use crate::services::plans::{
    begin, commit, lock_plan, owned, recalculate_metrics, require_active_version,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const ITEM_COLUMNS: &str = r#"item_id, version_id, item_number, need_category, product_code, additional_specs,
       unit_id, quantity, unit_price, total_amount, cost_item_id, funding_source_id,
       origin_category_code, kato_purchase_id, kato_delivery_id,
       is_ktp, is_resident, is_deleted, created_by, created_utc, updated_utc"#;

#[derive(Clone)]
pub struct ItemService {
    db: Database,
}

impl ItemService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append an item to the plan's active draft version. The item number is
    /// one past the highest ever issued in the version, including numbers
    /// held by soft-deleted rows, so numbers are never reused.
    #[instrument(skip(self, user, req), fields(plan_id = %plan_id, user_id = %user.user_id))]
    pub async fn append_item(
        &self,
        user: &User,
        plan_id: Uuid,
        req: CreateItemRequest,
    ) -> Result<PlanItem, AppError> {
        validate_amounts(Some(req.quantity), Some(req.unit_price))?;

        let mut tx = begin(&self.db).await?;

        owned(lock_plan(&mut *tx, plan_id).await?, user)?;
        let version = require_active_version(&mut *tx, plan_id).await?;
        if version.status() != PlanStatus::Draft {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Items can only be added to a draft version"
            )));
        }

        let product = find_product_code(&mut tx, &req.product_code)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Product code '{}' not found",
                    req.product_code
                ))
            })?;

        let item_number = sqlx::query_scalar::<_, i32>(
            "SELECT COALESCE(MAX(item_number), 0) + 1 FROM plan_items WHERE version_id = $1",
        )
        .bind(version.version_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to allocate item number: {}", e))
        })?;

        let total_amount = line_total(req.quantity, req.unit_price);

        let item = sqlx::query_as::<_, PlanItem>(&format!(
            r#"
            INSERT INTO plan_items (
                item_id, version_id, item_number, need_category, product_code,
                additional_specs, unit_id, quantity, unit_price, total_amount,
                cost_item_id, funding_source_id, origin_category_code,
                kato_purchase_id, kato_delivery_id, is_ktp, is_resident, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(version.version_id)
        .bind(item_number)
        .bind(NeedCategory::from_string(&product.need_category).as_str())
        .bind(&req.product_code)
        .bind(&req.additional_specs)
        .bind(req.unit_id)
        .bind(req.quantity)
        .bind(req.unit_price)
        .bind(total_amount)
        .bind(req.cost_item_id)
        .bind(req.funding_source_id)
        .bind(&req.origin_category_code)
        .bind(req.kato_purchase_id)
        .bind(req.kato_delivery_id)
        .bind(req.is_ktp)
        .bind(req.is_resident)
        .bind(user.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_item_write_error)?;

        recalculate_metrics(&mut *tx, version.version_id).await?;
        commit(tx).await?;

        info!(
            item_id = %item.item_id,
            item_number = item.item_number,
            "Item appended to draft version"
        );

        Ok(item)
    }

    /// Partial update of a draft item. Supplying quantity or unit price
    /// recomputes the line total; supplying a product code re-derives the
    /// need category from the registry.
    #[instrument(skip(self, user, req), fields(item_id = %item_id, user_id = %user.user_id))]
    pub async fn update_item(
        &self,
        user: &User,
        item_id: Uuid,
        req: UpdateItemRequest,
    ) -> Result<PlanItem, AppError> {
        validate_amounts(req.quantity, req.unit_price)?;

        let mut tx = begin(&self.db).await?;
        let mut item = lock_draft_item(&mut tx, user, item_id).await?;

        if let Some(code) = &req.product_code {
            let product = find_product_code(&mut tx, code).await?.ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Product code '{}' not found", code))
            })?;
            item.product_code = code.clone();
            item.need_category = NeedCategory::from_string(&product.need_category)
                .as_str()
                .to_string();
        }
        if let Some(specs) = req.additional_specs {
            item.additional_specs = Some(specs);
        }
        if let Some(unit_id) = req.unit_id {
            item.unit_id = Some(unit_id);
        }
        if let Some(quantity) = req.quantity {
            item.quantity = quantity;
        }
        if let Some(unit_price) = req.unit_price {
            item.unit_price = unit_price;
        }
        if let Some(cost_item_id) = req.cost_item_id {
            item.cost_item_id = cost_item_id;
        }
        if let Some(funding_source_id) = req.funding_source_id {
            item.funding_source_id = funding_source_id;
        }
        if let Some(code) = req.origin_category_code {
            item.origin_category_code = Some(code);
        }
        if let Some(kato_id) = req.kato_purchase_id {
            item.kato_purchase_id = Some(kato_id);
        }
        if let Some(kato_id) = req.kato_delivery_id {
            item.kato_delivery_id = Some(kato_id);
        }
        if let Some(is_ktp) = req.is_ktp {
            item.is_ktp = is_ktp;
        }
        if let Some(is_resident) = req.is_resident {
            item.is_resident = is_resident;
        }
        item.total_amount = line_total(item.quantity, item.unit_price);

        let updated = sqlx::query_as::<_, PlanItem>(&format!(
            r#"
            UPDATE plan_items SET
                need_category = $1, product_code = $2, additional_specs = $3,
                unit_id = $4, quantity = $5, unit_price = $6, total_amount = $7,
                cost_item_id = $8, funding_source_id = $9, origin_category_code = $10,
                kato_purchase_id = $11, kato_delivery_id = $12,
                is_ktp = $13, is_resident = $14, updated_utc = now()
            WHERE item_id = $15
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(&item.need_category)
        .bind(&item.product_code)
        .bind(&item.additional_specs)
        .bind(item.unit_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_amount)
        .bind(item.cost_item_id)
        .bind(item.funding_source_id)
        .bind(&item.origin_category_code)
        .bind(item.kato_purchase_id)
        .bind(item.kato_delivery_id)
        .bind(item.is_ktp)
        .bind(item.is_resident)
        .bind(item.item_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_item_write_error)?;

        recalculate_metrics(&mut *tx, updated.version_id).await?;
        commit(tx).await?;

        info!(item_id = %updated.item_id, "Item updated");

        Ok(updated)
    }

    /// Soft-delete a draft item. The row stays behind to pin its item number;
    /// metrics are recomputed without it.
    #[instrument(skip(self, user), fields(item_id = %item_id, user_id = %user.user_id))]
    pub async fn delete_item(&self, user: &User, item_id: Uuid) -> Result<(), AppError> {
        let mut tx = begin(&self.db).await?;
        let item = lock_draft_item(&mut tx, user, item_id).await?;

        sqlx::query("UPDATE plan_items SET is_deleted = TRUE, updated_utc = now() WHERE item_id = $1")
            .bind(item.item_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete item: {}", e)))?;

        recalculate_metrics(&mut *tx, item.version_id).await?;
        commit(tx).await?;

        info!(item_id = %item.item_id, "Item soft-deleted");

        Ok(())
    }

    /// Read a single item, ownership enforced via its plan.
    #[instrument(skip(self, user), fields(item_id = %item_id))]
    pub async fn get_item(&self, user: &User, item_id: Uuid) -> Result<PlanItem, AppError> {
        let item = self
            .db
            .find_item(item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan item not found")))?;

        self.check_ownership(user, item.version_id).await?;
        Ok(item)
    }

    /// Item plus the full registry rows it references, so an edit form can be
    /// pre-filled without a round of lookup calls.
    #[instrument(skip(self, user), fields(item_id = %item_id))]
    pub async fn get_edit_data(&self, user: &User, item_id: Uuid) -> Result<ItemEditData, AppError> {
        let item = self.get_item(user, item_id).await?;

        let mut options = ReferencedEntries {
            product_code: self.db.find_product_code(&item.product_code).await?,
            ..Default::default()
        };
        if let Some(unit_id) = item.unit_id {
            options.unit = self.db.find_unit(unit_id).await?;
        }
        options.cost_item = self.db.find_cost_item(item.cost_item_id).await?;
        options.funding_source = self.db.find_funding_source(item.funding_source_id).await?;
        if let Some(code) = &item.origin_category_code {
            options.origin_category = self.db.find_origin_category(code).await?;
        }
        if let Some(kato_id) = item.kato_purchase_id {
            options.kato_purchase = self.db.find_kato(kato_id).await?;
        }
        if let Some(kato_id) = item.kato_delivery_id {
            options.kato_delivery = self.db.find_kato(kato_id).await?;
        }

        Ok(ItemEditData {
            item,
            initial_options: options,
        })
    }

    async fn check_ownership(&self, user: &User, version_id: Uuid) -> Result<(), AppError> {
        let created_by = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT p.created_by
            FROM plan_versions v
            JOIN procurement_plans p ON p.plan_id = v.plan_id
            WHERE v.version_id = $1
            "#,
        )
        .bind(version_id)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to resolve item owner: {}", e))
        })?;

        if created_by != user.user_id {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Plan belongs to another user"
            )));
        }
        Ok(())
    }
}

/// Line total with the money scale fixed at two decimal places.
fn line_total(quantity: Decimal, unit_price: Decimal) -> Decimal {
    (quantity * unit_price).round_dp(2)
}

fn validate_amounts(
    quantity: Option<Decimal>,
    unit_price: Option<Decimal>,
) -> Result<(), AppError> {
    if let Some(q) = quantity {
        if q <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Quantity must be greater than zero"
            )));
        }
    }
    if let Some(p) = unit_price {
        if p <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Unit price must be greater than zero"
            )));
        }
    }
    Ok(())
}

/// Resolve an item for mutation: lock its plan, verify ownership, require the
/// item's version to be the plan's active draft, then lock the item row.
async fn lock_draft_item(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user: &User,
    item_id: Uuid,
) -> Result<PlanItem, AppError> {
    let ids = sqlx::query_as::<_, (Uuid, Uuid)>(
        r#"
        SELECT i.version_id, v.plan_id
        FROM plan_items i
        JOIN plan_versions v ON v.version_id = i.version_id
        WHERE i.item_id = $1 AND NOT i.is_deleted
        "#,
    )
    .bind(item_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to resolve item: {}", e)))?;

    let (version_id, plan_id) =
        ids.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan item not found")))?;

    owned(lock_plan(&mut **tx, plan_id).await?, user)?;

    let active = require_active_version(&mut **tx, plan_id).await?;
    if active.version_id != version_id || active.status() != PlanStatus::Draft {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Items can only be modified on the active draft version"
        )));
    }

    sqlx::query_as::<_, PlanItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM plan_items WHERE item_id = $1 AND NOT is_deleted FOR UPDATE"
    ))
    .bind(item_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock item: {}", e)))?
    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan item not found")))
}

async fn find_product_code(
    conn: &mut PgConnection,
    code: &str,
) -> Result<Option<ProductCode>, AppError> {
    sqlx::query_as::<_, ProductCode>(
        r#"
        SELECT product_code_id, code, name_ru, name_kz, need_category, specs_ru, specs_kz
        FROM product_codes
        WHERE code = $1
        "#,
    )
    .bind(code)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load product code: {}", e)))
}

/// Foreign-key violations surface as 400s: the client referenced a registry
/// row that does not exist. Everything else stays a 500.
fn map_item_write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_foreign_key_violation() {
            return AppError::BadRequest(anyhow::anyhow!(
                "Referenced registry entry does not exist"
            ));
        }
    }
    AppError::DatabaseError(anyhow::anyhow!("Failed to write item: {}", e))
}
