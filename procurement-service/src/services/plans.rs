//! Plan and version lifecycle service.
//!
//! Every lifecycle mutation (status transition, clone-for-editing, rollback,
//! plan deletion) runs in its own transaction and starts by locking the plan
//! row, which serializes concurrent lifecycle work against the same plan.
//! The multi-step procedures (clone, rollback) additionally execute inside a
//! savepoint so an internal failure unwinds cleanly without poisoning the
//! surrounding transaction.

use crate::models::{
    PlanDetail, PlanItem, PlanStatus, PlanVersion, ProcurementPlan, ProcurementPlanWithVersions,
    CreatePlanRequest, User, VersionDetail,
};
use crate::services::database::Database;
use crate::services::metrics::{PLANS_TOTAL, VERSION_EVENTS_TOTAL};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::{Acquire, PgConnection};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Version Lifecycle Engine plus plan CRUD orchestration.
#[derive(Clone)]
pub struct PlanService {
    db: Database,
}

impl PlanService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a plan together with its first version (number 1, draft,
    /// active) in one transaction.
    #[instrument(skip(self, user, req), fields(user_id = %user.user_id))]
    pub async fn create_plan(
        &self,
        user: &User,
        req: CreatePlanRequest,
    ) -> Result<ProcurementPlanWithVersions, AppError> {
        req.validate()?;

        let mut tx = begin(&self.db).await?;

        let plan = sqlx::query_as::<_, ProcurementPlan>(
            r#"
            INSERT INTO procurement_plans (plan_id, name, year, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING plan_id, name, year, created_by, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&req.name)
        .bind(req.year)
        .bind(user.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create plan: {}", e)))?;

        let version = insert_version(
            &mut tx,
            plan.plan_id,
            1,
            PlanStatus::Draft,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
            user.user_id,
        )
        .await?;

        commit(tx).await?;

        PLANS_TOTAL.with_label_values(&["created"]).inc();
        VERSION_EVENTS_TOTAL
            .with_label_values(&["created", version.status.as_str()])
            .inc();
        info!(plan_id = %plan.plan_id, year = plan.year, "Plan created with initial draft version");

        Ok(ProcurementPlanWithVersions {
            plan,
            versions: vec![version],
        })
    }

    /// List the caller's plans with their version histories.
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn list_plans(
        &self,
        user: &User,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<ProcurementPlanWithVersions>, AppError> {
        let plans = self.db.list_plans_by_user(user.user_id, skip, limit).await?;

        let mut out = Vec::with_capacity(plans.len());
        for plan in plans {
            let versions = self.db.list_versions_by_plan(plan.plan_id).await?;
            out.push(ProcurementPlanWithVersions { plan, versions });
        }
        Ok(out)
    }

    /// Plan with its active version and that version's items, display fields
    /// resolved.
    #[instrument(skip(self, user), fields(plan_id = %plan_id))]
    pub async fn get_plan_detail(&self, user: &User, plan_id: Uuid) -> Result<PlanDetail, AppError> {
        let plan = owned(self.db.find_plan(plan_id).await?, user)?;

        let version = self
            .db
            .get_active_version(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan has no active version")))?;
        let items = self.db.list_item_details(version.version_id).await?;

        Ok(PlanDetail {
            plan,
            active_version: VersionDetail { version, items },
        })
    }

    /// Any version of a plan with its items and resolved display fields.
    /// This is the read accessor the export renderer consumes.
    #[instrument(skip(self, user), fields(plan_id = %plan_id, version_id = %version_id))]
    pub async fn get_version_detail(
        &self,
        user: &User,
        plan_id: Uuid,
        version_id: Uuid,
    ) -> Result<VersionDetail, AppError> {
        owned(self.db.find_plan(plan_id).await?, user)?;

        let version = self
            .db
            .find_version(plan_id, version_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan version not found")))?;
        let items = self.db.list_item_details(version.version_id).await?;

        Ok(VersionDetail { version, items })
    }

    /// Delete a plan, but only if no version of it ever entered review.
    #[instrument(skip(self, user), fields(plan_id = %plan_id))]
    pub async fn delete_plan(&self, user: &User, plan_id: Uuid) -> Result<(), AppError> {
        let mut tx = begin(&self.db).await?;

        owned(lock_plan(&mut *tx, plan_id).await?, user)?;

        // Statuses never move backwards and reviewed versions are never
        // deleted, so "has a non-draft version now" equals "ever reviewed".
        let reviewed = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM plan_versions WHERE plan_id = $1 AND status <> 'draft')",
        )
        .bind(plan_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check plan history: {}", e))
        })?;

        if reviewed {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Plan has entered review and cannot be deleted"
            )));
        }

        sqlx::query("DELETE FROM procurement_plans WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete plan: {}", e)))?;

        commit(tx).await?;

        PLANS_TOTAL.with_label_values(&["deleted"]).inc();
        info!(plan_id = %plan_id, "Plan deleted");

        Ok(())
    }

    /// Advance the active version's status one step along
    /// draft -> pre_approved -> approved. Requesting the current status is an
    /// idempotent no-op; everything else is rejected before any mutation.
    #[instrument(skip(self, user), fields(plan_id = %plan_id, new_status = new_status.as_str()))]
    pub async fn transition_status(
        &self,
        user: &User,
        plan_id: Uuid,
        new_status: PlanStatus,
    ) -> Result<PlanVersion, AppError> {
        let mut tx = begin(&self.db).await?;

        owned(lock_plan(&mut *tx, plan_id).await?, user)?;
        let active = require_active_version(&mut *tx, plan_id).await?;

        let current = active.status();
        if current == new_status {
            return Ok(active);
        }
        if !current.can_transition_to(new_status) {
            return Err(AppError::InvalidTransition {
                from: current.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        let updated = sqlx::query_as::<_, PlanVersion>(
            r#"
            UPDATE plan_versions SET status = $1 WHERE version_id = $2
            RETURNING version_id, plan_id, version_number, status, is_active,
                      total_amount, ktp_percentage, import_percentage, created_by, created_utc
            "#,
        )
        .bind(new_status.as_str())
        .bind(active.version_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update status: {}", e)))?;

        commit(tx).await?;

        VERSION_EVENTS_TOTAL
            .with_label_values(&["transitioned", new_status.as_str()])
            .inc();
        info!(
            version_id = %updated.version_id,
            from = current.as_str(),
            to = new_status.as_str(),
            "Version status advanced"
        );

        Ok(updated)
    }

    /// Clone the active version into a fresh draft for re-editing.
    ///
    /// The active version must have left draft already; it becomes inactive
    /// but keeps its status and items. Every non-deleted item is copied into
    /// the new version with a fresh identity, item numbers preserved.
    #[instrument(skip(self, user), fields(plan_id = %plan_id))]
    pub async fn create_new_version_for_editing(
        &self,
        user: &User,
        plan_id: Uuid,
    ) -> Result<PlanVersion, AppError> {
        let mut tx = begin(&self.db).await?;

        owned(lock_plan(&mut *tx, plan_id).await?, user)?;
        let active = require_active_version(&mut *tx, plan_id).await?;

        if active.status() == PlanStatus::Draft {
            return Err(AppError::InvalidOperation(anyhow::anyhow!(
                "Active version is still a draft and already editable"
            )));
        }

        let cloned = {
            let mut sp = tx
                .begin()
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to open savepoint: {}", e)))?;

            sqlx::query("UPDATE plan_versions SET is_active = FALSE WHERE version_id = $1")
                .bind(active.version_id)
                .execute(&mut *sp)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to deactivate version: {}", e))
                })?;

            // Metrics start as a copy of the predecessor's and are
            // overwritten by the first recompute on this version.
            let new_version = insert_version(
                &mut sp,
                plan_id,
                active.version_number + 1,
                PlanStatus::Draft,
                active.total_amount,
                active.ktp_percentage,
                active.import_percentage,
                user.user_id,
            )
            .await?;

            let items = sqlx::query_as::<_, PlanItem>(
                r#"
                SELECT item_id, version_id, item_number, need_category, product_code, additional_specs,
                       unit_id, quantity, unit_price, total_amount, cost_item_id, funding_source_id,
                       origin_category_code, kato_purchase_id, kato_delivery_id,
                       is_ktp, is_resident, is_deleted, created_by, created_utc, updated_utc
                FROM plan_items
                WHERE version_id = $1 AND NOT is_deleted
                ORDER BY item_number
                "#,
            )
            .bind(active.version_id)
            .fetch_all(&mut *sp)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to read items for clone: {}", e))
            })?;

            for item in &items {
                sqlx::query(
                    r#"
                    INSERT INTO plan_items (
                        item_id, version_id, item_number, need_category, product_code,
                        additional_specs, unit_id, quantity, unit_price, total_amount,
                        cost_item_id, funding_source_id, origin_category_code,
                        kato_purchase_id, kato_delivery_id, is_ktp, is_resident, created_by
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(new_version.version_id)
                .bind(item.item_number)
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
                .bind(item.created_by)
                .execute(&mut *sp)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to copy item: {}", e))
                })?;
            }

            sp.commit().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to commit savepoint: {}", e))
            })?;

            new_version
        };

        commit(tx).await?;

        VERSION_EVENTS_TOTAL
            .with_label_values(&["cloned", cloned.status.as_str()])
            .inc();
        info!(
            plan_id = %plan_id,
            version_id = %cloned.version_id,
            version_number = cloned.version_number,
            "New draft version cloned for editing"
        );

        Ok(cloned)
    }

    /// Delete the active draft version and re-activate its predecessor.
    ///
    /// Items of the deleted version are hard-deleted together with the
    /// version row itself; the soft-delete discipline only applies while a
    /// version is alive. Version 1 can never be removed this way.
    #[instrument(skip(self, user), fields(plan_id = %plan_id))]
    pub async fn delete_latest_version(
        &self,
        user: &User,
        plan_id: Uuid,
    ) -> Result<PlanVersion, AppError> {
        let mut tx = begin(&self.db).await?;

        owned(lock_plan(&mut *tx, plan_id).await?, user)?;
        let active = require_active_version(&mut *tx, plan_id).await?;

        if active.status() != PlanStatus::Draft {
            return Err(AppError::InvalidOperation(anyhow::anyhow!(
                "Only a draft version can be rolled back"
            )));
        }
        if active.version_number == 1 {
            return Err(AppError::InvalidOperation(anyhow::anyhow!(
                "Version 1 cannot be deleted; delete the plan instead"
            )));
        }

        let predecessor = sqlx::query_as::<_, PlanVersion>(
            r#"
            SELECT version_id, plan_id, version_number, status, is_active,
                   total_amount, ktp_percentage, import_percentage, created_by, created_utc
            FROM plan_versions
            WHERE plan_id = $1 AND version_number = $2
            FOR UPDATE
            "#,
        )
        .bind(plan_id)
        .bind(active.version_number - 1)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load predecessor: {}", e))
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Predecessor version not found")))?;

        let promoted = {
            let mut sp = tx
                .begin()
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to open savepoint: {}", e)))?;

            sqlx::query("DELETE FROM plan_items WHERE version_id = $1")
                .bind(active.version_id)
                .execute(&mut *sp)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to delete version items: {}", e))
                })?;

            sqlx::query("DELETE FROM plan_versions WHERE version_id = $1")
                .bind(active.version_id)
                .execute(&mut *sp)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to delete version: {}", e))
                })?;

            let promoted = sqlx::query_as::<_, PlanVersion>(
                r#"
                UPDATE plan_versions SET is_active = TRUE WHERE version_id = $1
                RETURNING version_id, plan_id, version_number, status, is_active,
                          total_amount, ktp_percentage, import_percentage, created_by, created_utc
                "#,
            )
            .bind(predecessor.version_id)
            .fetch_one(&mut *sp)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to re-activate predecessor: {}", e))
            })?;

            sp.commit().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to commit savepoint: {}", e))
            })?;

            promoted
        };

        commit(tx).await?;

        VERSION_EVENTS_TOTAL
            .with_label_values(&["deleted", "draft"])
            .inc();
        info!(
            plan_id = %plan_id,
            deleted_version = active.version_number,
            promoted_version = promoted.version_number,
            "Latest draft version rolled back"
        );

        Ok(promoted)
    }
}

// -----------------------------------------------------------------------------
// Transaction-scoped helpers shared with the item service
// -----------------------------------------------------------------------------

pub(crate) async fn begin(
    db: &Database,
) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, AppError> {
    db.pool()
        .begin()
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e)))
}

pub(crate) async fn commit(tx: sqlx::Transaction<'_, sqlx::Postgres>) -> Result<(), AppError> {
    tx.commit()
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e)))
}

/// Load and exclusively lock the plan row. All lifecycle mutations funnel
/// through this lock, so concurrent transitions, clones and rollbacks on one
/// plan serialize here.
pub(crate) async fn lock_plan(
    conn: &mut PgConnection,
    plan_id: Uuid,
) -> Result<Option<ProcurementPlan>, AppError> {
    sqlx::query_as::<_, ProcurementPlan>(
        r#"
        SELECT plan_id, name, year, created_by, created_utc, updated_utc
        FROM procurement_plans
        WHERE plan_id = $1
        FOR UPDATE
        "#,
    )
    .bind(plan_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock plan: {}", e)))
}

/// Ownership check that fails closed: absent plan is NotFound, someone
/// else's plan is Forbidden.
pub(crate) fn owned(
    plan: Option<ProcurementPlan>,
    user: &User,
) -> Result<ProcurementPlan, AppError> {
    let plan = plan.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan not found")))?;
    if plan.created_by != user.user_id {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Plan belongs to another user"
        )));
    }
    Ok(plan)
}

pub(crate) async fn require_active_version(
    conn: &mut PgConnection,
    plan_id: Uuid,
) -> Result<PlanVersion, AppError> {
    sqlx::query_as::<_, PlanVersion>(
        r#"
        SELECT version_id, plan_id, version_number, status, is_active,
               total_amount, ktp_percentage, import_percentage, created_by, created_utc
        FROM plan_versions
        WHERE plan_id = $1 AND is_active
        "#,
    )
    .bind(plan_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load active version: {}", e)))?
    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan has no active version")))
}

async fn insert_version(
    conn: &mut PgConnection,
    plan_id: Uuid,
    version_number: i32,
    status: PlanStatus,
    total_amount: Decimal,
    ktp_percentage: Decimal,
    import_percentage: Decimal,
    created_by: Uuid,
) -> Result<PlanVersion, AppError> {
    sqlx::query_as::<_, PlanVersion>(
        r#"
        INSERT INTO plan_versions (
            version_id, plan_id, version_number, status, is_active,
            total_amount, ktp_percentage, import_percentage, created_by
        )
        VALUES ($1, $2, $3, $4, TRUE, $5, $6, $7, $8)
        RETURNING version_id, plan_id, version_number, status, is_active,
                  total_amount, ktp_percentage, import_percentage, created_by, created_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(plan_id)
    .bind(version_number)
    .bind(status.as_str())
    .bind(total_amount)
    .bind(ktp_percentage)
    .bind(import_percentage)
    .bind(created_by)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert version: {}", e)))
}

/// Recompute a version's aggregate metrics from its live item set and write
/// them back. Pure function of the current items, so repeated calls with no
/// item change produce identical values.
pub(crate) async fn recalculate_metrics(
    conn: &mut PgConnection,
    version_id: Uuid,
) -> Result<(), AppError> {
    let (grand_total, ktp_total): (Decimal, Decimal) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(total_amount), 0),
               COALESCE(SUM(total_amount) FILTER (WHERE is_ktp), 0)
        FROM plan_items
        WHERE version_id = $1 AND NOT is_deleted
        "#,
    )
    .bind(version_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum items: {}", e)))?;

    let (ktp_percentage, import_percentage) = percentages(grand_total, ktp_total);

    sqlx::query(
        r#"
        UPDATE plan_versions
        SET total_amount = $1, ktp_percentage = $2, import_percentage = $3
        WHERE version_id = $4
        "#,
    )
    .bind(grand_total)
    .bind(ktp_percentage)
    .bind(import_percentage)
    .bind(version_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to write metrics: {}", e)))?;

    Ok(())
}

/// KTP and import percentage split. When the grand total is zero both
/// percentages are zero; they do not sum to 100 in that case.
fn percentages(grand_total: Decimal, ktp_total: Decimal) -> (Decimal, Decimal) {
    if grand_total <= Decimal::ZERO {
        return (Decimal::ZERO, Decimal::ZERO);
    }
    let hundred = Decimal::from(100);
    let ktp_percentage = (ktp_total * hundred / grand_total).round_dp(2);
    (ktp_percentage, hundred - ktp_percentage)
}

#[cfg(test)]
mod tests {
    use super::percentages;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn percentages_split_sums_to_hundred() {
        let (ktp, import) = percentages(dec("4000.00"), dec("1000.00"));
        assert_eq!(ktp, dec("25.00"));
        assert_eq!(import, dec("75.00"));
    }

    #[test]
    fn zero_grand_total_gives_zero_for_both() {
        let (ktp, import) = percentages(Decimal::ZERO, Decimal::ZERO);
        assert_eq!(ktp, Decimal::ZERO);
        assert_eq!(import, Decimal::ZERO);
    }

    #[test]
    fn percentages_round_to_two_places() {
        let (ktp, import) = percentages(dec("3.00"), dec("1.00"));
        assert_eq!(ktp, dec("33.33"));
        assert_eq!(import, dec("66.67"));
    }

    #[test]
    fn percentages_are_idempotent() {
        let first = percentages(dec("1234.56"), dec("234.56"));
        let second = percentages(dec("1234.56"), dec("234.56"));
        assert_eq!(first, second);
    }
}
