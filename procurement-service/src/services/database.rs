//! Database service for procurement-service.
//!
//! Pool-level reads live here; the multi-step lifecycle mutations in
//! `services::plans` and `services::items` run their own transactions.

use crate::models::{
    CostItem, FundingSource, Kato, KatoNode, OriginCategory, PlanItem, PlanItemDetail,
    PlanVersion, ProcurementPlan, ProductCode, UnitOfMeasure, User,
};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "procurement-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    /// Find an active user by IIN.
    #[instrument(skip(self, iin))]
    pub async fn find_user_by_iin(&self, iin: &str) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_user_by_iin"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, iin, full_name, bin, org_name, email, phone, is_active, last_login_utc, created_utc
            FROM users
            WHERE iin = $1 AND is_active
            "#,
        )
        .bind(iin)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find user: {}", e)))?;

        timer.observe_duration();

        Ok(user)
    }

    /// Record a successful login.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn touch_last_login(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_utc = now() WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update last login: {}", e))
            })?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Plans and versions (reads)
    // -------------------------------------------------------------------------

    /// Get a plan by id.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn find_plan(&self, plan_id: Uuid) -> Result<Option<ProcurementPlan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, ProcurementPlan>(
            r#"
            SELECT plan_id, name, year, created_by, created_utc, updated_utc
            FROM procurement_plans
            WHERE plan_id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get plan: {}", e)))?;

        timer.observe_duration();

        Ok(plan)
    }

    /// List a user's plans, newest first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_plans_by_user(
        &self,
        user_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<ProcurementPlan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_plans_by_user"])
            .start_timer();

        let plans = sqlx::query_as::<_, ProcurementPlan>(
            r#"
            SELECT plan_id, name, year, created_by, created_utc, updated_utc
            FROM procurement_plans
            WHERE created_by = $1
            ORDER BY created_utc DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(skip.max(0))
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list plans: {}", e)))?;

        timer.observe_duration();

        Ok(plans)
    }

    /// List all versions of a plan, version number ascending.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn list_versions_by_plan(&self, plan_id: Uuid) -> Result<Vec<PlanVersion>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_versions_by_plan"])
            .start_timer();

        let versions = sqlx::query_as::<_, PlanVersion>(
            r#"
            SELECT version_id, plan_id, version_number, status, is_active,
                   total_amount, ktp_percentage, import_percentage, created_by, created_utc
            FROM plan_versions
            WHERE plan_id = $1
            ORDER BY version_number
            "#,
        )
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list versions: {}", e)))?;

        timer.observe_duration();

        Ok(versions)
    }

    /// Get the unique active version of a plan.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn get_active_version(&self, plan_id: Uuid) -> Result<Option<PlanVersion>, AppError> {
        let version = sqlx::query_as::<_, PlanVersion>(
            r#"
            SELECT version_id, plan_id, version_number, status, is_active,
                   total_amount, ktp_percentage, import_percentage, created_by, created_utc
            FROM plan_versions
            WHERE plan_id = $1 AND is_active
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get active version: {}", e))
        })?;

        Ok(version)
    }

    /// Get one version of a plan by id.
    #[instrument(skip(self), fields(plan_id = %plan_id, version_id = %version_id))]
    pub async fn find_version(
        &self,
        plan_id: Uuid,
        version_id: Uuid,
    ) -> Result<Option<PlanVersion>, AppError> {
        let version = sqlx::query_as::<_, PlanVersion>(
            r#"
            SELECT version_id, plan_id, version_number, status, is_active,
                   total_amount, ktp_percentage, import_percentage, created_by, created_utc
            FROM plan_versions
            WHERE plan_id = $1 AND version_id = $2
            "#,
        )
        .bind(plan_id)
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get version: {}", e)))?;

        Ok(version)
    }

    // -------------------------------------------------------------------------
    // Items (reads)
    // -------------------------------------------------------------------------

    /// Get a non-deleted item by id.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn find_item(&self, item_id: Uuid) -> Result<Option<PlanItem>, AppError> {
        let item = sqlx::query_as::<_, PlanItem>(
            r#"
            SELECT item_id, version_id, item_number, need_category, product_code, additional_specs,
                   unit_id, quantity, unit_price, total_amount, cost_item_id, funding_source_id,
                   origin_category_code, kato_purchase_id, kato_delivery_id,
                   is_ktp, is_resident, is_deleted, created_by, created_utc, updated_utc
            FROM plan_items
            WHERE item_id = $1 AND NOT is_deleted
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get item: {}", e)))?;

        Ok(item)
    }

    /// Ordered non-deleted items of a version with resolved registry display
    /// fields. Feeds plan detail responses and the export renderer.
    #[instrument(skip(self), fields(version_id = %version_id))]
    pub async fn list_item_details(&self, version_id: Uuid) -> Result<Vec<PlanItemDetail>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_item_details"])
            .start_timer();

        let items = sqlx::query_as::<_, PlanItemDetail>(
            r#"
            SELECT i.item_id, i.version_id, i.item_number, i.need_category,
                   i.product_code, pc.name_ru AS product_name_ru,
                   i.additional_specs,
                   i.unit_id, u.code AS unit_code, u.name_ru AS unit_name_ru,
                   i.quantity, i.unit_price, i.total_amount,
                   i.cost_item_id, ci.name_ru AS cost_item_name_ru,
                   i.funding_source_id, fs.name_ru AS funding_source_name_ru,
                   i.origin_category_code,
                   i.kato_purchase_id, kp.name_ru AS kato_purchase_name_ru,
                   i.kato_delivery_id, kd.name_ru AS kato_delivery_name_ru,
                   i.is_ktp, i.is_resident
            FROM plan_items i
            LEFT JOIN product_codes pc ON pc.code = i.product_code
            LEFT JOIN units_of_measure u ON u.unit_id = i.unit_id
            LEFT JOIN cost_items ci ON ci.cost_item_id = i.cost_item_id
            LEFT JOIN funding_sources fs ON fs.funding_source_id = i.funding_source_id
            LEFT JOIN kato kp ON kp.kato_id = i.kato_purchase_id
            LEFT JOIN kato kd ON kd.kato_id = i.kato_delivery_id
            WHERE i.version_id = $1 AND NOT i.is_deleted
            ORDER BY i.item_number
            "#,
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list items: {}", e)))?;

        timer.observe_duration();

        Ok(items)
    }

    // -------------------------------------------------------------------------
    // Reference registries
    // -------------------------------------------------------------------------

    /// Look up a product code in the ENS TRU registry.
    #[instrument(skip(self, code))]
    pub async fn find_product_code(&self, code: &str) -> Result<Option<ProductCode>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_product_code"])
            .start_timer();

        let entry = sqlx::query_as::<_, ProductCode>(
            r#"
            SELECT product_code_id, code, name_ru, name_kz, need_category, specs_ru, specs_kz
            FROM product_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to look up product code: {}", e))
        })?;

        timer.observe_duration();

        Ok(entry)
    }

    /// Whether a product code appears in the domestic-producer registry.
    #[instrument(skip(self, code))]
    pub async fn is_ktp_registered(&self, code: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM ktp_registry WHERE product_code = $1)",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check KTP registry: {}", e))
        })?;

        Ok(exists)
    }

    /// Search units of measure by code or name.
    #[instrument(skip(self, q))]
    pub async fn search_units(&self, q: Option<&str>) -> Result<Vec<UnitOfMeasure>, AppError> {
        let pattern = like_pattern(q);
        let units = sqlx::query_as::<_, UnitOfMeasure>(
            r#"
            SELECT unit_id, code, name_kz, name_ru
            FROM units_of_measure
            WHERE $1::text IS NULL OR code ILIKE $1 OR name_ru ILIKE $1 OR name_kz ILIKE $1
            ORDER BY code
            LIMIT 50
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to search units: {}", e)))?;

        Ok(units)
    }

    /// Search territorial codes by code or name (flat, no hierarchy).
    #[instrument(skip(self, q))]
    pub async fn search_kato(&self, q: Option<&str>) -> Result<Vec<Kato>, AppError> {
        let pattern = like_pattern(q);
        let rows = sqlx::query_as::<_, Kato>(
            r#"
            SELECT kato_id, parent_id, code, name_kz, name_ru
            FROM kato
            WHERE $1::text IS NULL OR code ILIKE $1 OR name_ru ILIKE $1 OR name_kz ILIKE $1
            ORDER BY code
            LIMIT 50
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to search KATO: {}", e)))?;

        Ok(rows)
    }

    /// Search categories of origin by group, code or name.
    #[instrument(skip(self, q))]
    pub async fn search_origin_categories(
        &self,
        q: Option<&str>,
    ) -> Result<Vec<OriginCategory>, AppError> {
        let pattern = like_pattern(q);
        let rows = sqlx::query_as::<_, OriginCategory>(
            r#"
            SELECT category_id, group_name, code, name_ru, standard, unit
            FROM origin_categories
            WHERE $1::text IS NULL OR group_name ILIKE $1 OR code ILIKE $1 OR name_ru ILIKE $1
            ORDER BY code
            LIMIT 50
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to search origin categories: {}", e))
        })?;

        Ok(rows)
    }

    /// Search cost items by name.
    #[instrument(skip(self, q))]
    pub async fn search_cost_items(&self, q: Option<&str>) -> Result<Vec<CostItem>, AppError> {
        let pattern = like_pattern(q);
        let rows = sqlx::query_as::<_, CostItem>(
            r#"
            SELECT cost_item_id, name_ru, name_kz
            FROM cost_items
            WHERE $1::text IS NULL OR name_ru ILIKE $1 OR name_kz ILIKE $1
            ORDER BY cost_item_id
            LIMIT 50
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to search cost items: {}", e))
        })?;

        Ok(rows)
    }

    /// Search funding sources by name.
    #[instrument(skip(self, q))]
    pub async fn search_funding_sources(
        &self,
        q: Option<&str>,
    ) -> Result<Vec<FundingSource>, AppError> {
        let pattern = like_pattern(q);
        let rows = sqlx::query_as::<_, FundingSource>(
            r#"
            SELECT funding_source_id, name_ru, name_kz
            FROM funding_sources
            WHERE $1::text IS NULL OR name_ru ILIKE $1 OR name_kz ILIKE $1
            ORDER BY funding_source_id
            LIMIT 50
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to search funding sources: {}", e))
        })?;

        Ok(rows)
    }

    /// Search the product-code registry by code or name.
    #[instrument(skip(self, q))]
    pub async fn search_product_codes(&self, q: Option<&str>) -> Result<Vec<ProductCode>, AppError> {
        let pattern = like_pattern(q);
        let rows = sqlx::query_as::<_, ProductCode>(
            r#"
            SELECT product_code_id, code, name_ru, name_kz, need_category, specs_ru, specs_kz
            FROM product_codes
            WHERE $1::text IS NULL OR code ILIKE $1 OR name_ru ILIKE $1 OR name_kz ILIKE $1
            ORDER BY code
            LIMIT 50
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to search product codes: {}", e))
        })?;

        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // KATO hierarchy
    // -------------------------------------------------------------------------

    /// Children of a KATO node (roots when `parent_id` is None), each
    /// annotated with whether it has children of its own.
    #[instrument(skip(self))]
    pub async fn kato_children(&self, parent_id: Option<i32>) -> Result<Vec<KatoNode>, AppError> {
        let rows = sqlx::query_as::<_, KatoNode>(
            r#"
            SELECT k.kato_id, k.parent_id, k.code, k.name_kz, k.name_ru,
                   EXISTS(SELECT 1 FROM kato c WHERE c.parent_id = k.kato_id) AS has_children
            FROM kato k
            WHERE k.parent_id IS NOT DISTINCT FROM $1
            ORDER BY k.code
            "#,
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list KATO children: {}", e))
        })?;

        Ok(rows)
    }

    /// One KATO node with its `has_children` flag.
    #[instrument(skip(self))]
    pub async fn kato_by_id(&self, kato_id: i32) -> Result<Option<KatoNode>, AppError> {
        let row = sqlx::query_as::<_, KatoNode>(
            r#"
            SELECT k.kato_id, k.parent_id, k.code, k.name_kz, k.name_ru,
                   EXISTS(SELECT 1 FROM kato c WHERE c.parent_id = k.kato_id) AS has_children
            FROM kato k
            WHERE k.kato_id = $1
            "#,
        )
        .bind(kato_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get KATO node: {}", e)))?;

        Ok(row)
    }

    /// Ancestor chain of a KATO node, root first, excluding the node itself.
    #[instrument(skip(self))]
    pub async fn kato_parents(&self, kato_id: i32) -> Result<Vec<KatoNode>, AppError> {
        let rows = sqlx::query_as::<_, KatoNode>(
            r#"
            WITH RECURSIVE ancestors AS (
                SELECT k.kato_id, k.parent_id, k.code, k.name_kz, k.name_ru, 0 AS depth
                FROM kato k
                WHERE k.kato_id = (SELECT parent_id FROM kato WHERE kato_id = $1)
                UNION ALL
                SELECT p.kato_id, p.parent_id, p.code, p.name_kz, p.name_ru, a.depth + 1
                FROM kato p
                JOIN ancestors a ON p.kato_id = a.parent_id
            )
            SELECT a.kato_id, a.parent_id, a.code, a.name_kz, a.name_ru,
                   EXISTS(SELECT 1 FROM kato c WHERE c.parent_id = a.kato_id) AS has_children
            FROM ancestors a
            ORDER BY a.depth DESC
            "#,
        )
        .bind(kato_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list KATO parents: {}", e))
        })?;

        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Single-row registry getters (edit-data assembly)
    // -------------------------------------------------------------------------

    pub async fn find_unit(&self, unit_id: i32) -> Result<Option<UnitOfMeasure>, AppError> {
        sqlx::query_as::<_, UnitOfMeasure>(
            "SELECT unit_id, code, name_kz, name_ru FROM units_of_measure WHERE unit_id = $1",
        )
        .bind(unit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get unit: {}", e)))
    }

    pub async fn find_cost_item(&self, cost_item_id: i32) -> Result<Option<CostItem>, AppError> {
        sqlx::query_as::<_, CostItem>(
            "SELECT cost_item_id, name_ru, name_kz FROM cost_items WHERE cost_item_id = $1",
        )
        .bind(cost_item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get cost item: {}", e)))
    }

    pub async fn find_funding_source(
        &self,
        funding_source_id: i32,
    ) -> Result<Option<FundingSource>, AppError> {
        sqlx::query_as::<_, FundingSource>(
            "SELECT funding_source_id, name_ru, name_kz FROM funding_sources WHERE funding_source_id = $1",
        )
        .bind(funding_source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get funding source: {}", e))
        })
    }

    pub async fn find_origin_category(
        &self,
        code: &str,
    ) -> Result<Option<OriginCategory>, AppError> {
        sqlx::query_as::<_, OriginCategory>(
            "SELECT category_id, group_name, code, name_ru, standard, unit FROM origin_categories WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get origin category: {}", e))
        })
    }

    pub async fn find_kato(&self, kato_id: i32) -> Result<Option<Kato>, AppError> {
        sqlx::query_as::<_, Kato>(
            "SELECT kato_id, parent_id, code, name_kz, name_ru FROM kato WHERE kato_id = $1",
        )
        .bind(kato_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get KATO row: {}", e)))
    }
}

/// `%q%` pattern for ILIKE search, or None to match everything.
fn like_pattern(q: Option<&str>) -> Option<String> {
    q.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s))
}
