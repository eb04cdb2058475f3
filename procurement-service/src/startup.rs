//! Application startup and lifecycle management.

use axum::{
    extract::State, http::HeaderValue, http::StatusCode, middleware, response::IntoResponse,
    routing::get, routing::post, Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::handlers;
use crate::middleware::{auth_middleware, track_metrics};
use crate::services::{get_metrics, init_metrics, Database, ItemService, JwtService, PlanService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ServiceConfig,
    pub db: Arc<Database>,
    pub jwt: JwtService,
    pub plans: PlanService,
    pub items: ItemService,
}

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<Database>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "procurement-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "procurement-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// API routes under `/api`. Plan and item routes require a bearer token;
/// login and the reference registries are public.
fn api_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route(
            "/plans",
            post(handlers::plans::create_plan).get(handlers::plans::list_plans),
        )
        .route(
            "/plans/:plan_id",
            get(handlers::plans::get_plan).delete(handlers::plans::delete_plan),
        )
        .route("/plans/:plan_id/versions", post(handlers::plans::create_version))
        .route(
            "/plans/:plan_id/versions/active/status",
            axum::routing::patch(handlers::plans::update_active_version_status),
        )
        .route(
            "/plans/:plan_id/versions/latest",
            axum::routing::delete(handlers::plans::delete_latest_version),
        )
        .route(
            "/plans/:plan_id/versions/:version_id",
            get(handlers::plans::get_version),
        )
        .route("/plans/:plan_id/items", post(handlers::plans::add_item))
        .route(
            "/items/:item_id",
            get(handlers::items::get_item)
                .put(handlers::items::update_item)
                .delete(handlers::items::delete_item),
        )
        .route(
            "/items/:item_id/edit-data",
            get(handlers::items::get_item_edit_data),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    let public = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/lookups/units", get(handlers::lookups::units))
        .route("/lookups/kato", get(handlers::lookups::kato))
        .route(
            "/lookups/origin-categories",
            get(handlers::lookups::origin_categories),
        )
        .route("/lookups/cost-items", get(handlers::lookups::cost_items))
        .route(
            "/lookups/funding-sources",
            get(handlers::lookups::funding_sources),
        )
        .route(
            "/lookups/product-codes",
            get(handlers::lookups::product_codes),
        )
        .route("/lookups/check-ktp", get(handlers::lookups::check_ktp))
        .route("/kato", get(handlers::kato::children))
        .route("/kato/:kato_id", get(handlers::kato::by_id))
        .route("/kato/:kato_id/parents", get(handlers::kato::parents));

    protected.merge(public)
}

fn cors_layer(config: &ServiceConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ServiceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: ServiceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: ServiceConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);
        let jwt = JwtService::new(&config.jwt)?;

        let state = AppState {
            config: config.clone(),
            db: db.clone(),
            jwt,
            plans: PlanService::new((*db).clone()),
            items: ItemService::new((*db).clone()),
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Procurement service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let health_state = HealthState {
            db: self.state.db.clone(),
        };

        let cors = cors_layer(&self.state.config);

        let router = Router::new()
            .route("/health", get(health_check).with_state(health_state.clone()))
            .route("/ready", get(readiness_check).with_state(health_state))
            .route("/metrics", get(metrics_handler))
            .nest("/api", api_router(self.state.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(track_metrics))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(cors)
            .with_state(self.state);

        tracing::info!(
            service = "procurement-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
