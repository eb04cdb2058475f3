use procurement_service::config::ServiceConfig;
use procurement_service::startup::Application;
use service_core::error::AppError;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = ServiceConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting procurement service"
    );

    let app = Application::build(config).await?;
    let port = app.port();

    tokio::select! {
        result = app.run_until_stopped() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(port = port, "Shutdown signal received, stopping");
        }
    }

    Ok(())
}
