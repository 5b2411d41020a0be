use axum::{error_handling::HandleErrorLayer, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use rust_people_api::config::Config;
use rust_people_api::db::Database;
use rust_people_api::db_storage::PersonStorage;
use rust_people_api::enrichment::Enricher;
use rust_people_api::errors::handle_middleware_error;
use rust_people_api::handlers::{self, AppState};
use rust_people_api::obs;
use rust_people_api::openapi::ApiDoc;

/// Resolves when the process receives Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Main entry point for the application.
///
/// Loads configuration, initializes tracing, connects to the database and
/// applies migrations, builds the enricher, and serves the HTTP API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    obs::init_tracing(&config);
    config.log_summary();

    // Initialize database connection pool, waiting for PostgreSQL to come up
    let db = Database::connect_with_retry(&config.database_url, config.connect_retry()).await?;
    db.migrate().await?;
    tracing::info!("Database connection pool established");

    let enricher = Enricher::new(&config.enricher_config())
        .map_err(|e| anyhow::anyhow!("Failed to create enrichment HTTP client: {}", e))?;
    tracing::info!(
        "Enricher initialized (timeout {}ms)",
        enricher.timeout().as_millis()
    );

    let app_state = Arc::new(AppState {
        storage: PersonStorage::new(db.pool.clone()),
        enricher: Arc::new(enricher),
        config: config.clone(),
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let people_routes = Router::new()
        .route(
            "/api/v1/people",
            get(handlers::list_people).post(handlers::create_person),
        )
        .route(
            "/api/v1/people/:id",
            get(handlers::get_person)
                .put(handlers::update_person)
                .patch(handlers::patch_person)
                .delete(handlers::delete_person),
        )
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                // Whole-request budget, DB writes included
                .layer(TimeoutLayer::new(config.request_timeout))
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(people_routes)
        .with_state(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
