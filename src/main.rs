//! healthpal server entry point.
//!
//! Starts the Axum HTTP server with the REST endpoints and the
//! notification dispatcher.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use healthpal::api;
use healthpal::api::auth::JwtKeys;
use healthpal::app_state::AppState;
use healthpal::config::{HealthPalConfig, LogFormat};
use healthpal::domain::EventBus;
use healthpal::notify::{Dispatcher, LogNotifier, spawn_dispatcher};
use healthpal::payment::{DisabledGateway, PaymentGateway, StripeGateway};
use healthpal::persistence::{
    ConsultationStore, LedgerStore, MemoryStore, PostgresStore, UserStore,
};
use healthpal::service::{ConsultationService, LedgerService, UserService};

struct Stores {
    ledger: Arc<dyn LedgerStore>,
    consultations: Arc<dyn ConsultationStore>,
    users: Arc<dyn UserStore>,
    postgres: Option<PostgresStore>,
}

async fn open_stores(config: &HealthPalConfig) -> anyhow::Result<Stores> {
    if !config.persistence_enabled {
        tracing::warn!("persistence disabled, using in-memory store");
        let store = Arc::new(MemoryStore::new());
        return Ok(Stores {
            ledger: Arc::clone(&store) as Arc<dyn LedgerStore>,
            consultations: Arc::clone(&store) as Arc<dyn ConsultationStore>,
            users: store,
            postgres: None,
        });
    }

    let pg = PostgresStore::connect(config)
        .await
        .context("connecting to database")?;
    pg.migrate().await.context("running migrations")?;
    tracing::info!("database ready");
    let store = Arc::new(pg.clone());
    Ok(Stores {
        ledger: Arc::clone(&store) as Arc<dyn LedgerStore>,
        consultations: Arc::clone(&store) as Arc<dyn ConsultationStore>,
        users: store,
        postgres: Some(pg),
    })
}

fn payment_gateway(config: &HealthPalConfig) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match &config.stripe_secret_key {
        Some(key) => {
            let gateway = StripeGateway::new(
                config.stripe_api_base.as_str(),
                key.as_str(),
                Duration::from_secs(config.payment_timeout_secs),
            )
            .context("building payment client")?;
            Ok(Arc::new(gateway))
        }
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set, card payments disabled");
            Ok(Arc::new(DisabledGateway))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration before tracing so LOG_FORMAT applies
    let config = HealthPalConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    tracing::info!(addr = %config.listen_addr, env = %config.app_env, "starting healthpal");
    if config.uses_dev_jwt_secret() {
        tracing::warn!("JWT_SECRET not set, using the development secret");
    }

    // Build infrastructure
    let stores = open_stores(&config).await?;
    let gateway = payment_gateway(&config)?;
    let event_bus = EventBus::new(config.event_bus_capacity);

    // Build service layer
    let ledger = LedgerService::new(
        Arc::clone(&stores.ledger),
        gateway,
        event_bus.clone(),
    )
    .with_currency(config.payment_currency.as_str())
    .with_webhook_secret(
        config.stripe_webhook_secret.clone(),
        config.webhook_tolerance_secs,
    );
    let consultations = ConsultationService::new(
        Arc::clone(&stores.consultations),
        Arc::clone(&stores.users),
        event_bus.clone(),
    );
    let users = UserService::new(Arc::clone(&stores.users));

    // Notifications run off the request path
    let dispatcher = Dispatcher::new(
        Arc::new(LogNotifier::new(config.email_from.as_str())),
        Arc::clone(&stores.users),
        Arc::clone(&stores.ledger),
        Duration::from_secs(config.notify_timeout_secs),
    );
    let dispatcher_task = spawn_dispatcher(&event_bus, dispatcher);

    // Build application state
    let app_state = AppState {
        ledger: Arc::new(ledger),
        consultations: Arc::new(consultations),
        users: Arc::new(users),
        event_bus,
        jwt: Arc::new(JwtKeys::from_secret(config.jwt_secret.as_bytes())),
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router(config.expose_error_details))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dispatcher_task.abort();
    if let Some(pg) = stores.postgres {
        pg.close().await;
    }
    tracing::info!("server stopped");

    Ok(())
}
