use std::sync::Arc;

use anyhow::Context;

use bursa::config::AppConfig;
use bursa::gateway::{self, service::OrderGateway, state::AppState};
use bursa::{logging, EventBus, MarketState, MatchingEngine, SessionController, Store, SymbolLanes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    let _log_guard = logging::init_logging(&config);

    tracing::info!(
        port = config.port,
        preopen_secs = config.preopen.as_secs(),
        locked_secs = config.locked.as_secs(),
        "Starting bursa trading core"
    );

    let store = Arc::new(
        Store::connect(&config.database_url)
            .await
            .context("Failed to connect to PostgreSQL")?,
    );
    store.init_schema().await?;

    let lanes = Arc::new(SymbolLanes::new());
    let bus = Arc::new(EventBus::new());
    let market = Arc::new(MarketState::new());
    let engine = Arc::new(MatchingEngine::new(
        store.clone(),
        lanes.clone(),
        bus.clone(),
        market.clone(),
    ));
    let gateway_svc = Arc::new(OrderGateway::new(
        store.clone(),
        lanes.clone(),
        engine.clone(),
    ));
    let sessions = Arc::new(SessionController::new(
        store.clone(),
        lanes.clone(),
        engine.clone(),
        market.clone(),
        config.preopen,
        config.locked,
    ));

    // If the process died mid-session, adopt the persisted phase and
    // rebuild the books from the live orders.
    sessions.resume().await.context("Session resume failed")?;

    let state = Arc::new(AppState {
        store,
        lanes,
        bus,
        market,
        engine,
        gateway: gateway_svc,
        sessions,
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = gateway::router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "Gateway listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
