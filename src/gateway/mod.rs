//! HTTP gateway: order pipeline, market data and session administration

pub mod handlers;
pub mod service;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use state::AppState;

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/market/depth/{symbol}", get(handlers::market_depth))
        .route("/market/iep/{symbol}", get(handlers::market_iep))
        .route("/ws", get(crate::ws::ws_handler));

    let private = Router::new()
        .route("/orders", post(handlers::place_order))
        .route("/orders/active", get(handlers::active_orders))
        .route("/orders/history", get(handlers::order_history))
        .route("/orders/{id}", delete(handlers::cancel_order))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::jwt_auth_middleware,
        ));

    let admin = Router::new()
        .route("/admin/session/open", post(handlers::open_session))
        .route("/admin/session/close", post(handlers::close_session))
        .layer(middleware::from_fn(auth::admin_guard))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::jwt_auth_middleware,
        ));

    Router::new()
        .merge(public)
        .merge(private)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
