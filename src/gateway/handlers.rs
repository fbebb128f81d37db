//! HTTP handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::OrderError;
use crate::store::orders::OrderSummary;

use super::state::AppState;
use super::types::{
    CloseSessionResponse, DepthResponse, IepResponse, PlaceOrderRequest, PlaceOrderResponse,
    SessionResponse,
};

/// POST /orders
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<Json<PlaceOrderResponse>, OrderError> {
    let placed = state
        .gateway
        .place_order(user.user_id, &req.symbol, req.side, req.price, req.quantity)
        .await?;
    Ok(Json(PlaceOrderResponse {
        order_id: placed.order_id,
        status: placed.status,
    }))
}

/// DELETE /orders/{id}
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<i64>,
) -> Result<Json<Value>, OrderError> {
    state.gateway.cancel_order(user.user_id, order_id).await?;
    Ok(Json(json!({})))
}

/// GET /orders/active
pub async fn active_orders(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<OrderSummary>>, OrderError> {
    Ok(Json(state.gateway.active_orders(user.user_id).await?))
}

/// GET /orders/history
pub async fn order_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<OrderSummary>>, OrderError> {
    Ok(Json(state.gateway.order_history(user.user_id).await?))
}

/// GET /market/depth/{symbol}
pub async fn market_depth(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Json<DepthResponse> {
    let lane = state.lanes.lane(&symbol);
    let book = lane.lock().await;
    let (bids, asks) = book.depth();
    Json(DepthResponse { symbol, bids, asks })
}

/// GET /market/iep/{symbol}
pub async fn market_iep(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Json<IepResponse> {
    let quote = state.engine.current_iep(&symbol).await;
    Json(IepResponse::from_quote(quote, state.market.phase()))
}

/// POST /admin/session/open
pub async fn open_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionResponse>, OrderError> {
    let session = state.sessions.open_session().await?;
    Ok(Json(SessionResponse { session }))
}

/// POST /admin/session/close
pub async fn close_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CloseSessionResponse>, OrderError> {
    let canceled_orders = state.sessions.close_session().await?;
    Ok(Json(CloseSessionResponse { canceled_orders }))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, OrderError> {
    state.store.health_check().await?;
    Ok(Json(json!({ "status": "ok" })))
}
