use std::sync::Arc;

use crate::engine::MatchingEngine;
use crate::events::EventBus;
use crate::gateway::service::OrderGateway;
use crate::lanes::SymbolLanes;
use crate::session::{MarketState, SessionController};
use crate::store::Store;

/// Shared application state handed to every handler.
///
/// All services are constructed once at process start and injected here;
/// nothing in the call graph reaches for globals.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub lanes: Arc<SymbolLanes>,
    pub bus: Arc<EventBus>,
    pub market: Arc<MarketState>,
    pub engine: Arc<MatchingEngine>,
    pub gateway: Arc<OrderGateway>,
    pub sessions: Arc<SessionController>,
    pub jwt_secret: String,
}
