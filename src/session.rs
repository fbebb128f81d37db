//! Trading session state machine
//!
//! CLOSED --open_session--> PRE_OPEN --(T_preopen)--> LOCKED
//! --(T_locked)--> OPEN --close_session--> CLOSED
//!
//! One session is active at a time. The timed transition task lives for
//! the whole session and is cancelled through a watch channel when the
//! session closes early. The in-memory phase mirrors the session row and
//! gates the engine; the row is what survives a restart.

use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use tokio::sync::watch;

use crate::core_types::{lot_value, SessionId};
use crate::engine::MatchingEngine;
use crate::error::OrderError;
use crate::lanes::SymbolLanes;
use crate::market_rules;
use crate::models::{RestingOrder, SessionPhase, Side, Trader};
use crate::store::{self, sessions::SessionRow, Store};

/// Reference price used for a stock's very first session.
const DEFAULT_PREV_CLOSE: i64 = 1000;

/// Shared in-memory view of the current session.
pub struct MarketState {
    phase: RwLock<SessionPhase>,
    session_id: RwLock<Option<SessionId>>,
}

impl MarketState {
    pub fn new() -> Self {
        Self {
            phase: RwLock::new(SessionPhase::Closed),
            session_id: RwLock::new(None),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.read().unwrap()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        *self.session_id.read().unwrap()
    }

    pub fn set(&self, phase: SessionPhase, session_id: Option<SessionId>) {
        *self.phase.write().unwrap() = phase;
        *self.session_id.write().unwrap() = session_id;
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.write().unwrap() = phase;
    }
}

impl Default for MarketState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SessionController {
    store: Arc<Store>,
    lanes: Arc<SymbolLanes>,
    engine: Arc<MatchingEngine>,
    market: Arc<MarketState>,
    preopen: Duration,
    locked: Duration,
    phase_timer: StdMutex<Option<watch::Sender<bool>>>,
}

impl SessionController {
    pub fn new(
        store: Arc<Store>,
        lanes: Arc<SymbolLanes>,
        engine: Arc<MatchingEngine>,
        market: Arc<MarketState>,
        preopen: Duration,
        locked: Duration,
    ) -> Self {
        Self {
            store,
            lanes,
            engine,
            market,
            preopen,
            locked,
            phase_timer: StdMutex::new(None),
        }
    }

    /// Open a new session in PRE_OPEN: seed daily data for every active
    /// stock, carry over pending orders from the last closed session,
    /// reseed the books, and start the timed phase transitions.
    pub async fn open_session(&self) -> Result<SessionRow, OrderError> {
        let mut tx = self.store.pool().begin().await?;

        if store::sessions::running_session(&mut tx).await?.is_some() {
            return Err(OrderError::SessionAlreadyRunning);
        }

        let session = store::sessions::create_session(&mut tx).await?;
        let stocks = store::sessions::active_stocks(&mut tx).await?;

        for (stock_id, symbol) in &stocks {
            let prev_close = store::sessions::latest_close_price(&mut tx, *stock_id)
                .await?
                .unwrap_or(DEFAULT_PREV_CLOSE);
            let (ara, arb) = market_rules::auto_reject_limits(prev_close);
            store::sessions::insert_daily(&mut tx, *stock_id, session.id, prev_close, ara, arb)
                .await?;
            tracing::info!(symbol = %symbol, prev_close, ara, arb, "Session band initialized");
        }

        if let Some(prev_session) = store::sessions::last_closed_before(&mut tx, session.id).await?
        {
            let moved = store::orders::migrate_pending(&mut tx, prev_session, session.id).await?;
            if moved > 0 {
                tracing::info!(moved, prev_session, "Carried pending orders into new session");
            }
        }

        let seeds = store::orders::book_seeds(&mut tx, session.id, false).await?;
        tx.commit().await?;

        self.lanes.clear();
        self.seed_books(&seeds).await;
        self.market.set(SessionPhase::PreOpen, Some(session.id));

        let symbols: Vec<String> = stocks.into_iter().map(|(_, s)| s).collect();
        self.spawn_transitions(session.id, symbols, SessionPhase::PreOpen);

        tracing::info!(
            session = session.session_number,
            "Trading session opened (pre-opening)"
        );
        Ok(session)
    }

    /// Close the running session: cancel the phase timer, refund every
    /// BUY reservation, cancel all live orders and flush the books.
    /// Returns the number of canceled orders.
    pub async fn close_session(&self) -> Result<u64, OrderError> {
        if let Some(timer) = self.phase_timer.lock().unwrap().take() {
            let _ = timer.send(true);
        }

        let mut tx = self.store.pool().begin().await?;
        let session_id = store::sessions::close_running_session(&mut tx)
            .await?
            .ok_or(OrderError::NoActiveSession)?;

        let open_orders = store::orders::open_for_session(&mut tx, session_id).await?;
        for order in &open_orders {
            if order.side == Side::Buy {
                let refund = lot_value(order.price, order.remaining);
                store::users::adjust_balance(&mut tx, order.user_id, refund).await?;
            }
            store::orders::mark_canceled(&mut tx, order.order_id).await?;
        }
        tx.commit().await?;

        self.market.set(SessionPhase::Closed, None);

        let symbols = self.lanes.symbols();
        self.lanes.clear();
        for symbol in &symbols {
            let lane = self.lanes.lane(symbol);
            let book = lane.lock().await;
            self.engine.broadcast_depth(symbol, &book);
        }

        tracing::info!(
            session_id,
            canceled = open_orders.len(),
            "Trading session closed"
        );
        Ok(open_orders.len() as u64)
    }

    /// Restore in-memory state after a restart. If a session row is still
    /// live, its phase is adopted, the books are reseeded from live orders
    /// and the remaining phase transitions are rescheduled.
    pub async fn resume(&self) -> Result<(), OrderError> {
        let mut conn = self.store.pool().acquire().await?;
        let Some(session) = store::sessions::running_session(&mut conn).await? else {
            return Ok(());
        };
        let phase = SessionPhase::parse(&session.status).unwrap_or(SessionPhase::Closed);

        let seeds = store::orders::book_seeds(&mut conn, session.id, true).await?;
        let stocks = store::sessions::active_stocks(&mut conn).await?;
        drop(conn);
        self.lanes.clear();
        self.seed_books(&seeds).await;
        self.market.set(phase, Some(session.id));

        tracing::info!(
            session = session.session_number,
            phase = phase.as_str(),
            orders = seeds.len(),
            "Resumed running session after restart"
        );

        match phase {
            SessionPhase::PreOpen | SessionPhase::Locked => {
                let symbols = stocks.into_iter().map(|(_, s)| s).collect();
                self.spawn_transitions(session.id, symbols, phase);
            }
            SessionPhase::Open | SessionPhase::Closed => {}
        }
        Ok(())
    }

    async fn seed_books(&self, seeds: &[store::orders::BookSeed]) {
        for seed in seeds {
            let lane = self.lanes.lane(&seed.symbol);
            let mut book = lane.lock().await;
            book.insert(
                seed.side,
                RestingOrder {
                    order_id: seed.order_id,
                    trader: Trader::Customer(seed.user_id),
                    stock_id: seed.stock_id,
                    price: seed.price,
                    quantity: seed.quantity,
                    remaining: seed.remaining,
                    timestamp_ms: seed.created_at.timestamp_millis(),
                    avg_price_at_order: seed.avg_price_at_order,
                },
            );
        }
    }

    /// Spawn the timed PRE_OPEN -> LOCKED -> OPEN sequence, cancellable by
    /// close_session. `from` selects where to start (restart support).
    fn spawn_transitions(&self, session_id: SessionId, symbols: Vec<String>, from: SessionPhase) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.phase_timer.lock().unwrap() = Some(cancel_tx);

        let store = self.store.clone();
        let engine = self.engine.clone();
        let market = self.market.clone();
        let preopen = self.preopen;
        let locked = self.locked;

        tokio::spawn(async move {
            let mut cancel_rx = cancel_rx;

            if from == SessionPhase::PreOpen {
                tracing::info!("Session started: PRE_OPEN phase");
                tokio::select! {
                    _ = tokio::time::sleep(preopen) => {}
                    _ = cancel_rx.changed() => {
                        tracing::info!("Phase timer cancelled during PRE_OPEN");
                        return;
                    }
                }

                tracing::info!("Entering LOCKED phase (auction price calculation)");
                market.set_phase(SessionPhase::Locked);
                if let Err(e) =
                    store::sessions::set_session_status(store.pool(), session_id, SessionPhase::Locked)
                        .await
                {
                    tracing::error!(error = %e, "Failed to persist LOCKED status");
                }
                for symbol in &symbols {
                    engine.match_symbol(symbol).await;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(locked) => {}
                _ = cancel_rx.changed() => {
                    tracing::info!("Phase timer cancelled during LOCKED");
                    return;
                }
            }

            tracing::info!("Entering OPEN phase (auction execution)");
            market.set_phase(SessionPhase::Open);
            if let Err(e) =
                store::sessions::set_session_status(store.pool(), session_id, SessionPhase::Open)
                    .await
            {
                tracing::error!(error = %e, "Failed to persist OPEN status");
            }
            for symbol in &symbols {
                engine.open_auction(symbol).await;
            }
            tracing::info!("Market fully open");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_state_defaults_closed() {
        let state = MarketState::new();
        assert_eq!(state.phase(), SessionPhase::Closed);
        assert_eq!(state.session_id(), None);
    }

    #[test]
    fn test_market_state_set_and_phase_only_update() {
        let state = MarketState::new();
        state.set(SessionPhase::PreOpen, Some(7));
        assert_eq!(state.phase(), SessionPhase::PreOpen);
        assert_eq!(state.session_id(), Some(7));

        state.set_phase(SessionPhase::Locked);
        assert_eq!(state.phase(), SessionPhase::Locked);
        assert_eq!(state.session_id(), Some(7));
    }
}
