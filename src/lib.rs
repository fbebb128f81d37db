//! bursa - equities exchange trading core
//!
//! A price-time-priority continuous matching engine with a call-auction
//! pre-open phase (IEP), built around per-symbol serial lanes.
//!
//! # Modules
//!
//! - [`core_types`] - id aliases, lot valuation
//! - [`models`] - orders, sides, statuses, session phases
//! - [`market_rules`] - tick sizes and ARA/ARB bands
//! - [`orderbook`] - per-symbol book index
//! - [`lanes`] - symbol-serialized book registry
//! - [`engine`] - continuous matching and settlement
//! - [`iep`] - auction price discovery
//! - [`session`] - session state machine and phase timers
//! - [`events`] - room-based push event bus
//! - [`store`] - PostgreSQL persistence
//! - [`gateway`] - HTTP surface
//! - [`ws`] - WebSocket subscriptions

pub mod auth;
pub mod config;
pub mod core_types;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod iep;
pub mod lanes;
pub mod logging;
pub mod market_rules;
pub mod models;
pub mod orderbook;
pub mod session;
pub mod store;
pub mod ws;

// Convenient re-exports at crate root
pub use core_types::{OrderId, SessionId, StockId, UserId, LOT_SHARES};
pub use engine::MatchingEngine;
pub use error::OrderError;
pub use events::EventBus;
pub use lanes::SymbolLanes;
pub use models::{OrderStatus, RestingOrder, SessionPhase, Side, Trader};
pub use orderbook::OrderBook;
pub use session::{MarketState, SessionController};
pub use store::Store;
