//! Per-symbol serial lanes
//!
//! Matching for a symbol is strictly serial: the book and every settlement
//! pass for that symbol run under one async mutex. The registry hands out
//! the lane on demand so gateway inserts, the matching loop and the auction
//! all contend on the same lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::orderbook::OrderBook;

#[derive(Default)]
pub struct SymbolLanes {
    lanes: DashMap<String, Arc<Mutex<OrderBook>>>,
}

impl SymbolLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lane for a symbol, created empty on first use.
    pub fn lane(&self, symbol: &str) -> Arc<Mutex<OrderBook>> {
        self.lanes
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new())))
            .clone()
    }

    /// Symbols that currently have a lane (booked at least once).
    pub fn symbols(&self) -> Vec<String> {
        self.lanes.iter().map(|e| e.key().clone()).collect()
    }

    /// Drop every lane. Used at session close after all orders are
    /// canceled; the next session reseeds from the store.
    pub fn clear(&self) {
        self.lanes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RestingOrder, Side, Trader};

    #[tokio::test]
    async fn test_lane_is_shared_per_symbol() {
        let lanes = SymbolLanes::new();

        {
            let lane = lanes.lane("AAA");
            let mut book = lane.lock().await;
            book.insert(
                Side::Buy,
                RestingOrder::new(1, Trader::Customer(1), 1, 1000, 10, 1),
            );
        }

        // Second lookup sees the same book
        let lane = lanes.lane("AAA");
        let book = lane.lock().await;
        assert_eq!(book.cardinality(), 1);
    }

    #[tokio::test]
    async fn test_lanes_are_independent_across_symbols() {
        let lanes = SymbolLanes::new();
        lanes
            .lane("AAA")
            .lock()
            .await
            .insert(Side::Buy, RestingOrder::new(1, Trader::Bot, 1, 100, 1, 1));

        assert_eq!(lanes.lane("BBB").lock().await.cardinality(), 0);
        assert_eq!(lanes.symbols().len(), 2);

        lanes.clear();
        assert!(lanes.symbols().is_empty());
    }
}
