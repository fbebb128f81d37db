//! OrderBook - BTreeMap-based price-time priority book index
//!
//! Each side keeps resting orders in a `BTreeMap` whose key encodes full
//! priority: `(rank, timestamp_ms, order_id)`. Bids use a negated price as
//! rank so the highest bid iterates first; asks rank by price directly. A
//! side `FxHashMap` from order id to key makes removal O(log n) without a
//! book scan.
//!
//! The book is authoritative during a session and is reseeded from the
//! persisted PENDING orders at session open.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::core_types::OrderId;
use crate::models::{DepthLevel, RestingOrder, Side};

/// Number of coalesced price levels included in depth broadcasts.
pub const DEPTH_LEVELS: usize = 20;

/// Full priority key: price rank, then arrival time, then id as a
/// deterministic tiebreak for same-millisecond arrivals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct BookKey {
    rank: i64,
    timestamp_ms: i64,
    order_id: OrderId,
}

impl BookKey {
    fn new(side: Side, order: &RestingOrder) -> Self {
        let rank = match side {
            Side::Buy => -order.price,
            Side::Sell => order.price,
        };
        Self {
            rank,
            timestamp_ms: order.timestamp_ms,
            order_id: order.order_id,
        }
    }
}

/// One side of the book (bids or asks), sorted best-first.
#[derive(Debug, Default)]
pub struct BookSide {
    entries: BTreeMap<BookKey, RestingOrder>,
    index: FxHashMap<OrderId, BookKey>,
}

impl BookSide {
    fn insert(&mut self, side: Side, order: RestingOrder) {
        let key = BookKey::new(side, &order);
        self.index.insert(order.order_id, key);
        self.entries.insert(key, order);
    }

    fn remove(&mut self, order_id: OrderId) -> Option<RestingOrder> {
        let key = self.index.remove(&order_id)?;
        self.entries.remove(&key)
    }

    /// Reduce a resting order by `qty` filled lots. Removes the entry when
    /// nothing remains; the priority key is untouched, so a partially
    /// filled order keeps its original time priority.
    fn fill(&mut self, order_id: OrderId, qty: i64) -> Option<i64> {
        let key = *self.index.get(&order_id)?;
        let remaining = {
            let order = self.entries.get_mut(&key)?;
            order.remaining -= qty;
            order.remaining
        };
        if remaining <= 0 {
            self.entries.remove(&key);
            self.index.remove(&order_id);
        }
        Some(remaining)
    }

    /// Best-priority resting order, if any.
    pub fn best(&self) -> Option<&RestingOrder> {
        self.entries.values().next()
    }

    /// Up to `n` best orders in priority order.
    pub fn top(&self, n: usize) -> Vec<RestingOrder> {
        self.entries.values().take(n).cloned().collect()
    }

    /// All resting orders at one price tick, in time priority.
    pub fn orders_at(&self, price: i64) -> Vec<&RestingOrder> {
        self.entries
            .values()
            .filter(|o| o.price == price)
            .collect()
    }

    /// Iterate the whole side in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &RestingOrder> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Coalesce consecutive equal-price entries into depth levels,
    /// truncated to `DEPTH_LEVELS`.
    pub fn depth(&self) -> Vec<DepthLevel> {
        let mut levels: Vec<DepthLevel> = Vec::new();
        for order in self.entries.values() {
            if order.remaining <= 0 {
                continue;
            }
            match levels.last_mut() {
                Some(level) if level.price == order.price => {
                    level.total_qty += order.remaining;
                    level.count += 1;
                }
                _ => {
                    if levels.len() == DEPTH_LEVELS {
                        break;
                    }
                    levels.push(DepthLevel {
                        price: order.price,
                        total_qty: order.remaining,
                        count: 1,
                    });
                }
            }
        }
        levels
    }
}

/// Per-symbol order book: a bid side and an ask side.
#[derive(Debug, Default)]
pub struct OrderBook {
    bids: BookSide,
    asks: BookSide,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    pub fn insert(&mut self, side: Side, order: RestingOrder) {
        self.side_mut(side).insert(side, order);
    }

    pub fn remove(&mut self, side: Side, order_id: OrderId) -> Option<RestingOrder> {
        self.side_mut(side).remove(order_id)
    }

    /// Apply a fill to a resting order; returns the remaining quantity.
    pub fn fill(&mut self, side: Side, order_id: OrderId, qty: i64) -> Option<i64> {
        self.side_mut(side).fill(order_id, qty)
    }

    pub fn best_bid(&self) -> Option<&RestingOrder> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<&RestingOrder> {
        self.asks.best()
    }

    /// Total resting orders across both sides.
    pub fn cardinality(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    /// Broadcast depth view: coalesced (bids, asks).
    pub fn depth(&self) -> (Vec<DepthLevel>, Vec<DepthLevel>) {
        (self.bids.depth(), self.asks.depth())
    }

    pub fn clear(&mut self) {
        self.bids = BookSide::default();
        self.asks = BookSide::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Trader;

    fn make_order(id: OrderId, price: i64, qty: i64, ts: i64) -> RestingOrder {
        RestingOrder::new(id, Trader::Customer(1), 1, price, qty, ts)
    }

    #[test]
    fn test_best_bid_ask() {
        let mut book = OrderBook::new();
        book.insert(Side::Buy, make_order(1, 1000, 10, 1));
        book.insert(Side::Buy, make_order(2, 995, 10, 2));
        book.insert(Side::Sell, make_order(3, 1005, 10, 3));
        book.insert(Side::Sell, make_order(4, 1010, 10, 4));

        assert_eq!(book.best_bid().unwrap().price, 1000);
        assert_eq!(book.best_ask().unwrap().price, 1005);
        assert_eq!(book.cardinality(), 4);
    }

    #[test]
    fn test_time_priority_at_same_price() {
        let mut book = OrderBook::new();
        book.insert(Side::Buy, make_order(2, 1000, 10, 200));
        book.insert(Side::Buy, make_order(1, 1000, 10, 100));

        // Earlier timestamp wins regardless of insertion order
        assert_eq!(book.best_bid().unwrap().order_id, 1);

        let top = book.side(Side::Buy).top(2);
        assert_eq!(top[0].order_id, 1);
        assert_eq!(top[1].order_id, 2);
    }

    #[test]
    fn test_order_id_tiebreak_same_millisecond() {
        let mut book = OrderBook::new();
        book.insert(Side::Sell, make_order(7, 1000, 10, 100));
        book.insert(Side::Sell, make_order(3, 1000, 10, 100));

        assert_eq!(book.best_ask().unwrap().order_id, 3);
    }

    #[test]
    fn test_remove() {
        let mut book = OrderBook::new();
        book.insert(Side::Buy, make_order(1, 1000, 10, 1));
        book.insert(Side::Buy, make_order(2, 990, 10, 2));

        let removed = book.remove(Side::Buy, 1).unwrap();
        assert_eq!(removed.order_id, 1);
        assert_eq!(book.best_bid().unwrap().order_id, 2);
        assert!(book.remove(Side::Buy, 99).is_none());
    }

    #[test]
    fn test_fill_keeps_priority() {
        let mut book = OrderBook::new();
        book.insert(Side::Buy, make_order(1, 1000, 10, 100));
        book.insert(Side::Buy, make_order(2, 1000, 10, 200));

        // Partial fill of the head order must not reset its position
        assert_eq!(book.fill(Side::Buy, 1, 4), Some(6));
        assert_eq!(book.best_bid().unwrap().order_id, 1);
        assert_eq!(book.best_bid().unwrap().remaining, 6);

        // Filling out removes the entry
        assert_eq!(book.fill(Side::Buy, 1, 6), Some(0));
        assert_eq!(book.best_bid().unwrap().order_id, 2);
        assert_eq!(book.fill(Side::Buy, 1, 1), None);
    }

    #[test]
    fn test_orders_at_price() {
        let mut book = OrderBook::new();
        book.insert(Side::Sell, make_order(1, 1000, 5, 1));
        book.insert(Side::Sell, make_order(2, 1000, 7, 2));
        book.insert(Side::Sell, make_order(3, 1005, 9, 3));

        let at_tick = book.side(Side::Sell).orders_at(1000);
        assert_eq!(at_tick.len(), 2);
        assert_eq!(at_tick[0].order_id, 1);
        assert_eq!(at_tick[1].order_id, 2);
    }

    #[test]
    fn test_depth_coalesces_levels() {
        let mut book = OrderBook::new();
        book.insert(Side::Buy, make_order(1, 1000, 5, 1));
        book.insert(Side::Buy, make_order(2, 1000, 7, 2));
        book.insert(Side::Buy, make_order(3, 995, 9, 3));

        let (bids, asks) = book.depth();
        assert!(asks.is_empty());
        assert_eq!(bids.len(), 2);
        assert_eq!(
            bids[0],
            DepthLevel {
                price: 1000,
                total_qty: 12,
                count: 2
            }
        );
        assert_eq!(
            bids[1],
            DepthLevel {
                price: 995,
                total_qty: 9,
                count: 1
            }
        );
    }

    #[test]
    fn test_depth_truncates_to_twenty_levels() {
        let mut book = OrderBook::new();
        for i in 0..30 {
            book.insert(Side::Sell, make_order(i + 1, 1000 + i * 5, 1, i));
        }
        let (_, asks) = book.depth();
        assert_eq!(asks.len(), DEPTH_LEVELS);
        assert_eq!(asks[0].price, 1000);
    }

    #[test]
    fn test_reseed_reproduces_top_of_book() {
        // Same orders inserted in a different arrival order yield an
        // identical priority view (session-open reseed equivalence).
        let orders = [
            make_order(1, 1000, 10, 100),
            make_order(2, 1000, 5, 50),
            make_order(3, 995, 8, 10),
        ];

        let mut live = OrderBook::new();
        for o in &orders {
            live.insert(Side::Buy, o.clone());
        }

        let mut reseeded = OrderBook::new();
        for o in orders.iter().rev() {
            reseeded.insert(Side::Buy, o.clone());
        }

        assert_eq!(live.side(Side::Buy).top(10), reseeded.side(Side::Buy).top(10));
    }
}
