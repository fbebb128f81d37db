//! Indicative Equilibrium Price discovery
//!
//! Call-auction price selection over the aggregated book:
//!
//! 1. candidate prices = union of all resting prices on both sides
//! 2. at each candidate p: demand = buy lots with price >= p, supply =
//!    sell lots with price <= p, matched = min(demand, supply),
//!    surplus = demand - supply
//! 3. keep candidates with matched > 0
//! 4. pick max matched, then min |surplus|, then closest to the previous
//!    close, then the lowest price
//!
//! Execution at the IEP happens in the engine under the symbol lane; this
//! module is pure price discovery.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::Side;
use crate::orderbook::OrderBook;

/// Selected auction price with its crossing volume and imbalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IepQuote {
    pub price: i64,
    pub matched_volume: i64,
    pub surplus: i64,
}

/// Compute the IEP for a book, or None when no crossing is possible.
pub fn calculate(book: &OrderBook, prev_close: i64) -> Option<IepQuote> {
    // Aggregate remaining lots per price tick on each side.
    let mut buy_by_price: BTreeMap<i64, i64> = BTreeMap::new();
    for order in book.side(Side::Buy).iter() {
        if order.remaining > 0 {
            *buy_by_price.entry(order.price).or_insert(0) += order.remaining;
        }
    }
    let mut sell_by_price: BTreeMap<i64, i64> = BTreeMap::new();
    for order in book.side(Side::Sell).iter() {
        if order.remaining > 0 {
            *sell_by_price.entry(order.price).or_insert(0) += order.remaining;
        }
    }

    if buy_by_price.is_empty() || sell_by_price.is_empty() {
        return None;
    }

    let mut prices: Vec<i64> = buy_by_price
        .keys()
        .chain(sell_by_price.keys())
        .copied()
        .collect();
    prices.sort_unstable();
    prices.dedup();

    let mut candidates: Vec<IepQuote> = Vec::new();
    for &p in &prices {
        let demand: i64 = buy_by_price.range(p..).map(|(_, v)| v).sum();
        let supply: i64 = sell_by_price.range(..=p).map(|(_, v)| v).sum();
        let matched = demand.min(supply);
        if matched > 0 {
            candidates.push(IepQuote {
                price: p,
                matched_volume: matched,
                surplus: demand - supply,
            });
        }
    }

    // Tie-break chain: max volume, min |surplus|, closest to prev close,
    // lowest price. Candidates are already in ascending price order, so a
    // strict "better than" comparison leaves the lowest price on final ties.
    candidates.into_iter().reduce(|best, c| {
        let better = c.matched_volume > best.matched_volume
            || (c.matched_volume == best.matched_volume
                && (c.surplus.abs() < best.surplus.abs()
                    || (c.surplus.abs() == best.surplus.abs()
                        && (c.price - prev_close).abs() < (best.price - prev_close).abs())));
        if better {
            c
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RestingOrder, Trader};

    fn seed(book: &mut OrderBook, side: Side, id: i64, price: i64, qty: i64) {
        book.insert(
            side,
            RestingOrder::new(id, Trader::Customer(1), 1, price, qty, id),
        );
    }

    #[test]
    fn test_no_orders_no_iep() {
        let book = OrderBook::new();
        assert_eq!(calculate(&book, 1000), None);

        let mut one_sided = OrderBook::new();
        seed(&mut one_sided, Side::Buy, 1, 1000, 10);
        assert_eq!(calculate(&one_sided, 1000), None);
    }

    #[test]
    fn test_no_crossing_no_iep() {
        let mut book = OrderBook::new();
        seed(&mut book, Side::Buy, 1, 990, 10);
        seed(&mut book, Side::Sell, 2, 1000, 10);
        assert_eq!(calculate(&book, 995), None);
    }

    #[test]
    fn test_discovery_with_prev_close_tiebreak() {
        // BUY(1000,20) BUY(995,30) vs SELL(990,25) SELL(1000,10):
        // matched(990)=25, matched(995)=25, matched(1000)=20.
        // 990 and 995 tie on volume (25) and |surplus| (25); 995 is closer
        // to prev close 998.
        let mut book = OrderBook::new();
        seed(&mut book, Side::Buy, 1, 1000, 20);
        seed(&mut book, Side::Buy, 2, 995, 30);
        seed(&mut book, Side::Sell, 3, 990, 25);
        seed(&mut book, Side::Sell, 4, 1000, 10);

        let iep = calculate(&book, 998).unwrap();
        assert_eq!(iep.price, 995);
        assert_eq!(iep.matched_volume, 25);
        assert_eq!(iep.surplus, 25);
    }

    #[test]
    fn test_max_volume_wins() {
        // Crossing concentrated at 1000: demand(1000)=40, supply(1000)=35
        let mut book = OrderBook::new();
        seed(&mut book, Side::Buy, 1, 1005, 40);
        seed(&mut book, Side::Sell, 2, 995, 5);
        seed(&mut book, Side::Sell, 3, 1000, 30);

        let iep = calculate(&book, 900).unwrap();
        assert_eq!(iep.price, 1000);
        assert_eq!(iep.matched_volume, 35);
        assert_eq!(iep.surplus, 5);
    }

    #[test]
    fn test_min_surplus_breaks_volume_tie() {
        // Both 995 and 1000 match 10 lots; surplus differs.
        // demand(995)=30, supply(995)=10 -> surplus 20
        // demand(1000)=10, supply(1000)=25 -> surplus -15
        let mut book = OrderBook::new();
        seed(&mut book, Side::Buy, 1, 1000, 10);
        seed(&mut book, Side::Buy, 2, 995, 20);
        seed(&mut book, Side::Sell, 3, 995, 10);
        seed(&mut book, Side::Sell, 4, 1000, 15);

        let iep = calculate(&book, 0).unwrap();
        assert_eq!(iep.price, 1000);
        assert_eq!(iep.surplus, -15);
    }

    #[test]
    fn test_lowest_price_on_full_tie() {
        // Symmetric book: 990 and 1000 tie on volume and |surplus|, and sit
        // equally far from prev close 995 -> lowest price wins.
        let mut book = OrderBook::new();
        seed(&mut book, Side::Buy, 1, 1000, 10);
        seed(&mut book, Side::Sell, 2, 990, 10);

        let iep = calculate(&book, 995).unwrap();
        assert_eq!(iep.price, 990);
        assert_eq!(iep.matched_volume, 10);
        assert_eq!(iep.surplus, 0);
    }

    #[test]
    fn test_partial_fills_use_remaining() {
        let mut book = OrderBook::new();
        seed(&mut book, Side::Buy, 1, 1000, 20);
        seed(&mut book, Side::Sell, 2, 1000, 20);
        book.fill(Side::Buy, 1, 15);

        let iep = calculate(&book, 1000).unwrap();
        assert_eq!(iep.matched_volume, 5);
    }
}
