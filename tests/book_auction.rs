//! Book + auction integration without a database: priority, crossing
//! decisions and IEP discovery working together on one book.

use bursa::engine::{execution_price, next_cross};
use bursa::iep;
use bursa::market_rules;
use bursa::models::{RestingOrder, Side, Trader};
use bursa::orderbook::OrderBook;

fn customer(id: i64, user: i64, price: i64, qty: i64, ts: i64) -> RestingOrder {
    RestingOrder::new(id, Trader::Customer(user), 1, price, qty, ts)
}

fn bot(id: i64, price: i64, qty: i64, ts: i64) -> RestingOrder {
    RestingOrder::new(id, Trader::Bot, 1, price, qty, ts)
}

#[test]
fn partial_fill_then_time_priority() {
    // A1 and A2 bid the same price; a large sell fills A1 fully and A2
    // partially. A2 must keep its original slot for the next sweep.
    let mut book = OrderBook::new();
    book.insert(Side::Buy, customer(1, 10, 1000, 10, 1));
    book.insert(Side::Buy, customer(2, 20, 1000, 10, 2));
    book.insert(Side::Sell, customer(3, 30, 1000, 15, 3));

    // First pair: A1 vs the sell, 10 lots.
    let (buy, sell, price, qty) = next_cross(&book).unwrap();
    assert_eq!(buy.order_id, 1);
    assert_eq!(price, 1000);
    assert_eq!(qty, 10);
    book.fill(Side::Buy, buy.order_id, qty);
    book.fill(Side::Sell, sell.order_id, qty);

    // Second pair: A2 vs the sell remainder, 5 lots.
    let (buy, sell, price, qty) = next_cross(&book).unwrap();
    assert_eq!(buy.order_id, 2);
    assert_eq!(sell.order_id, 3);
    assert_eq!(price, 1000);
    assert_eq!(qty, 5);
    book.fill(Side::Buy, buy.order_id, qty);
    book.fill(Side::Sell, sell.order_id, qty);

    // A2 rests with 5 lots at its original timestamp; the book no longer
    // crosses.
    assert!(next_cross(&book).is_none());
    let rest = book.best_bid().unwrap();
    assert_eq!(rest.order_id, 2);
    assert_eq!(rest.remaining, 5);
    assert_eq!(rest.timestamp_ms, 2);
    assert!(book.best_ask().is_none());
}

#[test]
fn resting_book_never_crosses_after_sweep() {
    let mut book = OrderBook::new();
    book.insert(Side::Buy, customer(1, 10, 1010, 8, 1));
    book.insert(Side::Buy, customer(2, 20, 1000, 5, 2));
    book.insert(Side::Sell, customer(3, 30, 1005, 6, 3));
    book.insert(Side::Sell, customer(4, 40, 1020, 9, 4));

    // Sweep until quiescent, the way the engine's match pass does.
    while let Some((buy, sell, _price, qty)) = next_cross(&book) {
        book.fill(Side::Buy, buy.order_id, qty);
        book.fill(Side::Sell, sell.order_id, qty);
    }

    if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
        assert!(bid.price < ask.price, "book at rest must not cross");
    }
}

#[test]
fn aggressor_price_rule_favors_resting_order() {
    // Sell rested first: an aggressive higher bid trades at the sell's
    // price, which is what funds the buyer's price-improvement refund.
    let sell = customer(1, 10, 1000, 5, 100);
    let buy = customer(2, 20, 1050, 5, 200);
    assert_eq!(execution_price(&buy, &sell), 1000);

    // Buy rested first: the later sell takes the bid price.
    let buy = customer(3, 30, 1050, 5, 100);
    let sell = customer(4, 40, 1000, 5, 200);
    assert_eq!(execution_price(&buy, &sell), 1050);
}

#[test]
fn bot_orders_share_the_book_with_customers() {
    // Synthetic liquidity uses negative ids, disjoint from DB ids, and
    // competes on the same price-time terms.
    let mut book = OrderBook::new();
    book.insert(Side::Sell, bot(-1, 1000, 5, 50));
    book.insert(Side::Sell, customer(7, 70, 1000, 5, 100));
    book.insert(Side::Buy, customer(8, 80, 1000, 8, 200));

    let (buy, sell, _price, qty) = next_cross(&book).unwrap();
    assert_eq!(buy.order_id, 8);
    assert_eq!(sell.order_id, -1, "earlier bot order has time priority");
    assert!(sell.trader.is_bot());
    assert_eq!(qty, 5);

    book.fill(Side::Buy, buy.order_id, qty);
    book.fill(Side::Sell, sell.order_id, qty);

    let (_, sell, _, qty) = next_cross(&book).unwrap();
    assert_eq!(sell.order_id, 7);
    assert_eq!(qty, 3);
}

#[test]
fn preopen_book_feeds_iep_then_depth() {
    // The S5 shape: during pre-open the book accumulates without
    // crossing; the IEP settles on 995 against a 998 reference price.
    let mut book = OrderBook::new();
    book.insert(Side::Buy, customer(1, 10, 1000, 20, 1));
    book.insert(Side::Buy, customer(2, 20, 995, 30, 2));
    book.insert(Side::Sell, customer(3, 30, 990, 25, 3));
    book.insert(Side::Sell, customer(4, 40, 1000, 10, 4));

    let quote = iep::calculate(&book, 998).unwrap();
    assert_eq!(quote.price, 995);
    assert_eq!(quote.matched_volume, 25);

    // The quoted price is band-legal for a 1000 prev close.
    let (ara, arb) = market_rules::auto_reject_limits(1000);
    assert!(quote.price <= ara && quote.price >= arb);
    assert!(market_rules::is_valid_tick(quote.price));

    // Depth aggregation sees both sides, best first.
    let (bids, asks) = book.depth();
    assert_eq!(bids[0].price, 1000);
    assert_eq!(bids[0].total_qty, 20);
    assert_eq!(asks[0].price, 990);
    assert_eq!(asks[1].price, 1000);
}

#[test]
fn tick_and_band_gate_examples() {
    // prev_close 300: tick 2 above 200, band [225, 375].
    let (ara, arb) = market_rules::auto_reject_limits(300);
    assert_eq!((ara, arb), (375, 225));
    assert!(!market_rules::is_valid_tick(301));
    assert!(market_rules::is_valid_tick(302));
    assert!(400 > ara, "400 must be rejected as out of band");
}
