//! Matching engine - continuous matching and trade settlement
//!
//! All matching for a symbol runs under that symbol's lane lock. During
//! PRE_OPEN and LOCKED the engine only recomputes and broadcasts the IEP;
//! while OPEN it sweeps the book pairwise in price-time priority. Each
//! executed pair is settled in a single DB transaction, then mirrored into
//! the book and pushed to subscribers.

use std::sync::Arc;

use crate::core_types::{lot_value, now_ms};
use crate::events::{Event, EventBus};
use crate::iep;
use crate::lanes::SymbolLanes;
use crate::models::{OrderStatus, RestingOrder, SessionPhase, Side, Trader};
use crate::orderbook::OrderBook;
use crate::session::MarketState;
use crate::store::{self, Store};

/// Upper bound on pairs executed per match pass. A still-crossing book is
/// picked up by the next Match invocation.
pub const MAX_ITER: usize = 100;

/// Continuous-mode execution price: the earlier order sets the price, the
/// later one is the aggressor. Same-millisecond arrivals resolve to the
/// sell side's price.
pub fn execution_price(buy: &RestingOrder, sell: &RestingOrder) -> i64 {
    if buy.timestamp_ms >= sell.timestamp_ms {
        sell.price
    } else {
        buy.price
    }
}

/// The next crossing pair of a book, with execution price and quantity.
/// None when either side is empty or best bid < best ask.
pub fn next_cross(book: &OrderBook) -> Option<(RestingOrder, RestingOrder, i64, i64)> {
    let buy = book.best_bid()?;
    let sell = book.best_ask()?;
    if buy.price < sell.price {
        return None;
    }
    let qty = buy.remaining.min(sell.remaining);
    Some((buy.clone(), sell.clone(), execution_price(buy, sell), qty))
}

/// Result of a settlement attempt.
pub enum SettleOutcome {
    Executed,
    /// One or both sides were no longer live in the store (phantom book
    /// entries); nothing was written.
    Stale { buy: bool, sell: bool },
}

#[derive(Clone)]
pub struct MatchingEngine {
    store: Arc<Store>,
    lanes: Arc<SymbolLanes>,
    bus: Arc<EventBus>,
    market: Arc<MarketState>,
}

impl MatchingEngine {
    pub fn new(
        store: Arc<Store>,
        lanes: Arc<SymbolLanes>,
        bus: Arc<EventBus>,
        market: Arc<MarketState>,
    ) -> Self {
        Self {
            store,
            lanes,
            bus,
            market,
        }
    }

    /// Fire-and-forget match trigger (the order placement hot path must
    /// not wait for the sweep).
    pub fn spawn_match(&self, symbol: &str) {
        let engine = self.clone();
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            engine.match_symbol(&symbol).await;
        });
    }

    /// One serialized match pass for a symbol, dispatching on the phase.
    pub async fn match_symbol(&self, symbol: &str) {
        let lane = self.lanes.lane(symbol);
        let mut book = lane.lock().await;

        match self.market.phase() {
            SessionPhase::PreOpen | SessionPhase::Locked => {
                self.refresh_iep(symbol, &book).await;
            }
            SessionPhase::Open => {
                self.run_continuous(symbol, &mut book).await;
                self.broadcast_depth(symbol, &book);
            }
            SessionPhase::Closed => {}
        }
    }

    /// LOCKED -> OPEN boundary: cross the book once at the IEP, then fall
    /// through to continuous matching. Runs under the same lane lock.
    pub async fn open_auction(&self, symbol: &str) {
        let lane = self.lanes.lane(symbol);
        let mut book = lane.lock().await;

        self.run_iep_cross(symbol, &mut book).await;
        self.run_continuous(symbol, &mut book).await;
        self.broadcast_depth(symbol, &book);
    }

    /// Recompute the indicative price and push it to the symbol room.
    async fn refresh_iep(&self, symbol: &str, book: &OrderBook) {
        let prev_close = self.prev_close(symbol).await;
        let quote = iep::calculate(book, prev_close);
        self.bus.emit(
            symbol,
            Event::IepUpdate {
                symbol: symbol.to_string(),
                iep: quote,
            },
        );
    }

    async fn prev_close(&self, symbol: &str) -> i64 {
        match store::sessions::daily_snapshot(self.store.pool(), symbol).await {
            Ok(Some(snap)) => snap.prev_close,
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Failed to load reference price");
                0
            }
        }
    }

    async fn run_continuous(&self, symbol: &str, book: &mut OrderBook) {
        for _ in 0..MAX_ITER {
            let Some((buy, sell, exec_price, exec_qty)) = next_cross(book) else {
                break;
            };

            match self.settle_trade(&buy, &sell, exec_price, exec_qty).await {
                Ok(SettleOutcome::Executed) => {
                    self.apply_and_notify(symbol, book, &buy, &sell, exec_price, exec_qty)
                        .await;
                }
                Ok(SettleOutcome::Stale {
                    buy: stale_buy,
                    sell: stale_sell,
                }) => {
                    // Lazy removal of entries the store no longer backs.
                    if stale_buy {
                        book.remove(Side::Buy, buy.order_id);
                    }
                    if stale_sell {
                        book.remove(Side::Sell, sell.order_id);
                    }
                    tracing::warn!(
                        symbol,
                        buy_order = buy.order_id,
                        sell_order = sell.order_id,
                        "Dropped phantom book entries"
                    );
                }
                Err(e) => {
                    tracing::error!(symbol, error = %e, "Trade settlement failed, aborting match pass");
                    break;
                }
            }
        }
    }

    async fn run_iep_cross(&self, symbol: &str, book: &mut OrderBook) {
        let prev_close = self.prev_close(symbol).await;
        let Some(quote) = iep::calculate(book, prev_close) else {
            return;
        };
        tracing::info!(
            symbol,
            price = quote.price,
            volume = quote.matched_volume,
            "Executing opening auction"
        );

        // Both sides iterate best-first, so the filters keep price-time
        // priority among eligible orders.
        let mut buys: Vec<RestingOrder> = book
            .side(Side::Buy)
            .iter()
            .filter(|o| o.price >= quote.price)
            .cloned()
            .collect();
        let mut sells: Vec<RestingOrder> = book
            .side(Side::Sell)
            .iter()
            .filter(|o| o.price <= quote.price)
            .cloned()
            .collect();

        let mut volume_left = quote.matched_volume;
        let (mut bi, mut si) = (0usize, 0usize);

        while volume_left > 0 && bi < buys.len() && si < sells.len() {
            let exec_qty = buys[bi].remaining.min(sells[si].remaining).min(volume_left);
            let buy = buys[bi].clone();
            let sell = sells[si].clone();

            match self.settle_trade(&buy, &sell, quote.price, exec_qty).await {
                Ok(SettleOutcome::Executed) => {
                    buys[bi].remaining -= exec_qty;
                    sells[si].remaining -= exec_qty;
                    volume_left -= exec_qty;
                    self.apply_and_notify(symbol, book, &buy, &sell, quote.price, exec_qty)
                        .await;
                    if buys[bi].remaining == 0 {
                        bi += 1;
                    }
                    if sells[si].remaining == 0 {
                        si += 1;
                    }
                }
                Ok(SettleOutcome::Stale {
                    buy: stale_buy,
                    sell: stale_sell,
                }) => {
                    if stale_buy {
                        book.remove(Side::Buy, buy.order_id);
                        bi += 1;
                    }
                    if stale_sell {
                        book.remove(Side::Sell, sell.order_id);
                        si += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(symbol, error = %e, "Auction settlement failed");
                    break;
                }
            }
        }
    }

    /// One DB transaction for one executed pair. Steps: defensive liveness
    /// check, trade row, order fills, price-improvement refund, seller
    /// credit + holding decrement, buyer holding upsert, daily stats.
    pub(crate) async fn settle_trade(
        &self,
        buy: &RestingOrder,
        sell: &RestingOrder,
        exec_price: i64,
        exec_qty: i64,
    ) -> Result<SettleOutcome, sqlx::Error> {
        let mut tx = self.store.pool().begin().await?;

        let stale_buy = !buy.trader.is_bot()
            && store::orders::live_remaining(&mut tx, buy.order_id)
                .await?
                .is_none();
        let stale_sell = !sell.trader.is_bot()
            && store::orders::live_remaining(&mut tx, sell.order_id)
                .await?
                .is_none();
        if stale_buy || stale_sell {
            tx.rollback().await?;
            return Ok(SettleOutcome::Stale {
                buy: stale_buy,
                sell: stale_sell,
            });
        }

        store::trades::insert_trade(
            &mut tx,
            buy.trader.user_id().map(|_| buy.order_id),
            sell.trader.user_id().map(|_| sell.order_id),
            buy.stock_id,
            exec_price,
            exec_qty,
        )
        .await?;

        if let Trader::Customer(buyer) = buy.trader {
            store::orders::apply_fill(&mut tx, buy.order_id, buy.remaining - exec_qty).await?;
            if exec_price < buy.price {
                // The bid reserved more cash than the execution consumed.
                let refund = lot_value(buy.price - exec_price, exec_qty);
                store::users::adjust_balance(&mut tx, buyer, refund).await?;
            }
            store::portfolios::apply_buy(&mut tx, buyer, buy.stock_id, exec_qty, exec_price)
                .await?;
        }

        if let Trader::Customer(seller) = sell.trader {
            store::orders::apply_fill(&mut tx, sell.order_id, sell.remaining - exec_qty).await?;
            store::users::adjust_balance(&mut tx, seller, lot_value(exec_price, exec_qty)).await?;
            store::portfolios::apply_sell(&mut tx, seller, sell.stock_id, exec_qty).await?;
        }

        store::sessions::record_trade_stats(&mut tx, buy.stock_id, exec_price, exec_qty).await?;

        tx.commit().await?;

        tracing::info!(
            stock_id = buy.stock_id,
            price = exec_price,
            qty = exec_qty,
            buyer = %buy.trader,
            seller = %sell.trader,
            "Trade executed"
        );
        Ok(SettleOutcome::Executed)
    }

    /// Mirror a committed trade into the book and push events. The book
    /// entries keep their original timestamps; a partially filled order
    /// keeps its time priority.
    async fn apply_and_notify(
        &self,
        symbol: &str,
        book: &mut OrderBook,
        buy: &RestingOrder,
        sell: &RestingOrder,
        exec_price: i64,
        exec_qty: i64,
    ) {
        book.fill(Side::Buy, buy.order_id, exec_qty);
        book.fill(Side::Sell, sell.order_id, exec_qty);

        let ts = now_ms();
        self.bus.emit(
            symbol,
            Event::Trade {
                symbol: symbol.to_string(),
                price: exec_price,
                quantity: exec_qty,
                timestamp_ms: ts,
            },
        );

        for (side, order) in [(Side::Buy, buy), (Side::Sell, sell)] {
            if let Trader::Customer(user_id) = order.trader {
                let remaining = order.remaining - exec_qty;
                let status = OrderStatus::after_fill(remaining);
                self.bus.emit_to_user(
                    user_id,
                    Event::OrderMatched {
                        symbol: symbol.to_string(),
                        side,
                        price: exec_price,
                        quantity: exec_qty,
                        status,
                    },
                );
                self.bus.emit_to_user(
                    user_id,
                    Event::OrderStatus {
                        order_id: order.order_id,
                        symbol: symbol.to_string(),
                        side,
                        status,
                        price: exec_price,
                        matched_quantity: exec_qty,
                        remaining_quantity: remaining,
                        timestamp_ms: ts,
                    },
                );
            }
        }

        self.publish_price(symbol, exec_price).await;
    }

    /// Last-price feed for the symbol room, relative to the previous close.
    async fn publish_price(&self, symbol: &str, last_price: i64) {
        let snap = match store::sessions::daily_snapshot(self.store.pool(), symbol).await {
            Ok(Some(snap)) => snap,
            _ => return,
        };
        let change = last_price - snap.prev_close;
        let change_percent = if snap.prev_close > 0 {
            change as f64 * 100.0 / snap.prev_close as f64
        } else {
            0.0
        };
        self.bus.emit(
            symbol,
            Event::PriceUpdate {
                symbol: symbol.to_string(),
                last_price,
                change,
                change_percent,
                volume: snap.volume,
                timestamp_ms: now_ms(),
            },
        );
    }

    /// Push the current coalesced depth to the symbol room.
    pub fn broadcast_depth(&self, symbol: &str, book: &OrderBook) {
        let (bids, asks) = book.depth();
        self.bus.emit(
            symbol,
            Event::OrderbookUpdate {
                symbol: symbol.to_string(),
                bids,
                asks,
                timestamp_ms: now_ms(),
            },
        );
    }

    /// Compute the current IEP for a symbol without mutating anything
    /// (market data endpoint).
    pub async fn current_iep(&self, symbol: &str) -> Option<iep::IepQuote> {
        let prev_close = self.prev_close(symbol).await;
        let lane = self.lanes.lane(symbol);
        let book = lane.lock().await;
        iep::calculate(&book, prev_close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Trader;

    fn resting(id: i64, price: i64, qty: i64, ts: i64) -> RestingOrder {
        RestingOrder::new(id, Trader::Customer(1), 1, price, qty, ts)
    }

    #[test]
    fn test_earlier_buy_sets_price() {
        let buy = resting(1, 1050, 5, 100);
        let sell = resting(2, 1000, 5, 200);
        // Buy was resting first; the incoming sell is the aggressor.
        assert_eq!(execution_price(&buy, &sell), 1050);
    }

    #[test]
    fn test_earlier_sell_sets_price() {
        let buy = resting(1, 1050, 5, 300);
        let sell = resting(2, 1000, 5, 200);
        assert_eq!(execution_price(&buy, &sell), 1000);
    }

    #[test]
    fn test_same_millisecond_uses_sell_price() {
        let buy = resting(1, 1050, 5, 200);
        let sell = resting(2, 1000, 5, 200);
        assert_eq!(execution_price(&buy, &sell), 1000);
    }

    #[test]
    fn test_next_cross_empty_or_uncrossed() {
        let mut book = OrderBook::new();
        assert!(next_cross(&book).is_none());

        book.insert(Side::Buy, resting(1, 990, 10, 1));
        book.insert(Side::Sell, resting(2, 1000, 10, 2));
        assert!(next_cross(&book).is_none());
    }

    #[test]
    fn test_next_cross_picks_best_pair_and_min_qty() {
        let mut book = OrderBook::new();
        book.insert(Side::Buy, resting(1, 1010, 8, 1));
        book.insert(Side::Buy, resting(2, 1000, 10, 2));
        book.insert(Side::Sell, resting(3, 1000, 5, 3));
        book.insert(Side::Sell, resting(4, 1010, 10, 4));

        let (buy, sell, price, qty) = next_cross(&book).unwrap();
        assert_eq!(buy.order_id, 1);
        assert_eq!(sell.order_id, 3);
        // Buy rested earlier: its price wins.
        assert_eq!(price, 1010);
        assert_eq!(qty, 5);
    }

    #[test]
    fn test_next_cross_equal_prices() {
        let mut book = OrderBook::new();
        book.insert(Side::Buy, resting(1, 1000, 5, 10));
        book.insert(Side::Sell, resting(2, 1000, 5, 20));

        let (_, _, price, qty) = next_cross(&book).unwrap();
        assert_eq!(price, 1000);
        assert_eq!(qty, 5);
    }
}
