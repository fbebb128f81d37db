//! Order placement and cancellation pipeline
//!
//! The hot path keeps the symbol lane free while the reservation
//! transaction runs: validate and reserve in the store first, commit, and
//! only then take the lane lock for the book insert and match trigger.
//! Cancellation mirrors this: the refund commits before the best-effort
//! book removal; a removal miss is repaired lazily by the settlement
//! liveness check.

use std::sync::Arc;

use crate::core_types::{lot_value, now_ms, OrderId, UserId};
use crate::engine::MatchingEngine;
use crate::error::OrderError;
use crate::lanes::SymbolLanes;
use crate::models::{OrderStatus, RestingOrder, Side, Trader};
use crate::store::{self, Store};

#[derive(Debug)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

pub struct OrderGateway {
    store: Arc<Store>,
    lanes: Arc<SymbolLanes>,
    engine: Arc<MatchingEngine>,
}

impl OrderGateway {
    pub fn new(store: Arc<Store>, lanes: Arc<SymbolLanes>, engine: Arc<MatchingEngine>) -> Self {
        Self {
            store,
            lanes,
            engine,
        }
    }

    /// Validate, reserve and persist a new order. With the market in
    /// PRE_OPEN or OPEN the order also enters the book and triggers a
    /// match; while CLOSED it waits in the store for the next session.
    pub async fn place_order(
        &self,
        user_id: UserId,
        symbol: &str,
        side: Side,
        price: i64,
        quantity: i64,
    ) -> Result<PlacedOrder, OrderError> {
        let mut tx = self.store.pool().begin().await?;

        let ctx = store::sessions::placement_context(&mut tx, symbol)
            .await?
            .ok_or(OrderError::InvalidSymbol)?;
        if ctx.phase == crate::models::SessionPhase::Locked {
            return Err(OrderError::MarketLocked);
        }

        if !crate::market_rules::is_valid_tick(price) {
            return Err(OrderError::BadTick);
        }
        if price > ctx.ara_limit || price < ctx.arb_limit {
            return Err(OrderError::OutOfBand);
        }
        if quantity <= 0 {
            return Err(OrderError::BadQty);
        }

        let mut avg_price_at_order = None;
        match side {
            Side::Buy => {
                let cost = lot_value(price, quantity);
                let balance = store::users::balance_for_update(&mut tx, user_id)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                if balance < cost {
                    return Err(OrderError::InsufficientCash);
                }
                store::users::adjust_balance(&mut tx, user_id, -cost).await?;
            }
            Side::Sell => {
                let (owned, avg_price) =
                    store::portfolios::holding_for_update(&mut tx, user_id, ctx.stock_id)
                        .await?
                        .ok_or(OrderError::InsufficientHolding {
                            owned: 0,
                            locked: 0,
                        })?;
                let locked =
                    store::orders::locked_sell_quantity(&mut tx, user_id, ctx.stock_id).await?;
                if owned - locked < quantity {
                    return Err(OrderError::InsufficientHolding { owned, locked });
                }
                // Shares stay in the portfolio until settlement; the
                // locked-quantity check above is the reservation.
                avg_price_at_order = Some(avg_price);
            }
        }

        let order_id = store::orders::insert_order(
            &mut tx,
            user_id,
            ctx.stock_id,
            ctx.session_id,
            side,
            price,
            quantity,
            avg_price_at_order,
        )
        .await?;
        tx.commit().await?;

        if ctx.phase.accepts_book_entries() {
            let timestamp_ms = now_ms();
            let resting = RestingOrder {
                order_id,
                trader: Trader::Customer(user_id),
                stock_id: ctx.stock_id,
                price,
                quantity,
                remaining: quantity,
                timestamp_ms,
                avg_price_at_order,
            };
            {
                let lane = self.lanes.lane(symbol);
                lane.lock().await.insert(side, resting);
            }
            self.engine.spawn_match(symbol);
            tracing::info!(
                order_id,
                user_id,
                symbol,
                side = side.as_str(),
                price,
                quantity,
                phase = ctx.phase.as_str(),
                "Order placed"
            );
        } else {
            tracing::info!(
                order_id,
                user_id,
                symbol,
                side = side.as_str(),
                "Offline order stored, waiting for session open"
            );
        }

        Ok(PlacedOrder {
            order_id,
            status: OrderStatus::Pending,
        })
    }

    /// Cancel a live order: refund the BUY reservation, mark the row
    /// CANCELED, then drop the book entry and rebroadcast the depth.
    pub async fn cancel_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<(), OrderError> {
        let mut tx = self.store.pool().begin().await?;

        let target = store::orders::lock_for_cancel(&mut tx, order_id, user_id)
            .await?
            .ok_or(OrderError::NotCancelable)?;
        if !target.status.is_live() {
            return Err(OrderError::NotCancelable);
        }

        if target.side == Side::Buy {
            let refund = lot_value(target.price, target.remaining);
            store::users::adjust_balance(&mut tx, user_id, refund).await?;
        }
        // SELL reservations are purely the locked-quantity check; nothing
        // to put back.

        store::orders::mark_canceled(&mut tx, order_id).await?;
        tx.commit().await?;

        let lane = self.lanes.lane(&target.symbol);
        let mut book = lane.lock().await;
        if book.remove(target.side, order_id).is_none() {
            tracing::debug!(order_id, "Canceled order was not resting in the book");
        }
        self.engine.broadcast_depth(&target.symbol, &book);

        tracing::info!(order_id, user_id, symbol = %target.symbol, "Order canceled");
        Ok(())
    }

    /// Live (PENDING/PARTIAL) orders of a user.
    pub async fn active_orders(
        &self,
        user_id: UserId,
    ) -> Result<Vec<store::orders::OrderSummary>, OrderError> {
        Ok(store::orders::active_orders(self.store.pool(), user_id).await?)
    }

    /// The user's recent order history with realized PnL on sells.
    pub async fn order_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<store::orders::OrderSummary>, OrderError> {
        Ok(store::orders::order_history(self.store.pool(), user_id).await?)
    }
}
