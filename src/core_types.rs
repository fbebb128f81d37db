//! Core types used throughout the system
//!
//! Fundamental aliases and constants shared by all modules. They carry
//! semantic meaning and keep the DB column types (`BIGSERIAL`/`BIGINT`,
//! `SERIAL`/`INT`) in one place.

use rust_decimal::Decimal;

/// Order ID - primary key of the `orders` table (`BIGSERIAL`).
///
/// Synthetic liquidity orders (SYSTEM_BOT) live only in the in-memory book
/// and are assigned ids from a disjoint negative range so they can never
/// collide with persisted orders.
pub type OrderId = i64;

/// User ID - primary key of the `users` table.
pub type UserId = i64;

/// Stock ID - primary key of the `stocks` table (`SERIAL`).
pub type StockId = i32;

/// Trading session ID - primary key of the `trading_sessions` table.
pub type SessionId = i32;

/// Shares per lot. All quantities in the system are lots; the monetary
/// value of a fill is `price * qty_lots * LOT_SHARES`.
pub const LOT_SHARES: i64 = 100;

/// Monetary value of `qty` lots at `price` per share.
#[inline]
pub fn lot_value(price: i64, qty: i64) -> Decimal {
    Decimal::from(price * qty * LOT_SHARES)
}

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// This is the timestamp recorded on resting orders at book insertion;
/// time priority is decided by it.
#[inline]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lot_value() {
        // 5 lots @ 1000 = 1000 * 5 * 100 = 500_000
        assert_eq!(lot_value(1000, 5), Decimal::from(500_000));
        assert_eq!(lot_value(0, 10), Decimal::ZERO);
    }

    #[test]
    fn test_lot_value_refund_delta() {
        // Price improvement: bid 1050, executed 1000, 5 lots -> 25_000 back
        let refund = lot_value(1050 - 1000, 5);
        assert_eq!(refund, Decimal::from(25_000));
    }
}
