// models.rs - Core order, trade and session types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{OrderId, StockId, UserId};

/// Sentinel identity for synthetic liquidity orders. Their trades are
/// recorded with NULL order-id columns and they never touch balances or
/// portfolios.
pub const SYSTEM_BOT: &str = "SYSTEM_BOT";

/// Order side: Buy or Sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// DB column / API representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Side> {
        match s {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Order status - lifecycle of a persisted order
///
/// PENDING -> PARTIAL -> MATCHED, or PENDING/PARTIAL -> CANCELED.
/// MATCHED and CANCELED are terminal; terminal orders are never in the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Partial,
    Matched,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Partial => "PARTIAL",
            OrderStatus::Matched => "MATCHED",
            OrderStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> Option<OrderStatus> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "PARTIAL" => Some(OrderStatus::Partial),
            "MATCHED" => Some(OrderStatus::Matched),
            "CANCELED" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }

    /// Status of an order after a fill leaves `remaining` lots.
    pub fn after_fill(remaining: i64) -> OrderStatus {
        if remaining > 0 {
            OrderStatus::Partial
        } else {
            OrderStatus::Matched
        }
    }

    /// PENDING and PARTIAL orders rest in the book and can be canceled.
    pub fn is_live(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Partial)
    }
}

/// Trading session phase
///
/// CLOSED -> PRE_OPEN -> LOCKED -> OPEN -> CLOSED. Orders are accepted in
/// every phase except LOCKED; continuous matching runs only while OPEN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    Closed,
    PreOpen,
    Locked,
    Open,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Closed => "CLOSED",
            SessionPhase::PreOpen => "PRE_OPEN",
            SessionPhase::Locked => "LOCKED",
            SessionPhase::Open => "OPEN",
        }
    }

    pub fn parse(s: &str) -> Option<SessionPhase> {
        match s {
            "CLOSED" => Some(SessionPhase::Closed),
            "PRE_OPEN" => Some(SessionPhase::PreOpen),
            "LOCKED" => Some(SessionPhase::Locked),
            "OPEN" => Some(SessionPhase::Open),
            _ => None,
        }
    }

    /// Phases during which a new order is inserted into the book.
    pub fn accepts_book_entries(&self) -> bool {
        matches!(self, SessionPhase::PreOpen | SessionPhase::Open)
    }
}

/// Who placed an order: a real customer or the synthetic liquidity bot.
///
/// Every settlement branch dispatches on this tag: the bot side of a trade
/// skips the order, balance and portfolio updates entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trader {
    Customer(UserId),
    Bot,
}

impl Trader {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Trader::Customer(id) => Some(*id),
            Trader::Bot => None,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Trader::Bot)
    }
}

impl std::fmt::Display for Trader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trader::Customer(id) => write!(f, "{}", id),
            Trader::Bot => write!(f, "{}", SYSTEM_BOT),
        }
    }
}

/// A resting order as held by the in-memory book.
///
/// `timestamp_ms` is fixed at book insertion and preserved across partial
/// fills - time priority is never reset. For SELL orders of real users,
/// `avg_price_at_order` snapshots the holding's average buy price at entry
/// for later PnL reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct RestingOrder {
    pub order_id: OrderId,
    pub trader: Trader,
    pub stock_id: StockId,
    pub price: i64,
    pub quantity: i64,
    pub remaining: i64,
    pub timestamp_ms: i64,
    pub avg_price_at_order: Option<Decimal>,
}

impl RestingOrder {
    pub fn new(
        order_id: OrderId,
        trader: Trader,
        stock_id: StockId,
        price: i64,
        quantity: i64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            order_id,
            trader,
            stock_id,
            price,
            quantity,
            remaining: quantity,
            timestamp_ms,
            avg_price_at_order: None,
        }
    }
}

/// One coalesced price level of the broadcast depth view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepthLevel {
    pub price: i64,
    #[serde(rename = "totalQty")]
    pub total_qty: i64,
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_round_trip() {
        assert_eq!(Side::parse(Side::Buy.as_str()), Some(Side::Buy));
        assert_eq!(Side::parse(Side::Sell.as_str()), Some(Side::Sell));
        assert_eq!(Side::parse("HOLD"), None);
    }

    #[test]
    fn test_status_after_fill() {
        assert_eq!(OrderStatus::after_fill(0), OrderStatus::Matched);
        assert_eq!(OrderStatus::after_fill(3), OrderStatus::Partial);
    }

    #[test]
    fn test_status_liveness() {
        assert!(OrderStatus::Pending.is_live());
        assert!(OrderStatus::Partial.is_live());
        assert!(!OrderStatus::Matched.is_live());
        assert!(!OrderStatus::Canceled.is_live());
    }

    #[test]
    fn test_phase_book_entry_gate() {
        assert!(SessionPhase::PreOpen.accepts_book_entries());
        assert!(SessionPhase::Open.accepts_book_entries());
        assert!(!SessionPhase::Locked.accepts_book_entries());
        assert!(!SessionPhase::Closed.accepts_book_entries());
    }

    #[test]
    fn test_phase_round_trip() {
        for phase in [
            SessionPhase::Closed,
            SessionPhase::PreOpen,
            SessionPhase::Locked,
            SessionPhase::Open,
        ] {
            assert_eq!(SessionPhase::parse(phase.as_str()), Some(phase));
        }
    }

    #[test]
    fn test_trader_bot_display() {
        assert_eq!(Trader::Bot.to_string(), SYSTEM_BOT);
        assert_eq!(Trader::Customer(42).to_string(), "42");
        assert_eq!(Trader::Bot.user_id(), None);
        assert_eq!(Trader::Customer(42).user_id(), Some(42));
    }
}
