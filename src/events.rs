//! Event bus for real-time push notifications
//!
//! Room-based fan-out: one room per symbol plus one `user:<id>` room per
//! connected user. Delivery is fire-and-forget over unbounded channels so
//! the matching loop never blocks on a slow client; dead subscribers are
//! dropped lazily on the next emit.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::core_types::{OrderId, UserId};
use crate::iep::IepQuote;
use crate::models::{DepthLevel, OrderStatus, Side};

/// Unique subscriber (connection) identifier.
pub type SubscriberId = u64;

pub type EventSender = mpsc::UnboundedSender<Event>;

/// Push events, serialized as `{"event": ..., "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    OrderbookUpdate {
        symbol: String,
        bids: Vec<DepthLevel>,
        asks: Vec<DepthLevel>,
        timestamp_ms: i64,
    },
    Trade {
        symbol: String,
        price: i64,
        quantity: i64,
        timestamp_ms: i64,
    },
    IepUpdate {
        symbol: String,
        iep: Option<IepQuote>,
    },
    PriceUpdate {
        symbol: String,
        last_price: i64,
        change: i64,
        change_percent: f64,
        volume: i64,
        timestamp_ms: i64,
    },
    OrderMatched {
        symbol: String,
        side: Side,
        price: i64,
        quantity: i64,
        status: OrderStatus,
    },
    OrderStatus {
        order_id: OrderId,
        symbol: String,
        side: Side,
        status: OrderStatus,
        price: i64,
        matched_quantity: i64,
        remaining_quantity: i64,
        timestamp_ms: i64,
    },
    Connected {
        user_id: UserId,
    },
    Pong,
}

/// Room name for a user's private notifications.
pub fn user_room(user_id: UserId) -> String {
    format!("user:{}", user_id)
}

/// Thread-safe room registry.
pub struct EventBus {
    rooms: DashMap<String, Vec<(SubscriberId, EventSender)>>,
    next_subscriber_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a new connection.
    pub fn next_subscriber_id(&self) -> SubscriberId {
        self.next_subscriber_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Join a room. One subscriber may sit in many rooms.
    pub fn join(&self, room: &str, subscriber: SubscriberId, tx: EventSender) {
        let mut members = self.rooms.entry(room.to_string()).or_default();
        if !members.iter().any(|(id, _)| *id == subscriber) {
            members.push((subscriber, tx));
        }
    }

    /// Leave a single room.
    pub fn leave(&self, room: &str, subscriber: SubscriberId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.retain(|(id, _)| *id != subscriber);
            if members.is_empty() {
                drop(members);
                self.rooms.remove(room);
            }
        }
    }

    /// Remove a subscriber from every room (connection closed).
    pub fn leave_all(&self, subscriber: SubscriberId) {
        let mut emptied: Vec<String> = Vec::new();
        for mut entry in self.rooms.iter_mut() {
            entry.value_mut().retain(|(id, _)| *id != subscriber);
            if entry.value().is_empty() {
                emptied.push(entry.key().clone());
            }
        }
        for room in emptied {
            self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
    }

    /// Send an event to every subscriber of a room. Closed receivers are
    /// pruned on the spot.
    pub fn emit(&self, room: &str, event: Event) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        }
    }

    /// Send an event to a user's private room.
    pub fn emit_to_user(&self, user_id: UserId, event: Event) {
        self.emit(&user_room(user_id), event);
    }

    /// (rooms, total subscriptions) - for health and shutdown logs.
    pub fn stats(&self) -> (usize, usize) {
        let rooms = self.rooms.len();
        let subs = self.rooms.iter().map(|e| e.value().len()).sum();
        (rooms, subs)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_emit_leave() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = bus.next_subscriber_id();

        bus.join("AAA", sub, tx);
        bus.emit("AAA", Event::Pong);

        assert!(matches!(rx.try_recv().unwrap(), Event::Pong));

        bus.leave("AAA", sub);
        bus.emit("AAA", Event::Pong);
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.stats(), (0, 0));
    }

    #[test]
    fn test_emit_skips_other_rooms() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = bus.next_subscriber_id();

        bus.join("AAA", sub, tx);
        bus.emit("BBB", Event::Pong);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dead_subscribers_are_pruned() {
        let bus = EventBus::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = bus.next_subscriber_id();

        bus.join("AAA", sub, tx);
        drop(rx);
        bus.emit("AAA", Event::Pong);
        assert_eq!(bus.stats().1, 0);
    }

    #[test]
    fn test_leave_all_clears_every_room() {
        let bus = EventBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let sub = bus.next_subscriber_id();

        bus.join("AAA", sub, tx.clone());
        bus.join(&user_room(7), sub, tx);
        assert_eq!(bus.stats(), (2, 2));

        bus.leave_all(sub);
        assert_eq!(bus.stats(), (0, 0));
    }

    #[test]
    fn test_event_wire_format() {
        let event = Event::Trade {
            symbol: "AAA".into(),
            price: 1000,
            quantity: 5,
            timestamp_ms: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "trade");
        assert_eq!(json["data"]["symbol"], "AAA");
        assert_eq!(json["data"]["price"], 1000);
    }
}
