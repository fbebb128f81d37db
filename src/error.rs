//! Order pipeline error taxonomy
//!
//! Every command either succeeds with an id or fails with one of these
//! classified errors; nothing is silently dropped. Validation and
//! reservation failures roll the surrounding transaction back and reach the
//! client with their original category.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    // Validation
    #[error("price is not aligned to the tick size")]
    BadTick,
    #[error("price is outside the session ARA/ARB band")]
    OutOfBand,
    #[error("quantity must be a positive number of lots")]
    BadQty,
    #[error("unknown or inactive symbol")]
    InvalidSymbol,

    // Reservation
    #[error("insufficient cash balance")]
    InsufficientCash,
    #[error("insufficient holding: owned {owned} lots, {locked} already queued for sale")]
    InsufficientHolding { owned: i64, locked: i64 },

    // State
    #[error("market is locked for auction price calculation")]
    MarketLocked,
    #[error("order cannot be canceled")]
    NotCancelable,
    #[error("no trading session is running")]
    NoActiveSession,

    // Conflict
    #[error("a trading session is already running")]
    SessionAlreadyRunning,
    #[error("stock supply cap exceeded")]
    MaxSharesExceeded,

    // Infra
    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),
}

impl OrderError {
    /// HTTP status for the gateway error body.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OrderError::BadTick
            | OrderError::OutOfBand
            | OrderError::BadQty
            | OrderError::InvalidSymbol
            | OrderError::InsufficientCash
            | OrderError::InsufficientHolding { .. }
            | OrderError::MarketLocked
            | OrderError::NotCancelable
            | OrderError::NoActiveSession
            | OrderError::SessionAlreadyRunning
            | OrderError::MaxSharesExceeded => StatusCode::BAD_REQUEST,
            OrderError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_400() {
        assert_eq!(OrderError::BadTick.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            OrderError::InsufficientHolding { owned: 10, locked: 8 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OrderError::MarketLocked.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_store_errors_are_500() {
        let err = OrderError::Store(sqlx::Error::PoolClosed);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_holding_message_names_quantities() {
        let msg = OrderError::InsufficientHolding { owned: 10, locked: 8 }.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("8"));
    }
}
