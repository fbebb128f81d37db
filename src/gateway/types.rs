//! Gateway request/response DTOs and error mapping
//!
//! Errors leave the gateway as `{"error": "<message>"}` with a status from
//! the error's category (400 for client errors, 500 for infrastructure).

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};

use crate::core_types::OrderId;
use crate::error::OrderError;
use crate::iep::IepQuote;
use crate::models::{DepthLevel, OrderStatus, SessionPhase, Side};
use crate::store::sessions::SessionRow;

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: Side,
    pub price: i64,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct DepthResponse {
    pub symbol: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

#[derive(Debug, Serialize)]
pub struct IepResponse {
    pub iep: Option<i64>,
    pub volume: Option<i64>,
    pub surplus: Option<i64>,
    pub status: SessionPhase,
}

impl IepResponse {
    pub fn from_quote(quote: Option<IepQuote>, status: SessionPhase) -> Self {
        Self {
            iep: quote.map(|q| q.price),
            volume: quote.map(|q| q.matched_volume),
            surplus: quote.map(|q| q.surplus),
            status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: SessionRow,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseSessionResponse {
    pub canceled_orders: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_request_parses_side() {
        let req: PlaceOrderRequest = serde_json::from_str(
            r#"{"symbol":"AAA","type":"BUY","price":1000,"quantity":5}"#,
        )
        .unwrap();
        assert_eq!(req.side, Side::Buy);
        assert_eq!(req.price, 1000);
    }

    #[test]
    fn test_place_request_rejects_unknown_side() {
        let req = serde_json::from_str::<PlaceOrderRequest>(
            r#"{"symbol":"AAA","type":"HOLD","price":1000,"quantity":5}"#,
        );
        assert!(req.is_err());
    }

    #[test]
    fn test_iep_response_null_when_no_cross() {
        let resp = IepResponse::from_quote(None, SessionPhase::PreOpen);
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["iep"].is_null());
        assert_eq!(json["status"], "PRE_OPEN");
    }

    #[test]
    fn test_error_body_shape() {
        let json = serde_json::to_value(ErrorBody::new("boom")).unwrap();
        assert_eq!(json["error"], "boom");
    }
}
