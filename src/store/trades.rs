//! Trade log (`trades` table)

use sqlx::PgConnection;

use crate::core_types::{OrderId, StockId};

/// Record an executed trade. Order-id columns are NULL for the synthetic
/// liquidity side, whose orders are never persisted.
pub async fn insert_trade(
    conn: &mut PgConnection,
    buy_order_id: Option<OrderId>,
    sell_order_id: Option<OrderId>,
    stock_id: StockId,
    price: i64,
    quantity: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO trades (buy_order_id, sell_order_id, stock_id, price, quantity) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(buy_order_id)
    .bind(sell_order_id)
    .bind(stock_id)
    .bind(price)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
