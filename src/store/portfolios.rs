//! Holdings (`portfolios` table)

use rust_decimal::Decimal;
use sqlx::{PgConnection, Row};

use crate::core_types::{StockId, UserId};

/// Lock a holding row; returns `(quantity_owned, avg_buy_price)`.
pub async fn holding_for_update(
    conn: &mut PgConnection,
    user_id: UserId,
    stock_id: StockId,
) -> Result<Option<(i64, Decimal)>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT quantity_owned, avg_buy_price FROM portfolios \
         WHERE user_id = $1 AND stock_id = $2 FOR UPDATE",
    )
    .bind(user_id)
    .bind(stock_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| (r.get("quantity_owned"), r.get("avg_buy_price"))))
}

/// Credit a buyer with `qty` lots at `price`, re-weighting the average buy
/// price. The zero-quantity guard keeps the average defined when a holding
/// was fully sold earlier in the same session.
pub async fn apply_buy(
    conn: &mut PgConnection,
    user_id: UserId,
    stock_id: StockId,
    qty: i64,
    price: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO portfolios (user_id, stock_id, quantity_owned, avg_buy_price)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, stock_id) DO UPDATE SET
            avg_buy_price = CASE
                WHEN portfolios.quantity_owned + $3 = 0 THEN 0
                ELSE ((portfolios.avg_buy_price * portfolios.quantity_owned) + ($4 * $3))
                     / (portfolios.quantity_owned + $3)
            END,
            quantity_owned = portfolios.quantity_owned + $3
        "#,
    )
    .bind(user_id)
    .bind(stock_id)
    .bind(qty)
    .bind(Decimal::from(price))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Remove `qty` sold lots from a holding.
pub async fn apply_sell(
    conn: &mut PgConnection,
    user_id: UserId,
    stock_id: StockId,
    qty: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE portfolios SET quantity_owned = quantity_owned - $1 \
         WHERE user_id = $2 AND stock_id = $3",
    )
    .bind(qty)
    .bind(user_id)
    .bind(stock_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
