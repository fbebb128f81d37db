//! Order rows (`orders` table)
//!
//! Orders are created PENDING by the gateway, mutated to PARTIAL/MATCHED
//! only by the settlement transaction, and to CANCELED only by
//! cancellation or session close. Terminal rows never re-enter the book.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Row};

use crate::core_types::{OrderId, SessionId, StockId, UserId};
use crate::models::{OrderStatus, Side};

/// Insert a new PENDING order; returns its id.
#[allow(clippy::too_many_arguments)]
pub async fn insert_order(
    conn: &mut PgConnection,
    user_id: UserId,
    stock_id: StockId,
    session_id: SessionId,
    side: Side,
    price: i64,
    quantity: i64,
    avg_price_at_order: Option<Decimal>,
) -> Result<OrderId, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO orders
            (user_id, stock_id, session_id, type, price, quantity,
             remaining_quantity, status, avg_price_at_order)
        VALUES ($1, $2, $3, $4, $5, $6, $6, 'PENDING', $7)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(stock_id)
    .bind(session_id)
    .bind(side.as_str())
    .bind(price)
    .bind(quantity)
    .bind(avg_price_at_order)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get("id"))
}

/// Lots already queued for sale by this user on this stock (PENDING or
/// PARTIAL sell orders). Used for the holding reservation check.
pub async fn locked_sell_quantity(
    conn: &mut PgConnection,
    user_id: UserId,
    stock_id: StockId,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(remaining_quantity), 0) AS locked FROM orders \
         WHERE user_id = $1 AND stock_id = $2 AND type = 'SELL' \
           AND status IN ('PENDING', 'PARTIAL')",
    )
    .bind(user_id)
    .bind(stock_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get("locked"))
}

/// An order locked for cancellation.
#[derive(Debug)]
pub struct CancelTarget {
    pub order_id: OrderId,
    pub stock_id: StockId,
    pub symbol: String,
    pub side: Side,
    pub price: i64,
    pub remaining: i64,
    pub status: OrderStatus,
}

/// Lock an order owned by `user_id`. Returns None when the order does not
/// exist, belongs to someone else, or carries an unknown side/status.
pub async fn lock_for_cancel(
    conn: &mut PgConnection,
    order_id: OrderId,
    user_id: UserId,
) -> Result<Option<CancelTarget>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT o.id, o.stock_id, o.type, o.price, o.remaining_quantity, o.status, s.symbol
        FROM orders o
        JOIN stocks s ON o.stock_id = s.id
        WHERE o.id = $1 AND o.user_id = $2
        FOR UPDATE OF o
        "#,
    )
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.and_then(|r| {
        let side = Side::parse(r.get::<String, _>("type").as_str())?;
        let status = OrderStatus::parse(r.get::<String, _>("status").as_str())?;
        Some(CancelTarget {
            order_id: r.get("id"),
            stock_id: r.get("stock_id"),
            symbol: r.get("symbol"),
            side,
            price: r.get("price"),
            remaining: r.get("remaining_quantity"),
            status,
        })
    }))
}

pub async fn mark_canceled(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET status = 'CANCELED', updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Write the post-fill state of an order.
pub async fn apply_fill(
    conn: &mut PgConnection,
    order_id: OrderId,
    remaining: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE orders SET status = $1, remaining_quantity = $2, updated_at = NOW() \
         WHERE id = $3",
    )
    .bind(OrderStatus::after_fill(remaining).as_str())
    .bind(remaining)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Remaining quantity if the order is still live (PENDING/PARTIAL with
/// lots left). The settlement path checks this before touching money so a
/// phantom book entry can never settle.
pub async fn live_remaining(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT remaining_quantity FROM orders \
         WHERE id = $1 AND status IN ('PENDING', 'PARTIAL') AND remaining_quantity > 0",
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| r.get("remaining_quantity")))
}

/// Carry PENDING orders of a closed session into a new one.
pub async fn migrate_pending(
    conn: &mut PgConnection,
    from_session: SessionId,
    to_session: SessionId,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders SET session_id = $1 \
         WHERE session_id = $2 AND status = 'PENDING'",
    )
    .bind(to_session)
    .bind(from_session)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// A persisted order ready to be rested in the book.
#[derive(Debug)]
pub struct BookSeed {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub stock_id: StockId,
    pub symbol: String,
    pub side: Side,
    pub price: i64,
    pub quantity: i64,
    pub remaining: i64,
    pub created_at: DateTime<Utc>,
    pub avg_price_at_order: Option<Decimal>,
}

/// Live orders of a session for (re)seeding the book. Session open passes
/// `include_partial = false` (only never-touched PENDING orders migrate);
/// a process restart during an active session reseeds PARTIAL rows too.
pub async fn book_seeds(
    conn: &mut PgConnection,
    session_id: SessionId,
    include_partial: bool,
) -> Result<Vec<BookSeed>, sqlx::Error> {
    let statuses: Vec<String> = if include_partial {
        vec!["PENDING".into(), "PARTIAL".into()]
    } else {
        vec!["PENDING".into()]
    };
    let rows = sqlx::query(
        r#"
        SELECT o.id, o.user_id, o.stock_id, o.type, o.price, o.quantity,
               o.remaining_quantity, o.created_at, o.avg_price_at_order, s.symbol
        FROM orders o
        JOIN stocks s ON o.stock_id = s.id
        WHERE o.session_id = $1 AND o.status = ANY($2) AND o.remaining_quantity > 0
        ORDER BY o.created_at ASC
        "#,
    )
    .bind(session_id)
    .bind(statuses)
    .fetch_all(&mut *conn)
    .await?;

    let mut seeds = Vec::with_capacity(rows.len());
    for r in rows {
        let Some(side) = Side::parse(r.get::<String, _>("type").as_str()) else {
            tracing::warn!(order_id = r.get::<i64, _>("id"), "Skipping order with unknown side");
            continue;
        };
        seeds.push(BookSeed {
            order_id: r.get("id"),
            user_id: r.get("user_id"),
            stock_id: r.get("stock_id"),
            symbol: r.get("symbol"),
            side,
            price: r.get("price"),
            quantity: r.get("quantity"),
            remaining: r.get("remaining_quantity"),
            created_at: r.get("created_at"),
            avg_price_at_order: r.get("avg_price_at_order"),
        });
    }
    Ok(seeds)
}

/// A live order to refund and cancel at session close.
#[derive(Debug)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: String,
    pub side: Side,
    pub price: i64,
    pub remaining: i64,
}

pub async fn open_for_session(
    conn: &mut PgConnection,
    session_id: SessionId,
) -> Result<Vec<OpenOrder>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT o.id, o.user_id, o.type, o.price, o.remaining_quantity, s.symbol
        FROM orders o
        JOIN stocks s ON o.stock_id = s.id
        WHERE o.session_id = $1 AND o.status IN ('PENDING', 'PARTIAL')
        "#,
    )
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut orders = Vec::with_capacity(rows.len());
    for r in rows {
        let Some(side) = Side::parse(r.get::<String, _>("type").as_str()) else {
            continue;
        };
        orders.push(OpenOrder {
            order_id: r.get("id"),
            user_id: r.get("user_id"),
            symbol: r.get("symbol"),
            side,
            price: r.get("price"),
            remaining: r.get("remaining_quantity"),
        });
    }
    Ok(orders)
}

/// One row of the user-facing order listings.
#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: Side,
    pub target_price: i64,
    pub execution_price: Decimal,
    pub quantity: i64,
    pub remaining_quantity: i64,
    pub matched_quantity: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_loss: Option<Decimal>,
}

fn summary_from_row(r: &sqlx::postgres::PgRow) -> Option<OrderSummary> {
    let side = Side::parse(r.get::<String, _>("type").as_str())?;
    let status = OrderStatus::parse(r.get::<String, _>("status").as_str())?;
    let execution_price: Decimal = r.get("execution_price");
    let matched_quantity: i64 = r.get("matched_quantity");
    let avg_at_order: Option<Decimal> = r.get("avg_price_at_order");

    // Realized PnL for sells, against the holding average at entry time.
    let profit_loss = match (side, avg_at_order) {
        (Side::Sell, Some(avg)) if matched_quantity > 0 => Some(
            (execution_price - avg) * Decimal::from(matched_quantity * crate::core_types::LOT_SHARES),
        ),
        _ => None,
    };

    Some(OrderSummary {
        id: r.get("id"),
        symbol: r.get("symbol"),
        side,
        target_price: r.get("price"),
        execution_price,
        quantity: r.get("quantity"),
        remaining_quantity: r.get("remaining_quantity"),
        matched_quantity,
        status,
        created_at: r.get("created_at"),
        profit_loss,
    })
}

const SUMMARY_SELECT: &str = r#"
SELECT
    o.id,
    s.symbol,
    o.type,
    o.price,
    COALESCE(AVG(t.price), o.price::NUMERIC) AS execution_price,
    o.quantity,
    o.remaining_quantity,
    (o.quantity - o.remaining_quantity) AS matched_quantity,
    o.status,
    o.created_at,
    o.avg_price_at_order
FROM orders o
JOIN stocks s ON o.stock_id = s.id
LEFT JOIN trades t ON (t.buy_order_id = o.id OR t.sell_order_id = o.id)
"#;

/// Live (PENDING/PARTIAL) orders of a user, newest first.
pub async fn active_orders(
    pool: &PgPool,
    user_id: UserId,
) -> Result<Vec<OrderSummary>, sqlx::Error> {
    let sql = format!(
        "{SUMMARY_SELECT} \
         WHERE o.user_id = $1 AND o.status IN ('PENDING', 'PARTIAL') \
         GROUP BY o.id, s.symbol \
         ORDER BY o.created_at DESC"
    );
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(pool).await?;
    Ok(rows.iter().filter_map(summary_from_row).collect())
}

/// The user's last 100 orders in any state.
pub async fn order_history(
    pool: &PgPool,
    user_id: UserId,
) -> Result<Vec<OrderSummary>, sqlx::Error> {
    let sql = format!(
        "{SUMMARY_SELECT} \
         WHERE o.user_id = $1 \
         GROUP BY o.id, s.symbol \
         ORDER BY o.created_at DESC \
         LIMIT 100"
    );
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(pool).await?;
    Ok(rows.iter().filter_map(summary_from_row).collect())
}
