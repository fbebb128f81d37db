//! Trading sessions and per-session daily stock data

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Row};

use crate::core_types::{SessionId, StockId};
use crate::models::SessionPhase;

#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub id: SessionId,
    pub session_number: i32,
    pub status: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

fn session_from_row(r: &sqlx::postgres::PgRow) -> SessionRow {
    SessionRow {
        id: r.get("id"),
        session_number: r.get("session_number"),
        status: r.get("status"),
        started_at: r.get("started_at"),
        ended_at: r.get("ended_at"),
    }
}

/// The session currently in PRE_OPEN, LOCKED or OPEN, if any.
pub async fn running_session(
    conn: &mut PgConnection,
) -> Result<Option<SessionRow>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, session_number, status, started_at, ended_at FROM trading_sessions \
         WHERE status IN ('PRE_OPEN', 'LOCKED', 'OPEN') ORDER BY id DESC LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| session_from_row(&r)))
}

/// Create the next session in PRE_OPEN with a monotonically increasing
/// session number.
pub async fn create_session(conn: &mut PgConnection) -> Result<SessionRow, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO trading_sessions (session_number, status, started_at)
        VALUES (
            COALESCE((SELECT MAX(session_number) FROM trading_sessions), 0) + 1,
            'PRE_OPEN',
            NOW()
        )
        RETURNING id, session_number, status, started_at, ended_at
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok(session_from_row(&row))
}

/// Phase-transition update (PRE_OPEN -> LOCKED -> OPEN).
pub async fn set_session_status(
    pool: &PgPool,
    session_id: SessionId,
    phase: SessionPhase,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE trading_sessions SET status = $1 WHERE id = $2")
        .bind(phase.as_str())
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Close whichever session is running; returns its id.
pub async fn close_running_session(
    conn: &mut PgConnection,
) -> Result<Option<SessionId>, sqlx::Error> {
    let row = sqlx::query(
        "UPDATE trading_sessions SET status = 'CLOSED', ended_at = NOW() \
         WHERE status IN ('PRE_OPEN', 'LOCKED', 'OPEN') RETURNING id",
    )
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| r.get("id")))
}

/// Most recent CLOSED session before `session_id` (source of carried-over
/// pending orders).
pub async fn last_closed_before(
    conn: &mut PgConnection,
    session_id: SessionId,
) -> Result<Option<SessionId>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id FROM trading_sessions WHERE status = 'CLOSED' AND id < $1 \
         ORDER BY ended_at DESC NULLS LAST LIMIT 1",
    )
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| r.get("id")))
}

pub async fn active_stocks(
    conn: &mut PgConnection,
) -> Result<Vec<(StockId, String)>, sqlx::Error> {
    let rows = sqlx::query("SELECT id, symbol FROM stocks WHERE is_active = true ORDER BY symbol")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.iter().map(|r| (r.get("id"), r.get("symbol"))).collect())
}

/// Reference price for a new session: the close recorded for the stock's
/// most recent session, falling back to its prev_close.
pub async fn latest_close_price(
    conn: &mut PgConnection,
    stock_id: StockId,
) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COALESCE(close_price, prev_close) AS ref_price FROM daily_stock_data \
         WHERE stock_id = $1 ORDER BY session_id DESC LIMIT 1",
    )
    .bind(stock_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| r.get("ref_price")))
}

/// Seed the session's daily row; open/close start at the reference price
/// and the ARA/ARB band stays frozen for the session.
pub async fn insert_daily(
    conn: &mut PgConnection,
    stock_id: StockId,
    session_id: SessionId,
    prev_close: i64,
    ara_limit: i64,
    arb_limit: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO daily_stock_data
            (stock_id, session_id, prev_close, open_price, close_price, ara_limit, arb_limit)
        VALUES ($1, $2, $3, $3, $3, $4, $5)
        "#,
    )
    .bind(stock_id)
    .bind(session_id)
    .bind(prev_close)
    .bind(ara_limit)
    .bind(arb_limit)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fold an executed trade into the OPEN session's OHLC/volume row.
pub async fn record_trade_stats(
    conn: &mut PgConnection,
    stock_id: StockId,
    price: i64,
    quantity: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE daily_stock_data SET
            open_price = COALESCE(open_price, $1),
            high_price = GREATEST(COALESCE(high_price, $1), $1),
            low_price = LEAST(COALESCE(low_price, $1), $1),
            close_price = $1,
            volume = volume + $2
        WHERE stock_id = $3
          AND session_id = (SELECT id FROM trading_sessions WHERE status = 'OPEN'
                            ORDER BY id DESC LIMIT 1)
        "#,
    )
    .bind(price)
    .bind(quantity)
    .bind(stock_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Placement context: stock + frozen band + session the order will join.
#[derive(Debug)]
pub struct PlacementContext {
    pub stock_id: StockId,
    pub ara_limit: i64,
    pub arb_limit: i64,
    pub session_id: SessionId,
    pub phase: SessionPhase,
}

/// Resolve a symbol to its placement context. Prefers the running session;
/// with the market closed, falls back to the stock's latest session so
/// offline orders still reserve against the last known band.
pub async fn placement_context(
    conn: &mut PgConnection,
    symbol: &str,
) -> Result<Option<PlacementContext>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT s.id, d.ara_limit, d.arb_limit, d.session_id, ts.status
        FROM stocks s
        JOIN daily_stock_data d ON s.id = d.stock_id
        JOIN trading_sessions ts ON d.session_id = ts.id
        WHERE s.symbol = $1 AND s.is_active = true
          AND ts.status IN ('OPEN', 'PRE_OPEN', 'LOCKED')
        ORDER BY ts.id DESC LIMIT 1
        "#,
    )
    .bind(symbol)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(r) = row {
        let phase = SessionPhase::parse(r.get::<String, _>("status").as_str())
            .unwrap_or(SessionPhase::Closed);
        return Ok(Some(PlacementContext {
            stock_id: r.get("id"),
            ara_limit: r.get("ara_limit"),
            arb_limit: r.get("arb_limit"),
            session_id: r.get("session_id"),
            phase,
        }));
    }

    let row = sqlx::query(
        r#"
        SELECT s.id, d.ara_limit, d.arb_limit, d.session_id
        FROM stocks s
        JOIN daily_stock_data d ON s.id = d.stock_id
        WHERE s.symbol = $1 AND s.is_active = true
        ORDER BY d.session_id DESC LIMIT 1
        "#,
    )
    .bind(symbol)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| PlacementContext {
        stock_id: r.get("id"),
        ara_limit: r.get("ara_limit"),
        arb_limit: r.get("arb_limit"),
        session_id: r.get("session_id"),
        phase: SessionPhase::Closed,
    }))
}

/// Latest reference data for a symbol (price feed and IEP endpoint).
#[derive(Debug, Clone, Copy)]
pub struct DailySnapshot {
    pub prev_close: i64,
    pub volume: i64,
}

pub async fn daily_snapshot(
    pool: &PgPool,
    symbol: &str,
) -> Result<Option<DailySnapshot>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT d.prev_close, d.volume
        FROM daily_stock_data d
        JOIN stocks s ON d.stock_id = s.id
        WHERE s.symbol = $1
        ORDER BY d.session_id DESC LIMIT 1
        "#,
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| DailySnapshot {
        prev_close: r.get("prev_close"),
        volume: r.get("volume"),
    }))
}
