use anyhow::{Context, Result};
use sqlx::PgPool;

/// Initialize the trading schema. Every statement is idempotent.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing PostgreSQL schema...");

    for (name, ddl) in [
        ("users", CREATE_USERS),
        ("stocks", CREATE_STOCKS),
        ("trading_sessions", CREATE_TRADING_SESSIONS),
        ("daily_stock_data", CREATE_DAILY_STOCK_DATA),
        ("orders", CREATE_ORDERS),
        ("trades", CREATE_TRADES),
        ("portfolios", CREATE_PORTFOLIOS),
        ("idx_orders_user_stock_status", IDX_ORDERS_USER_STOCK_STATUS),
        ("idx_orders_session_status", IDX_ORDERS_SESSION_STATUS),
        ("idx_trades_stock_time", IDX_TRADES_STOCK_TIME),
    ] {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create {}", name))?;
    }

    tracing::info!("PostgreSQL schema initialized");
    Ok(())
}

const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            BIGSERIAL PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    balance_rdn   NUMERIC(18, 2) NOT NULL DEFAULT 0 CHECK (balance_rdn >= 0),
    role          TEXT NOT NULL DEFAULT 'user',
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_STOCKS: &str = r#"
CREATE TABLE IF NOT EXISTS stocks (
    id         SERIAL PRIMARY KEY,
    symbol     TEXT NOT NULL UNIQUE,
    name       TEXT NOT NULL,
    is_active  BOOLEAN NOT NULL DEFAULT TRUE,
    max_shares BIGINT NOT NULL
)
"#;

const CREATE_TRADING_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS trading_sessions (
    id             SERIAL PRIMARY KEY,
    session_number INT NOT NULL UNIQUE,
    status         TEXT NOT NULL,
    started_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    ended_at       TIMESTAMPTZ
)
"#;

const CREATE_DAILY_STOCK_DATA: &str = r#"
CREATE TABLE IF NOT EXISTS daily_stock_data (
    stock_id    INT NOT NULL REFERENCES stocks(id),
    session_id  INT NOT NULL REFERENCES trading_sessions(id),
    prev_close  BIGINT NOT NULL,
    open_price  BIGINT,
    high_price  BIGINT,
    low_price   BIGINT,
    close_price BIGINT,
    ara_limit   BIGINT NOT NULL,
    arb_limit   BIGINT NOT NULL,
    volume      BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (stock_id, session_id)
)
"#;

const CREATE_ORDERS: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id                 BIGSERIAL PRIMARY KEY,
    user_id            BIGINT NOT NULL REFERENCES users(id),
    stock_id           INT NOT NULL REFERENCES stocks(id),
    session_id         INT REFERENCES trading_sessions(id),
    type               TEXT NOT NULL,
    price              BIGINT NOT NULL,
    quantity           BIGINT NOT NULL CHECK (quantity > 0),
    remaining_quantity BIGINT NOT NULL CHECK (remaining_quantity >= 0),
    status             TEXT NOT NULL DEFAULT 'PENDING',
    avg_price_at_order NUMERIC(18, 2),
    created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at         TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_TRADES: &str = r#"
CREATE TABLE IF NOT EXISTS trades (
    id            BIGSERIAL PRIMARY KEY,
    buy_order_id  BIGINT REFERENCES orders(id),
    sell_order_id BIGINT REFERENCES orders(id),
    stock_id      INT NOT NULL REFERENCES stocks(id),
    price         BIGINT NOT NULL,
    quantity      BIGINT NOT NULL CHECK (quantity > 0),
    executed_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_PORTFOLIOS: &str = r#"
CREATE TABLE IF NOT EXISTS portfolios (
    user_id        BIGINT NOT NULL REFERENCES users(id),
    stock_id       INT NOT NULL REFERENCES stocks(id),
    quantity_owned BIGINT NOT NULL DEFAULT 0,
    avg_buy_price  NUMERIC(18, 2) NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, stock_id)
)
"#;

const IDX_ORDERS_USER_STOCK_STATUS: &str = r#"
CREATE INDEX IF NOT EXISTS idx_orders_user_stock_status
    ON orders (user_id, stock_id, status)
"#;

const IDX_ORDERS_SESSION_STATUS: &str = r#"
CREATE INDEX IF NOT EXISTS idx_orders_session_status
    ON orders (session_id, status)
"#;

const IDX_TRADES_STOCK_TIME: &str = r#"
CREATE INDEX IF NOT EXISTS idx_trades_stock_time
    ON trades (stock_id, executed_at)
"#;
