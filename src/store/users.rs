//! Balance operations on the `users` table
//!
//! Cash moves only inside transactions that also touch the order rows the
//! money is reserved for; callers hand in the open connection.

use rust_decimal::Decimal;
use sqlx::{PgConnection, Row};

use crate::core_types::UserId;

/// Lock a user's row and return the cash balance.
pub async fn balance_for_update(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Option<Decimal>, sqlx::Error> {
    let row = sqlx::query("SELECT balance_rdn FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.get("balance_rdn")))
}

/// Move cash by `delta` (negative to reserve, positive to refund/credit).
pub async fn adjust_balance(
    conn: &mut PgConnection,
    user_id: UserId,
    delta: Decimal,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET balance_rdn = balance_rdn + $1 WHERE id = $2")
        .bind(delta)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
