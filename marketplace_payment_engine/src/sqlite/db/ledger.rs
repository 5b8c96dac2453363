use mpe_common::Money;
use sqlx::SqliteConnection;

use crate::{db_types::MarketId, traits::StorageError};

pub async fn fetch_customer_balance(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Money, StorageError> {
    let balance: Option<Money> =
        sqlx::query_scalar("SELECT balance FROM customer_balances WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_optional(conn)
            .await?;
    Ok(balance.unwrap_or(Money::ZERO))
}

pub async fn update_customer_balance(
    customer_id: &str,
    balance: Money,
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
            INSERT INTO customer_balances (customer_id, balance) VALUES ($1, $2)
            ON CONFLICT (customer_id) DO UPDATE SET balance = excluded.balance, updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(customer_id)
    .bind(balance)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_market_wallet(
    market_id: &MarketId,
    conn: &mut SqliteConnection,
) -> Result<String, StorageError> {
    let wallet: Option<String> = sqlx::query_scalar("SELECT wallet_id FROM markets WHERE market_id = $1")
        .bind(market_id.as_str())
        .fetch_optional(conn)
        .await?;
    wallet.ok_or_else(|| StorageError::MarketNotFound(market_id.clone()))
}

pub async fn register_market(
    market_id: &MarketId,
    wallet_id: &str,
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
            INSERT INTO markets (market_id, wallet_id) VALUES ($1, $2)
            ON CONFLICT (market_id) DO UPDATE SET wallet_id = excluded.wallet_id;
        "#,
    )
    .bind(market_id.as_str())
    .bind(wallet_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn credit_monthly_earnings(
    market_id: &MarketId,
    month: &str,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
            INSERT INTO market_monthly_earnings (market_id, month, amount) VALUES ($1, $2, $3)
            ON CONFLICT (market_id, month) DO UPDATE SET amount = amount + excluded.amount;
        "#,
    )
    .bind(market_id.as_str())
    .bind(month)
    .bind(amount)
    .execute(conn)
    .await?;
    Ok(())
}
