use rust_decimal::Decimal;
use sqlx::{Error, PgExecutor, PgPool};

pub async fn get_balance(pool: &PgPool, user_id: i32) -> Result<Option<Decimal>, Error> {
    sqlx::query_scalar(
        r#"
            SELECT balance
            FROM hawker_users
            WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Atomically takes `amount` from the user's balance. Returns false when
/// the balance does not cover it; the caller treats that as insufficient
/// funds and rolls back whatever transaction this ran in.
pub async fn debit_balance<'e>(
    ex: impl PgExecutor<'e>,
    user_id: i32,
    amount: Decimal,
) -> Result<bool, Error> {
    let res = sqlx::query(
        r#"
            UPDATE hawker_users
            SET balance = balance - $2
            WHERE id = $1 AND balance >= $2
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .execute(ex)
    .await?;

    Ok(res.rows_affected() > 0)
}

pub async fn credit_balance<'e>(
    ex: impl PgExecutor<'e>,
    user_id: i32,
    amount: Decimal,
) -> Result<bool, Error> {
    let res = sqlx::query(
        r#"
            UPDATE hawker_users
            SET balance = balance + $2
            WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .execute(ex)
    .await?;

    Ok(res.rows_affected() > 0)
}
