use std::env;

use sqlx::{postgres::PgPoolOptions, Error, PgPool};
use urlencoding::encode;

pub mod crud;
pub mod models;

/// Connects a fresh pool sized for the engine's scheduler jobs plus the
/// synchronous purchase path.
pub async fn new_pool() -> Result<PgPool, Error> {
    let max = env::var("POSTGRES_MAX_CONNECTIONS")
        .unwrap_or("10".into())
        .parse::<u32>()
        .expect("Invalid psql max connections");
    let pool = PgPoolOptions::new()
        .max_connections(max)
        .connect(&get_conn_string())
        .await?;

    Ok(pool)
}

pub fn get_conn_string() -> String {
    let user = env::var("POSTGRES_USER").unwrap_or("postgres".into());
    let pwd = env::var("POSTGRES_PASSWORD").unwrap_or("password".into());
    let pwd = encode(&pwd);
    let db = env::var("POSTGRES_DB").unwrap_or("hawker".into());
    let host = env::var("POSTGRES_HOST").unwrap_or("localhost".into());
    let port = env::var("POSTGRES_PORT")
        .unwrap_or("5432".into())
        .parse::<usize>()
        .expect("Invalid psql port");
    format!("postgresql://{}:{}@{}:{}/{}", user, pwd, host, port, db)
}
