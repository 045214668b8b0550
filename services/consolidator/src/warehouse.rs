//! Warehouse table access and the run lock.

use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use firehose_model::StatusRow;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use std::time::Duration;
use tracing::{debug, info, instrument};

const INSERT_SQL: &str = r#"
    INSERT INTO statuses (
        tweet_id, tweet_created_at, text, source,
        user_id, user_name, user_location,
        user_followers_count, user_friends_count, user_listed_count,
        user_favourites_count, user_statuses_count, profile_created_at,
        reply_count, retweet_count, favorite_count
    ) VALUES (
        $1, $2, $3, $4,
        $5, $6, $7,
        $8, $9, $10,
        $11, $12, $13,
        $14, $15, $16
    )
"#;

/// Append-only warehouse for consolidated status rows.
pub struct Warehouse {
    pool: PgPool,
}

/// Held for the duration of one consolidation run.
///
/// Advisory locks are session-scoped, so the lock pins its own pooled
/// connection; returning the connection without unlocking would leak the
/// lock into the pool. Always release explicitly.
pub struct RunLock {
    conn: PoolConnection<Postgres>,
    key: i64,
}

impl RunLock {
    pub async fn release(mut self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(self.key)
            .execute(&mut *self.conn)
            .await
            .context("Failed to release run lock")?;
        debug!(key = self.key, "Run lock released");
        Ok(())
    }
}

impl Warehouse {
    /// Create a new warehouse handle with a connection pool.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to warehouse database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Try to take the advisory lock guarding a consolidation run.
    ///
    /// Returns `None` when another run still holds it.
    pub async fn try_lock_run(&self, key: i64) -> Result<Option<RunLock>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for run lock")?;

        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to take run lock")?;

        if acquired {
            debug!(key, "Run lock acquired");
            Ok(Some(RunLock { conn, key }))
        } else {
            Ok(None)
        }
    }

    /// Append rows to the statuses table inside one transaction.
    ///
    /// Write mode is append, never replace: the table only ever grows.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn append_rows(&self, rows: &[StatusRow]) -> Result<u64> {
        if rows.is_empty() {
            info!("No rows to load");
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for row in rows {
            sqlx::query(INSERT_SQL)
                .bind(row.tweet_id)
                .bind(&row.tweet_created_at)
                .bind(&row.text)
                .bind(&row.source)
                .bind(row.user_id)
                .bind(&row.user_name)
                .bind(&row.user_location)
                .bind(row.user_followers_count)
                .bind(row.user_friends_count)
                .bind(row.user_listed_count)
                .bind(row.user_favourites_count)
                .bind(row.user_statuses_count)
                .bind(&row.profile_created_at)
                .bind(row.reply_count)
                .bind(row.retweet_count)
                .bind(row.favorite_count)
                .execute(&mut *tx)
                .await
                .context("Failed to insert status row")?;
        }

        tx.commit().await.context("Failed to commit transaction")?;

        let loaded = rows.len() as u64;
        metrics::counter!("consolidator.rows.loaded").increment(loaded);
        info!(rows = loaded, "Rows appended to warehouse table");

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firehose_model::COLUMNS;

    #[test]
    fn test_insert_sql_binds_columns_in_model_order() {
        // The positional contract: the INSERT column list must name the
        // model columns in exactly the model order.
        let mut position = 0;
        for column in COLUMNS {
            let found = INSERT_SQL[position..]
                .find(column)
                .unwrap_or_else(|| panic!("column {column} missing or out of order"));
            position += found + column.len();
        }
        assert_eq!(INSERT_SQL.matches("$16").count(), 1);
    }
}
