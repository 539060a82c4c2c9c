// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

use crate::error::DbError;
use crate::settings::GlobalSettings;

/// Connection pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
	pub max_connections: u32,
	/// How long a statement waits on a locked database before failing.
	pub busy_timeout: Duration,
}

impl Default for PoolOptions {
	fn default() -> Self {
		Self {
			max_connections: 4,
			busy_timeout: Duration::from_secs(5),
		}
	}
}

/// Create a SqlitePool with WAL mode and full fsync on commit.
///
/// A write that returns success has reached disk, so a crash right after a
/// peer is added cannot lose its private key.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./roster.db")
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid or connection fails.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, DbError> {
	create_pool_with(database_url, PoolOptions::default()).await
}

/// [`create_pool`] with explicit sizing.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool_with(database_url: &str, sizing: PoolOptions) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Full)
		.busy_timeout(sizing.busy_timeout)
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(sizing.max_connections)
		.connect_with(options)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Creates the peer and settings tables and seeds the settings singleton.
/// Safe to run on every start.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS peers (
			public_key TEXT PRIMARY KEY,
			private_key TEXT,
			preshared_key TEXT,
			name TEXT NOT NULL,
			allowed_ips TEXT NOT NULL,
			dns TEXT NOT NULL DEFAULT '',
			mtu INTEGER NOT NULL DEFAULT 0,
			persistent_keepalive INTEGER NOT NULL DEFAULT 0,
			interface_address TEXT NOT NULL DEFAULT '',
			created_at TEXT NOT NULL DEFAULT (datetime('now')),
			updated_at TEXT NOT NULL DEFAULT (datetime('now'))
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS settings (
			id INTEGER PRIMARY KEY CHECK (id = 1),
			server_address TEXT NOT NULL,
			dns TEXT NOT NULL,
			mtu INTEGER NOT NULL,
			keepalive INTEGER NOT NULL,
			endpoint TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	let defaults = GlobalSettings::default();
	sqlx::query(
		"INSERT OR IGNORE INTO settings (id, server_address, dns, mtu, keepalive, endpoint)
		 VALUES (1, ?, ?, ?, ?, ?)",
	)
	.bind(&defaults.server_address)
	.bind(&defaults.dns)
	.bind(i64::from(defaults.mtu))
	.bind(i64::from(defaults.keepalive))
	.bind(&defaults.endpoint)
	.execute(pool)
	.await?;

	tracing::debug!("database schema ready");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn migrations_are_idempotent_and_persist() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("roster.db").display());

		let pool = create_pool(&url).await.unwrap();
		run_migrations(&pool).await.unwrap();
		run_migrations(&pool).await.unwrap();

		let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM settings")
			.fetch_one(&pool)
			.await
			.unwrap();
		assert_eq!(count, 1);
	}

	#[tokio::test]
	async fn pool_honours_sizing() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("roster.db").display());
		let sizing = PoolOptions {
			max_connections: 1,
			busy_timeout: Duration::from_millis(250),
		};

		let pool = create_pool_with(&url, sizing).await.unwrap();
		assert_eq!(pool.options().get_max_connections(), 1);
		run_migrations(&pool).await.unwrap();
	}

	#[tokio::test]
	async fn settings_row_is_a_singleton() {
		let pool = crate::testing::create_test_pool().await.unwrap();
		let result = sqlx::query(
			"INSERT INTO settings (id, server_address, dns, mtu, keepalive, endpoint)
			 VALUES (2, '', '', 0, 0, '')",
		)
		.execute(&pool)
		.await;
		assert!(result.is_err());
	}
}
