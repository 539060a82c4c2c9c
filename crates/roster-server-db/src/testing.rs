// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Helpers for tests in this and downstream crates.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::Result;
use crate::pool::run_migrations;

/// An in-memory database with the schema applied.
///
/// Limited to one connection: every `:memory:` connection is a separate
/// database.
pub async fn create_test_pool() -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(":memory:")?.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.connect_with(options)
		.await?;

	run_migrations(&pool).await?;
	Ok(pool)
}
