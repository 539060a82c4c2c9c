// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{extract::State, Json};
use roster_server_wg::{InterfaceStats, StatsHistoryItem};

use crate::{api::AppState, error::ApiError};

/// GET /stats
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<InterfaceStats>, ApiError> {
	Ok(Json(state.service.get_stats().await?))
}

/// GET /stats/history - oldest sample first.
pub async fn get_stats_history(State(state): State<AppState>) -> Json<Vec<StatsHistoryItem>> {
	Json(state.service.get_stats_history())
}
