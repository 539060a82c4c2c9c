// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	extract::{rejection::JsonRejection, State},
	http::StatusCode,
	Json,
};
use roster_server_db::GlobalSettings;

use crate::{api::AppState, error::ApiError};

/// GET /settings
pub async fn get_settings(State(state): State<AppState>) -> Json<GlobalSettings> {
	Json(state.service.get_settings().await)
}

/// PUT /settings - replaces the whole settings row.
pub async fn update_settings(
	State(state): State<AppState>,
	body: Result<Json<GlobalSettings>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
	let Json(settings) = body?;
	state.service.update_settings(settings).await?;
	Ok(StatusCode::NO_CONTENT)
}
