// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use roster_server_wg::{ErrorKind, WgError};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error(transparent)]
	Peer(#[from] WgError),
	#[error("invalid request body: {0}")]
	BadRequest(String),
}

impl From<JsonRejection> for ApiError {
	fn from(e: JsonRejection) -> Self {
		ApiError::BadRequest(e.body_text())
	}
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
	pub error: &'static str,
	pub message: String,
}

impl ApiError {
	fn status(&self) -> (StatusCode, &'static str) {
		let ApiError::Peer(e) = self else {
			return (StatusCode::BAD_REQUEST, "validation");
		};
		match (e.kind(), e) {
			(ErrorKind::Validation, _) => (StatusCode::BAD_REQUEST, "validation"),
			(ErrorKind::NotFound, _) => (StatusCode::NOT_FOUND, "not_found"),
			(ErrorKind::Capacity, _) => (StatusCode::INSUFFICIENT_STORAGE, "capacity"),
			(ErrorKind::Upstream, WgError::Device(_)) => (StatusCode::BAD_GATEWAY, "device"),
			(ErrorKind::Upstream, WgError::Closed) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
			(ErrorKind::Upstream, _) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, error) = self.status();
		if status.is_server_error() {
			tracing::error!(error = %self, "request failed");
		} else {
			tracing::debug!(error = %self, "request rejected");
		}

		let body = ErrorBody {
			error,
			message: self.to_string(),
		};
		(status, Json(body)).into_response()
	}
}
