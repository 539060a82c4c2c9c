// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use qrcode::render::svg;
use qrcode::types::QrError as BackendError;
use qrcode::{EcLevel, QrCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QrError {
	#[error("payload cannot be encoded as a QR code: {0}")]
	Encode(#[from] BackendError),
}

/// Renders `payload` (usually a client profile) as a standalone SVG QR code
/// suitable for scanning with the mobile WireGuard apps.
pub fn render_qr_svg(payload: &str) -> Result<String, QrError> {
	let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)?;
	Ok(code
		.render::<svg::Color<'_>>()
		.min_dimensions(256, 256)
		.quiet_zone(true)
		.build())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn renders_svg_document() {
		let svg = render_qr_svg("[Interface]\nPrivateKey = abc\n").unwrap();
		assert!(svg.starts_with("<?xml"));
		assert!(svg.contains("<svg"));
	}

	#[test]
	fn oversized_payload_is_an_error() {
		let payload = "x".repeat(8 * 1024);
		assert!(matches!(render_qr_svg(&payload), Err(QrError::Encode(_))));
	}
}
