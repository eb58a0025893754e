//! Intake API handlers.
//!
//! Orders enter the pipeline through this API; the pipeline itself never
//! creates orders.

pub mod orders;
pub mod users;

use accrual_storage::StorageError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON body returned with every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

/// Errors returned by the intake API.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Invalid order number: {0}")]
	InvalidOrderNumber(String),
	#[error("Order {0} was submitted by another user")]
	Conflict(String),
	#[error("Internal error: {0}")]
	Internal(String),
}

impl ApiError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			ApiError::NotFound(_) => StatusCode::NOT_FOUND,
			ApiError::InvalidOrderNumber(_) => StatusCode::UNPROCESSABLE_ENTITY,
			ApiError::Conflict(_) => StatusCode::CONFLICT,
			ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn error_code(&self) -> &'static str {
		match self {
			ApiError::NotFound(_) => "ORDER_NOT_FOUND",
			ApiError::InvalidOrderNumber(_) => "INVALID_ORDER_NUMBER",
			ApiError::Conflict(_) => "ORDER_CONFLICT",
			ApiError::Internal(_) => "INTERNAL_ERROR",
		}
	}
}

impl From<StorageError> for ApiError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::NotFound(number) => ApiError::NotFound(number),
			StorageError::InvalidOrderNumber(number) => ApiError::InvalidOrderNumber(number),
			StorageError::Conflict { order_number, .. } => ApiError::Conflict(order_number),
			other => ApiError::Internal(other.to_string()),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		if matches!(self, ApiError::Internal(_)) {
			tracing::error!(error = %self, "Request failed");
		} else {
			tracing::debug!(error = %self, "Request rejected");
		}

		let body = ErrorResponse {
			error: self.error_code().to_string(),
			message: self.to_string(),
		};
		(self.status_code(), Json(body)).into_response()
	}
}
