//! Client for the remote accrual service.
//!
//! The service answers `GET {base_url}/{order}` with the current verdict for
//! an order. Transient failures and rate limiting are handled inside the
//! client according to its [`RetryPolicy`], so callers only ever see a
//! verdict or a failure that retrying did not fix.

use accrual_types::{RemoteVerdict, VerdictStatus};
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

pub mod implementations {
	pub mod http;
}
pub mod retry;

pub use implementations::http::HttpAccrualClient;
pub use retry::RetryPolicy;

/// Errors that can occur while talking to the accrual service.
#[derive(Debug, Error)]
pub enum ClientError {
	/// The request could not be sent or the response could not be read.
	#[error("Network error: {0}")]
	Network(String),
	/// The service answered with an error status.
	#[error("Unexpected status {status} from {url}")]
	Status { status: u16, url: String },
	/// The response body is not a valid verdict.
	#[error("Decode error: {0}")]
	Decode(String),
	/// The client could not be built.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Access to the accrual service's verdicts.
///
/// Implementations must be safe to call from many workers at once.
#[async_trait]
pub trait AccrualInterface: Send + Sync {
	/// Fetches the current verdict for an order.
	async fn fetch(&self, order_number: &str) -> Result<RemoteVerdict, ClientError>;
}

/// Verdict as it appears on the wire, with a floating point amount.
#[derive(Debug, Deserialize)]
pub struct AccrualResponse {
	pub order: String,
	pub status: VerdictStatus,
	#[serde(default)]
	pub accrual: Option<f64>,
}

impl TryFrom<AccrualResponse> for RemoteVerdict {
	type Error = ClientError;

	fn try_from(response: AccrualResponse) -> Result<Self, Self::Error> {
		let accrual = response
			.accrual
			.map(|value| {
				Decimal::from_f64(value)
					.map(|d| d.normalize())
					.ok_or_else(|| ClientError::Decode(format!("accrual {} is not a decimal", value)))
			})
			.transpose()?;

		Ok(RemoteVerdict {
			order: response.order,
			status: response.status,
			accrual,
		})
	}
}

/// Decodes a verdict from a response body.
pub fn decode_verdict(body: &[u8]) -> Result<RemoteVerdict, ClientError> {
	let response: AccrualResponse =
		serde_json::from_slice(body).map_err(|e| ClientError::Decode(e.to_string()))?;
	response.try_into()
}
