//! HTTP client for the accrual service built on reqwest.

use crate::retry::{ResponseClass, RetryPolicy};
use crate::{decode_verdict, AccrualInterface, ClientError};
use accrual_config::AccrualConfig;
use accrual_types::RemoteVerdict;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, RequestBuilder};
use std::time::Duration;

/// Accrual service client with transparent retries.
///
/// Every request is sent with `Content-Type: application/json`. Request
/// bodies are kept as [`Bytes`] and sent again unchanged on each attempt.
#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
	http: reqwest::Client,
	base_url: String,
	policy: RetryPolicy,
}

impl HttpAccrualClient {
	pub fn new(
		base_url: impl Into<String>,
		policy: RetryPolicy,
		request_timeout: Option<Duration>,
	) -> Result<Self, ClientError> {
		let mut builder = reqwest::Client::builder();
		if let Some(timeout) = request_timeout {
			builder = builder.timeout(timeout);
		}
		let http = builder
			.build()
			.map_err(|e| ClientError::Configuration(e.to_string()))?;

		Ok(Self {
			http,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			policy,
		})
	}

	pub fn from_config(config: &AccrualConfig) -> Result<Self, ClientError> {
		Self::new(
			config.base_url.trim(),
			RetryPolicy::from_config(config),
			config.request_timeout(),
		)
	}

	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	fn order_url(&self, order_number: &str) -> String {
		format!("{}/{}", self.base_url, order_number)
	}

	pub async fn get(&self, url: &str) -> Result<Bytes, ClientError> {
		self.send(Method::GET, url, None).await
	}

	pub async fn post(&self, url: &str, body: Bytes) -> Result<Bytes, ClientError> {
		self.send(Method::POST, url, Some(body)).await
	}

	/// Sends a request under the retry policy and returns the response body.
	pub async fn send(
		&self,
		method: Method,
		url: &str,
		body: Option<Bytes>,
	) -> Result<Bytes, ClientError> {
		let policy = &self.policy;
		let operation = || {
			let mut request = self
				.http
				.request(method.clone(), url)
				.header(CONTENT_TYPE, "application/json");
			if let Some(body) = &body {
				request = request.body(body.clone());
			}
			attempt(request, policy)
		};

		backoff::future::retry_notify(
			policy.budget(),
			operation,
			|err: ClientError, wait: Duration| {
				tracing::warn!(
					url = %url,
					error = %err,
					wait_ms = wait.as_millis() as u64,
					"Accrual request failed, retrying"
				);
			},
		)
		.await
	}
}

/// Performs one attempt and sorts its outcome for the retry loop.
async fn attempt(
	request: RequestBuilder,
	policy: &RetryPolicy,
) -> Result<Bytes, backoff::Error<ClientError>> {
	let response = request
		.send()
		.await
		.map_err(|e| backoff::Error::transient(ClientError::Network(e.to_string())))?;

	let status = response.status();
	let url = response.url().to_string();
	match policy.classify(status) {
		ResponseClass::Success => response
			.bytes()
			.await
			.map_err(|e| backoff::Error::transient(ClientError::Network(e.to_string()))),
		ResponseClass::RateLimited => {
			let retry_after = response
				.headers()
				.get(RETRY_AFTER)
				.and_then(|value| value.to_str().ok());
			let wait = policy.rate_limit_delay(retry_after);
			Err(backoff::Error::retry_after(
				ClientError::Status {
					status: status.as_u16(),
					url,
				},
				wait,
			))
		},
		ResponseClass::Transient => Err(backoff::Error::transient(ClientError::Status {
			status: status.as_u16(),
			url,
		})),
		ResponseClass::Permanent => Err(backoff::Error::permanent(ClientError::Status {
			status: status.as_u16(),
			url,
		})),
	}
}

#[async_trait]
impl AccrualInterface for HttpAccrualClient {
	async fn fetch(&self, order_number: &str) -> Result<RemoteVerdict, ClientError> {
		let body = self.get(&self.order_url(order_number)).await?;
		let verdict = decode_verdict(&body)?;
		tracing::debug!(
			order_number = %order_number,
			status = %verdict.status,
			"Received accrual verdict"
		);
		Ok(verdict)
	}
}
