//! Retry policy for accrual service calls.
//!
//! Three kinds of failed attempts are distinguished:
//!
//! - network failures and 5xx responses spend the retry budget, waiting
//!   `backoff_unit * 2^n` before retry `n`;
//! - 429 responses, when rate-limit handling is on, wait for `Retry-After`
//!   seconds (or the fallback) and are retried without spending the budget;
//! - every other error status fails the call at once.

use accrual_config::AccrualConfig;
use backoff::backoff::Backoff;
use reqwest::StatusCode;
use std::time::Duration;

/// How a response status is treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
	Success,
	/// Worth retrying against the budget.
	Transient,
	/// Wait as instructed, then retry outside the budget.
	RateLimited,
	/// Give up immediately.
	Permanent,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
	/// Retries allowed after network failures and 5xx responses.
	pub retry_count: u32,
	pub backoff_unit: Duration,
	pub handle_rate_limit: bool,
	/// Wait used for a 429 without a usable `Retry-After` header.
	pub rate_limit_fallback: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			retry_count: 3,
			backoff_unit: Duration::from_secs(1),
			handle_rate_limit: true,
			rate_limit_fallback: Duration::from_secs(60),
		}
	}
}

impl RetryPolicy {
	pub fn from_config(config: &AccrualConfig) -> Self {
		Self {
			retry_count: config.retry_count,
			backoff_unit: config.backoff_unit(),
			handle_rate_limit: config.handle_rate_limit,
			rate_limit_fallback: config.rate_limit_fallback(),
		}
	}

	/// Wait before retry number `retry` (zero based).
	pub fn backoff_delay(&self, retry: u32) -> Duration {
		self.backoff_unit
			.saturating_mul(2u32.saturating_pow(retry))
	}

	/// Wait requested by a 429 response's `Retry-After` header value.
	///
	/// Only the delta-seconds form is understood; anything else falls back to
	/// the configured wait.
	pub fn rate_limit_delay(&self, retry_after: Option<&str>) -> Duration {
		retry_after
			.and_then(|value| value.trim().parse::<u64>().ok())
			.map(Duration::from_secs)
			.unwrap_or(self.rate_limit_fallback)
	}

	pub fn classify(&self, status: StatusCode) -> ResponseClass {
		if status == StatusCode::TOO_MANY_REQUESTS {
			if self.handle_rate_limit {
				ResponseClass::RateLimited
			} else {
				ResponseClass::Permanent
			}
		} else if status.is_server_error() {
			ResponseClass::Transient
		} else if status.is_client_error() {
			ResponseClass::Permanent
		} else {
			ResponseClass::Success
		}
	}

	/// Fresh budget for one call.
	pub fn budget(&self) -> RetryBudget {
		RetryBudget {
			policy: self.clone(),
			retries: 0,
		}
	}
}

/// Exponential backoff that stops after the policy's retry count.
#[derive(Debug, Clone)]
pub struct RetryBudget {
	policy: RetryPolicy,
	retries: u32,
}

impl RetryBudget {
	pub fn retries(&self) -> u32 {
		self.retries
	}
}

impl Backoff for RetryBudget {
	fn reset(&mut self) {
		self.retries = 0;
	}

	fn next_backoff(&mut self) -> Option<Duration> {
		if self.retries >= self.policy.retry_count {
			return None;
		}
		let delay = self.policy.backoff_delay(self.retries);
		self.retries += 1;
		Some(delay)
	}
}
