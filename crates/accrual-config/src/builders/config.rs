//! Configuration builder for tests and local development.

use crate::{AccrualConfig, ApiConfig, Config, PipelineConfig, ServiceConfig, StorageConfig};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
///
/// Defaults use the in-memory repository, a single worker per stage and a
/// millisecond backoff unit so tests do not sleep for seconds.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	base_url: String,
	handle_rate_limit: bool,
	retry_count: u32,
	backoff_unit_ms: u64,
	poll_interval_seconds: u64,
	worker_count: usize,
	max_orders_in_work: usize,
	evaluation_poll_delay_ms: u64,
	task_deadline_seconds: Option<u64>,
	storage_primary: String,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			service_id: "accrual-test".to_string(),
			base_url: "http://127.0.0.1:8081/api/orders".to_string(),
			handle_rate_limit: true,
			retry_count: 3,
			backoff_unit_ms: 1,
			poll_interval_seconds: 1,
			worker_count: 1,
			max_orders_in_work: 10,
			evaluation_poll_delay_ms: 0,
			task_deadline_seconds: None,
			storage_primary: "memory".to_string(),
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	pub fn base_url(mut self, url: impl Into<String>) -> Self {
		self.base_url = url.into();
		self
	}

	pub fn handle_rate_limit(mut self, enabled: bool) -> Self {
		self.handle_rate_limit = enabled;
		self
	}

	pub fn retry_count(mut self, count: u32) -> Self {
		self.retry_count = count;
		self
	}

	pub fn backoff_unit_ms(mut self, unit: u64) -> Self {
		self.backoff_unit_ms = unit;
		self
	}

	pub fn poll_interval_seconds(mut self, seconds: u64) -> Self {
		self.poll_interval_seconds = seconds;
		self
	}

	pub fn worker_count(mut self, count: usize) -> Self {
		self.worker_count = count;
		self
	}

	pub fn max_orders_in_work(mut self, capacity: usize) -> Self {
		self.max_orders_in_work = capacity;
		self
	}

	pub fn evaluation_poll_delay_ms(mut self, delay: u64) -> Self {
		self.evaluation_poll_delay_ms = delay;
		self
	}

	pub fn task_deadline_seconds(mut self, deadline: Option<u64>) -> Self {
		self.task_deadline_seconds = deadline;
		self
	}

	pub fn storage_primary(mut self, primary: impl Into<String>) -> Self {
		self.storage_primary = primary.into();
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config`. The primary storage gets an empty table.
	pub fn build(self) -> Config {
		let mut implementations = HashMap::new();
		implementations.insert(
			self.storage_primary.clone(),
			toml::Value::Table(toml::map::Map::new()),
		);

		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			accrual: AccrualConfig {
				base_url: self.base_url,
				handle_rate_limit: self.handle_rate_limit,
				retry_count: self.retry_count,
				backoff_unit_ms: self.backoff_unit_ms,
				rate_limit_fallback_seconds: 60,
				request_timeout_seconds: None,
			},
			pipeline: PipelineConfig {
				poll_interval_seconds: self.poll_interval_seconds,
				worker_count: self.worker_count,
				max_orders_in_work: self.max_orders_in_work,
				evaluation_poll_delay_ms: self.evaluation_poll_delay_ms,
				task_deadline_seconds: self.task_deadline_seconds,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations,
			},
			api: self.api,
		}
	}
}
