//! Configuration for the accrual pipeline service.
//!
//! Configuration is read from a TOML file. Values may reference environment
//! variables with `${VAR}` or `${VAR:-default}`, which are substituted before
//! parsing. The parsed configuration is validated before it is handed out, so
//! every component can rely on the invariants checked here.

#[cfg(any(test, feature = "testing"))]
pub mod builders;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only, the full error embeds the whole input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Remote accrual service connection and retry policy.
	pub accrual: AccrualConfig,
	/// Dispatcher and worker pool sizing.
	pub pipeline: PipelineConfig,
	/// Order repository backend selection.
	pub storage: StorageConfig,
	/// Optional order intake HTTP API.
	pub api: Option<ApiConfig>,
}

/// Identity of this service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier, used in logs.
	pub id: String,
}

/// Remote accrual service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccrualConfig {
	/// Base URL that order numbers are appended to, e.g.
	/// `http://localhost:8081/api/orders`.
	pub base_url: String,
	/// Whether 429 responses are waited out instead of failing the call.
	#[serde(default = "default_handle_rate_limit")]
	pub handle_rate_limit: bool,
	/// Retries after network failures and 5xx responses.
	#[serde(default = "default_retry_count")]
	pub retry_count: u32,
	/// Unit of the exponential backoff; retry `n` waits `unit * 2^n`.
	#[serde(default = "default_backoff_unit_ms")]
	pub backoff_unit_ms: u64,
	/// Wait applied to a 429 without a usable `Retry-After` header.
	#[serde(default = "default_rate_limit_fallback_seconds")]
	pub rate_limit_fallback_seconds: u64,
	/// Per-request timeout. No timeout when absent.
	#[serde(default)]
	pub request_timeout_seconds: Option<u64>,
}

impl AccrualConfig {
	pub fn backoff_unit(&self) -> Duration {
		Duration::from_millis(self.backoff_unit_ms)
	}

	pub fn rate_limit_fallback(&self) -> Duration {
		Duration::from_secs(self.rate_limit_fallback_seconds)
	}

	pub fn request_timeout(&self) -> Option<Duration> {
		self.request_timeout_seconds.map(Duration::from_secs)
	}
}

/// Returns the default for 429 handling.
///
/// Rate limits are honoured unless explicitly disabled.
fn default_handle_rate_limit() -> bool {
	true
}

/// Returns the default retry budget for transient failures.
fn default_retry_count() -> u32 {
	3
}

/// Returns the default backoff unit in milliseconds.
///
/// With the default budget this gives waits of 1s, 2s and 4s.
fn default_backoff_unit_ms() -> u64 {
	1000
}

/// Returns the default wait for a 429 without `Retry-After`.
fn default_rate_limit_fallback_seconds() -> u64 {
	60
}

/// Dispatcher and worker pool settings, shared by both stages.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
	/// How often each stage's dispatcher queries storage for new work.
	pub poll_interval_seconds: u64,
	/// Number of concurrent workers per stage.
	pub worker_count: usize,
	/// Capacity of each stage's work queue.
	pub max_orders_in_work: usize,
	/// Pause between evaluation polls that return a non-terminal verdict.
	/// Zero polls again immediately.
	#[serde(default)]
	pub evaluation_poll_delay_ms: u64,
	/// Upper bound on the time a worker may spend on one task.
	#[serde(default)]
	pub task_deadline_seconds: Option<u64>,
}

impl PipelineConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_seconds)
	}

	pub fn evaluation_poll_delay(&self) -> Duration {
		Duration::from_millis(self.evaluation_poll_delay_ms)
	}

	pub fn task_deadline(&self) -> Option<Duration> {
		self.task_deadline_seconds.map(Duration::from_secs)
	}
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the order intake API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is started.
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
}

/// Returns the default API host.
fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

/// Returns the default API port.
fn default_api_port() -> u16 {
	3000
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable and
/// supports defaults with `${VAR_NAME:-default_value}`.
///
/// Input strings are limited to 1MB to keep regex matching bounded.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut resolved = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		// Comment lines are copied as they are
		let line_start = input[..full_match.start()]
			.rfind('\n')
			.map_or(0, |i| i + 1);
		if input[line_start..full_match.start()]
			.trim_start()
			.starts_with('#')
		{
			continue;
		}
		let value = match (std::env::var(var_name.as_str()), cap.get(2)) {
			(Ok(v), _) => v,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name.as_str()
				)));
			},
		};

		resolved.push_str(&input[last_end..full_match.start()]);
		resolved.push_str(&value);
		last_end = full_match.end();
	}
	resolved.push_str(&input[last_end..]);

	Ok(resolved)
}

impl Config {
	/// Loads configuration from a file, resolving environment variables and
	/// validating the result.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await?;
		content.parse()
	}

	/// Validates cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		let base_url = self.accrual.base_url.trim();
		if base_url.is_empty() {
			return Err(ConfigError::Validation(
				"Accrual base_url cannot be empty".into(),
			));
		}
		if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
			return Err(ConfigError::Validation(format!(
				"Accrual base_url must be an http(s) URL, got '{}'",
				base_url
			)));
		}
		if self.accrual.retry_count > 10 {
			return Err(ConfigError::Validation(format!(
				"retry_count must be at most 10, got {}",
				self.accrual.retry_count
			)));
		}
		if self.accrual.backoff_unit_ms == 0 {
			return Err(ConfigError::Validation(
				"backoff_unit_ms must be greater than 0".into(),
			));
		}

		let pipeline = &self.pipeline;
		if pipeline.poll_interval_seconds == 0 || pipeline.poll_interval_seconds > 86400 {
			return Err(ConfigError::Validation(format!(
				"poll_interval_seconds must be between 1 and 86400, got {}",
				pipeline.poll_interval_seconds
			)));
		}
		if pipeline.worker_count == 0 {
			return Err(ConfigError::Validation(
				"worker_count must be at least 1".into(),
			));
		}
		if pipeline.max_orders_in_work == 0 {
			return Err(ConfigError::Validation(
				"max_orders_in_work must be at least 1".into(),
			));
		}
		if pipeline.task_deadline_seconds == Some(0) {
			return Err(ConfigError::Validation(
				"task_deadline_seconds must be greater than 0 when set".into(),
			));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		if let Some(api) = &self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation("API port cannot be 0".into()));
			}
		}

		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[service]
id = "accrual-test"

[accrual]
base_url = "http://localhost:8081/api/orders"

[pipeline]
poll_interval_seconds = 5
worker_count = 2
max_orders_in_work = 10

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("ACCRUAL_TEST_HOST", "localhost");
		std::env::set_var("ACCRUAL_TEST_PORT", "8081");

		let input = "url = \"http://${ACCRUAL_TEST_HOST}:${ACCRUAL_TEST_PORT}/api\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "url = \"http://localhost:8081/api\"");

		std::env::remove_var("ACCRUAL_TEST_HOST");
		std::env::remove_var("ACCRUAL_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${ACCRUAL_MISSING_VAR:-fallback}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"fallback\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${ACCRUAL_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("ACCRUAL_MISSING_VAR"));
	}

	#[test]
	fn test_defaults_applied() {
		let config: Config = MINIMAL.parse().unwrap();

		assert!(config.accrual.handle_rate_limit);
		assert_eq!(config.accrual.retry_count, 3);
		assert_eq!(config.accrual.backoff_unit(), Duration::from_secs(1));
		assert_eq!(config.accrual.rate_limit_fallback(), Duration::from_secs(60));
		assert!(config.accrual.request_timeout().is_none());
		assert_eq!(config.pipeline.poll_interval(), Duration::from_secs(5));
		assert_eq!(config.pipeline.evaluation_poll_delay(), Duration::ZERO);
		assert!(config.pipeline.task_deadline().is_none());
		assert!(config.api.is_none());
	}

	#[test]
	fn test_pipeline_values_from_env() {
		std::env::set_var("ACCRUAL_TEST_WORKER_LIMIT", "7");

		let config_str = MINIMAL.replace(
			"worker_count = 2",
			"worker_count = ${ACCRUAL_TEST_WORKER_LIMIT:-1}",
		);
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.pipeline.worker_count, 7);

		std::env::remove_var("ACCRUAL_TEST_WORKER_LIMIT");
	}

	#[test]
	fn test_invalid_pipeline_rejected() {
		let zero_workers = MINIMAL.replace("worker_count = 2", "worker_count = 0");
		let err = zero_workers.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("worker_count"));

		let zero_capacity = MINIMAL.replace("max_orders_in_work = 10", "max_orders_in_work = 0");
		let err = zero_capacity.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("max_orders_in_work"));

		let zero_interval = MINIMAL.replace("poll_interval_seconds = 5", "poll_interval_seconds = 0");
		assert!(zero_interval.parse::<Config>().is_err());
	}

	#[test]
	fn test_invalid_base_url_rejected() {
		let config_str = MINIMAL.replace("http://localhost:8081/api/orders", "localhost:8081");
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_unknown_primary_storage_rejected() {
		let config_str = MINIMAL.replace("primary = \"memory\"", "primary = \"file\"");
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Primary storage 'file'"));
	}

	#[test]
	fn test_placeholders_in_comments_are_ignored() {
		let input = "# use ${ACCRUAL_UNSET_IN_TESTS} here\nid = \"${ACCRUAL_UNSET_IN_TESTS:-x}\"\n";

		let resolved = resolve_env_vars(input).unwrap();

		assert_eq!(
			resolved,
			"# use ${ACCRUAL_UNSET_IN_TESTS} here\nid = \"x\"\n"
		);
	}

	#[test]
	fn test_shipped_config_parses() {
		let config: Config = include_str!("../../../config/accrual.toml").parse().unwrap();

		assert_eq!(config.storage.primary, "file");
		assert!(config.storage.implementations.contains_key("memory"));
		assert!(config.api.as_ref().is_some_and(|api| api.enabled));
		assert!(config.accrual.base_url.ends_with("/api/orders"));
	}

	#[tokio::test]
	async fn test_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("accrual.toml");
		tokio::fs::write(&path, MINIMAL).await.unwrap();

		let config = Config::from_file(&path).await.unwrap();
		assert_eq!(config.service.id, "accrual-test");
		assert_eq!(config.pipeline.max_orders_in_work, 10);

		let missing = Config::from_file(dir.path().join("missing.toml")).await;
		assert!(matches!(missing, Err(ConfigError::Io(_))));
	}
}
