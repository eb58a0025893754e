//! Lifecycle management for the accrual engine.

use super::{AccrualEngine, EngineError};

impl AccrualEngine {
	/// Checks the pipeline settings before anything is spawned.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		if self.config.poll_interval_seconds == 0 {
			return Err(EngineError::Config(
				"poll_interval_seconds must be greater than zero".into(),
			));
		}
		if self.config.worker_count == 0 {
			return Err(EngineError::Config(
				"worker_count must be greater than zero".into(),
			));
		}
		if self.config.max_orders_in_work == 0 {
			return Err(EngineError::Config(
				"max_orders_in_work must be greater than zero".into(),
			));
		}

		tracing::info!(
			poll_interval_seconds = self.config.poll_interval_seconds,
			worker_count = self.config.worker_count,
			max_orders_in_work = self.config.max_orders_in_work,
			"Starting orders processing"
		);
		Ok(())
	}

	/// Performs cleanup after all pipeline tasks have stopped.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Orders processing stopped");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::ScriptedClient;
	use accrual_config::builders::config::ConfigBuilder;
	use accrual_storage::implementations::memory::MemoryRepository;
	use std::sync::Arc;

	#[tokio::test]
	async fn test_initialize_rejects_zero_workers() {
		let config = ConfigBuilder::new().worker_count(0).build().pipeline;
		let engine = AccrualEngine::new(
			config,
			Arc::new(MemoryRepository::new()),
			Arc::new(ScriptedClient::new()),
		);

		let err = engine.initialize().await.unwrap_err();
		assert!(matches!(err, EngineError::Config(_)));
	}
}
