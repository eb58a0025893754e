//! Builder for constructing accrual engines.
//!
//! The repository backend is picked by name from a set of factory functions,
//! using the `[storage]` section of the configuration. The accrual service
//! client is built from `[accrual]`.

use crate::engine::AccrualEngine;
use accrual_client::{AccrualInterface, HttpAccrualClient};
use accrual_config::Config;
use accrual_storage::{OrderRepository, RepositoryFactory, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions available to the builder, keyed by implementation name.
pub struct AccrualFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

impl AccrualFactories<RepositoryFactory> {
	/// Factories for every repository implementation shipped with the crate.
	pub fn registered() -> Self {
		Self {
			storage_factories: accrual_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}
}

/// Builder for an [`AccrualEngine`] with pluggable implementations.
pub struct AccrualBuilder {
	config: Config,
}

impl AccrualBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine, creating the primary repository and the client.
	pub fn build<SF>(self, factories: AccrualFactories<SF>) -> Result<AccrualEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn OrderRepository>, StorageError>,
	{
		let primary = &self.config.storage.primary;
		let implementation_config = self.config.storage.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' has no configuration section",
				primary
			))
		})?;

		for name in self.config.storage.implementations.keys() {
			if name != primary {
				tracing::debug!(component = "storage", implementation = %name, "Configured but not primary, skipping");
			}
		}

		let factory = factories
			.storage_factories
			.get(primary)
			.ok_or_else(|| BuilderError::MissingComponent(format!("storage '{}'", primary)))?;

		let repository: Arc<dyn OrderRepository> = match factory(implementation_config) {
			Ok(implementation) => {
				tracing::info!(component = "storage", implementation = %primary, "Loaded");
				Arc::from(implementation)
			},
			Err(e) => {
				tracing::error!(
					component = "storage",
					implementation = %primary,
					error = %e,
					"Failed to create storage implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create storage implementation '{}': {}",
					primary, e
				)));
			},
		};

		let client: Arc<dyn AccrualInterface> = Arc::new(
			HttpAccrualClient::from_config(&self.config.accrual)
				.map_err(|e| BuilderError::Config(e.to_string()))?,
		);
		tracing::info!(component = "accrual", base_url = %self.config.accrual.base_url, "Loaded");

		Ok(AccrualEngine::new(
			self.config.pipeline.clone(),
			repository,
			client,
		))
	}
}
