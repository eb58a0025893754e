//! File-backed repository.
//!
//! The whole repository is kept in memory and written to a single JSON
//! snapshot after every change. A change is applied to a copy of the state,
//! the copy is written to a temporary file that is then renamed over the
//! snapshot, and only then does the copy replace the live state. A failed
//! write therefore leaves both the file and the in-memory state unchanged.
//!
//! Claims are not written to the snapshot, so after a restart every
//! registered but unresolved task is returned by `fetch_in_flight`.
//!
//! Each commit clones the full state and rewrites the full snapshot. Task
//! history and ledger only grow, so the cost of a write grows with the total
//! history. This suits local runs and tests; large deployments need a
//! database-backed repository.

use crate::state::RepositoryState;
use crate::{OrderRepository, RepositoryFactory, RepositoryRegistry, StorageError};
use accrual_types::{
	ConfigSchema, Field, ImplementationRegistry, LedgerEntry, Order, OrderStatus,
	ProcessingTask, Schema, TaskStatus, ValidationError,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

const DEFAULT_STORAGE_PATH: &str = "./data/accrual.json";

/// File-backed repository implementation.
pub struct FileRepository {
	/// Location of the JSON snapshot.
	path: PathBuf,
	state: RwLock<RepositoryState>,
}

impl FileRepository {
	/// Opens the snapshot at `path`, starting empty when it does not exist.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let path = path.into();
		let state = match std::fs::read(&path) {
			Ok(bytes) => serde_json::from_slice(&bytes)
				.map_err(|e| StorageError::Serialization(e.to_string()))?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => RepositoryState::default(),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		tracing::debug!(path = %path.display(), "Opened file repository");
		Ok(Self {
			path,
			state: RwLock::new(state),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Applies `change` to a copy of the state and commits it once the
	/// snapshot is on disk.
	async fn commit<T, F>(&self, change: F) -> Result<T, StorageError>
	where
		F: FnOnce(&mut RepositoryState) -> Result<T, StorageError>,
	{
		let mut state = self.state.write().await;
		let mut next = state.clone();
		let result = change(&mut next)?;
		self.persist(&next).await?;
		*state = next;
		Ok(result)
	}

	async fn persist(&self, state: &RepositoryState) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(state).map_err(|e| StorageError::Serialization(e.to_string()))?;

		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let temp_path = self.path.with_extension("tmp");
		fs::write(&temp_path, bytes)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &self.path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		Ok(())
	}
}

#[async_trait]
impl OrderRepository for FileRepository {
	async fn create_processing_task(
		&self,
		user_id: Uuid,
		order_number: &str,
	) -> Result<Order, StorageError> {
		self.commit(|state| state.create_order(user_id, order_number))
			.await
	}

	async fn fetch_pending_registration(
		&self,
		limit: usize,
	) -> Result<Vec<ProcessingTask>, StorageError> {
		Ok(self
			.state
			.write()
			.await
			.claim_pending(TaskStatus::New, limit))
	}

	async fn fetch_pending_evaluation(
		&self,
		limit: usize,
	) -> Result<Vec<ProcessingTask>, StorageError> {
		Ok(self
			.state
			.write()
			.await
			.claim_pending(TaskStatus::Registered, limit))
	}

	async fn fetch_in_flight(&self) -> Result<Vec<ProcessingTask>, StorageError> {
		Ok(self.state.write().await.claim_in_flight())
	}

	async fn mark_registered(&self, order_number: &str) -> Result<(), StorageError> {
		self.commit(|state| state.mark_registered(order_number))
			.await
	}

	async fn record_verdict(
		&self,
		order_number: &str,
		status: OrderStatus,
		amount: Decimal,
	) -> Result<(), StorageError> {
		self.commit(|state| state.record_verdict(order_number, status, amount))
			.await
	}

	async fn release(&self, order_number: &str) -> Result<(), StorageError> {
		self.state.write().await.release(order_number);
		Ok(())
	}

	async fn get_order(&self, order_number: &str) -> Result<Order, StorageError> {
		self.state.read().await.order(order_number).cloned()
	}

	async fn get_task(&self, order_number: &str) -> Result<ProcessingTask, StorageError> {
		self.state.read().await.latest_task(order_number).cloned()
	}

	async fn user_orders(&self, user_id: Uuid) -> Result<Vec<Order>, StorageError> {
		Ok(self.state.read().await.user_orders(user_id))
	}

	async fn balance(&self, user_id: Uuid) -> Result<Decimal, StorageError> {
		Ok(self.state.read().await.balance(user_id))
	}

	async fn ledger(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, StorageError> {
		Ok(self.state.read().await.ledger(user_id))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileRepositorySchema)
	}
}

/// Configuration schema for FileRepository.
pub struct FileRepositorySchema;

impl ConfigSchema for FileRepositorySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path").with_validator(|value| {
					match value.as_str() {
						Some(path) if path.trim().is_empty() => {
							Err("storage_path cannot be empty".to_string())
						},
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file repository from configuration.
///
/// Configuration parameters:
/// - `storage_path`: snapshot file, defaults to `./data/accrual.json`
pub fn create_repository(config: &toml::Value) -> Result<Box<dyn OrderRepository>, StorageError> {
	FileRepositorySchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileRepository::open(storage_path)?))
}

/// Registry for the file repository.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = RepositoryFactory;

	fn factory() -> Self::Factory {
		create_repository
	}
}

impl RepositoryRegistry for Registry {}
