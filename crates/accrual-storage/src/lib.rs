//! Order repository for the accrual pipeline.
//!
//! The pipeline only talks to storage through [`OrderRepository`], a narrow
//! contract covering the stage queries, the two status transitions and the
//! transactional verdict recording. Backends are selected by name from the
//! configuration and built through factory functions.

use accrual_types::{
	ConfigSchema, ImplementationRegistry, LedgerEntry, Order, OrderStatus, ProcessingTask,
	TaskStatus,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

mod state;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// The requested order or task does not exist.
	#[error("Not found: {0}")]
	NotFound(String),
	/// The order number was already submitted.
	#[error("Order {order_number} already submitted by user {owner}")]
	Conflict { order_number: String, owner: Uuid },
	/// The order number fails the Luhn check.
	#[error("Invalid order number: {0}")]
	InvalidOrderNumber(String),
	/// A task or order is not in a state that allows the requested update.
	#[error("Invalid transition for order {order_number}: {from} -> {to}")]
	InvalidTransition {
		order_number: String,
		from: String,
		to: String,
	},
	/// The verdict carries an amount that cannot be credited.
	#[error("Invalid amount for order {order_number}: {amount}")]
	InvalidAmount {
		order_number: String,
		amount: Decimal,
	},
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Storage operations the accrual pipeline depends on.
///
/// Fetch operations claim the tasks they return: a claimed task is not
/// returned by any fetch again until it is resolved by [`mark_registered`] or
/// [`record_verdict`], or handed back with [`release`]. Claims are kept in
/// process memory only, so after a restart every unresolved task is visible
/// again.
///
/// [`mark_registered`]: OrderRepository::mark_registered
/// [`record_verdict`]: OrderRepository::record_verdict
/// [`release`]: OrderRepository::release
#[async_trait]
pub trait OrderRepository: Send + Sync {
	/// Creates an order and its processing task atomically.
	///
	/// Used at submission time. The number must be Luhn-valid and not yet
	/// submitted.
	async fn create_processing_task(
		&self,
		user_id: Uuid,
		order_number: &str,
	) -> Result<Order, StorageError>;

	/// Returns up to `limit` unclaimed tasks waiting for registration.
	async fn fetch_pending_registration(
		&self,
		limit: usize,
	) -> Result<Vec<ProcessingTask>, StorageError>;

	/// Returns up to `limit` unclaimed tasks waiting for a verdict.
	async fn fetch_pending_evaluation(
		&self,
		limit: usize,
	) -> Result<Vec<ProcessingTask>, StorageError>;

	/// Returns every unclaimed task that is neither new nor processed.
	///
	/// Used once at startup to resume work left over by a previous run.
	async fn fetch_in_flight(&self) -> Result<Vec<ProcessingTask>, StorageError>;

	/// Moves the task to REGISTERED and its order to PROCESSING in one update.
	async fn mark_registered(&self, order_number: &str) -> Result<(), StorageError>;

	/// Records the final verdict for an order.
	///
	/// Atomically moves the task to PROCESSED, sets the order's status and
	/// amount, and appends a ledger deposit when `amount` is positive. Either
	/// all of these changes are applied or none.
	async fn record_verdict(
		&self,
		order_number: &str,
		status: OrderStatus,
		amount: Decimal,
	) -> Result<(), StorageError>;

	/// Drops the claim on a task so that it can be fetched again.
	async fn release(&self, order_number: &str) -> Result<(), StorageError>;

	async fn get_order(&self, order_number: &str) -> Result<Order, StorageError>;

	/// Returns the most recent task for an order, including processed ones.
	async fn get_task(&self, order_number: &str) -> Result<ProcessingTask, StorageError>;

	/// Orders submitted by a user, oldest first.
	async fn user_orders(&self, user_id: Uuid) -> Result<Vec<Order>, StorageError>;

	/// Current balance of a user, zero when they have no ledger entries.
	async fn balance(&self, user_id: Uuid) -> Result<Decimal, StorageError>;

	/// Ledger entries of a user, oldest first.
	async fn ledger(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Convenience for stage code that only knows which task status it serves.
pub async fn fetch_pending(
	repository: &dyn OrderRepository,
	status: TaskStatus,
	limit: usize,
) -> Result<Vec<ProcessingTask>, StorageError> {
	match status {
		TaskStatus::New => repository.fetch_pending_registration(limit).await,
		TaskStatus::Registered => repository.fetch_pending_evaluation(limit).await,
		TaskStatus::Processed => Ok(Vec::new()),
	}
}

/// Type alias for repository factory functions.
pub type RepositoryFactory = fn(&toml::Value) -> Result<Box<dyn OrderRepository>, StorageError>;

/// Registry trait for repository implementations.
pub trait RepositoryRegistry: ImplementationRegistry<Factory = RepositoryFactory> {}

/// Get all registered repository implementations.
///
/// Returns (name, factory) pairs used by the service to build the backend
/// named in `storage.primary`.
pub fn get_all_implementations() -> Vec<(&'static str, RepositoryFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}
