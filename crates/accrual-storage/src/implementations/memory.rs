//! In-memory repository.
//!
//! Keeps everything in process memory behind a single lock, which makes
//! every operation atomic. Nothing survives a restart, so this backend is
//! meant for tests and local development.

use crate::state::RepositoryState;
use crate::{OrderRepository, RepositoryFactory, RepositoryRegistry, StorageError};
use accrual_types::{
	ConfigSchema, ImplementationRegistry, LedgerEntry, Order, OrderStatus, ProcessingTask, Schema,
	TaskStatus, ValidationError,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory repository implementation.
pub struct MemoryRepository {
	state: Arc<RwLock<RepositoryState>>,
}

impl MemoryRepository {
	pub fn new() -> Self {
		Self {
			state: Arc::new(RwLock::new(RepositoryState::default())),
		}
	}
}

impl Default for MemoryRepository {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl OrderRepository for MemoryRepository {
	async fn create_processing_task(
		&self,
		user_id: Uuid,
		order_number: &str,
	) -> Result<Order, StorageError> {
		self.state.write().await.create_order(user_id, order_number)
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
		self.state.write().await.mark_registered(order_number)
	}

	async fn record_verdict(
		&self,
		order_number: &str,
		status: OrderStatus,
		amount: Decimal,
	) -> Result<(), StorageError> {
		self.state
			.write()
			.await
			.record_verdict(order_number, status, amount)
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
		Box::new(MemoryRepositorySchema)
	}
}

/// Configuration schema for MemoryRepository.
pub struct MemoryRepositorySchema;

impl ConfigSchema for MemoryRepositorySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// No settings
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory repository from configuration.
pub fn create_repository(_config: &toml::Value) -> Result<Box<dyn OrderRepository>, StorageError> {
	Ok(Box::new(MemoryRepository::new()))
}

/// Registry for the memory repository.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = RepositoryFactory;

	fn factory() -> Self::Factory {
		create_repository
	}
}

impl RepositoryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	#[tokio::test]
	async fn test_basic_lifecycle() {
		let repo = MemoryRepository::new();
		let user = Uuid::new_v4();

		let order = repo
			.create_processing_task(user, "79927398713")
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::New);

		// Registration stage
		let tasks = repo.fetch_pending_registration(10).await.unwrap();
		assert_eq!(tasks.len(), 1);
		repo.mark_registered("79927398713").await.unwrap();
		assert_eq!(
			repo.get_order("79927398713").await.unwrap().status,
			OrderStatus::Processing
		);

		// Evaluation stage
		let tasks = repo.fetch_pending_evaluation(10).await.unwrap();
		assert_eq!(tasks.len(), 1);
		repo.record_verdict("79927398713", OrderStatus::Processed, Decimal::from(500))
			.await
			.unwrap();

		assert_eq!(repo.balance(user).await.unwrap(), Decimal::from(500));
		assert_eq!(
			repo.get_task("79927398713").await.unwrap().status,
			TaskStatus::Processed
		);
		assert!(repo.fetch_pending_evaluation(10).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_concurrent_fetches_never_share_tasks() {
		let repo = Arc::new(MemoryRepository::new());
		let user = Uuid::new_v4();
		// First 20 Luhn-valid numbers
		let numbers: Vec<String> = (0u64..)
			.map(|n| n.to_string())
			.filter(|n| accrual_types::is_valid_order_number(n))
			.take(20)
			.collect();
		for number in &numbers {
			repo.create_processing_task(user, number).await.unwrap();
		}

		let handles: Vec<_> = (0..4)
			.map(|_| {
				let repo = repo.clone();
				tokio::spawn(async move { repo.fetch_pending_registration(7).await.unwrap() })
			})
			.collect();

		let mut seen = HashSet::new();
		let mut total = 0;
		for handle in handles {
			for task in handle.await.unwrap() {
				total += 1;
				seen.insert(task.order_number);
			}
		}
		assert_eq!(total, 20);
		assert_eq!(seen.len(), 20);
	}

	#[tokio::test]
	async fn test_release_makes_task_visible_again() {
		let repo = MemoryRepository::new();
		repo.create_processing_task(Uuid::new_v4(), "79927398713")
			.await
			.unwrap();

		assert_eq!(repo.fetch_pending_registration(1).await.unwrap().len(), 1);
		assert!(repo.fetch_pending_registration(1).await.unwrap().is_empty());

		repo.release("79927398713").await.unwrap();
		assert_eq!(repo.fetch_pending_registration(1).await.unwrap().len(), 1);
	}
}
