//! Test doubles for the accrual service and the repository.

use accrual_client::{AccrualInterface, ClientError};
use accrual_storage::implementations::memory::MemoryRepository;
use accrual_storage::{OrderRepository, StorageError};
use accrual_types::{
	ConfigSchema, LedgerEntry, Order, OrderStatus, ProcessingTask, RemoteVerdict, VerdictStatus,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
	Verdict(VerdictStatus, Option<Decimal>),
	/// Fails the call as if the service answered with this status.
	Fail(u16),
	/// Panics inside the call.
	Panic,
}

/// Accrual service double answering from a per-order script.
///
/// Replies are consumed in order; the last verdict is repeated once the
/// script runs out. Orders without a script fail with 404.
#[derive(Default)]
pub(crate) struct ScriptedClient {
	scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
	calls: Mutex<HashMap<String, usize>>,
	latency: Option<Duration>,
}

impl ScriptedClient {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_latency(latency: Duration) -> Self {
		Self {
			latency: Some(latency),
			..Self::default()
		}
	}

	pub fn script(&self, order_number: &str, replies: Vec<Reply>) {
		self.scripts
			.lock()
			.unwrap()
			.insert(order_number.to_string(), replies.into());
	}

	pub fn calls(&self, order_number: &str) -> usize {
		self.calls
			.lock()
			.unwrap()
			.get(order_number)
			.copied()
			.unwrap_or(0)
	}

	fn next_reply(&self, order_number: &str) -> Option<Reply> {
		let mut scripts = self.scripts.lock().unwrap();
		let script = scripts.get_mut(order_number)?;
		match script.len() {
			0 => None,
			1 if matches!(script.front(), Some(Reply::Verdict(..))) => script.front().cloned(),
			_ => script.pop_front(),
		}
	}
}

#[async_trait]
impl AccrualInterface for ScriptedClient {
	async fn fetch(&self, order_number: &str) -> Result<RemoteVerdict, ClientError> {
		*self
			.calls
			.lock()
			.unwrap()
			.entry(order_number.to_string())
			.or_default() += 1;

		if let Some(latency) = self.latency {
			tokio::time::sleep(latency).await;
		}

		match self.next_reply(order_number) {
			Some(Reply::Verdict(status, accrual)) => Ok(RemoteVerdict {
				order: order_number.to_string(),
				status,
				accrual,
			}),
			Some(Reply::Fail(status)) => Err(ClientError::Status {
				status,
				url: format!("scripted://{}", order_number),
			}),
			Some(Reply::Panic) => panic!("scripted panic for order {}", order_number),
			None => Err(ClientError::Status {
				status: 404,
				url: format!("scripted://{}", order_number),
			}),
		}
	}
}

/// Memory repository with injectable failures.
///
/// `fail_fetches(n)` makes the next `n` fetch calls fail, `fail_records(n)`
/// does the same for `record_verdict`. Fetch limits are recorded so tests can
/// check what the dispatcher asked for.
#[derive(Default)]
pub(crate) struct FaultyRepository {
	inner: MemoryRepository,
	fetch_failures: AtomicUsize,
	record_failures: AtomicUsize,
	duplicate_in_flight: AtomicBool,
	limits: Mutex<Vec<usize>>,
}

impl FaultyRepository {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn fail_fetches(&self, count: usize) {
		self.fetch_failures.store(count, Ordering::SeqCst);
	}

	pub fn fail_records(&self, count: usize) {
		self.record_failures.store(count, Ordering::SeqCst);
	}

	/// Makes `fetch_in_flight` return every record twice.
	pub fn duplicate_in_flight(&self, enabled: bool) {
		self.duplicate_in_flight.store(enabled, Ordering::SeqCst);
	}

	pub fn requested_limits(&self) -> Vec<usize> {
		self.limits.lock().unwrap().clone()
	}

	fn injected(counter: &AtomicUsize) -> Result<(), StorageError> {
		let armed = counter
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok();
		if armed {
			Err(StorageError::Backend("injected failure".to_string()))
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl OrderRepository for FaultyRepository {
	async fn create_processing_task(
		&self,
		user_id: Uuid,
		order_number: &str,
	) -> Result<Order, StorageError> {
		self.inner.create_processing_task(user_id, order_number).await
	}

	async fn fetch_pending_registration(
		&self,
		limit: usize,
	) -> Result<Vec<ProcessingTask>, StorageError> {
		self.limits.lock().unwrap().push(limit);
		Self::injected(&self.fetch_failures)?;
		self.inner.fetch_pending_registration(limit).await
	}

	async fn fetch_pending_evaluation(
		&self,
		limit: usize,
	) -> Result<Vec<ProcessingTask>, StorageError> {
		self.limits.lock().unwrap().push(limit);
		Self::injected(&self.fetch_failures)?;
		self.inner.fetch_pending_evaluation(limit).await
	}

	async fn fetch_in_flight(&self) -> Result<Vec<ProcessingTask>, StorageError> {
		Self::injected(&self.fetch_failures)?;
		let tasks = self.inner.fetch_in_flight().await?;
		if self.duplicate_in_flight.load(Ordering::SeqCst) {
			Ok(tasks.iter().chain(tasks.iter()).cloned().collect())
		} else {
			Ok(tasks)
		}
	}

	async fn mark_registered(&self, order_number: &str) -> Result<(), StorageError> {
		self.inner.mark_registered(order_number).await
	}

	async fn record_verdict(
		&self,
		order_number: &str,
		status: OrderStatus,
		amount: Decimal,
	) -> Result<(), StorageError> {
		Self::injected(&self.record_failures)?;
		self.inner.record_verdict(order_number, status, amount).await
	}

	async fn release(&self, order_number: &str) -> Result<(), StorageError> {
		self.inner.release(order_number).await
	}

	async fn get_order(&self, order_number: &str) -> Result<Order, StorageError> {
		self.inner.get_order(order_number).await
	}

	async fn get_task(&self, order_number: &str) -> Result<ProcessingTask, StorageError> {
		self.inner.get_task(order_number).await
	}

	async fn user_orders(&self, user_id: Uuid) -> Result<Vec<Order>, StorageError> {
		self.inner.user_orders(user_id).await
	}

	async fn balance(&self, user_id: Uuid) -> Result<Decimal, StorageError> {
		self.inner.balance(user_id).await
	}

	async fn ledger(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, StorageError> {
		self.inner.ledger(user_id).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}
}

pub(crate) fn registered() -> Reply {
	Reply::Verdict(VerdictStatus::Registered, None)
}

pub(crate) fn processing() -> Reply {
	Reply::Verdict(VerdictStatus::Processing, None)
}

pub(crate) fn processed(amount: i64) -> Reply {
	Reply::Verdict(VerdictStatus::Processed, Some(Decimal::from(amount)))
}

pub(crate) fn invalid() -> Reply {
	Reply::Verdict(VerdictStatus::Invalid, None)
}

/// Luhn-valid order numbers, smallest first.
pub(crate) fn order_numbers(count: usize) -> Vec<String> {
	(1u64..)
		.map(|n| n.to_string())
		.filter(|n| accrual_types::is_valid_order_number(n))
		.take(count)
		.collect()
}
