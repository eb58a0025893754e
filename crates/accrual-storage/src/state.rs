//! Repository state shared by the storage backends.
//!
//! All checks of an update run before any field is touched, so a failed
//! update leaves the state unchanged. Backends wrap this in a lock to make
//! each operation atomic.

use crate::StorageError;
use accrual_types::{
	is_valid_order_number, LedgerEntry, Order, OrderStatus, ProcessingTask, TaskStatus,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

static ORDER_TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(OrderStatus::New, HashSet::from([OrderStatus::Processing]));
	m.insert(
		OrderStatus::Processing,
		HashSet::from([OrderStatus::Processed, OrderStatus::Invalid]),
	);
	m.insert(OrderStatus::Processed, HashSet::new()); // terminal
	m.insert(OrderStatus::Invalid, HashSet::new()); // terminal
	m
});

static TASK_TRANSITIONS: Lazy<HashMap<TaskStatus, HashSet<TaskStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(TaskStatus::New, HashSet::from([TaskStatus::Registered]));
	m.insert(TaskStatus::Registered, HashSet::from([TaskStatus::Processed]));
	m.insert(TaskStatus::Processed, HashSet::new()); // terminal
	m
});

fn order_transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
	ORDER_TRANSITIONS
		.get(&from)
		.is_some_and(|set| set.contains(&to))
}

fn task_transition_allowed(from: TaskStatus, to: TaskStatus) -> bool {
	TASK_TRANSITIONS
		.get(&from)
		.is_some_and(|set| set.contains(&to))
}

/// Orders, tasks and ledger of one repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RepositoryState {
	/// Orders keyed by number.
	orders: HashMap<String, Order>,
	/// The single unresolved task of each order, keyed by order number.
	active_tasks: HashMap<String, ProcessingTask>,
	/// Processed tasks, in completion order.
	task_history: Vec<ProcessingTask>,
	/// Append-only balance ledger.
	ledger: Vec<LedgerEntry>,
	/// Tasks currently handed out to the pipeline.
	#[serde(skip)]
	claims: HashSet<String>,
}

impl RepositoryState {
	pub fn create_order(&mut self, user_id: Uuid, number: &str) -> Result<Order, StorageError> {
		if !is_valid_order_number(number) {
			return Err(StorageError::InvalidOrderNumber(number.to_string()));
		}
		if let Some(existing) = self.orders.get(number) {
			return Err(StorageError::Conflict {
				order_number: number.to_string(),
				owner: existing.user_id,
			});
		}

		let order = Order::new(user_id, number);
		let task = ProcessingTask::for_order(&order);
		self.orders.insert(order.number.clone(), order.clone());
		self.active_tasks.insert(task.order_number.clone(), task);
		Ok(order)
	}

	/// Claims and returns up to `limit` unclaimed tasks in `status`, oldest first.
	pub fn claim_pending(&mut self, status: TaskStatus, limit: usize) -> Vec<ProcessingTask> {
		if limit == 0 {
			return Vec::new();
		}

		let mut pending: Vec<&ProcessingTask> = self
			.active_tasks
			.values()
			.filter(|task| task.status == status && !self.claims.contains(&task.order_number))
			.collect();
		pending.sort_by(|a, b| {
			a.created_at
				.cmp(&b.created_at)
				.then_with(|| a.order_number.cmp(&b.order_number))
		});

		let selected: Vec<ProcessingTask> = pending.into_iter().take(limit).cloned().collect();
		for task in &selected {
			self.claims.insert(task.order_number.clone());
		}
		selected
	}

	/// Claims every unclaimed task that is past registration but unresolved.
	pub fn claim_in_flight(&mut self) -> Vec<ProcessingTask> {
		let in_flight = self
			.active_tasks
			.values()
			.filter(|task| !matches!(task.status, TaskStatus::New | TaskStatus::Processed))
			.count();
		self.claim_pending(TaskStatus::Registered, in_flight)
	}

	pub fn release(&mut self, number: &str) {
		self.claims.remove(number);
	}

	pub fn mark_registered(&mut self, number: &str) -> Result<(), StorageError> {
		let task = self.active_task(number)?;
		check_task_transition(task, TaskStatus::Registered)?;
		let order = self.order(number)?;
		check_order_transition(order, OrderStatus::Processing)?;

		let now = Utc::now();
		if let Some(task) = self.active_tasks.get_mut(number) {
			task.status = TaskStatus::Registered;
			task.updated_at = now;
		}
		if let Some(order) = self.orders.get_mut(number) {
			order.status = OrderStatus::Processing;
			order.updated_at = Some(now);
		}
		self.claims.remove(number);
		Ok(())
	}

	pub fn record_verdict(
		&mut self,
		number: &str,
		status: OrderStatus,
		amount: Decimal,
	) -> Result<(), StorageError> {
		if amount < Decimal::ZERO {
			return Err(StorageError::InvalidAmount {
				order_number: number.to_string(),
				amount,
			});
		}
		let task = self.active_task(number)?;
		check_task_transition(task, TaskStatus::Processed)?;
		let order = self.order(number)?;
		check_order_transition(order, status)?;
		let user_id = order.user_id;
		let deposit = if amount > Decimal::ZERO {
			let entry = LedgerEntry::deposit(user_id, number, self.balance(user_id), amount)
				.ok_or_else(|| StorageError::InvalidAmount {
					order_number: number.to_string(),
					amount,
				})?;
			Some(entry)
		} else {
			None
		};

		let now = Utc::now();
		if let Some(mut task) = self.active_tasks.remove(number) {
			task.status = TaskStatus::Processed;
			task.updated_at = now;
			self.task_history.push(task);
		}
		if let Some(order) = self.orders.get_mut(number) {
			order.status = status;
			order.accrual = amount;
			order.updated_at = Some(now);
		}
		if let Some(entry) = deposit {
			self.ledger.push(entry);
		}
		self.claims.remove(number);
		Ok(())
	}

	pub fn order(&self, number: &str) -> Result<&Order, StorageError> {
		self.orders
			.get(number)
			.ok_or_else(|| StorageError::NotFound(format!("order {}", number)))
	}

	fn active_task(&self, number: &str) -> Result<&ProcessingTask, StorageError> {
		self.active_tasks
			.get(number)
			.ok_or_else(|| StorageError::NotFound(format!("active task for order {}", number)))
	}

	pub fn latest_task(&self, number: &str) -> Result<&ProcessingTask, StorageError> {
		self.active_tasks
			.get(number)
			.or_else(|| {
				self.task_history
					.iter()
					.rev()
					.find(|task| task.order_number == number)
			})
			.ok_or_else(|| StorageError::NotFound(format!("task for order {}", number)))
	}

	pub fn user_orders(&self, user_id: Uuid) -> Vec<Order> {
		let mut orders: Vec<Order> = self
			.orders
			.values()
			.filter(|order| order.user_id == user_id)
			.cloned()
			.collect();
		orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
		orders
	}

	pub fn balance(&self, user_id: Uuid) -> Decimal {
		self.ledger
			.iter()
			.rev()
			.find(|entry| entry.user_id == user_id)
			.map(|entry| entry.new_balance)
			.unwrap_or(Decimal::ZERO)
	}

	pub fn ledger(&self, user_id: Uuid) -> Vec<LedgerEntry> {
		self.ledger
			.iter()
			.filter(|entry| entry.user_id == user_id)
			.cloned()
			.collect()
	}
}

fn check_task_transition(task: &ProcessingTask, to: TaskStatus) -> Result<(), StorageError> {
	if task_transition_allowed(task.status, to) {
		Ok(())
	} else {
		Err(StorageError::InvalidTransition {
			order_number: task.order_number.clone(),
			from: format!("task {}", task.status),
			to: format!("task {}", to),
		})
	}
}

fn check_order_transition(order: &Order, to: OrderStatus) -> Result<(), StorageError> {
	if order_transition_allowed(order.status, to) {
		Ok(())
	} else {
		Err(StorageError::InvalidTransition {
			order_number: order.number.clone(),
			from: format!("order {}", order.status),
			to: format!("order {}", to),
		})
	}
}
