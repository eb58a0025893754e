//! Order and processing task types.
//!
//! An order is a user's purchase submission; its processing task tracks the
//! order's progress through the registration and evaluation stages. Both are
//! created together when the order is submitted and only the pipeline advances
//! their statuses afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A purchase order submitted for cashback evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: Uuid,
	/// Luhn-valid order number as submitted by the user.
	pub number: String,
	/// Owner of the order.
	pub user_id: Uuid,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Awarded cashback, zero until a verdict is recorded.
	#[serde(default)]
	pub accrual: Decimal,
	/// When the order was submitted.
	pub created_at: DateTime<Utc>,
	/// When the order last changed status.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
	/// Creates a freshly submitted order.
	pub fn new(user_id: Uuid, number: impl Into<String>) -> Self {
		Self {
			id: Uuid::new_v4(),
			number: number.into(),
			user_id,
			status: OrderStatus::New,
			accrual: Decimal::ZERO,
			created_at: Utc::now(),
			updated_at: None,
		}
	}
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	/// Submitted, not yet registered with the remote service.
	New,
	/// Registered and awaiting a verdict.
	Processing,
	/// Evaluated, cashback awarded (possibly zero).
	Processed,
	/// Rejected by the remote service.
	Invalid,
}

impl OrderStatus {
	/// Returns true when no further transitions are possible.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::New => "NEW",
			OrderStatus::Processing => "PROCESSING",
			OrderStatus::Processed => "PROCESSED",
			OrderStatus::Invalid => "INVALID",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One unit of pipeline work for an order.
///
/// Exactly one non-terminal task exists per order at any time. Tasks in
/// [`TaskStatus::Processed`] are kept as immutable history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTask {
	/// Identifier of the order this task belongs to.
	pub order_id: Uuid,
	/// Number of the order this task belongs to.
	pub order_number: String,
	/// Current task status.
	pub status: TaskStatus,
	/// When the task was created.
	pub created_at: DateTime<Utc>,
	/// When the task last changed status.
	pub updated_at: DateTime<Utc>,
}

impl ProcessingTask {
	/// Creates the initial task for an order.
	pub fn for_order(order: &Order) -> Self {
		Self {
			order_id: order.id,
			order_number: order.number.clone(),
			status: TaskStatus::New,
			created_at: order.created_at,
			updated_at: order.created_at,
		}
	}
}

/// Status of a processing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
	/// Waiting for the registration stage.
	New,
	/// Registered with the remote service, waiting for evaluation.
	Registered,
	/// Verdict recorded.
	Processed,
}

impl fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TaskStatus::New => write!(f, "NEW"),
			TaskStatus::Registered => write!(f, "REGISTERED"),
			TaskStatus::Processed => write!(f, "PROCESSED"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_new_order_defaults() {
		let user = Uuid::new_v4();
		let order = Order::new(user, "79927398713");

		assert_eq!(order.status, OrderStatus::New);
		assert_eq!(order.accrual, Decimal::ZERO);
		assert_eq!(order.user_id, user);
		assert!(order.updated_at.is_none());

		let task = ProcessingTask::for_order(&order);
		assert_eq!(task.order_id, order.id);
		assert_eq!(task.order_number, "79927398713");
		assert_eq!(task.status, TaskStatus::New);
	}

	#[test]
	fn test_status_wire_format() {
		let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
		assert_eq!(json, "\"PROCESSING\"");

		let status: TaskStatus = serde_json::from_str("\"REGISTERED\"").unwrap();
		assert_eq!(status, TaskStatus::Registered);

		assert_eq!(OrderStatus::Invalid.to_string(), "INVALID");
		assert!(OrderStatus::Invalid.is_terminal());
		assert!(!OrderStatus::Processing.is_terminal());
	}
}
