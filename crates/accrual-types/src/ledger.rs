//! Append-only balance ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single balance change for a user.
///
/// The user's current balance is the `new_balance` of their most recent
/// entry, or zero when they have none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
	pub id: Uuid,
	pub user_id: Uuid,
	/// Order that produced this change, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub order_number: Option<String>,
	pub old_balance: Decimal,
	pub change: Decimal,
	pub new_balance: Decimal,
	pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
	/// Builds a deposit on top of `old_balance`.
	///
	/// Returns `None` when the new balance does not fit in a `Decimal`.
	pub fn deposit(
		user_id: Uuid,
		order_number: impl Into<String>,
		old_balance: Decimal,
		amount: Decimal,
	) -> Option<Self> {
		let new_balance = old_balance.checked_add(amount)?;
		Some(Self {
			id: Uuid::new_v4(),
			user_id,
			order_number: Some(order_number.into()),
			old_balance,
			change: amount,
			new_balance,
			created_at: Utc::now(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::str::FromStr;

	#[test]
	fn test_deposit_uses_exact_arithmetic() {
		let old = Decimal::from_str("0.1").unwrap();
		let amount = Decimal::from_str("0.2").unwrap();
		let entry = LedgerEntry::deposit(Uuid::new_v4(), "79927398713", old, amount).unwrap();

		assert_eq!(entry.new_balance, Decimal::from_str("0.3").unwrap());
		assert_eq!(entry.change, amount);
		assert_eq!(entry.order_number.as_deref(), Some("79927398713"));
	}

	#[test]
	fn test_deposit_overflow_is_rejected() {
		let old = Decimal::MAX;
		assert!(LedgerEntry::deposit(Uuid::new_v4(), "79927398713", old, Decimal::ONE).is_none());
	}
}
