//! Remote accrual service verdicts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The remote service's answer for one order.
///
/// Verdicts are never persisted; they are translated into order and ledger
/// updates by the evaluation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteVerdict {
	/// Order number the verdict refers to.
	pub order: String,
	/// Remote processing status.
	pub status: VerdictStatus,
	/// Awarded cashback, present only for processed orders.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub accrual: Option<Decimal>,
}

impl RemoteVerdict {
	/// Amount to credit for this verdict. Non-processed verdicts award nothing.
	pub fn awarded(&self) -> Decimal {
		match self.status {
			VerdictStatus::Processed => self.accrual.unwrap_or(Decimal::ZERO),
			_ => Decimal::ZERO,
		}
	}
}

/// Status reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
	Registered,
	Processing,
	Invalid,
	Processed,
}

impl VerdictStatus {
	/// Terminal verdicts end the evaluation polling loop.
	pub fn is_terminal(&self) -> bool {
		matches!(self, VerdictStatus::Invalid | VerdictStatus::Processed)
	}
}

impl fmt::Display for VerdictStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			VerdictStatus::Registered => "REGISTERED",
			VerdictStatus::Processing => "PROCESSING",
			VerdictStatus::Invalid => "INVALID",
			VerdictStatus::Processed => "PROCESSED",
		};
		f.write_str(s)
	}
}
