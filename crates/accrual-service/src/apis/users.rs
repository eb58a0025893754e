//! Per-user views: submitted orders and current balance.

use super::ApiError;
use accrual_storage::OrderRepository;
use accrual_types::Order;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `GET /api/users/{user_id}/balance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResponse {
	pub current: Decimal,
}

pub async fn user_orders(
	repository: &dyn OrderRepository,
	user_id: Uuid,
) -> Result<Vec<Order>, ApiError> {
	Ok(repository.user_orders(user_id).await?)
}

pub async fn balance(
	repository: &dyn OrderRepository,
	user_id: Uuid,
) -> Result<BalanceResponse, ApiError> {
	let current = repository.balance(user_id).await?;
	Ok(BalanceResponse { current })
}
