//! Order submission and lookup.

use super::ApiError;
use accrual_storage::{OrderRepository, StorageError};
use accrual_types::{is_valid_order_number, Order};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
	pub user_id: Uuid,
	pub order: String,
}

/// Submits an order for processing.
///
/// Returns `202 Accepted` for a new order and `200 OK` when the same user
/// already submitted this number. A number owned by someone else is a
/// conflict.
pub async fn submit_order(
	repository: &dyn OrderRepository,
	request: SubmitOrderRequest,
) -> Result<(StatusCode, Order), ApiError> {
	let number = request.order.trim();
	if !is_valid_order_number(number) {
		return Err(ApiError::InvalidOrderNumber(number.to_string()));
	}

	match repository
		.create_processing_task(request.user_id, number)
		.await
	{
		Ok(order) => {
			tracing::info!(order_number = %number, user_id = %request.user_id, "Order accepted");
			Ok((StatusCode::ACCEPTED, order))
		},
		Err(StorageError::Conflict { owner, .. }) if owner == request.user_id => {
			let order = repository.get_order(number).await?;
			Ok((StatusCode::OK, order))
		},
		Err(e) => Err(e.into()),
	}
}

pub async fn get_order(repository: &dyn OrderRepository, number: &str) -> Result<Order, ApiError> {
	Ok(repository.get_order(number).await?)
}
