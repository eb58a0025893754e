//! Registration stage: announce new orders to the accrual service.

use super::{HandlerError, TaskHandler};
use crate::Stage;
use accrual_client::AccrualInterface;
use accrual_storage::OrderRepository;
use accrual_types::ProcessingTask;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

/// Registers an order with the accrual service, then moves its task to
/// REGISTERED and the order to PROCESSING.
pub struct RegistrationHandler {
	client: Arc<dyn AccrualInterface>,
	repository: Arc<dyn OrderRepository>,
}

impl RegistrationHandler {
	pub fn new(client: Arc<dyn AccrualInterface>, repository: Arc<dyn OrderRepository>) -> Self {
		Self { client, repository }
	}
}

#[async_trait]
impl TaskHandler for RegistrationHandler {
	fn stage(&self) -> Stage {
		Stage::Registration
	}

	#[instrument(skip_all, fields(order_number = %task.order_number))]
	async fn handle(&self, task: &ProcessingTask) -> Result<(), HandlerError> {
		let verdict = self.client.fetch(&task.order_number).await?;
		tracing::debug!(remote_status = %verdict.status, "Order known to accrual service");

		self.repository.mark_registered(&task.order_number).await?;
		tracing::info!("Order registered");
		Ok(())
	}
}
