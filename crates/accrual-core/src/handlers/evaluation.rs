//! Evaluation stage: poll for the final verdict and record it.

use super::{HandlerError, TaskHandler};
use crate::Stage;
use accrual_client::AccrualInterface;
use accrual_storage::OrderRepository;
use accrual_types::{OrderStatus, ProcessingTask, RemoteVerdict, VerdictStatus};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Polls the accrual service until it reports PROCESSED or INVALID, then
/// records the verdict and any cashback in one repository transaction.
pub struct EvaluationHandler {
	client: Arc<dyn AccrualInterface>,
	repository: Arc<dyn OrderRepository>,
	/// Pause between polls returning a non-terminal status.
	poll_delay: Duration,
}

impl EvaluationHandler {
	pub fn new(
		client: Arc<dyn AccrualInterface>,
		repository: Arc<dyn OrderRepository>,
		poll_delay: Duration,
	) -> Self {
		Self {
			client,
			repository,
			poll_delay,
		}
	}

	async fn await_verdict(&self, order_number: &str) -> Result<RemoteVerdict, HandlerError> {
		let mut polls: u64 = 0;
		loop {
			let verdict = self.client.fetch(order_number).await?;
			polls += 1;
			if verdict.status.is_terminal() {
				tracing::debug!(polls, status = %verdict.status, "Final verdict received");
				return Ok(verdict);
			}

			tracing::trace!(polls, status = %verdict.status, "Verdict pending");
			if !self.poll_delay.is_zero() {
				tokio::time::sleep(self.poll_delay).await;
			} else {
				// Rate limiting lives in the client; just let other tasks run
				tokio::task::yield_now().await;
			}
		}
	}
}

#[async_trait]
impl TaskHandler for EvaluationHandler {
	fn stage(&self) -> Stage {
		Stage::Evaluation
	}

	#[instrument(skip_all, fields(order_number = %task.order_number))]
	async fn handle(&self, task: &ProcessingTask) -> Result<(), HandlerError> {
		let verdict = self.await_verdict(&task.order_number).await?;

		let status = match verdict.status {
			VerdictStatus::Processed => OrderStatus::Processed,
			_ => OrderStatus::Invalid,
		};
		let amount = verdict.awarded();

		self.repository
			.record_verdict(&task.order_number, status, amount)
			.await?;
		tracing::info!(status = %status, accrual = %amount, "Verdict recorded");
		Ok(())
	}
}
