//! Worker pool draining a stage's work queue.

use crate::engine::PipelineError;
use crate::handlers::{HandlerError, TaskHandler};
use crate::queue::WorkQueue;
use accrual_storage::OrderRepository;
use accrual_types::ProcessingTask;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Fixed-size set of workers sharing one queue and one handler.
///
/// Each worker processes a task to completion before taking the next one.
/// Cancellation is observed between tasks only, so an in-flight remote call
/// is never cut short by shutdown.
pub struct WorkerPool {
	handler: Arc<dyn TaskHandler>,
	repository: Arc<dyn OrderRepository>,
	queue: WorkQueue<ProcessingTask>,
	size: usize,
	task_deadline: Option<Duration>,
	errors: mpsc::UnboundedSender<PipelineError>,
}

impl WorkerPool {
	pub fn new(
		handler: Arc<dyn TaskHandler>,
		repository: Arc<dyn OrderRepository>,
		queue: WorkQueue<ProcessingTask>,
		size: usize,
		errors: mpsc::UnboundedSender<PipelineError>,
	) -> Self {
		Self {
			handler,
			repository,
			queue,
			size: size.max(1),
			task_deadline: None,
			errors,
		}
	}

	/// Bounds how long a single task may take. Expiry counts as a failure.
	pub fn with_task_deadline(mut self, deadline: Option<Duration>) -> Self {
		self.task_deadline = deadline;
		self
	}

	pub fn size(&self) -> usize {
		self.size
	}

	/// Starts the workers. Each handle completes when its worker stops.
	pub fn spawn(self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
		let pool = Arc::new(self);
		(0..pool.size)
			.map(|worker_id| {
				let pool = pool.clone();
				let cancel = cancel.clone();
				tokio::spawn(async move { pool.work(worker_id, cancel).await })
			})
			.collect()
	}

	async fn work(&self, worker_id: usize, cancel: CancellationToken) {
		let stage = self.handler.stage();
		tracing::debug!(%stage, worker_id, "Worker started");

		loop {
			let task = tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				task = self.queue.pop() => match task {
					Some(task) => task,
					None => break,
				},
			};

			if let Err(e) = self.process(&task).await {
				tracing::error!(
					%stage,
					worker_id,
					order_number = %task.order_number,
					error = %e,
					"Task failed"
				);
				if let Err(release_err) = self.repository.release(&task.order_number).await {
					tracing::warn!(
						order_number = %task.order_number,
						error = %release_err,
						"Failed to release task"
					);
				}
				let error = PipelineError::Worker {
					stage,
					order_number: task.order_number.clone(),
					source: e,
				};
				if self.errors.send(error).is_err() {
					tracing::debug!(%stage, worker_id, "Error channel closed");
				}
			}
		}

		tracing::info!(%stage, worker_id, "Worker stopped");
	}

	async fn process(&self, task: &ProcessingTask) -> Result<(), HandlerError> {
		match self.task_deadline {
			Some(deadline) => tokio::time::timeout(deadline, self.handler.handle(task))
				.await
				.map_err(|_| HandlerError::DeadlineExceeded(deadline))?,
			None => self.handler.handle(task).await,
		}
	}
}
