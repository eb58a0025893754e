//! Restart recovery for in-flight tasks.
//!
//! Tasks that were registered with the accrual service but never received a
//! verdict stay in REGISTERED across restarts. Before the evaluation
//! dispatcher starts its regular cycles, the loader pushes that backlog into
//! the stage queue, waiting for workers to make room when the queue is full.

use crate::queue::{TryPushError, WorkQueue};
use accrual_storage::OrderRepository;
use accrual_types::ProcessingTask;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const DEFAULT_RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Errors that can occur while loading the recovery backlog.
#[derive(Debug, Error)]
pub enum RecoveryError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Work queue closed with {0} tasks left to enqueue")]
	QueueClosed(usize),
	#[error("Recovery cancelled with {0} tasks left to enqueue")]
	Cancelled(usize),
}

/// Summary of a completed recovery run.
#[derive(Debug, Default)]
pub struct RecoveryReport {
	/// Tasks pushed into the queue, in push order.
	pub tasks: Vec<ProcessingTask>,
	/// Records dropped because their order number was already seen.
	pub duplicates_skipped: usize,
	/// Times the loader found the queue full and had to wait.
	pub full_queue_waits: usize,
}

impl RecoveryReport {
	pub fn total(&self) -> usize {
		self.tasks.len()
	}
}

/// Re-enqueues tasks left in flight by a previous run.
pub struct RecoveryLoader {
	repository: Arc<dyn OrderRepository>,
	queue: WorkQueue<ProcessingTask>,
	retry_pause: Duration,
}

impl RecoveryLoader {
	pub fn new(repository: Arc<dyn OrderRepository>, queue: WorkQueue<ProcessingTask>) -> Self {
		Self {
			repository,
			queue,
			retry_pause: DEFAULT_RETRY_PAUSE,
		}
	}

	/// Sets the pause between attempts to push into a full queue.
	pub fn with_retry_pause(mut self, pause: Duration) -> Self {
		self.retry_pause = pause;
		self
	}

	/// Loads every in-flight task into the queue.
	///
	/// Returns only once the whole backlog is enqueued. Each order number is
	/// enqueued at most once per call.
	#[instrument(skip_all)]
	pub async fn load_pending(
		&self,
		cancel: &CancellationToken,
	) -> Result<RecoveryReport, RecoveryError> {
		tracing::info!("Loading in-flight tasks from storage");

		let fetched = self
			.repository
			.fetch_in_flight()
			.await
			.map_err(|e| RecoveryError::Storage(e.to_string()))?;

		let mut report = RecoveryReport::default();
		let mut seen = HashSet::with_capacity(fetched.len());
		let mut backlog: VecDeque<ProcessingTask> = VecDeque::with_capacity(fetched.len());
		for task in fetched {
			if seen.insert(task.order_number.clone()) {
				backlog.push_back(task);
			} else {
				report.duplicates_skipped += 1;
			}
		}

		tracing::info!("Found {} in-flight tasks to recover", backlog.len());

		while let Some(task) = backlog.pop_front() {
			if cancel.is_cancelled() {
				return Err(RecoveryError::Cancelled(backlog.len() + 1));
			}

			match self.queue.try_push(task.clone()) {
				Ok(()) => report.tasks.push(task),
				Err(TryPushError::Full(task)) => {
					backlog.push_front(task);
					report.full_queue_waits += 1;
					tracing::debug!(
						remaining = backlog.len(),
						"Work queue full, waiting to enqueue the rest"
					);
					tokio::select! {
						_ = cancel.cancelled() => {
							return Err(RecoveryError::Cancelled(backlog.len()));
						}
						_ = tokio::time::sleep(self.retry_pause) => {}
					}
				},
				Err(TryPushError::Closed(_)) => {
					return Err(RecoveryError::QueueClosed(backlog.len() + 1));
				},
			}
		}

		tracing::info!(
			recovered = report.total(),
			duplicates = report.duplicates_skipped,
			"Recovery completed"
		);
		Ok(report)
	}
}
