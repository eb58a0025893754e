//! Periodic top-up of a stage's work queue from storage.

use crate::engine::PipelineError;
use crate::queue::{QueueClosed, WorkQueue};
use crate::recovery::{RecoveryError, RecoveryLoader};
use crate::Stage;
use accrual_storage::{OrderRepository, StorageError};
use accrual_types::ProcessingTask;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Feeds one stage's queue.
///
/// A dispatcher wakes on a fixed tick and, once per poll interval, fetches
/// as many pending tasks as the queue has room for. When a recovery loader
/// is attached it runs to completion before the first cycle.
pub struct Dispatcher {
	stage: Stage,
	repository: Arc<dyn OrderRepository>,
	queue: WorkQueue<ProcessingTask>,
	poll_interval: Duration,
	tick: Duration,
	next_due: Instant,
	recovery: Option<RecoveryLoader>,
	errors: mpsc::UnboundedSender<PipelineError>,
}

impl Dispatcher {
	pub fn new(
		stage: Stage,
		repository: Arc<dyn OrderRepository>,
		queue: WorkQueue<ProcessingTask>,
		poll_interval: Duration,
		errors: mpsc::UnboundedSender<PipelineError>,
	) -> Self {
		Self {
			stage,
			repository,
			queue,
			poll_interval,
			tick: DEFAULT_TICK,
			next_due: Instant::now() + poll_interval,
			recovery: None,
			errors,
		}
	}

	pub fn with_recovery(mut self, loader: RecoveryLoader) -> Self {
		self.recovery = Some(loader);
		self
	}

	pub fn with_tick(mut self, tick: Duration) -> Self {
		self.tick = tick;
		self
	}

	pub fn stage(&self) -> Stage {
		self.stage
	}

	pub fn next_due(&self) -> Instant {
		self.next_due
	}

	/// Runs a single fetch cycle and returns how many tasks were enqueued.
	///
	/// Does nothing when the queue is full. Otherwise asks storage for at
	/// most as many tasks as there is room for.
	pub async fn top_up(&self) -> Result<usize, StorageError> {
		let room = self.queue.room();
		if room == 0 {
			tracing::debug!(stage = %self.stage, "Queue full, skipping cycle");
			return Ok(0);
		}

		let tasks = accrual_storage::fetch_pending(
			self.repository.as_ref(),
			self.stage.input_status(),
			room,
		)
		.await?;
		tracing::debug!(stage = %self.stage, "Fetched {} tasks to process", tasks.len());

		let mut enqueued = 0;
		let mut pending = tasks.into_iter();
		while let Some(task) = pending.next() {
			if let Err(QueueClosed(task)) = self.queue.push(task).await {
				tracing::warn!(stage = %self.stage, "Queue closed, releasing fetched tasks");
				for task in std::iter::once(task).chain(pending.by_ref()) {
					self.repository.release(&task.order_number).await?;
				}
				break;
			}
			enqueued += 1;
		}
		Ok(enqueued)
	}

	/// Advances the schedule if a cycle is due at `now`.
	fn advance(&mut self, now: Instant) -> bool {
		if now < self.next_due {
			return false;
		}
		self.next_due += self.poll_interval;
		if self.next_due <= now {
			// Missed cycles are not replayed
			self.next_due = now + self.poll_interval;
		}
		true
	}

	fn report(&self, error: PipelineError) {
		tracing::error!(stage = %self.stage, error = %error, "Dispatcher error");
		if self.errors.send(error).is_err() {
			tracing::debug!(stage = %self.stage, "Error channel closed");
		}
	}

	/// Runs until `cancel` fires, then closes the queue.
	pub async fn run(mut self, cancel: CancellationToken) {
		if let Some(loader) = self.recovery.take() {
			match loader.load_pending(&cancel).await {
				Ok(report) => {
					tracing::info!(stage = %self.stage, recovered = report.total(), "Backlog enqueued");
				},
				Err(RecoveryError::Cancelled(remaining)) => {
					tracing::info!(stage = %self.stage, remaining, "Recovery interrupted by shutdown");
					self.queue.close();
					return;
				},
				Err(e) => {
					self.report(PipelineError::Recovery {
						stage: self.stage,
						source: e,
					});
					self.queue.close();
					return;
				},
			}
		}

		let mut ticker = tokio::time::interval(self.tick);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				now = ticker.tick() => {
					if !self.advance(now) {
						continue;
					}
					match self.top_up().await {
						Ok(count) => {
							tracing::debug!(stage = %self.stage, enqueued = count, "Dispatch cycle done");
						},
						Err(e) => self.report(PipelineError::Dispatch {
							stage: self.stage,
							source: e,
						}),
					}
				}
			}
		}

		tracing::info!(stage = %self.stage, "Stopping dispatcher");
		self.queue.close();
	}
}
