//! Pipeline supervisor.
//!
//! The engine wires a queue, a dispatcher and a worker pool for each stage,
//! then waits for either a shutdown request or the first error reported by
//! any component. Any reported error halts both stages.

pub mod lifecycle;

use crate::dispatcher::Dispatcher;
use crate::handlers::{EvaluationHandler, HandlerError, RegistrationHandler, TaskHandler};
use crate::queue::WorkQueue;
use crate::recovery::{RecoveryError, RecoveryLoader};
use crate::workers::WorkerPool;
use crate::Stage;
use accrual_client::AccrualInterface;
use accrual_config::PipelineConfig;
use accrual_storage::{OrderRepository, StorageError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Errors reported by pipeline components to the supervisor.
#[derive(Debug, Error)]
pub enum PipelineError {
	#[error("{stage} dispatcher failed: {source}")]
	Dispatch { stage: Stage, source: StorageError },
	#[error("{stage} recovery failed: {source}")]
	Recovery { stage: Stage, source: RecoveryError },
	#[error("{stage} worker failed on order {order_number}: {source}")]
	Worker {
		stage: Stage,
		order_number: String,
		source: HandlerError,
	},
	#[error("{stage} task ended abnormally: {reason}")]
	Aborted { stage: Stage, reason: String },
}

impl PipelineError {
	pub fn stage(&self) -> Stage {
		match self {
			PipelineError::Dispatch { stage, .. }
			| PipelineError::Recovery { stage, .. }
			| PipelineError::Worker { stage, .. }
			| PipelineError::Aborted { stage, .. } => *stage,
		}
	}
}

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Pipeline halted: {0}")]
	Pipeline(#[from] PipelineError),
	#[error("Service error: {0}")]
	Service(String),
}

/// Outcome of a run that ended by request.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
	/// Workers started per stage.
	pub workers_per_stage: usize,
	/// Spawned tasks that ended with a panic while shutting down.
	pub panicked_tasks: usize,
	pub uptime: Duration,
}

/// Supervises the registration and evaluation stages.
#[derive(Clone)]
pub struct AccrualEngine {
	pub(crate) config: PipelineConfig,
	pub(crate) repository: Arc<dyn OrderRepository>,
	pub(crate) client: Arc<dyn AccrualInterface>,
}

impl AccrualEngine {
	pub fn new(
		config: PipelineConfig,
		repository: Arc<dyn OrderRepository>,
		client: Arc<dyn AccrualInterface>,
	) -> Self {
		Self {
			config,
			repository,
			client,
		}
	}

	pub fn config(&self) -> &PipelineConfig {
		&self.config
	}

	pub fn repository(&self) -> &Arc<dyn OrderRepository> {
		&self.repository
	}

	/// Runs until Ctrl+C or the first pipeline error.
	pub async fn run(&self) -> Result<RunReport, EngineError> {
		let shutdown = CancellationToken::new();
		let signal = {
			let shutdown = shutdown.clone();
			tokio::spawn(async move {
				match tokio::signal::ctrl_c().await {
					Ok(()) => {
						tracing::info!("Shutdown signal received");
						shutdown.cancel();
					},
					Err(e) => tracing::warn!("Failed to listen for shutdown signal: {}", e),
				}
			})
		};

		let result = self.run_until(shutdown).await;
		signal.abort();
		result
	}

	/// Runs until `shutdown` is cancelled or the first pipeline error.
	///
	/// Either way every spawned task is awaited before returning, so tasks
	/// already taken by workers are finished. A pipeline error is returned
	/// as [`EngineError::Pipeline`].
	pub async fn run_until(&self, shutdown: CancellationToken) -> Result<RunReport, EngineError> {
		self.initialize().await?;
		let started = Instant::now();

		let cancel = shutdown.child_token();
		let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
		let mut tasks = FuturesUnordered::new();
		for stage in Stage::ALL {
			for handle in self.start_stage(stage, &cancel, errors_tx.clone()) {
				tasks.push(supervise(stage, handle));
			}
		}
		drop(errors_tx);

		let failure = loop {
			tokio::select! {
				_ = cancel.cancelled() => break None,
				Some(error) = errors_rx.recv() => break Some(error),
				Some((stage, result)) = tasks.next() => match result {
					Ok(()) => tracing::debug!(%stage, "Pipeline task finished"),
					Err(e) => break Some(PipelineError::Aborted {
						stage,
						reason: e.to_string(),
					}),
				},
			}
		};

		if let Some(error) = &failure {
			tracing::error!(stage = %error.stage(), error = %error, "Stopping pipelines");
		}
		cancel.cancel();

		let mut report = RunReport {
			workers_per_stage: self.config.worker_count,
			..RunReport::default()
		};
		while let Some((stage, result)) = tasks.next().await {
			if let Err(e) = result {
				report.panicked_tasks += 1;
				tracing::error!(%stage, "Pipeline task ended abnormally: {}", e);
			}
		}

		// Errors raised by tasks that were finishing during shutdown
		while let Ok(error) = errors_rx.try_recv() {
			tracing::warn!(stage = %error.stage(), error = %error, "Error during shutdown");
		}

		self.shutdown().await?;
		report.uptime = started.elapsed();

		match failure {
			Some(error) => Err(EngineError::Pipeline(error)),
			None => Ok(report),
		}
	}

	fn start_stage(
		&self,
		stage: Stage,
		cancel: &CancellationToken,
		errors: mpsc::UnboundedSender<PipelineError>,
	) -> Vec<JoinHandle<()>> {
		let queue = WorkQueue::bounded(self.config.max_orders_in_work);
		let mut dispatcher = Dispatcher::new(
			stage,
			self.repository.clone(),
			queue.clone(),
			self.config.poll_interval(),
			errors.clone(),
		);

		let handler: Arc<dyn TaskHandler> = match stage {
			Stage::Registration => Arc::new(RegistrationHandler::new(
				self.client.clone(),
				self.repository.clone(),
			)),
			Stage::Evaluation => {
				dispatcher = dispatcher
					.with_recovery(RecoveryLoader::new(self.repository.clone(), queue.clone()));
				Arc::new(EvaluationHandler::new(
					self.client.clone(),
					self.repository.clone(),
					self.config.evaluation_poll_delay(),
				))
			},
		};

		let pool = WorkerPool::new(
			handler,
			self.repository.clone(),
			queue,
			self.config.worker_count,
			errors,
		)
		.with_task_deadline(self.config.task_deadline());

		tracing::info!(
			%stage,
			workers = pool.size(),
			capacity = self.config.max_orders_in_work,
			"Starting stage"
		);

		let mut handles = vec![tokio::spawn(dispatcher.run(cancel.clone()))];
		handles.extend(pool.spawn(cancel));
		handles
	}
}

async fn supervise(stage: Stage, handle: JoinHandle<()>) -> (Stage, Result<(), JoinError>) {
	(stage, handle.await)
}
