//! Per-stage task handlers run by the worker pools.

pub mod evaluation;
pub mod registration;

pub use evaluation::EvaluationHandler;
pub use registration::RegistrationHandler;

use crate::Stage;
use accrual_client::ClientError;
use accrual_storage::StorageError;
use accrual_types::ProcessingTask;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while a worker processes a task.
#[derive(Debug, Error)]
pub enum HandlerError {
	#[error("Accrual service error: {0}")]
	Remote(#[from] ClientError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Task not finished within {0:?}")]
	DeadlineExceeded(Duration),
}

/// Processes one task of a stage from start to finish.
#[async_trait]
pub trait TaskHandler: Send + Sync {
	fn stage(&self) -> Stage;

	async fn handle(&self, task: &ProcessingTask) -> Result<(), HandlerError>;
}
