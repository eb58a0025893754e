//! Order accrual processing pipeline.
//!
//! Two stages run side by side. The registration stage tells the remote
//! accrual service about newly submitted orders; the evaluation stage polls
//! the service until it returns a final verdict and records the result.
//! Each stage is made of a dispatcher that tops up a bounded work queue from
//! storage and a pool of workers draining it. The [`AccrualEngine`] supervises
//! both stages and stops everything on the first reported error.

pub mod builder;
pub mod dispatcher;
pub mod engine;
pub mod handlers;
pub mod queue;
pub mod recovery;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;

use accrual_types::TaskStatus;
use std::fmt;

pub use builder::{AccrualBuilder, AccrualFactories, BuilderError};
pub use engine::{AccrualEngine, EngineError, PipelineError, RunReport};
pub use queue::WorkQueue;

/// One of the two pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
	Registration,
	Evaluation,
}

impl Stage {
	pub const ALL: [Stage; 2] = [Stage::Registration, Stage::Evaluation];

	/// Task status a stage picks up.
	pub fn input_status(&self) -> TaskStatus {
		match self {
			Stage::Registration => TaskStatus::New,
			Stage::Evaluation => TaskStatus::Registered,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Stage::Registration => "registration",
			Stage::Evaluation => "evaluation",
		}
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
