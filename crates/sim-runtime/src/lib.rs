#![deny(warnings)]

//! Runtime for quarter resolution: convergence driver, orchestrator, lobby and recovery.
//!
//! Everything that touches storage goes through a [`persistence::GameStore`];
//! the only cross-process guarantee relied on is the store's atomic quarter claim.

pub mod convergence;
pub mod lobby;
pub mod orchestrator;
pub mod recovery;

use persistence::StoreError;
use sim_core::{QuarterId, ValidationError};
use thiserror::Error;

pub use convergence::{run_pass, PassResult, CONVERGENCE_TOLERANCE, MAX_ITERATIONS};
pub use lobby::{create_game, join_game, start_game, submit_policies, SubmitReceipt};
pub use orchestrator::{build_inputs, Orchestrator};
pub use recovery::{RecoveryPolicy, SweepReport};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("policies rejected: {0:?}")]
    InvalidPolicies(Vec<ValidationError>),
    /// Someone else holds (or already completed) this quarter.
    #[error("{0} is already resolving or resolved")]
    Conflict(QuarterId),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RuntimeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::StaleClaim(q) | StoreError::QuarterClosed(q) => RuntimeError::Conflict(q),
            StoreError::NotFound(what) => RuntimeError::NotFound(what),
            other => RuntimeError::Store(other),
        }
    }
}
