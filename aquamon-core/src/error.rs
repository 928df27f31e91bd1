//! Error taxonomy of the core
//!
//! Failures are always scoped to one subscription or one write:
//! - `StoreError` comes from the remote store (listener cancelled, write rejected)
//! - `ControlError` is what command callers see, tagged by channel

use crate::models::ACTUATOR_COUNT;

/// Erreurs remontées par le store distant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store forcibly closed a listener (transport or permission failure)
    #[error("listener cancelled by store: {0}")]
    Cancelled(String),
    #[error("write to '{path}' rejected: {reason}")]
    Write { path: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Erreurs des commandes (pompes, planning)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("actuator index {0} out of range (expected < {max})", max = ACTUATOR_COUNT)]
    InvalidIndex(usize),
    #[error("failed to switch actuator: {0}")]
    Actuator(#[source] StoreError),
    #[error("failed to send schedule command: {0}")]
    Schedule(#[source] StoreError),
}

pub type StoreResult<T> = Result<T, StoreError>;
