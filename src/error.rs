//! Error types for the QC engine
//!
//! Errors raised while evaluating a single (screw, check) pair. The manager
//! records them per item; they never abort sibling evaluations.

use crate::hardware::{ConnectionId, ScrewId};
use thiserror::Error;

/// Errors that can occur while evaluating a check
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QcError {
    #[error("Screw {0} is not part of the plan snapshot")]
    UnknownScrew(ScrewId),

    #[error("Implant case '{0}' is not part of the plan snapshot")]
    UnknownCase(String),

    #[error("Malformed connection '{connection}': {reason}")]
    MalformedConnection {
        connection: ConnectionId,
        reason: String,
    },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Geometric query cancelled")]
    Cancelled,

    #[error("Checker panicked: {0}")]
    Panicked(String),
}

pub type QcResultOf<T> = Result<T, QcError>;
