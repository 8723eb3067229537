//! Unified error handling for the scanbridge broker.
//!
//! Every fallible operation inside the crate returns [`BrokerResult`]. At
//! the dispatch boundary errors are folded into a [`ResultCode::Failure`]
//! plus a [`ConditionCode`] stored on the owning application (or the global
//! slot when no application context exists); see `broker`.
//!
//! [`ResultCode::Failure`]: crate::protocol::ResultCode::Failure

use thiserror::Error;

use crate::protocol::{ConditionCode, Dat, DataGroups, Msg, ResultCode};

/// Main error type for broker operations
#[derive(Debug, Error)]
pub enum BrokerError {
    /// I/O related errors (module files, default store)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required argument was missing or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An application with the same product name is already registered
    #[error("Application '{0}' is already registered")]
    DuplicateName(String),

    /// The connection table is full
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Operation issued in the wrong connection state, or reentrantly
    #[error("Sequence error: {0}")]
    SequenceError(String),

    /// Unrecognized (group, attribute, verb) combination
    #[error("Unsupported triplet {group:?}/{dat:?}/{msg:?}")]
    BadProtocol {
        group: DataGroups,
        dat: Dat,
        msg: Msg,
    },

    /// The addressed source does not exist or has no resolved entry point
    #[error("Bad destination: {0}")]
    BadDestination(String),

    /// No capability-compatible source is available
    #[error("no compatible source found")]
    NoSource,

    /// Module load, symbol resolution, or identity-probe failure
    #[error("Source operation failed: {0}")]
    Operation(String),

    /// An internal fault caught at a firewall boundary (source entry point
    /// or application callback)
    #[error("Internal fault: {0}")]
    Fault(String),
}

impl From<serde_yaml::Error> for BrokerError {
    fn from(err: serde_yaml::Error) -> Self {
        BrokerError::Config(format!("YAML error: {}", err))
    }
}

// Helper methods
impl BrokerError {
    /// Create an invalid-argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        BrokerError::InvalidArgument(msg.into())
    }

    /// Create a sequence error
    pub fn sequence<S: Into<String>>(msg: S) -> Self {
        BrokerError::SequenceError(msg.into())
    }

    /// Create a bad-destination error
    pub fn bad_destination<S: Into<String>>(msg: S) -> Self {
        BrokerError::BadDestination(msg.into())
    }

    /// Create a source-operation error
    pub fn operation<S: Into<String>>(msg: S) -> Self {
        BrokerError::Operation(msg.into())
    }

    /// Create an internal-fault error
    pub fn fault<S: Into<String>>(msg: S) -> Self {
        BrokerError::Fault(msg.into())
    }

    /// Condition code reported to the application for this error.
    pub fn condition(&self) -> ConditionCode {
        match self {
            BrokerError::Io(_) => ConditionCode::OperationError,
            BrokerError::Config(_) => ConditionCode::BadValue,
            BrokerError::InvalidArgument(_) => ConditionCode::BadValue,
            // Duplicate registration is a sequencing fault on the wire.
            BrokerError::DuplicateName(_) => ConditionCode::SequenceError,
            BrokerError::CapacityExceeded(_) => ConditionCode::MaxConnections,
            BrokerError::SequenceError(_) => ConditionCode::SequenceError,
            BrokerError::BadProtocol { .. } => ConditionCode::BadProtocol,
            BrokerError::BadDestination(_) => ConditionCode::BadDestination,
            BrokerError::NoSource => ConditionCode::NoSuchSource,
            BrokerError::Operation(_) => ConditionCode::OperationError,
            BrokerError::Fault(_) => ConditionCode::Bummer,
        }
    }
}

/// Convenience type alias for Results using BrokerError
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Run a boundary call (source entry point or application callback),
/// converting a panic into a [`BrokerError::Fault`] instead of letting it
/// unwind across the broker.
pub(crate) fn firewall<F>(what: &str, f: F) -> BrokerResult<ResultCode>
where
    F: FnOnce() -> ResultCode,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(rc) => Ok(rc),
        Err(panic) => {
            let detail = if let Some(s) = panic.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(BrokerError::Fault(format!("{} panicked: {}", what, detail)))
        }
    }
}
