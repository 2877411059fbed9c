//! Typed errors shared across the workflow engine.
//!
//! Every failure an action can hit maps to one of four kinds. All of them are
//! recoverable: the caller reports the error and the Session Record stays
//! exactly as it was before the action started.

use thiserror::Error;

use crate::session::Phase;

/// Canonical error type for the workflow engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Content could not be normalized to a canonical byte form for
    /// fingerprinting.
    #[error("content cannot be canonicalized: {reason}")]
    Encoding { reason: String },

    /// A collaborator call failed or timed out. Retried only on explicit
    /// user action.
    #[error("{service} call failed: {reason}")]
    ExternalService {
        service: &'static str,
        reason: String,
    },

    /// A collaborator returned a structurally invalid response. Nothing is
    /// committed.
    #[error("invalid {service} response: {reason}")]
    Validation {
        service: &'static str,
        reason: String,
    },

    /// An operation was attempted without satisfying its phase precondition.
    #[error("cannot {action} in phase {phase}: {condition}")]
    PhaseGuard {
        phase: Phase,
        action: String,
        condition: String,
    },
}

impl EngineError {
    pub fn encoding(reason: impl Into<String>) -> Self {
        EngineError::Encoding {
            reason: reason.into(),
        }
    }

    pub fn external(service: &'static str, reason: impl Into<String>) -> Self {
        EngineError::ExternalService {
            service,
            reason: reason.into(),
        }
    }

    pub fn validation(service: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            service,
            reason: reason.into(),
        }
    }

    pub fn phase_guard(
        phase: Phase,
        action: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        EngineError::PhaseGuard {
            phase,
            action: action.into(),
            condition: condition.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
