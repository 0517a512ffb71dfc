// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messaging error taxonomy.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by dispatchers, receivers and stoppable components.
///
/// Cloneable so a component can record a structural failure once and report
/// it from every later `stop()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    /// The target no longer accepts messages
    #[error("{0} has been stopped")]
    Stopped(String),

    /// Operation not valid in the component's current state
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Construction or call parameters rejected
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A protocol stage saw a message its state does not allow
    #[error("protocol contract violated: {0}")]
    ContractViolation(String),

    /// An addressed message had no route to its destination
    #[error("no route to {destination} for {message}")]
    Unroutable { destination: String, message: String },

    /// Discovery found no provider for a channel in time
    #[error("no provider for {channel} found within {timeout:?}")]
    LookupTimeout { channel: String, timeout: Duration },

    /// A component did not drain within its stop deadline
    #[error("timed out after {timeout:?} waiting for {component} to stop")]
    StopTimeout { component: String, timeout: Duration },

    /// I/O or framing failure on a physical connection
    #[error("transport failure: {0}")]
    Transport(String),

    /// A message handler rejected a message
    #[error("handler failed: {0}")]
    Handler(String),
}

impl MessagingError {
    pub fn stopped(component: impl Into<String>) -> Self {
        MessagingError::Stopped(component.into())
    }

    pub fn contract(detail: impl Into<String>) -> Self {
        MessagingError::ContractViolation(detail.into())
    }

    /// Structural failures abort the operation that observes them; all
    /// others are per-message and may be discarded.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            MessagingError::ContractViolation(_)
                | MessagingError::Unroutable { .. }
                | MessagingError::StopTimeout { .. }
        )
    }
}

impl From<std::io::Error> for MessagingError {
    fn from(e: std::io::Error) -> Self {
        MessagingError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(e: serde_json::Error) -> Self {
        MessagingError::Handler(format!("payload conversion: {}", e))
    }
}
