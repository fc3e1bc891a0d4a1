//! Error types for Mesa-OS

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A remote HTTP service answered with a non-success status.
    #[error("remote service error: {service} returned {status}: {body}")]
    RemoteService {
        service: String,
        status: u16,
        body: String,
    },

    /// Establishing or keeping a remote session failed.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("tool invocation failed: {name} - {message}")]
    ToolInvocation { name: String, message: String },

    /// An operation was attempted in a lifecycle state that does not allow it.
    #[error("invalid state: cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    #[error("runner error: {0}")]
    Runner(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn remote_service(service: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::RemoteService {
            service: service.into(),
            status,
            body: body.into(),
        }
    }

    pub fn tool_invocation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(operation: impl Into<String>, state: impl Into<String>) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.into(),
        }
    }

    pub fn runner(message: impl Into<String>) -> Self {
        Self::Runner(message.into())
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}
