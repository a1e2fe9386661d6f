// ── Core error types ──
//
// Domain errors for bootstrap, reconciliation, and routing control.
// Store-level failures are translated here so consumers never see SDK
// error shapes. `StoreUnavailable` and `NotFound` are kept apart: only
// the latter may drive a create-on-demand path.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Parameter store ──────────────────────────────────────────────
    #[error("Parameter store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Parameter not found: {name}")]
    NotFound { name: String },

    #[error("Parameter store error: {message}")]
    Store { message: String },

    // ── Identity ─────────────────────────────────────────────────────
    #[error("Invalid key material: {message}")]
    KeyMaterial { message: String },

    // ── Routing ──────────────────────────────────────────────────────
    #[error("{operation} requires root privileges")]
    PrivilegeRequired { operation: String },

    #[error("No routing snapshot at {}", path.display())]
    MissingSnapshot { path: PathBuf },

    #[error("Routing snapshot at {} is unreadable: {message}", path.display())]
    Snapshot { path: PathBuf, message: String },

    #[error("Invalid route '{input}': {reason}")]
    InvalidRoute { input: String, reason: String },

    #[error("Cannot {operation} from state {state}")]
    InvalidTransition {
        state: String,
        operation: &'static str,
    },

    #[error("`{program}` failed: {message}")]
    Command { program: String, message: String },

    // ── Publication ──────────────────────────────────────────────────
    #[error("DNS publication failed: {message}")]
    Dns { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid configuration for {field}: {reason}")]
    Config { field: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn command(program: &str, message: impl Into<String>) -> Self {
        Self::Command {
            program: program.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_route(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRoute {
            input: input.to_owned(),
            reason: reason.into(),
        }
    }
}

// ── Store error translation ─────────────────────────────────────────

impl From<ephemvpn_store::Error> for CoreError {
    fn from(err: ephemvpn_store::Error) -> Self {
        match err {
            ephemvpn_store::Error::NotFound { name } => Self::NotFound { name },
            ephemvpn_store::Error::Unavailable { name, message } => Self::StoreUnavailable {
                message: format!("{name}: {message}"),
            },
            other => Self::Store {
                message: other.to_string(),
            },
        }
    }
}
