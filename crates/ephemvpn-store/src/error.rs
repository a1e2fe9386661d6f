use thiserror::Error;

/// Top-level error type for the `ephemvpn-store` crate.
///
/// Distinguishes a parameter that genuinely does not exist from a store
/// that could not be reached. Callers that implement create-on-demand
/// must only create on [`Error::NotFound`].
#[derive(Debug, Error)]
pub enum Error {
    // ── Lookup ──────────────────────────────────────────────────────
    /// The parameter does not exist in the store.
    #[error("Parameter not found: {name}")]
    NotFound { name: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Network, throttling, or authorization failure talking to the store.
    #[error("Parameter store unavailable while accessing {name}: {message}")]
    Unavailable { name: String, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A binary parameter held text that is not valid base64.
    #[error("Parameter {name} is not valid base64: {message}")]
    Encoding { name: String, message: String },

    /// Store returned a parameter without a value field.
    #[error("Parameter {name} has no value")]
    EmptyValue { name: String },
}

impl Error {
    /// Returns `true` if the parameter is absent (as opposed to unreadable).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the store itself could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub(crate) fn unavailable(name: &str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            name: name.to_owned(),
            message: message.into(),
        }
    }
}
