//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use ephemvpn_config::ConfigError;
use ephemvpn_core::CoreError;

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Parameter store ──────────────────────────────────────────────

    #[error("Parameter store unavailable: {message}")]
    #[diagnostic(
        code(ephemvpn::store_unavailable),
        help(
            "Check AWS credentials and network access to SSM.\n\
             Region and endpoint come from AWS_REGION and EPHEMVPN_SSM_ENDPOINT."
        )
    )]
    StoreUnavailable { message: String },

    #[error("Parameter '{name}' not found")]
    #[diagnostic(
        code(ephemvpn::not_found),
        help("Run: ephemvpn node peers to see the clients this node knows about")
    )]
    NotFound { name: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("No API credential configured")]
    #[diagnostic(
        code(ephemvpn::no_credentials),
        help(
            "Pass it as an argument, set EPHEMVPN_API_KEY,\n\
             or store it with: ephemvpn config set-key"
        )
    )]
    NoCredentials,

    // ── Host routing ─────────────────────────────────────────────────

    #[error("'{operation}' must run as root")]
    #[diagnostic(
        code(ephemvpn::privilege_required),
        help("Re-run with sudo: routes, NAT rules, and resolver config are host-wide.")
    )]
    PrivilegeRequired { operation: String },

    #[error("No routing snapshot at {path}")]
    #[diagnostic(
        code(ephemvpn::missing_snapshot),
        help("Nothing to restore. Run: ephemvpn backup before changing routes.")
    )]
    MissingSnapshot { path: String },

    #[error("Restore finished with {failed} failed step(s)")]
    #[diagnostic(
        code(ephemvpn::restore_incomplete),
        help("The snapshot was kept. Fix the failing steps and run: ephemvpn restore")
    )]
    RestoreIncomplete { failed: usize },

    #[error("Cannot {operation} while routing is {state}")]
    #[diagnostic(
        code(ephemvpn::invalid_transition),
        help("Run: ephemvpn restore to return to a known state first")
    )]
    InvalidTransition { state: String, operation: String },

    #[error("{host}:{port} is not reachable")]
    #[diagnostic(code(ephemvpn::unreachable))]
    Unreachable { host: String, port: u16 },

    // ── Processes ────────────────────────────────────────────────────

    #[error("{program} exited with status {code}")]
    #[diagnostic(code(ephemvpn::child_failed))]
    ChildFailed { program: String, code: i32 },

    #[error("{message}")]
    #[diagnostic(code(ephemvpn::operation_failed))]
    Operation { message: String },

    // ── DNS ──────────────────────────────────────────────────────────

    #[error("DNS publication failed: {reason}")]
    #[diagnostic(
        code(ephemvpn::dns_failed),
        help("Check DNS_NAME, HOSTED_ZONE_ID, and Route 53 permissions.")
    )]
    DnsFailed { reason: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ephemvpn::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(ephemvpn::config),
        help("Inspect the resolved settings with: ephemvpn config show")
    )]
    Config(Box<figment::Error>),

    #[error("Settings file already exists at {path}")]
    #[diagnostic(code(ephemvpn::config_exists), help("Use --force to overwrite it."))]
    ConfigExists { path: String },

    #[error("Keyring error: {message}")]
    #[diagnostic(code(ephemvpn::keyring))]
    Keyring { message: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON output failed: {0}")]
    #[diagnostic(code(ephemvpn::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML output failed: {0}")]
    #[diagnostic(code(ephemvpn::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML output failed: {0}")]
    #[diagnostic(code(ephemvpn::toml))]
    Toml(#[from] toml::ser::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StoreUnavailable { .. } => exit_code::CONNECTION,
            Self::NoCredentials | Self::Keyring { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::PrivilegeRequired { .. } => exit_code::PERMISSION,
            Self::InvalidTransition { .. } | Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            Self::ChildFailed { code, .. } if *code != exit_code::SUCCESS => *code,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::StoreUnavailable { message } => CliError::StoreUnavailable { message },
            CoreError::NotFound { name } => CliError::NotFound { name },
            CoreError::PrivilegeRequired { operation } => CliError::PrivilegeRequired { operation },
            CoreError::MissingSnapshot { path } => CliError::MissingSnapshot {
                path: path.display().to_string(),
            },
            CoreError::InvalidTransition { state, operation } => CliError::InvalidTransition {
                state,
                operation: operation.into(),
            },
            CoreError::Dns { message } => CliError::DnsFailed { reason: message },
            CoreError::Config { field, reason } => CliError::Validation { field, reason },
            CoreError::Io(e) => CliError::Io(e),
            other => CliError::Operation {
                message: other.to_string(),
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials => CliError::NoCredentials,
            ConfigError::Keyring(e) => CliError::Keyring {
                message: e.to_string(),
            },
            ConfigError::Serialization(e) => CliError::Toml(e),
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn privilege_errors_exit_with_permission_code() {
        let err = CliError::from(CoreError::PrivilegeRequired {
            operation: "restore".into(),
        });
        assert_eq!(err.exit_code(), exit_code::PERMISSION);
    }

    #[test]
    fn missing_snapshot_is_a_general_failure() {
        let err = CliError::from(CoreError::MissingSnapshot {
            path: PathBuf::from("/var/lib/ephemvpn/routing-snapshot.json"),
        });
        assert_eq!(err.exit_code(), exit_code::GENERAL);
        assert!(err.to_string().contains("routing-snapshot.json"));
    }

    #[test]
    fn child_exit_code_passes_through() {
        let err = CliError::ChildFailed {
            program: "ephemvpn-client".into(),
            code: 42,
        };
        assert_eq!(err.exit_code(), 42);
    }

    #[test]
    fn store_outage_maps_to_connection_code() {
        let err = CliError::from(CoreError::StoreUnavailable {
            message: "timeout".into(),
        });
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }
}
