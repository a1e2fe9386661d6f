//! Clap derive structures for the `ephemvpn` CLI.
//!
//! Node commands run on the VPN server at boot; the routing commands run
//! on the connecting host around a VPN client session.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ephemvpn -- bootstrap an ephemeral VPN node and keep client routing recoverable
#[derive(Debug, Parser)]
#[command(
    name = "ephemvpn",
    version,
    about = "Bootstrap ephemeral WireGuard nodes and manage client routing",
    long_about = "Node commands reconcile identity, peers, and DNS from the parameter\n\
        store and hand an explicit configuration to the tunnel engine.\n\n\
        Routing commands back up, capture, and restore the connecting host's\n\
        default routes around a VPN client session.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, env = "EPHEMVPN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "EPHEMVPN_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Node startup: identity, credential, peers, DNS, tunnel
    Node(NodeArgs),

    /// Render a WireGuard configuration for a stored client
    ClientConfig(ClientConfigArgs),

    /// Snapshot the host's default routes, NAT rules, and resolver config
    Backup,

    /// Put the host back the way the last backup found it
    Restore,

    /// Route the VPN subnet through the tunnel device
    Setup,

    /// Print routing, NAT, and interface state
    Show,

    /// Check that a TCP endpoint is reachable
    Test(TestArgs),

    /// Backup, capture, run the VPN client, then restore
    Start(StartArgs),

    /// Manage local settings and the stored API credential
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  NODE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct NodeArgs {
    /// Use an empty in-memory parameter store instead of SSM
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: NodeCommand,
}

#[derive(Debug, Subcommand)]
pub enum NodeCommand {
    /// Run a full startup pass and bring the tunnel up
    Up {
        /// Reconcile and render the tunnel config without applying it
        #[arg(long)]
        dry_run: bool,

        /// Peer-management API command to run once the tunnel is up
        #[arg(long, env = "EPHEMVPN_API_COMMAND")]
        api_command: Option<String>,
    },

    /// Ensure the node keypair exists and print the public key
    Identity,

    /// Ensure the administrative API credential exists
    Credential {
        /// Also store the credential in the local system keyring
        #[arg(long)]
        save_to_keyring: bool,
    },

    /// Reconcile and list the authorized peers
    #[command(alias = "ls")]
    Peers,

    /// Detect the public address and publish the DNS record
    PublishDns,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CLIENT CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ClientConfigArgs {
    /// Client identifier as stored under users/
    pub client_id: String,

    /// Endpoint clients dial (host:port); defaults to DNS_NAME or the detected address
    #[arg(long)]
    pub endpoint: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ROUTING
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct TestArgs {
    /// Host name or address
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Connect timeout in seconds (defaults to probe_timeout_secs)
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Args)]
pub struct StartArgs {
    /// VPN server host
    pub host: String,

    /// VPN server API port
    pub port: u16,

    /// API credential (falls back to settings, keyring, then a prompt)
    #[arg(env = "EPHEMVPN_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved settings (secrets masked)
    Show,

    /// Print the settings file location
    Path,

    /// Write a settings file populated with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Store the API credential in the system keyring
    SetKey,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
