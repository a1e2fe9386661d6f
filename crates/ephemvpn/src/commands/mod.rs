//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod client_config;
pub mod config_cmd;
pub mod node;
pub mod routing;

use ephemvpn_config::Settings;
use ephemvpn_store::SsmStore;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a settings-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Node(args) => node::handle(args, settings, global).await,
        Command::ClientConfig(args) => client_config::handle(args, settings, global).await,
        Command::Backup => routing::backup(settings, global).await,
        Command::Restore => routing::restore(settings, global).await,
        Command::Setup => routing::setup(settings, global).await,
        Command::Show => routing::show(settings, global).await,
        Command::Test(args) => routing::test(args, settings, global).await,
        Command::Start(args) => routing::start(args, settings, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}

/// Connect to the parameter store named by the settings.
pub(crate) async fn connect_store(settings: &Settings) -> Result<SsmStore, CliError> {
    let ssm = settings.ssm_config()?;
    tracing::debug!(region = %ssm.region, endpoint = ?ssm.endpoint, "connecting to SSM");
    Ok(SsmStore::connect(&ssm).await)
}
