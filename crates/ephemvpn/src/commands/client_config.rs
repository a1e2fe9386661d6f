//! Client configuration rendering.

use serde::Serialize;

use ephemvpn_config::Settings;
use ephemvpn_core::{ClientProfile, NodeConfig, PublicAddressResolver};

use crate::cli::{ClientConfigArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::connect_store;

#[derive(Serialize)]
struct RenderedConfig<'a> {
    client_id: &'a str,
    address: String,
    endpoint: &'a str,
    config: String,
}

pub async fn handle(
    args: ClientConfigArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let node = settings.node_config()?;
    let endpoint = match args.endpoint {
        Some(endpoint) => validate_endpoint(&endpoint)?,
        None => default_endpoint(&node).await?,
    };

    let store = connect_store(settings).await?;
    let profile = ClientProfile::load(&store, &node, &args.client_id, endpoint).await?;
    let view = RenderedConfig {
        client_id: &profile.client_id,
        address: format!("{}/32", profile.address),
        endpoint: &profile.endpoint,
        config: profile.render(),
    };

    // Table and plain both print the file itself
    let out = output::render_single(&global.output, &view, |v| v.config.clone(), |v| {
        v.config.clone()
    })?;
    output::print_output(out.trim_end(), global.quiet);
    Ok(())
}

/// `DNS_NAME:port` when a name is configured, the detected public
/// address otherwise.
async fn default_endpoint(node: &NodeConfig) -> Result<String, CliError> {
    if let Some(endpoint) = node.static_endpoint() {
        return Ok(endpoint);
    }
    let resolver = PublicAddressResolver::new(node.public_ip.clone())?;
    match resolver.resolve().await {
        Some((address, _)) => Ok(format!("{address}:{}", node.tunnel.listen_port)),
        None => Err(CliError::Validation {
            field: "endpoint".into(),
            reason: "no DNS_NAME configured and the public address could not be detected; \
                     pass --endpoint HOST:PORT"
                .into(),
        }),
    }
}

fn validate_endpoint(endpoint: &str) -> Result<String, CliError> {
    let invalid = |reason: &str| CliError::Validation {
        field: "endpoint".into(),
        reason: format!("'{endpoint}' {reason}"),
    };
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| invalid("is not HOST:PORT"))?;
    if host.is_empty() {
        return Err(invalid("has an empty host"));
    }
    port.parse::<u16>()
        .map_err(|_| invalid("has an invalid port"))?;
    Ok(endpoint.to_owned())
}
