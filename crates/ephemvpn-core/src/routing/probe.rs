// TCP reachability probe.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub host: String,
    pub port: u16,
    pub reachable: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Try to open a TCP connection within `limit`.
pub async fn probe_tcp(host: &str, port: u16, limit: Duration) -> ProbeResult {
    let started = Instant::now();
    let error = match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(format!("timed out after {}s", limit.as_secs_f32())),
    };
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    debug!(host, port, elapsed_ms, ?error, "tcp probe finished");

    ProbeResult {
        host: host.to_owned(),
        port,
        reachable: error.is_none(),
        elapsed_ms,
        error,
    }
}
