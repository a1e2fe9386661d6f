// ── Routing snapshot ──
//
// Pre-capture host state, persisted as JSON so a restore can run from a
// different process than the one that captured.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::route::RouteDescriptor;
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingSnapshot {
    pub default_routes: Vec<RouteDescriptor>,
    /// `iptables-save -t nat` output, stored verbatim.
    #[serde(default)]
    pub nat_rules: String,
    /// Resolver configuration, stored verbatim.
    #[serde(default)]
    pub dns_config: String,
    pub captured_at: DateTime<Utc>,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl RoutingSnapshot {
    /// Write the snapshot, replacing any previous one atomically.
    pub async fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(self).map_err(|e| CoreError::Snapshot {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let tmp = temp_path(path);
        tokio::fs::write(&tmp, json).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), routes = self.default_routes.len(), "routing snapshot saved");
        Ok(())
    }

    /// Read and validate a snapshot. A missing file is `MissingSnapshot`.
    pub async fn load(path: &Path) -> Result<Self, CoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::MissingSnapshot {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: Self = serde_json::from_slice(&bytes).map_err(|e| CoreError::Snapshot {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        for route in &snapshot.default_routes {
            route.validate()?;
        }
        Ok(snapshot)
    }

    pub async fn exists(path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Remove the snapshot file. Removing a missing file is not an error.
    pub async fn discard(path: &Path) -> Result<(), CoreError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> RoutingSnapshot {
        RoutingSnapshot {
            default_routes: vec![
                "default via 192.168.1.1 dev eth0 proto dhcp metric 100"
                    .parse()
                    .unwrap(),
            ],
            nat_rules: "*nat\nCOMMIT\n".into(),
            dns_config: "nameserver 1.1.1.1\n".into(),
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/snapshot.json");
        let snapshot = sample();

        snapshot.save(&path).await.unwrap();
        assert!(RoutingSnapshot::exists(&path).await);
        assert!(!temp_path(&path).exists());
        assert_eq!(RoutingSnapshot::load(&path).await.unwrap(), snapshot);

        RoutingSnapshot::discard(&path).await.unwrap();
        assert!(!RoutingSnapshot::exists(&path).await);
        RoutingSnapshot::discard(&path).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_reported_as_such() {
        let dir = tempfile::tempdir().unwrap();
        let result = RoutingSnapshot::load(&dir.path().join("none.json")).await;
        assert!(matches!(result, Err(CoreError::MissingSnapshot { .. })));
    }

    #[tokio::test]
    async fn tampered_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let body = r#"{
            "default_routes": [{"destination": "default", "interface": "eth0 down"}],
            "captured_at": "2024-01-01T00:00:00Z"
        }"#;
        std::fs::write(&path, body).unwrap();
        let result = RoutingSnapshot::load(&path).await;
        assert!(matches!(result, Err(CoreError::InvalidRoute { .. })));

        std::fs::write(&path, "{not json").unwrap();
        let result = RoutingSnapshot::load(&path).await;
        assert!(matches!(result, Err(CoreError::Snapshot { .. })));
    }
}
