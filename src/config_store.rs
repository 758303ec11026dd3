use crate::types::{FleetConfig, ServerRecord};
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read roster file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse roster file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Concurrency-safe holder of the fleet roster.
///
/// Readers take a cheap `Arc` snapshot; a reload swaps the whole snapshot
/// under the write lock, so a reader never observes a half-replaced roster.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<Arc<FleetConfig>>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// An empty fleet: the gateway starts even with no roster file and
    /// degrades individual endpoints to "not configured" responses.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(FleetConfig::default()))),
        }
    }

    pub fn with_config(config: FleetConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Parse a roster file and install it as the new snapshot. On error the
    /// previous snapshot stays in place. Returns the number of servers loaded.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: FleetConfig = serde_json::from_str(&data)?;
        let count = config.servers.len();
        self.replace(config);
        info!("Loaded {} servers from {}", count, path.as_ref().display());
        Ok(count)
    }

    pub fn replace(&self, config: FleetConfig) {
        let mut guard = self.inner.write().unwrap();
        *guard = Arc::new(config);
    }

    pub fn get(&self) -> Arc<FleetConfig> {
        self.inner.read().unwrap().clone()
    }

    /// Exact, case-sensitive lookup by server name over the current snapshot.
    pub fn find_server(&self, name: &str) -> Option<ServerRecord> {
        self.get().servers.iter().find(|s| s.name == name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(name: &str, ip: &str) -> ServerRecord {
        ServerRecord {
            name: name.into(),
            ip: ip.into(),
            ssh_port: 0,
            ipmi_host: String::new(),
            ipmi_user: String::new(),
            ipmi_password: String::new(),
        }
    }

    #[test]
    fn empty_store_has_no_servers() {
        let store = ConfigStore::new();
        assert!(store.get().servers.is_empty());
        assert!(store.find_server("anything").is_none());
    }

    #[test]
    fn find_server_is_exact_and_case_sensitive() {
        let store = ConfigStore::with_config(FleetConfig {
            servers: vec![record("node-a", "10.0.0.5")],
            ..Default::default()
        });
        assert_eq!(store.find_server("node-a").unwrap().ip, "10.0.0.5");
        assert!(store.find_server("Node-A").is_none());
        assert!(store.find_server("node").is_none());
    }

    #[test]
    fn load_file_replaces_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"servers": [{{"name": "node-a", "ip": "10.0.0.5", "ssh_port": 22}}]}}"#
        )
        .unwrap();

        let store = ConfigStore::new();
        let count = store.load_file(file.path()).unwrap();
        assert_eq!(count, 1);
        assert!(store.find_server("node-a").is_some());
    }

    #[test]
    fn load_file_missing_keeps_previous_snapshot() {
        let store = ConfigStore::with_config(FleetConfig {
            servers: vec![record("node-a", "10.0.0.5")],
            ..Default::default()
        });
        assert!(store.load_file("/nonexistent/roster.json").is_err());
        assert!(store.find_server("node-a").is_some());
    }

    #[test]
    fn concurrent_reload_never_tears_a_snapshot() {
        // Each generation's roster is internally consistent: every server ip
        // matches the generation tag. A torn read would mix generations.
        let store = ConfigStore::new();
        let generations: Vec<FleetConfig> = (0..10)
            .map(|g| FleetConfig {
                servers: (0..20)
                    .map(|i| record(&format!("node-{}", i), &format!("10.0.{}.1", g)))
                    .collect(),
                ..Default::default()
            })
            .collect();
        store.replace(generations[0].clone());

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for config in generations {
                    store.replace(config);
                }
            })
        };

        let readers: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let snapshot = store.get();
                        let first = snapshot.servers.first().map(|s| s.ip.clone());
                        for server in &snapshot.servers {
                            assert_eq!(Some(server.ip.clone()), first);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
