use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{OteError, OteResult};
use crate::types::MAX_OBJECT_DATA_LEN;

/// Top-level configuration (loaded from ote.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OteConfig {
    pub daemon: DaemonConfig,
    pub service: ServiceConfig,
}

impl OteConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> OteResult<Self> {
        match Self::read(path)? {
            Some(config) => Ok(config),
            None => {
                tracing::warn!(
                    "config file not found: {}  (using defaults)",
                    path.display()
                );
                Ok(Self::default())
            }
        }
    }

    /// Parse `path`; `None` when the file does not exist. Nothing is logged,
    /// so this is safe to call before a subscriber is installed.
    pub fn read(path: &Path) -> OteResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map(Some)
            .map_err(|e| OteError::Config(format!("parsing config {}: {e}", path.display())))
    }
}

/// Host file daemon (tlkd) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Unix socket the daemon serves file requests on (default: /run/tlkd/tlkd.sock)
    pub socket: PathBuf,
    /// Storage directory; `--storagedir` on the command line takes precedence
    pub storage_dir: Option<PathBuf>,
    /// Consecutive "no new request" failures tolerated before the daemon exits
    pub new_request_retries: u32,
    /// Prometheus metrics endpoint (disabled unless set)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Log file used once the daemon has detached from its terminal
    pub log_file: Option<PathBuf>,
}

/// Secure storage service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Daemon socket the service sends file requests to
    pub socket: PathBuf,
    /// File holding the 16-byte device unique id (raw or 32 hex chars)
    pub device_id_file: PathBuf,
    /// Largest object payload accepted by WRITE and expected by READ
    pub max_object_len: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from("/run/tlkd/tlkd.sock"),
            storage_dir: None,
            new_request_retries: 50,
            metrics_addr: None,
            log_level: "info".into(),
            log_format: "text".into(),
            log_file: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from("/run/tlkd/tlkd.sock"),
            device_id_file: PathBuf::from("/etc/ote/device_id"),
            max_object_len: MAX_OBJECT_DATA_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[daemon]
socket = "/tmp/tlkd.sock"
storage_dir = "/data"
new_request_retries = 10
metrics_addr = "127.0.0.1:9200"
log_level = "debug"
log_format = "json"
log_file = "/var/log/tlkd.log"

[service]
socket = "/tmp/tlkd.sock"
device_id_file = "/tmp/device_id"
max_object_len = 4096
"#;
        let config: OteConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.daemon.socket, PathBuf::from("/tmp/tlkd.sock"));
        assert_eq!(config.daemon.storage_dir, Some(PathBuf::from("/data")));
        assert_eq!(config.daemon.new_request_retries, 10);
        assert_eq!(config.daemon.metrics_addr.as_deref(), Some("127.0.0.1:9200"));
        assert_eq!(config.daemon.log_format, "json");
        assert_eq!(config.service.device_id_file, PathBuf::from("/tmp/device_id"));
        assert_eq!(config.service.max_object_len, 4096);
    }

    #[test]
    fn test_parse_defaults() {
        let config: OteConfig = toml::from_str("").unwrap();

        assert_eq!(config.daemon.socket, PathBuf::from("/run/tlkd/tlkd.sock"));
        assert_eq!(config.daemon.new_request_retries, 50);
        assert!(config.daemon.storage_dir.is_none());
        assert!(config.daemon.metrics_addr.is_none());
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.service.socket, config.daemon.socket);
        assert_eq!(config.service.max_object_len, MAX_OBJECT_DATA_LEN);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[daemon]
new_request_retries = 3
"#;
        let config: OteConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.daemon.new_request_retries, 3);
        // Defaults
        assert_eq!(config.daemon.log_format, "text");
        assert_eq!(config.service.device_id_file, PathBuf::from("/etc/ote/device_id"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = OteConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.daemon.new_request_retries, 50);
    }

    #[test]
    fn test_read_missing_file_is_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(OteConfig::read(&tmp.path().join("absent.toml"))
            .unwrap()
            .is_none());

        let path = tmp.path().join("ote.toml");
        std::fs::write(&path, "[daemon]\nnew_request_retries = 7\n").unwrap();
        let config = OteConfig::read(&path).unwrap().unwrap();
        assert_eq!(config.daemon.new_request_retries, 7);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ote.toml");
        std::fs::write(&path, "[daemon\nsocket = 1").unwrap();
        assert!(matches!(OteConfig::load(&path), Err(OteError::Config(_))));
    }
}
