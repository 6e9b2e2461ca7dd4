//! Bridge configuration
//!
//! Defaults match the reference deployment; a `spd-bridge.toml` next to the
//! binary overrides any subset of them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Config file looked for in the working directory
pub const CONFIG_FILE: &str = "spd-bridge.toml";

/// Telemetry sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Whether completed samples are written anywhere
    pub enabled: bool,
    /// JSONL output path
    pub path: String,
    /// Measurement name stamped on every record
    pub measurement: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "spd-telemetry.jsonl".to_string(),
            measurement: "spd3303x".to_string(),
        }
    }
}

/// Top-level bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// WebSocket listen host
    pub ws_host: String,
    /// WebSocket listen port
    pub ws_port: u16,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Request/response reply bound in milliseconds
    pub reply_timeout_ms: u64,
    /// Log file used while the status display owns the terminal
    pub log_file: String,
    /// Telemetry sink settings
    pub telemetry: TelemetryConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ws_host: "127.0.0.1".to_string(),
            ws_port: 8765,
            baud_rate: spd_link::DEFAULT_BAUD,
            reply_timeout_ms: 2000,
            log_file: "spd-bridge.log".to_string(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load from the default config file, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(CONFIG_FILE)
    }

    /// Load from a specific path, falling back to defaults
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring invalid {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Listen address for the WebSocket server
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ws_host, self.ws_port)
    }

    /// Request/response reply bound
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = BridgeConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8765");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.reply_timeout(), Duration::from_secs(2));
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let config: BridgeConfig = toml::from_str(
            r#"
            ws_port = 9000

            [telemetry]
            enabled = true
            measurement = "bench1"
            "#,
        )
        .unwrap();

        assert_eq!(config.ws_port, 9000);
        assert_eq!(config.ws_host, "127.0.0.1");
        assert!(config.telemetry.enabled);
        assert_eq!(config.telemetry.measurement, "bench1");
        assert_eq!(config.telemetry.path, "spd-telemetry.jsonl");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = BridgeConfig::load_from("/nonexistent/spd-bridge.toml");
        assert_eq!(config.ws_port, 8765);
    }
}
