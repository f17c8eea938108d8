use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::errors::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub network: NetworkConfig,
    pub limits: LimitsConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    /// Operator credentials checked by OPER. Presence in this set is the only privilege
    /// mechanism the core implements (no cryptographic challenge, per the spec's non-goals).
    #[serde(default)]
    pub operators: Vec<OperatorCredential>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperatorCredential {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub motd: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_connections: usize,
    /// Path to a PEM certificate chain; when set together with `tls_key_path`, the listener
    /// wraps every accepted socket in a TLS handshake instead of serving plaintext.
    #[serde(default)]
    pub tls_cert_path: Option<String>,
    #[serde(default)]
    pub tls_key_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub max_channels_per_user: usize,
    pub max_message_length: usize,
    pub max_connections_per_ip: usize,
    pub unregistered_timeout: u64,
}

/// Liveness supervisor timings. Defaults mirror the reference deployment: a ping every 30s,
/// a sweep of idle connections every 100s, and a 280s idle bound before disconnection.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LivenessConfig {
    pub ping_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub idle_bound_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        LivenessConfig {
            ping_interval_secs: 30,
            sweep_interval_secs: 100,
            idle_bound_secs: 280,
        }
    }
}

impl Config {
    /// Loads and parses the TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_defaults_match_reference_timings() {
        let liveness = LivenessConfig::default();
        assert_eq!(liveness.ping_interval_secs, 30);
        assert_eq!(liveness.sweep_interval_secs, 100);
        assert_eq!(liveness.idle_bound_secs, 280);
    }

    #[test]
    fn parses_minimal_toml_with_liveness_defaulted() {
        let toml_src = r#"
            [server]
            name = "mock.server"
            version = "1.0"
            motd = "hi"

            [network]
            bind_address = "127.0.0.1"
            port = 6667
            max_connections = 100

            [limits]
            max_channels_per_user = 10
            max_message_length = 512
            max_connections_per_ip = 5
            unregistered_timeout = 60
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.liveness.ping_interval_secs, 30);
        assert_eq!(config.network.tls_cert_path, None);
    }
}
