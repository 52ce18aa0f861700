use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

/// Process configuration with documented defaults; every field can be
/// overridden through an `UPLOAD_SERVER_*` environment variable. Invalid
/// values warn and fall back so the demo always boots.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,                    // Default: 3000
    pub upload_dir: PathBuf,          // Default: "uploads"
    pub max_upload_bytes: usize,      // Default: 100 MiB
    pub telemetry_interval: Duration, // Default: 5s
    pub echo_interval: Duration,      // Default: 2s
    pub echo_payload_bytes: usize,    // Default: 64 KiB
    pub echo_enabled: bool,           // Default: true
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 3000,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 100 * 1024 * 1024,
            telemetry_interval: Duration::from_secs(5),
            echo_interval: Duration::from_secs(2),
            echo_payload_bytes: 64 * 1024,
            echo_enabled: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = ServerConfig::default();
        ServerConfig {
            port: env_parsed("UPLOAD_SERVER_PORT", defaults.port),
            upload_dir: std::env::var("UPLOAD_SERVER_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes: env_parsed("UPLOAD_SERVER_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            telemetry_interval: Duration::from_millis(env_parsed(
                "UPLOAD_SERVER_TELEMETRY_INTERVAL_MS",
                defaults.telemetry_interval.as_millis() as u64,
            )),
            echo_interval: Duration::from_millis(env_parsed(
                "UPLOAD_SERVER_ECHO_INTERVAL_MS",
                defaults.echo_interval.as_millis() as u64,
            )),
            echo_payload_bytes: env_parsed(
                "UPLOAD_SERVER_ECHO_PAYLOAD_BYTES",
                defaults.echo_payload_bytes,
            ),
            echo_enabled: env_parsed("UPLOAD_SERVER_ECHO", defaults.echo_enabled),
        }
    }
}

fn env_parsed<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("{}={:?} is invalid, using default {}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_deployment() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(config.telemetry_interval, Duration::from_secs(5));
        assert_eq!(config.echo_interval, Duration::from_secs(2));
        assert!(config.echo_enabled);
    }
}
