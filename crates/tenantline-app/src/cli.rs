//! CLI argument definitions for the Tenantline binary.
//!
//! Uses `clap` with derive macros.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Tenantline - maintenance call line dialogue engine.
#[derive(Parser, Debug)]
#[command(name = "tenantline", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// JSON file with the property registry.
    #[arg(short = 'r', long = "registry")]
    pub registry: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Play a transcript file through one call instead of serving the API.
    #[arg(long = "replay", value_name = "TRANSCRIPT")]
    pub replay: Option<PathBuf>,

    /// Caller ID to attach to the replayed call.
    #[arg(long = "caller-id", requires = "replay")]
    pub caller_id: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > TENANTLINE_CONFIG env var > platform default (~/.tenantline/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("TENANTLINE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > TENANTLINE_PORT env var > config file value > 7480.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("TENANTLINE_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        if config_port != 0 {
            return config_port;
        }
        7480
    }

    /// Resolve the registry feed path.
    ///
    /// Priority: --registry flag > TENANTLINE_REGISTRY env var > config file value.
    /// Returns `None` when no registry is configured anywhere.
    pub fn resolve_registry_path(&self, config_path: Option<&str>) -> Option<PathBuf> {
        if let Some(ref p) = self.registry {
            return Some(p.clone());
        }
        if let Ok(p) = std::env::var("TENANTLINE_REGISTRY") {
            if !p.trim().is_empty() {
                return Some(PathBuf::from(p));
            }
        }
        config_path.map(PathBuf::from)
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".tenantline").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".tenantline").join("config.toml");
    }
    PathBuf::from("tenantline.toml")
}
