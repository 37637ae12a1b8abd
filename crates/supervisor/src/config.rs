//! Supervisor configuration.
//!
//! Loads the full [`SupervisorConfig`] from a YAML file, then applies a
//! small set of environment-variable overrides for the settings an
//! operator is most likely to want to set per-deployment without editing
//! the file (bind address, state file path, api token).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use supervisor_core::SupervisorConfig;

/// Loads configuration from a YAML file, then applies environment overrides.
pub fn load(path: &Path) -> Result<SupervisorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: SupervisorConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

/// Applies `SUPERVISOR_*` environment variable overrides to the configuration.
fn apply_env_overrides(config: &mut SupervisorConfig) -> Result<()> {
    if let Ok(val) = std::env::var("SUPERVISOR_BIND_ADDR") {
        config.bind_addr = val
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid SUPERVISOR_BIND_ADDR: {val}"))?;
    }

    if let Ok(val) = std::env::var("SUPERVISOR_STATE_FILE") {
        config.state_file = PathBuf::from(val);
    }

    if let Ok(val) = std::env::var("SUPERVISOR_API_TOKEN") {
        config.api_token = Some(val);
    }

    if let Ok(val) = std::env::var("SUPERVISOR_HOST_ENDPOINT") {
        config.host.endpoint = val;
    }

    if let Ok(val) = std::env::var("SUPERVISOR_HOST_PASSWORD") {
        config.host.password = Some(val);
    }

    if let Ok(val) = std::env::var("SUPERVISOR_WEBHOOK_URL") {
        config.notifier.webhook_url = Some(val);
    }

    Ok(())
}

/// Rejects configs that would violate the loopback-only binding contract
/// (§6) before a listener is ever opened.
fn validate(config: &SupervisorConfig) -> Result<()> {
    if !config.bind_addr.ip().is_loopback() {
        bail!(
            "bindAddr {} is not a loopback address — the player socket and \
             admin surface must never be reachable off-box",
            config.bind_addr
        );
    }
    if config.playlists.is_empty() {
        bail!("configuration must list at least one playlist");
    }
    Ok(())
}
