//! Application bootstrap and dependency wiring.
//!
//! This module is the composition root - the single place where the
//! state store, transport, host client, notifier, and recovery engine
//! are instantiated and wired together. [`Supervisor`] owns the result
//! behind a lock so that [`Supervisor::reload_config`] can tear down and
//! rebuild everything except the state store (which survives reloads,
//! since it is the one thing a reload must not lose track of).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::{SupervisorError, SupervisorResult};
use crate::events::EventLog;
use crate::host_client::{HostClient, HostClientConfig, HostClientEvent, HttpHostRpc};
use crate::notifier::{Notifier, NotifierConfig};
use crate::protocol_constants::API_TOKEN_BYTES;
use crate::recovery::{PlaylistEntry, QualityRank, RecoveryConfig, RecoveryEngine};
use crate::state_store::StateStore;
use crate::transport::PlayerTransport;
use crate::util::generate_api_token;

/// Host-connection settings, the subset of [`SupervisorConfig`] that
/// varies with which streaming application is being supervised.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    pub endpoint: String,
    #[serde(default)]
    pub password: Option<String>,
    pub browser_source_name: String,
    #[serde(default)]
    pub auto_restart_host: bool,
    #[serde(default)]
    pub host_executable: Option<PathBuf>,
    #[serde(default)]
    pub crash_sentinel_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub auto_stream: bool,
}

fn default_true() -> bool {
    true
}

/// Full, validated configuration for one supervisor instance.
///
/// This is what `supervisor`'s config loader deserializes a config file
/// into, after applying CLI/env overrides — see that crate's `config`
/// module for the load path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Loopback-only bind address for the player socket and admin surface.
    pub bind_addr: SocketAddr,
    /// Path to the persisted playback-position file.
    pub state_file: PathBuf,
    /// Per-process secret required on mutating admin requests. Generated
    /// and logged once at startup if absent from the file.
    #[serde(default)]
    pub api_token: Option<String>,
    pub playlists: Vec<PlaylistEntry>,
    pub host: HostConfig,
    #[serde(default)]
    pub recovery: RecoveryConfigFile,
    #[serde(default)]
    pub notifier: NotifierConfigFile,
}

/// Recovery tuning knobs as they appear in the config file; all optional
/// with defaults matching [`crate::protocol_constants`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryConfigFile {
    #[serde(default)]
    pub max_consecutive_errors: Option<u32>,
    #[serde(default)]
    pub recovery_delay_ms: Option<u64>,
    #[serde(default)]
    pub heartbeat_timeout_secs: Option<u64>,
    #[serde(default)]
    pub heartbeat_interval_ms: Option<u64>,
    #[serde(default)]
    pub quality_recovery_delay_ms: Option<u64>,
    #[serde(default)]
    pub min_quality: Option<String>,
    #[serde(default)]
    pub source_refresh_interval_ms: Option<u64>,
}

/// Notifier settings as they appear in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierConfigFile {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub bot_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role_mention: Option<String>,
}

impl RecoveryConfigFile {
    fn into_config(self, playlists: Vec<PlaylistEntry>) -> RecoveryConfig {
        let default = RecoveryConfig::default();
        RecoveryConfig {
            playlists,
            max_consecutive_errors: self.max_consecutive_errors.unwrap_or(default.max_consecutive_errors),
            recovery_delay_ms: self.recovery_delay_ms.unwrap_or(default.recovery_delay_ms),
            heartbeat_timeout_secs: self.heartbeat_timeout_secs.unwrap_or(default.heartbeat_timeout_secs),
            heartbeat_interval_ms: self.heartbeat_interval_ms.unwrap_or(default.heartbeat_interval_ms),
            quality_recovery_delay_ms: self.quality_recovery_delay_ms,
            min_quality: self.min_quality.as_deref().and_then(QualityRank::parse),
            source_refresh_interval_ms: self.source_refresh_interval_ms,
        }
    }
}

impl NotifierConfigFile {
    fn into_config(self) -> NotifierConfig {
        NotifierConfig {
            webhook_url: self.webhook_url,
            bot_name: self.bot_name,
            avatar_url: self.avatar_url,
            role_mention: self.role_mention,
            ..NotifierConfig::default()
        }
    }
}

/// Container for one instance's wired-together services.
pub struct BootstrappedServices {
    pub state_store: Arc<StateStore>,
    pub transport: Arc<PlayerTransport>,
    pub host: Arc<HostClient>,
    pub notifier: Arc<Notifier>,
    pub events: Arc<EventLog>,
    pub engine: Arc<RecoveryEngine>,
    pub api_token: String,
    router: Router,
    engine_task: JoinHandle<()>,
    health_task: JoinHandle<()>,
    host_event_listener_task: JoinHandle<()>,
    host_notify_task: JoinHandle<()>,
}

impl BootstrappedServices {
    /// The combined router exposing the player socket; the admin surface
    /// is mounted on top of this by the binary crate, which also applies
    /// the `apiToken` check middleware.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Tears down background tasks. The state store is not touched here —
    /// callers that own it across a reload keep the same `Arc`.
    pub async fn shutdown(&self) {
        self.engine.shutdown();
        self.host.shutdown();
        self.engine_task.abort();
        self.health_task.abort();
        self.host_event_listener_task.abort();
        self.host_notify_task.abort();
        self.state_store.flush().await;
    }
}

/// Bootstraps a fresh set of services for `config`.
///
/// `existing_state` lets a config reload reuse the already-loaded state
/// store instead of re-reading the file — the resolved behavior is that
/// a reload does not re-derive playback position from disk, only from
/// whatever is already in memory.
pub fn bootstrap_services(
    config: &SupervisorConfig,
    existing_state: Option<Arc<StateStore>>,
) -> SupervisorResult<BootstrappedServices> {
    let state_store = existing_state
        .unwrap_or_else(|| Arc::new(StateStore::open(config.state_file.clone())));

    let (transport, transport_events) = PlayerTransport::new();

    let rpc = Arc::new(HttpHostRpc::new(
        config.host.endpoint.clone(),
        config.host.password.clone(),
    ));
    let health_transport = Arc::clone(&transport);
    let health: crate::host_client::HealthPredicate =
        Arc::new(move || health_transport.is_connected());
    let host_config = HostClientConfig {
        browser_source_name: config.host.browser_source_name.clone(),
        auto_restart_host: config.host.auto_restart_host,
        host_executable: config.host.host_executable.clone(),
        crash_sentinel_path: config.host.crash_sentinel_path.clone(),
        auto_stream: config.host.auto_stream,
    };
    let (host, host_events) = HostClient::new(rpc, host_config, health);

    let notifier = Notifier::new(config.notifier.clone().into_config());
    let events = Arc::new(EventLog::new());

    let host_notify_task = spawn_host_event_forwarder(host_events, Arc::clone(&notifier), Arc::clone(&events));

    let recovery_config = config.recovery.clone().into_config(config.playlists.clone());
    let (engine, escalation_rx) = RecoveryEngine::new(
        recovery_config,
        Arc::clone(&state_store),
        Arc::clone(&transport),
        Arc::clone(&host),
        Arc::clone(&notifier),
        Arc::clone(&events) as Arc<dyn crate::events::EventEmitter>,
    );

    let engine_task = Arc::clone(&engine).run(transport_events, escalation_rx);
    let health_task = Arc::clone(&host).start_health_monitor();
    let host_event_listener_task = Arc::clone(&host).start_event_listener();

    // Kicks off the initial connection attempt in the background; failure
    // chains into `schedule_reconnect`, which keeps retrying with back-off
    // on its own from there (§4.3).
    {
        let host = Arc::clone(&host);
        tokio::spawn(async move {
            host.connect().await;
        });
    }

    let api_token = config.api_token.clone().unwrap_or_else(generate_fresh_token);

    Ok(BootstrappedServices {
        state_store,
        transport: Arc::clone(&transport),
        host,
        notifier,
        events,
        engine,
        api_token,
        router: transport.router(),
        engine_task,
        health_task,
        host_event_listener_task,
        host_notify_task,
    })
}

/// Forwards host-client lifecycle/stream events into the notifier and
/// event log (§2's "Host Client → Engine/Supervisor → Notifier" data flow).
fn spawn_host_event_forwarder(
    mut host_events: tokio::sync::mpsc::UnboundedReceiver<HostClientEvent>,
    notifier: Arc<Notifier>,
    events: Arc<EventLog>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = host_events.recv().await {
            match event {
                HostClientEvent::Connected => {
                    notifier.notify_host_reconnect();
                    events.push("Host connection established");
                }
                HostClientEvent::Disconnected => {
                    notifier.notify_host_disconnect();
                    events.push("Host connection lost");
                }
                HostClientEvent::StreamDrop { attempt, max } => {
                    notifier.notify_stream_drop(attempt, max);
                    events.push(format!("Stream dropped, restart attempt {attempt} of {max}"));
                }
                HostClientEvent::StreamRestart { attempts } => {
                    notifier.notify_stream_restart(attempts);
                    events.push(format!("Stream restarted after {attempts} attempt(s)"));
                }
                HostClientEvent::StreamRestartFailed => {
                    notifier.notify_critical();
                    events.push("Stream restart attempts exhausted");
                }
            }
        }
    })
}

fn generate_fresh_token() -> String {
    log::info!(
        "[Bootstrap] no apiToken configured, generated a fresh {}-byte secret for this run",
        API_TOKEN_BYTES
    );
    generate_api_token()
}

/// Owns the current set of bootstrapped services and mediates reloads.
///
/// A reload tears down the old transport/host/notifier/recovery-engine
/// stack and rebuilds it from the new config, while the state store — the
/// one thing whose identity must survive a reload — is carried over.
pub struct Supervisor {
    services: RwLock<BootstrappedServices>,
}

impl Supervisor {
    /// Bootstraps a new supervisor from `config`.
    pub fn new(config: &SupervisorConfig) -> SupervisorResult<Self> {
        let services = bootstrap_services(config, None)?;
        Ok(Self {
            services: RwLock::new(services),
        })
    }

    /// Returns the current router. Safe to call repeatedly — a reload
    /// swaps the underlying services but the returned `Router` instances
    /// remain valid for their (now-shutdown) generation.
    pub async fn router(&self) -> Router {
        self.services.read().await.router()
    }

    /// Returns the current generation's `apiToken`, required on mutating
    /// admin requests per §5/§6.
    pub async fn api_token(&self) -> String {
        self.services.read().await.api_token.clone()
    }

    /// Returns a defensive snapshot of the current generation's event log.
    pub async fn event_log_snapshot(&self) -> Vec<crate::events::EventLogEntry> {
        self.services.read().await.events.snapshot()
    }

    /// Returns whether a player is currently connected, for status reporting.
    pub async fn is_player_connected(&self) -> bool {
        self.services.read().await.transport.is_connected()
    }

    /// Tears down the current services and rebuilds them from
    /// `new_config`, reusing the existing state store.
    pub async fn reload_config(&self, new_config: &SupervisorConfig) -> SupervisorResult<()> {
        let mut guard = self.services.write().await;
        guard.shutdown().await;
        let state_store = Arc::clone(&guard.state_store);
        let rebuilt = bootstrap_services(new_config, Some(state_store)).map_err(|e| {
            SupervisorError::Configuration(format!("reload failed: {e}"))
        })?;
        *guard = rebuilt;
        log::info!("[Supervisor] config reloaded");
        Ok(())
    }

    /// Shuts the current services down. Call once, at process exit.
    pub async fn shutdown(&self) {
        self.services.read().await.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> SupervisorConfig {
        SupervisorConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            state_file: dir.join("state.json"),
            api_token: Some("test-token".into()),
            playlists: vec![PlaylistEntry {
                id: "PL1".into(),
                name: None,
            }],
            host: HostConfig {
                endpoint: "http://127.0.0.1:4455".into(),
                password: None,
                browser_source_name: "widget".into(),
                auto_restart_host: false,
                host_executable: None,
                crash_sentinel_path: None,
                auto_stream: false,
            },
            recovery: RecoveryConfigFile::default(),
            notifier: NotifierConfigFile::default(),
        }
    }

    #[tokio::test]
    async fn bootstrap_then_shutdown_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let services = bootstrap_services(&config, None).unwrap();
        services.shutdown().await;
    }

    #[tokio::test]
    async fn reload_preserves_the_state_store_identity() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let supervisor = Supervisor::new(&config).unwrap();

        let state_ptr_before = {
            let guard = supervisor.services.read().await;
            Arc::as_ptr(&guard.state_store)
        };

        supervisor.reload_config(&config).await.unwrap();

        let state_ptr_after = {
            let guard = supervisor.services.read().await;
            Arc::as_ptr(&guard.state_store)
        };
        assert_eq!(state_ptr_before, state_ptr_after);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn missing_api_token_is_generated() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.api_token = None;
        let services = bootstrap_services(&config, None).unwrap();
        assert_eq!(services.api_token.len(), API_TOKEN_BYTES * 2);
        services.shutdown().await;
    }
}
