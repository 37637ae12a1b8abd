//! Resilient client for the streaming host's control surface.
//!
//! Wraps a [`HostRpc`] trait object with reconnect back-off, optional host
//! process launch, an independent stream-health poll, and the stream-drop
//! restart sub-FSM described in the component design for this crate. The
//! health-monitor loop's `tokio::select!` shape (cancellation + interval +
//! manual-trigger notify, with `interval.reset()` on manual trigger) is the
//! same shape this codebase's topology monitor uses for its own periodic
//! refresh.

mod process;
mod rpc;
mod restart;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use restart::RestartAttempts;
pub use rpc::{HostRpc, HttpHostRpc, InputSettings, SceneItem, StreamStatus};

use crate::error::HostRpcError;
use crate::protocol_constants::{
    HOST_LAUNCH_AFTER_FAILURES, HOST_LAUNCH_ARGS, HOST_RECONNECT_INITIAL_SECS,
    HOST_RECONNECT_MAX_SECS, HOST_RECONNECT_MULTIPLIER, STREAM_HEALTH_POLL_INTERVAL_SECS,
    STREAM_OUTPUT_STARTED, STREAM_OUTPUT_STOPPED,
};

/// Events published by the host client for the supervisor/notifier to react to.
#[derive(Debug, Clone)]
pub enum HostClientEvent {
    /// The host connection was (re-)established.
    Connected,
    /// The host connection was lost.
    Disconnected,
    /// The output stream dropped; a restart attempt has been scheduled.
    StreamDrop { attempt: usize, max: usize },
    /// The output stream was successfully restarted.
    StreamRestart { attempts: usize },
    /// The restart attempt budget was exhausted without success.
    StreamRestartFailed,
}

/// Static configuration for a [`HostClient`] instance.
#[derive(Debug, Clone)]
pub struct HostClientConfig {
    /// Name of the browser-source input hosting the player page.
    pub browser_source_name: String,
    /// Whether the host should be launched automatically after repeated
    /// reconnect failures.
    pub auto_restart_host: bool,
    /// Path to the host executable, used only if `auto_restart_host` is set.
    pub host_executable: Option<PathBuf>,
    /// Optional crash-sentinel file cleared before a host launch.
    pub crash_sentinel_path: Option<PathBuf>,
    /// Whether stream drops should trigger automatic restart attempts.
    pub auto_stream: bool,
}

/// Cheap external predicate the restart sub-FSM consults before each
/// attempt: "is it currently safe/meaningful to restart the stream?" The
/// supervisor wires this to "player is connected and not mid-recovery".
pub type HealthPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

struct ReconnectState {
    delay: Duration,
    failed_attempts: u32,
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs_f64(HOST_RECONNECT_INITIAL_SECS),
            failed_attempts: 0,
        }
    }
}

/// Resilient wrapper around the host RPC surface.
pub struct HostClient {
    rpc: Arc<dyn HostRpc>,
    config: HostClientConfig,
    health: HealthPredicate,
    connected: AtomicBool,
    host_launched: AtomicBool,
    reconnect: Mutex<ReconnectState>,
    reconnect_timer: Mutex<Option<JoinHandle<()>>>,
    restart_attempts: Mutex<RestartAttempts>,
    restart_timer: Mutex<Option<JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<HostClientEvent>,
    health_poll_notify: Notify,
    cancel: CancellationToken,
}

impl HostClient {
    /// Creates a new client and its event receiver.
    ///
    /// `health` is consulted by the stream-restart sub-FSM before each
    /// attempt fires; it should report whether the player is connected and
    /// not currently mid-recovery.
    pub fn new(
        rpc: Arc<dyn HostRpc>,
        config: HostClientConfig,
        health: HealthPredicate,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<HostClientEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            rpc,
            config,
            health,
            connected: AtomicBool::new(false),
            host_launched: AtomicBool::new(false),
            reconnect: Mutex::new(ReconnectState::default()),
            reconnect_timer: Mutex::new(None),
            restart_attempts: Mutex::new(RestartAttempts::default()),
            restart_timer: Mutex::new(None),
            events_tx,
            health_poll_notify: Notify::new(),
            cancel: CancellationToken::new(),
        });
        (client, events_rx)
    }

    /// Whether the host connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn emit(&self, event: HostClientEvent) {
        if self.events_tx.send(event).is_err() {
            log::trace!("[HostClient] no event receiver, dropping event");
        }
    }

    /// Attempts to connect (or verify) the host connection.
    ///
    /// On success, resets the reconnect delay to its floor and emits
    /// `Connected` if this is a transition from disconnected. On failure,
    /// increments the failure counter, optionally launches the host
    /// process, and schedules a reconnect.
    pub async fn connect(self: &Arc<Self>) {
        match self.rpc.connect().await {
            Ok(()) => {
                let was_connected = self.connected.swap(true, Ordering::AcqRel);
                {
                    let mut state = self.reconnect.lock();
                    *state = ReconnectState::default();
                }
                self.host_launched.store(false, Ordering::Release);
                if !was_connected {
                    log::info!("[HostClient] connected");
                    self.emit(HostClientEvent::Connected);
                }
            }
            Err(e) => {
                let was_connected = self.connected.swap(false, Ordering::AcqRel);
                if was_connected {
                    log::warn!("[HostClient] lost connection: {}", e);
                    self.emit(HostClientEvent::Disconnected);
                } else {
                    log::debug!("[HostClient] reconnect attempt failed: {}", e);
                }
                self.maybe_launch_host().await;
                self.schedule_reconnect();
            }
        }
    }

    async fn maybe_launch_host(self: &Arc<Self>) {
        if !self.config.auto_restart_host {
            return;
        }
        let failed = {
            let mut state = self.reconnect.lock();
            state.failed_attempts += 1;
            state.failed_attempts
        };
        if failed < HOST_LAUNCH_AFTER_FAILURES {
            return;
        }
        if self.host_launched.load(Ordering::Acquire) {
            return; // already launched for this disconnect cycle
        }
        let Some(ref executable) = self.config.host_executable else {
            return;
        };

        let image_name = executable
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if process::is_process_running(image_name).await {
            log::debug!(
                "[HostClient] host process {} already running, not relaunching",
                image_name
            );
            return;
        }

        if self.host_launched.swap(true, Ordering::AcqRel) {
            return; // already launched for this disconnect cycle
        }
        if let Some(ref sentinel) = self.config.crash_sentinel_path {
            process::clear_crash_sentinel(sentinel);
        }
        log::info!("[HostClient] launching host process: {}", executable.display());
        let args: Vec<String> = HOST_LAUNCH_ARGS.iter().map(|s| s.to_string()).collect();
        if let Err(e) = process::spawn_detached(executable, &args) {
            log::warn!("[HostClient] failed to launch host: {}", e);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let delay = {
            let mut state = self.reconnect.lock();
            let current = state.delay;
            let next_secs =
                (current.as_secs_f64() * HOST_RECONNECT_MULTIPLIER).min(HOST_RECONNECT_MAX_SECS);
            state.delay = Duration::from_secs_f64(next_secs);
            current
        };

        let mut timer = self.reconnect_timer.lock();
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        let this = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.connect().await;
        }));
    }

    /// Refreshes the browser source so the embedded page re-fetches its URL.
    ///
    /// Strips any existing `_cb=<digits>` cache-bust parameter and appends
    /// a fresh one derived from the current time.
    pub async fn refresh_browser_source(&self) -> Result<(), HostRpcError> {
        let name = &self.config.browser_source_name;
        let settings = self.rpc.get_input_settings(name).await?;
        let refreshed_url = bump_cache_buster(&settings.url);
        let mut settings = settings;
        settings.url = refreshed_url;
        self.rpc.set_input_settings(name, settings).await
    }

    /// Toggles the browser source off and back on, forcing the embedded
    /// page to reload.
    pub async fn toggle_browser_source(&self) -> Result<(), HostRpcError> {
        let name = &self.config.browser_source_name;
        let scene = self.rpc.get_current_program_scene().await?;
        let items = self.rpc.get_scene_item_list(&scene).await?;
        let item_id = items
            .iter()
            .find(|item| &item.source_name == name)
            .map(|item| item.scene_item_id)
            .ok_or_else(|| {
                HostRpcError::Rpc(format!("source {} not found in scene {}", name, scene))
            })?;

        self.rpc.set_scene_item_enabled(&scene, item_id, false).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.rpc.set_scene_item_enabled(&scene, item_id, true).await
    }

    /// Returns whether the host is currently streaming. Any RPC failure is
    /// treated as "not streaming".
    pub async fn is_streaming(&self) -> bool {
        match self.rpc.get_stream_status().await {
            Ok(status) => status.active,
            Err(_) => false,
        }
    }

    /// Starts streaming after checking the browser source is present,
    /// enabled, and not already streaming.
    pub async fn start_streaming(&self) -> Result<(), HostRpcError> {
        if self.is_streaming().await {
            return Ok(());
        }
        let name = &self.config.browser_source_name;
        let scene = self.rpc.get_current_program_scene().await?;
        let items = self.rpc.get_scene_item_list(&scene).await?;
        let item_id = items
            .iter()
            .find(|item| &item.source_name == name)
            .map(|item| item.scene_item_id)
            .ok_or_else(|| {
                HostRpcError::Rpc(format!("source {} not found in scene {}", name, scene))
            })?;
        if !self.rpc.get_scene_item_enabled(&scene, item_id).await? {
            return Err(HostRpcError::Rpc(format!("source {} is disabled", name)));
        }
        self.rpc.start_stream().await
    }

    /// Stops streaming.
    pub async fn stop_stream(&self) -> Result<(), HostRpcError> {
        self.rpc.stop_stream().await
    }

    /// Feeds a `StreamStateChanged` event from the host into the
    /// stream-drop restart sub-FSM.
    pub fn on_stream_state_changed(self: &Arc<Self>, output_state: &str) {
        match output_state {
            s if s == STREAM_OUTPUT_STOPPED => self.handle_stream_stopped(),
            s if s == STREAM_OUTPUT_STARTED => self.handle_stream_started(),
            other => log::debug!("[HostClient] ignoring unknown output state: {}", other),
        }
    }

    fn handle_stream_stopped(self: &Arc<Self>) {
        if !self.config.auto_stream {
            return;
        }
        let mut pending = self.restart_timer.lock();
        if pending.is_some() {
            return; // a restart is already pending
        }
        let Some(delay_secs) = self.restart_attempts.lock().next_delay_secs() else {
            return;
        };
        let attempt = self.restart_attempts.lock().record_attempt();
        let max = crate::protocol_constants::STREAM_RESTART_MAX_ATTEMPTS;
        self.emit(HostClientEvent::StreamDrop { attempt, max });

        let this = Arc::clone(self);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            this.fire_restart_attempt().await;
        }));
    }

    async fn fire_restart_attempt(self: &Arc<Self>) {
        {
            let mut pending = self.restart_timer.lock();
            *pending = None;
        }

        if !self.is_connected() || !(self.health)() || self.is_streaming().await {
            return;
        }

        match self.start_streaming().await {
            Ok(()) => {
                // The actual reset/notify happens on the host's own
                // StreamStateChanged(STARTED) event, not here — the start
                // call can succeed while the host is still negotiating.
            }
            Err(e) => {
                log::warn!("[HostClient] stream restart attempt failed: {}", e);
                if self.restart_attempts.lock().exhausted() {
                    self.restart_attempts.lock().reset();
                    self.emit(HostClientEvent::StreamRestartFailed);
                }
            }
        }
    }

    fn handle_stream_started(self: &Arc<Self>) {
        let attempts = {
            let mut state = self.restart_attempts.lock();
            let count = state.count();
            state.reset();
            count
        };
        if let Some(handle) = self.restart_timer.lock().take() {
            handle.abort();
        }
        if attempts > 0 {
            self.emit(HostClientEvent::StreamRestart { attempts });
        }
    }

    /// Runs the host event feed until cancelled, routing each
    /// `StreamStateChanged` event into [`Self::on_stream_state_changed`].
    ///
    /// Polling continues across disconnects: a poll failure is logged and
    /// retried after a short delay rather than ending the loop, since the
    /// reconnect back-off already owns the "are we connected" question.
    pub fn start_event_listener(self: Arc<Self>) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = self.rpc.next_stream_state_event() => {
                        match result {
                            Ok(output_state) => self.on_stream_state_changed(&output_state),
                            Err(e) => {
                                log::debug!("[HostClient] event poll failed: {}", e);
                                tokio::select! {
                                    _ = cancel.cancelled() => break,
                                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Starts the independent stream-health poll, matching this codebase's
    /// interval-plus-manual-trigger monitoring loop shape.
    pub fn start_health_monitor(self: Arc<Self>) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(STREAM_HEALTH_POLL_INTERVAL_SECS));
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                    _ = self.health_poll_notify.notified() => {
                        interval.reset();
                    }
                }

                if !self.config.auto_stream || !self.is_connected() || !(self.health)() {
                    continue;
                }
                if self.restart_timer.lock().is_some() {
                    continue; // a restart is already in flight
                }
                if !self.is_streaming().await {
                    log::info!("[HostClient] health poll found stream stopped, restarting");
                    if let Err(e) = self.start_streaming().await {
                        log::warn!("[HostClient] health-poll restart failed: {}", e);
                    }
                }
            }
        })
    }

    /// Triggers an immediate health check instead of waiting for the next tick.
    pub fn trigger_health_check(&self) {
        self.health_poll_notify.notify_one();
    }

    /// Cancels all background timers (reconnect, restart, health poll).
    pub fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.reconnect_timer.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.restart_timer.lock().take() {
            handle.abort();
        }
    }
}

fn bump_cache_buster(url: &str) -> String {
    let without_cb = strip_cb_param(url);
    let now_ms = crate::util::now_unix_millis();
    let separator = if without_cb.contains('?') { '&' } else { '?' };
    format!("{without_cb}{separator}_cb={now_ms}")
}

fn strip_cb_param(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let remaining: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.starts_with("_cb="))
        .collect();
    if remaining.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", remaining.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_cb_param_removes_existing_value() {
        assert_eq!(
            strip_cb_param("http://x/page?_cb=123&foo=bar"),
            "http://x/page?foo=bar"
        );
        assert_eq!(strip_cb_param("http://x/page?_cb=123"), "http://x/page");
        assert_eq!(strip_cb_param("http://x/page"), "http://x/page");
    }

    #[test]
    fn bump_cache_buster_appends_fresh_value() {
        let updated = bump_cache_buster("http://x/page?_cb=1&foo=bar");
        assert!(updated.starts_with("http://x/page?foo=bar&_cb="));
    }

    #[test]
    fn bump_cache_buster_on_url_without_query() {
        let updated = bump_cache_buster("http://x/page");
        assert!(updated.starts_with("http://x/page?_cb="));
    }
}
