//! The recovery engine's state machine and run loop.
//!
//! # Concurrency
//!
//! All mutable [`EngineState`] is touched only from the task spawned by
//! [`RecoveryEngine::run`]. That task owns a single `tokio::select!` loop
//! multiplexing transport events, the heartbeat watchdog tick, the
//! maintenance-refresh tick, and escalation-timer fires — the same
//! pattern this codebase's topology monitor uses to multiplex a
//! cancellation token, an interval, and a manual-trigger notify. Scheduled
//! transitions (reconnect-style back-off timers, escalation steps) run as
//! separate spawned tasks that post their result back into the loop's
//! mailbox rather than mutating state directly, so a long host RPC call
//! never blocks the loop's ability to process the next player message.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::EventEmitter;
use crate::host_client::HostClient;
use crate::notifier::Notifier;
use crate::protocol_constants::{
    AUTO_RESUME_HEARTBEAT_THRESHOLD, CRITICAL_ALERT_REPEAT_SECS, ESCALATION_STEP_DELAY_SECS,
    HEARTBEAT_WATCHDOG_TICK_SECS, NON_PLAYING_HEARTBEAT_THRESHOLD, PERMANENT_SKIP_ERROR_CODES,
    PLAYER_STATE_ENDED, PLAYER_STATE_PAUSED, PLAYER_STATE_PLAYING, STALL_HEARTBEAT_THRESHOLD,
};
use crate::state_store::{StateStore, StateUpdate};
use crate::transport::{PlayerMessage, PlayerTransport, ServerMessage, TransportEvent};

use super::{PlaylistEntry, QualityRank};

/// Escalation step, in order of increasing severity. `None` means "not
/// currently recovering".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    None,
    RetryCurrent,
    RefreshSource,
    ToggleVisibility,
    CriticalAlert,
}

/// Static, per-reload configuration for the engine.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Ordered list of playlists the engine cycles through.
    pub playlists: Vec<PlaylistEntry>,
    /// Consecutive non-skip playback errors before a skip is forced.
    pub max_consecutive_errors: u32,
    /// Delay before escalating from `RetryCurrent` to `RefreshSource` (ms),
    /// and the retry delay scheduled after a non-skip playback error.
    pub recovery_delay_ms: u64,
    /// Seconds without a heartbeat before the watchdog declares the player
    /// unresponsive and starts recovery.
    pub heartbeat_timeout_secs: u64,
    /// Expected interval between heartbeats (ms); used to derive the
    /// quality-recovery heartbeat threshold.
    pub heartbeat_interval_ms: u64,
    /// If set, sustained sub-`min_quality` playback for this many
    /// milliseconds triggers recovery.
    pub quality_recovery_delay_ms: Option<u64>,
    /// Minimum acceptable playback quality, paired with
    /// `quality_recovery_delay_ms`.
    pub min_quality: Option<QualityRank>,
    /// If set, periodically refresh the browser source on this interval
    /// (ms) while not recovering, as a maintenance measure against widget
    /// memory growth.
    pub source_refresh_interval_ms: Option<u64>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            playlists: Vec::new(),
            max_consecutive_errors: 3,
            recovery_delay_ms: crate::protocol_constants::DEFAULT_RECOVERY_DELAY_MS,
            heartbeat_timeout_secs: crate::protocol_constants::DEFAULT_HEARTBEAT_TIMEOUT_SECS,
            heartbeat_interval_ms: 5_000,
            quality_recovery_delay_ms: None,
            min_quality: None,
            source_refresh_interval_ms: None,
        }
    }
}

/// Mutable state owned exclusively by the engine's run loop.
struct EngineState {
    step: RecoveryStep,
    /// Incremented on every recovery reset; scheduled transitions carry the
    /// generation they were scheduled under and no-op if it has moved on.
    generation: u64,
    consecutive_errors: u32,
    stalled_heartbeats: u32,
    consecutive_paused_heartbeats: u32,
    non_playing_heartbeats: u32,
    low_quality_heartbeats: u32,
    last_heartbeat_at: Option<Instant>,
    /// `None` until the first heartbeat is observed, so a cold connect's
    /// first reading doesn't need an arbitrary baseline to compare against.
    last_progress_time: Option<f64>,
    total_videos: usize,
    playlist_index: usize,
    video_index: usize,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            step: RecoveryStep::None,
            generation: 0,
            consecutive_errors: 0,
            stalled_heartbeats: 0,
            consecutive_paused_heartbeats: 0,
            non_playing_heartbeats: 0,
            low_quality_heartbeats: 0,
            last_heartbeat_at: None,
            last_progress_time: None,
            total_videos: 0,
            playlist_index: 0,
            video_index: 0,
        }
    }
}

/// A pending escalation-timer fire, posted back into the run loop.
pub struct EscalationFire {
    step_to_check: RecoveryStep,
    generation: u64,
}

/// The recovery engine.
pub struct RecoveryEngine {
    pub(super) config: RecoveryConfig,
    state: Mutex<EngineState>,
    pub(super) state_store: Arc<StateStore>,
    pub(super) transport: Arc<PlayerTransport>,
    pub(super) host: Arc<HostClient>,
    pub(super) notifier: Arc<Notifier>,
    pub(super) events: Arc<dyn EventEmitter>,
    escalation_tx: mpsc::UnboundedSender<EscalationFire>,
    cancel: CancellationToken,
}

impl RecoveryEngine {
    /// Constructs a new engine. Call [`RecoveryEngine::run`] to start it.
    pub fn new(
        config: RecoveryConfig,
        state_store: Arc<StateStore>,
        transport: Arc<PlayerTransport>,
        host: Arc<HostClient>,
        notifier: Arc<Notifier>,
        events: Arc<dyn EventEmitter>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<EscalationFire>) {
        let (escalation_tx, escalation_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            config,
            state: Mutex::new(EngineState::default()),
            state_store,
            transport,
            host,
            notifier,
            events,
            escalation_tx,
            cancel: CancellationToken::new(),
        });
        (engine, escalation_rx)
    }

    /// Runs the engine's main loop until cancelled. Consumes the transport
    /// event receiver and the escalation-fire receiver returned from `new`.
    pub fn run(
        self: Arc<Self>,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        mut escalation_fires: mpsc::UnboundedReceiver<EscalationFire>,
    ) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut watchdog = tokio::time::interval(Duration::from_secs(
                HEARTBEAT_WATCHDOG_TICK_SECS,
            ));
            let mut maintenance = self
                .config
                .source_refresh_interval_ms
                .map(|ms| tokio::time::interval(Duration::from_millis(ms)));

            loop {
                let maintenance_tick = async {
                    match maintenance.as_mut() {
                        Some(interval) => {
                            interval.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    maybe_event = transport_events.recv() => {
                        match maybe_event {
                            Some(event) => self.handle_transport_event(event).await,
                            None => break,
                        }
                    }
                    maybe_fire = escalation_fires.recv() => {
                        if let Some(fire) = maybe_fire {
                            self.handle_escalation_fire(fire.step_to_check, fire.generation).await;
                        }
                    }
                    _ = watchdog.tick() => self.check_watchdog().await,
                    _ = maintenance_tick => self.run_maintenance_refresh().await,
                }
            }
        })
    }

    /// Cancels the run loop and any in-flight scheduled transitions.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_player_connect().await,
            TransportEvent::Disconnected => {
                // Per the current (source-inherited) behavior, a pending
                // stream-restart attempt is not cancelled here — see the
                // documented open question on this exact interaction.
            }
            TransportEvent::Message(msg) => self.handle_player_message(msg).await,
        }
    }

    async fn handle_player_message(self: &Arc<Self>, message: PlayerMessage) {
        match message {
            PlayerMessage::Ready => {}
            PlayerMessage::Heartbeat {
                video_index,
                video_id,
                video_title,
                player_state,
                current_time,
                video_duration,
                next_video_id,
                playback_quality,
                ..
            } => {
                self.on_heartbeat(
                    video_index,
                    &video_id,
                    &video_title,
                    player_state,
                    current_time,
                    video_duration,
                    &next_video_id,
                    playback_quality.as_deref(),
                )
                .await
            }
            PlayerMessage::StateChange {
                player_state,
                video_index,
                ..
            } => self.on_state_change(player_state, video_index).await,
            PlayerMessage::PlaylistLoaded { total_videos } => {
                self.on_playlist_loaded(total_videos).await
            }
            PlayerMessage::Error {
                error_code,
                video_index,
                video_id,
            } => self.on_error(error_code, video_index, &video_id).await,
        }
    }

    /// §4.5.1 — player-connect handler.
    async fn on_player_connect(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.generation += 1;
            state.step = RecoveryStep::None;
            state.last_heartbeat_at = Some(Instant::now());
            state.non_playing_heartbeats = 0;
            state.stalled_heartbeats = 0;
            state.last_progress_time = None;
        }

        let persisted = self.state_store.get();
        let playlist_count = self.config.playlists.len().max(1);
        let playlist_index = persisted.playlist_index.min(playlist_count - 1);
        {
            let mut state = self.state.lock();
            state.playlist_index = playlist_index;
            state.video_index = persisted.video_index;
        }

        let Some(playlist) = self.config.playlists.get(playlist_index) else {
            log::warn!("[Recovery] no playlists configured, nothing to load");
            return;
        };

        self.transport.send(ServerMessage::LoadPlaylist {
            playlist_id: playlist.id.clone(),
            index: persisted.video_index,
            loop_playlist: self.config.playlists.len() == 1,
            start_time: Some(persisted.current_time),
        });
    }

    /// §4.5.2 — heartbeat handler.
    #[allow(clippy::too_many_arguments)]
    async fn on_heartbeat(
        self: &Arc<Self>,
        video_index: usize,
        video_id: &str,
        video_title: &str,
        player_state: i32,
        current_time: f64,
        video_duration: f64,
        next_video_id: &str,
        playback_quality: Option<&str>,
    ) {
        let now = Instant::now();
        let stalled;
        let should_auto_resume;
        let non_playing_fired;
        let quality_fired;

        {
            let mut state = self.state.lock();
            state.last_heartbeat_at = Some(now);

            // Stall detection. A cold connect has no baseline to compare
            // against yet, so the first heartbeat establishes one and
            // already counts toward the stall streak rather than being
            // given a free pass.
            if player_state == PLAYER_STATE_PLAYING
                && current_time > 0.0
                && state
                    .last_progress_time
                    .map(|last| (current_time - last).abs() < 1.0)
                    .unwrap_or(true)
            {
                state.stalled_heartbeats += 1;
                state.last_progress_time = Some(current_time);
            } else {
                state.stalled_heartbeats = 0;
                state.last_progress_time = Some(current_time);
                if player_state == PLAYER_STATE_PLAYING && state.step != RecoveryStep::None {
                    // A fresh heartbeat with real progress while recovering
                    // resolves recovery at the next escalation check, not
                    // here directly — see §4.5.8.
                }
            }
            stalled = state.stalled_heartbeats >= STALL_HEARTBEAT_THRESHOLD
                && state.step == RecoveryStep::None;
            if stalled {
                state.step = RecoveryStep::RetryCurrent;
                state.generation += 1;
            }

            // Quality-recovery detection.
            quality_fired = match (self.config.min_quality, self.config.quality_recovery_delay_ms) {
                (Some(min_quality), Some(delay_ms)) if player_state == PLAYER_STATE_PLAYING => {
                    let below = playback_quality
                        .and_then(QualityRank::parse)
                        .map(|q| q < min_quality)
                        .unwrap_or(false);
                    if below {
                        state.low_quality_heartbeats += 1;
                    } else {
                        state.low_quality_heartbeats = 0;
                    }
                    let threshold = ((delay_ms as f64) / (self.config.heartbeat_interval_ms.max(1) as f64))
                        .ceil() as u32;
                    let fired = below
                        && state.low_quality_heartbeats >= threshold.max(1)
                        && state.step == RecoveryStep::None;
                    if fired {
                        state.step = RecoveryStep::RetryCurrent;
                        state.generation += 1;
                    }
                    fired
                }
                _ => false,
            };

            // Paused auto-resume.
            if player_state == PLAYER_STATE_PAUSED {
                state.consecutive_paused_heartbeats += 1;
            } else {
                state.consecutive_paused_heartbeats = 0;
            }
            should_auto_resume =
                state.consecutive_paused_heartbeats == AUTO_RESUME_HEARTBEAT_THRESHOLD;

            // Non-playing detection.
            if player_state != PLAYER_STATE_PLAYING && player_state != PLAYER_STATE_PAUSED {
                state.non_playing_heartbeats += 1;
            } else {
                state.non_playing_heartbeats = 0;
            }
            non_playing_fired = state.non_playing_heartbeats >= NON_PLAYING_HEARTBEAT_THRESHOLD
                && state.step == RecoveryStep::None;
            if non_playing_fired {
                state.step = RecoveryStep::RetryCurrent;
                state.generation += 1;
            }

            state.video_index = video_index;
        }

        // State-write policy: always persist identity fields; persist
        // current_time only while playing/paused or already nonzero, and
        // never while stalled at/above threshold.
        let stalled_now = self.state.lock().stalled_heartbeats >= STALL_HEARTBEAT_THRESHOLD;
        if !stalled_now {
            let persist_time = player_state == PLAYER_STATE_PLAYING
                || player_state == PLAYER_STATE_PAUSED
                || current_time > 0.0;
            self.state_store.update(StateUpdate {
                video_index: Some(video_index),
                video_id: Some(video_id.to_string()),
                video_title: Some(video_title.to_string()),
                video_duration: Some(video_duration),
                next_video_id: Some(next_video_id.to_string()),
                current_time: if persist_time { Some(current_time) } else { None },
                ..Default::default()
            });
        }

        if should_auto_resume {
            log::info!("[Recovery] player paused for {} heartbeats, resuming", AUTO_RESUME_HEARTBEAT_THRESHOLD);
            self.transport.send(ServerMessage::Resume);
        }

        if stalled || quality_fired || non_playing_fired {
            self.enter_recovery(video_id).await;
        }
    }

    /// §4.5.3 — stateChange handler.
    async fn on_state_change(self: &Arc<Self>, player_state: i32, video_index: usize) {
        if player_state == PLAYER_STATE_PLAYING {
            self.state.lock().consecutive_errors = 0;
        }

        if player_state == PLAYER_STATE_ENDED && self.config.playlists.len() > 1 {
            let total_videos = self.state.lock().total_videos;
            if total_videos > 0 && video_index == total_videos - 1 {
                self.advance_playlist("playlist finished").await;
            }
        }
    }

    /// §4.5.4 — playlistLoaded handler.
    async fn on_playlist_loaded(self: &Arc<Self>, total_videos: usize) {
        let out_of_range = {
            let mut state = self.state.lock();
            state.total_videos = total_videos;
            state.video_index >= total_videos
        };
        if out_of_range {
            self.state.lock().video_index = 0;
            self.state_store.update(StateUpdate {
                video_index: Some(0),
                ..Default::default()
            });
            self.transport.send(ServerMessage::Skip { index: 0 });
        }
    }

    /// §4.5.5 — error handler.
    async fn on_error(self: &Arc<Self>, error_code: i32, video_index: usize, video_id: &str) {
        if PERMANENT_SKIP_ERROR_CODES.contains(&error_code) {
            let reason = format!("Error {error_code} (unavailable/not embeddable)");
            self.notifier.notify_skip(video_id, &reason);
            self.skip(video_index, &reason).await;
            return;
        }

        self.notifier.notify_error(error_code, video_id);

        let exceeded = {
            let mut state = self.state.lock();
            state.consecutive_errors += 1;
            state.consecutive_errors >= self.config.max_consecutive_errors
        };

        if exceeded {
            let reason = format!("{} consecutive errors", self.config.max_consecutive_errors);
            self.notifier.notify_skip(video_id, &reason);
            self.state.lock().consecutive_errors = 0;
            self.skip(video_index, &reason).await;
        } else {
            self.schedule_retry_current().await;
        }
    }

    async fn schedule_retry_current(self: &Arc<Self>) {
        let delay = Duration::from_millis(self.config.recovery_delay_ms);
        let generation = self.state.lock().generation;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if this.state.lock().generation == generation {
                this.transport.send(ServerMessage::RetryCurrent);
            }
        });
    }

    async fn enter_recovery(self: &Arc<Self>, video_id: &str) {
        self.events.emit(&format!("Recovery started for video {video_id}"));
        self.notifier.notify_recovery(video_id);
        self.execute_step(RecoveryStep::RetryCurrent).await;
    }

    async fn execute_step(self: &Arc<Self>, step: RecoveryStep) {
        let generation = {
            let mut state = self.state.lock();
            state.step = step;
            state.generation
        };

        match step {
            RecoveryStep::RetryCurrent => {
                self.transport.send(ServerMessage::RetryCurrent);
                self.schedule_escalation_check(RecoveryStep::RefreshSource, generation, Duration::from_millis(self.config.recovery_delay_ms));
            }
            RecoveryStep::RefreshSource => {
                if let Err(e) = self.host.refresh_browser_source().await {
                    log::warn!("[Recovery] RefreshSource RPC failed: {}", e);
                }
                self.schedule_escalation_check(RecoveryStep::ToggleVisibility, generation, Duration::from_secs(ESCALATION_STEP_DELAY_SECS));
            }
            RecoveryStep::ToggleVisibility => {
                if let Err(e) = self.host.toggle_browser_source().await {
                    log::warn!("[Recovery] ToggleVisibility RPC failed: {}", e);
                }
                self.schedule_escalation_check(RecoveryStep::CriticalAlert, generation, Duration::from_secs(ESCALATION_STEP_DELAY_SECS));
            }
            RecoveryStep::CriticalAlert => {
                self.notifier.notify_critical();
                self.events.emit("Recovery escalated to critical alert");
                self.schedule_escalation_check(RecoveryStep::CriticalAlert, generation, Duration::from_secs(CRITICAL_ALERT_REPEAT_SECS));
            }
            RecoveryStep::None => {}
        }
    }

    fn schedule_escalation_check(&self, next_step: RecoveryStep, generation: u64, delay: Duration) {
        let tx = self.escalation_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(EscalationFire {
                step_to_check: next_step,
                generation,
            });
        });
    }

    async fn handle_escalation_fire(self: &Arc<Self>, step_to_check: RecoveryStep, generation: u64) {
        if self.state.lock().generation != generation {
            return; // superseded by a reconnect, resolution, or new recovery
        }
        if self.state.lock().step == RecoveryStep::None {
            return;
        }

        if self.still_broken() {
            self.execute_step(step_to_check).await;
        } else {
            let video_id = self.state_store.get().video_id;
            self.resolve_recovery(&video_id).await;
        }
    }

    fn still_broken(&self) -> bool {
        let state = self.state.lock();
        let heartbeat_overdue = state
            .last_heartbeat_at
            .map(|t| t.elapsed() > Duration::from_secs(self.config.heartbeat_timeout_secs))
            .unwrap_or(true);
        heartbeat_overdue
            || state.stalled_heartbeats >= STALL_HEARTBEAT_THRESHOLD
            || state.non_playing_heartbeats >= NON_PLAYING_HEARTBEAT_THRESHOLD
    }

    async fn resolve_recovery(self: &Arc<Self>, video_id: &str) {
        self.reset_recovery();
        self.notifier.notify_resume(video_id);
        self.events.emit("Recovery resolved");
    }

    fn reset_recovery(&self) {
        let mut state = self.state.lock();
        state.step = RecoveryStep::None;
        state.generation += 1;
        state.stalled_heartbeats = 0;
        state.non_playing_heartbeats = 0;
        state.low_quality_heartbeats = 0;
    }

    /// §4.5.7 — heartbeat watchdog tick.
    async fn check_watchdog(self: &Arc<Self>) {
        if !self.transport.is_connected() {
            return;
        }
        let (overdue, already_recovering) = {
            let state = self.state.lock();
            let overdue = state
                .last_heartbeat_at
                .map(|t| t.elapsed() > Duration::from_secs(self.config.heartbeat_timeout_secs))
                .unwrap_or(false);
            (overdue, state.step != RecoveryStep::None)
        };
        if overdue && !already_recovering {
            let video_id = self.state_store.get().video_id;
            self.enter_recovery(&video_id).await;
        }
    }

    /// §4.5.9 — periodic maintenance refresh.
    async fn run_maintenance_refresh(self: &Arc<Self>) {
        let recovering = self.state.lock().step != RecoveryStep::None;
        if recovering || !self.transport.is_connected() || !self.host.is_connected() {
            return;
        }
        if let Err(e) = self.host.refresh_browser_source().await {
            log::debug!("[Recovery] maintenance refresh failed: {}", e);
        }
    }

    pub(super) fn skip_target(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.video_index, state.total_videos)
    }

    pub(super) fn skip_target_playlist_index(&self) -> usize {
        self.state.lock().playlist_index
    }

    pub(super) fn set_playlist_position(&self, playlist_index: usize, video_index: usize, total_videos: usize) {
        let mut state = self.state.lock();
        state.playlist_index = playlist_index;
        state.video_index = video_index;
        state.total_videos = total_videos;
        state.consecutive_errors = 0;
    }

    pub(super) fn set_playlist_position_keep_playlist(&self, video_index: usize, total_videos: usize) {
        let mut state = self.state.lock();
        state.video_index = video_index;
        state.total_videos = total_videos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::tempdir;

    use crate::events::NoopEventEmitter;
    use crate::host_client::{HostClientConfig, HostRpc, InputSettings, SceneItem, StreamStatus};
    use crate::notifier::NotifierConfig;

    struct FakeHostRpc;

    #[async_trait]
    impl HostRpc for FakeHostRpc {
        async fn connect(&self) -> Result<(), crate::error::HostRpcError> {
            Ok(())
        }
        async fn get_input_settings(
            &self,
            _input_name: &str,
        ) -> Result<InputSettings, crate::error::HostRpcError> {
            Ok(InputSettings {
                url: "http://example.invalid/player".into(),
                extra: serde_json::json!({}),
            })
        }
        async fn set_input_settings(
            &self,
            _input_name: &str,
            _settings: InputSettings,
        ) -> Result<(), crate::error::HostRpcError> {
            Ok(())
        }
        async fn get_current_program_scene(&self) -> Result<String, crate::error::HostRpcError> {
            Ok("Scene".into())
        }
        async fn get_scene_item_list(
            &self,
            _scene: &str,
        ) -> Result<Vec<SceneItem>, crate::error::HostRpcError> {
            Ok(vec![SceneItem {
                source_name: "widget".into(),
                scene_item_id: 1,
            }])
        }
        async fn get_scene_item_enabled(
            &self,
            _scene: &str,
            _item_id: i64,
        ) -> Result<bool, crate::error::HostRpcError> {
            Ok(true)
        }
        async fn set_scene_item_enabled(
            &self,
            _scene: &str,
            _item_id: i64,
            _enabled: bool,
        ) -> Result<(), crate::error::HostRpcError> {
            Ok(())
        }
        async fn get_stream_status(&self) -> Result<StreamStatus, crate::error::HostRpcError> {
            Ok(StreamStatus { active: true })
        }
        async fn start_stream(&self) -> Result<(), crate::error::HostRpcError> {
            Ok(())
        }
        async fn stop_stream(&self) -> Result<(), crate::error::HostRpcError> {
            Ok(())
        }
        async fn next_stream_state_event(&self) -> Result<String, crate::error::HostRpcError> {
            // Never used by these tests; the event listener is not spawned
            // by `test_engine`.
            std::future::pending().await
        }
    }

    fn test_engine(playlists: Vec<PlaylistEntry>, max_consecutive_errors: u32) -> (Arc<RecoveryEngine>, Arc<PlayerTransport>) {
        let dir = tempdir().unwrap();
        let state_store = Arc::new(StateStore::open(dir.path().join("state.json")));
        let (transport, _transport_events) = PlayerTransport::new();
        let (host, _host_events) = HostClient::new(
            Arc::new(FakeHostRpc),
            HostClientConfig {
                browser_source_name: "widget".into(),
                auto_restart_host: false,
                host_executable: None,
                crash_sentinel_path: None,
                auto_stream: false,
            },
            Arc::new(|| true),
        );
        let notifier = Notifier::new(NotifierConfig::default());
        let events: Arc<dyn EventEmitter> = Arc::new(NoopEventEmitter);

        let config = RecoveryConfig {
            playlists,
            max_consecutive_errors,
            ..RecoveryConfig::default()
        };
        let (engine, _escalation_rx) = RecoveryEngine::new(config, state_store, Arc::clone(&transport), host, notifier, events);
        (engine, transport)
    }

    #[tokio::test]
    async fn permanent_error_code_skips_immediately_without_threshold() {
        let (engine, _transport) = test_engine(
            vec![PlaylistEntry { id: "PL1".into(), name: None }],
            5,
        );
        engine.set_playlist_position(0, 0, 3);
        engine.on_error(PERMANENT_SKIP_ERROR_CODES[0], 0, "vid-a").await;
        assert_eq!(engine.state.lock().video_index, 1);
    }

    #[tokio::test]
    async fn transient_errors_skip_only_after_consecutive_threshold() {
        let (engine, _transport) = test_engine(
            vec![PlaylistEntry { id: "PL1".into(), name: None }],
            2,
        );
        engine.set_playlist_position(0, 0, 3);

        engine.on_error(500, 0, "vid-a").await;
        assert_eq!(engine.state.lock().video_index, 0, "first transient error should not skip");

        engine.on_error(500, 0, "vid-a").await;
        assert_eq!(engine.state.lock().video_index, 1, "second consecutive error hits the threshold");
        assert_eq!(engine.state.lock().consecutive_errors, 0);
    }

    #[tokio::test]
    async fn skip_past_last_video_advances_to_next_playlist() {
        let (engine, _transport) = test_engine(
            vec![
                PlaylistEntry { id: "PL1".into(), name: None },
                PlaylistEntry { id: "PL2".into(), name: None },
            ],
            10,
        );
        engine.set_playlist_position(0, 2, 3);
        engine.skip(2, "test").await;
        let state = engine.state.lock();
        assert_eq!(state.playlist_index, 1);
        assert_eq!(state.video_index, 0);
    }

    #[tokio::test]
    async fn playlist_loaded_out_of_range_index_resets_to_zero() {
        let (engine, _transport) = test_engine(
            vec![PlaylistEntry { id: "PL1".into(), name: None }],
            10,
        );
        engine.set_playlist_position(0, 9, 0);
        engine.on_playlist_loaded(3).await;
        assert_eq!(engine.state.lock().video_index, 0);
    }

    #[tokio::test]
    async fn three_identical_heartbeats_trigger_stall_recovery() {
        let (engine, _transport) = test_engine(
            vec![PlaylistEntry { id: "PL1".into(), name: None }],
            10,
        );
        engine.on_player_connect().await;

        for n in 1..=3 {
            engine
                .on_heartbeat(0, "v", "title", PLAYER_STATE_PLAYING, 17.0, 120.0, "", None)
                .await;
            if n < 3 {
                assert_ne!(
                    engine.state.lock().step,
                    RecoveryStep::RetryCurrent,
                    "recovery should not fire before the third identical heartbeat"
                );
            }
        }
        assert_eq!(engine.state.lock().step, RecoveryStep::RetryCurrent);
        assert_eq!(engine.state.lock().stalled_heartbeats, 3);
    }

    #[tokio::test]
    async fn still_broken_is_true_before_any_heartbeat_observed() {
        let (engine, _transport) = test_engine(
            vec![PlaylistEntry { id: "PL1".into(), name: None }],
            10,
        );
        assert!(engine.still_broken());
    }

    #[tokio::test]
    async fn still_broken_is_false_once_heartbeat_is_recent_and_not_stalled() {
        let (engine, _transport) = test_engine(
            vec![PlaylistEntry { id: "PL1".into(), name: None }],
            10,
        );
        engine.state.lock().last_heartbeat_at = Some(Instant::now());
        assert!(!engine.still_broken());
    }
}
