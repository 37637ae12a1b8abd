//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the external protocols this crate speaks
//! (the player's duplex-socket schema, the host's JSON-RPC surface, and the
//! webhook embed format) and changing them would break wire compatibility.

// ─────────────────────────────────────────────────────────────────────────────
// Player state (as reported by `heartbeat`/`stateChange` messages)
// ─────────────────────────────────────────────────────────────────────────────

/// Player has not started a video yet.
pub const PLAYER_STATE_UNSTARTED: i32 = -1;
/// Current video has finished.
pub const PLAYER_STATE_ENDED: i32 = 0;
/// Currently playing.
pub const PLAYER_STATE_PLAYING: i32 = 1;
/// Paused.
pub const PLAYER_STATE_PAUSED: i32 = 2;
/// Buffering.
pub const PLAYER_STATE_BUFFERING: i32 = 3;
/// Cued but not yet started.
pub const PLAYER_STATE_CUED: i32 = 5;

/// Error codes that should cause an immediate skip instead of a retry.
///
/// These map to "this video cannot be embedded/played here" conditions in the
/// embedded widget's own error protocol, as opposed to transient failures.
pub const PERMANENT_SKIP_ERROR_CODES: [i32; 3] = [100, 101, 150];

// ─────────────────────────────────────────────────────────────────────────────
// Host RPC
// ─────────────────────────────────────────────────────────────────────────────

/// Host RPC request name: fetch a browser source's current settings.
pub const RPC_GET_INPUT_SETTINGS: &str = "GetInputSettings";
/// Host RPC request name: update a browser source's settings.
pub const RPC_SET_INPUT_SETTINGS: &str = "SetInputSettings";
/// Host RPC request name: fetch the currently active scene.
pub const RPC_GET_CURRENT_PROGRAM_SCENE: &str = "GetCurrentProgramScene";
/// Host RPC request name: list items in a scene.
pub const RPC_GET_SCENE_ITEM_LIST: &str = "GetSceneItemList";
/// Host RPC request name: fetch a scene item's enabled state.
pub const RPC_GET_SCENE_ITEM_ENABLED: &str = "GetSceneItemEnabled";
/// Host RPC request name: set a scene item's enabled state.
pub const RPC_SET_SCENE_ITEM_ENABLED: &str = "SetSceneItemEnabled";
/// Host RPC request name: query stream status.
pub const RPC_GET_STREAM_STATUS: &str = "GetStreamStatus";
/// Host RPC request name: start streaming.
pub const RPC_START_STREAM: &str = "StartStream";
/// Host RPC request name: stop streaming.
pub const RPC_STOP_STREAM: &str = "StopStream";

/// Host event name: stream output state transitioned.
pub const EVENT_STREAM_STATE_CHANGED: &str = "StreamStateChanged";
/// Stream output state value: stream is live.
pub const STREAM_OUTPUT_STARTED: &str = "OBS_WEBSOCKET_OUTPUT_STARTED";
/// Stream output state value: stream has stopped.
pub const STREAM_OUTPUT_STOPPED: &str = "OBS_WEBSOCKET_OUTPUT_STOPPED";

/// Timeout for a single host RPC call (seconds).
pub const HOST_RPC_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Reconnect / restart timing
// ─────────────────────────────────────────────────────────────────────────────

/// Initial host reconnect delay (seconds).
pub const HOST_RECONNECT_INITIAL_SECS: f64 = 5.0;
/// Multiplier applied to the reconnect delay after each failure.
pub const HOST_RECONNECT_MULTIPLIER: f64 = 1.5;
/// Maximum host reconnect delay (seconds).
pub const HOST_RECONNECT_MAX_SECS: f64 = 30.0;
/// Consecutive reconnect failures before an optional host-process launch is attempted.
pub const HOST_LAUNCH_AFTER_FAILURES: u32 = 2;

/// Argv appended to an auto-launched host process so it skips its own
/// unclean-shutdown prompt (the supervisor already cleared the crash
/// sentinel the prompt would otherwise be gated on).
pub const HOST_LAUNCH_ARGS: &[&str] = &["--disable-shutdown-check"];

/// Delay table for stream-drop restart attempts (seconds), indexed by attempt number.
pub const STREAM_RESTART_DELAYS_SECS: [u64; 5] = [10, 30, 60, 60, 60];
/// Maximum stream-restart attempts before giving up and alerting critically.
pub const STREAM_RESTART_MAX_ATTEMPTS: usize = 5;
/// Interval for the independent stream-health poll (seconds).
pub const STREAM_HEALTH_POLL_INTERVAL_SECS: u64 = 30;

// ─────────────────────────────────────────────────────────────────────────────
// Recovery engine timing
// ─────────────────────────────────────────────────────────────────────────────

/// Consecutive non-progressing heartbeats before a stall is declared.
pub const STALL_HEARTBEAT_THRESHOLD: u32 = 3;
/// Consecutive paused heartbeats before an auto-resume is sent.
pub const AUTO_RESUME_HEARTBEAT_THRESHOLD: u32 = 2;
/// Consecutive non-playing heartbeats before recovery is triggered.
pub const NON_PLAYING_HEARTBEAT_THRESHOLD: u32 = 6;
/// Tick interval for the heartbeat watchdog (seconds).
pub const HEARTBEAT_WATCHDOG_TICK_SECS: u64 = 5;
/// Default heartbeat timeout before the watchdog declares the player unresponsive (seconds).
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 15;
/// Delay between `RetryCurrent` and `RefreshSource` (default, configurable).
pub const DEFAULT_RECOVERY_DELAY_MS: u64 = 5_000;
/// Delay between `RefreshSource`/`ToggleVisibility`/`CriticalAlert` escalation steps (seconds).
pub const ESCALATION_STEP_DELAY_SECS: u64 = 15;
/// Interval at which an unresolved `CriticalAlert` re-fires (seconds).
pub const CRITICAL_ALERT_REPEAT_SECS: u64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Notifier
// ─────────────────────────────────────────────────────────────────────────────

/// Debounce window for batching non-error notifications (milliseconds).
pub const NOTIFIER_DEBOUNCE_MS: u64 = 5_000;
/// Embed color for info-level notifications.
pub const NOTIFIER_COLOR_INFO: u32 = 3_447_003;
/// Embed color for warn-level notifications.
pub const NOTIFIER_COLOR_WARN: u32 = 16_776_960;
/// Embed color for error-level notifications.
pub const NOTIFIER_COLOR_ERROR: u32 = 15_158_332;

// ─────────────────────────────────────────────────────────────────────────────
// State store
// ─────────────────────────────────────────────────────────────────────────────

/// Debounce window before a state mutation is flushed to disk (milliseconds).
pub const STATE_WRITE_DEBOUNCE_MS: u64 = 2_000;

// ─────────────────────────────────────────────────────────────────────────────
// Event log
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum number of entries retained in the in-memory event log ring.
pub const EVENT_LOG_CAPACITY: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Application identity
// ─────────────────────────────────────────────────────────────────────────────

/// Process exit code requesting that a launcher wrapper restart the supervisor.
pub const EXIT_CODE_RESTART: i32 = 75;

/// HTTP header carrying the per-process secret required on mutating requests.
pub const API_TOKEN_HEADER: &str = "x-api-token";

/// Length in bytes of the generated `apiToken` secret before hex-encoding.
pub const API_TOKEN_BYTES: usize = 32;
