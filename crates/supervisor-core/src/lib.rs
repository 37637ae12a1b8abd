//! Supervisor Core - shared library for the playback recovery supervisor.
//!
//! This crate provides the core functionality for supervising a
//! browser-embedded video playlist widget hosted inside a streaming
//! application's in-process web view: persisted playback position, the
//! player duplex socket, a resilient client for the host's control
//! surface, the stall/quality/non-playing recovery engine, the bounded
//! event log, and outbound webhook notifications.
//!
//! # Architecture
//!
//! - [`state_store`]: Persisted, debounced playback-position document
//! - [`transport`]: Player duplex-socket transport (single live peer)
//! - [`host_client`]: Resilient client for the streaming host's control surface
//! - [`recovery`]: Heartbeat watchdog, escalation FSM, and playlist sequencer
//! - [`notifier`]: Batched, debounced outbound webhook notifications
//! - [`events`]: Bounded in-memory event log and emitter abstraction
//! - [`bootstrap`]: Composition root and config-reload lifecycle
//! - [`error`]: Centralized error types
//! - [`protocol_constants`]: Fixed wire/timing constants

#![warn(clippy::all)]

pub mod bootstrap;
pub mod error;
pub mod events;
pub mod host_client;
pub mod notifier;
pub mod protocol_constants;
pub mod recovery;
pub mod state_store;
pub mod transport;
pub mod util;

pub use bootstrap::{BootstrappedServices, HostConfig, Supervisor, SupervisorConfig};
pub use error::{ErrorCode, SupervisorError, SupervisorResult};
pub use events::{EventEmitter, EventLog, EventLogEntry};
pub use host_client::{HostClient, HostClientConfig, HostClientEvent, HostRpc};
pub use notifier::{Notifier, NotifierConfig};
pub use recovery::{PlaylistEntry, QualityRank, RecoveryConfig, RecoveryEngine, RecoveryStep};
pub use state_store::{PersistedState, StateStore, StateUpdate};
pub use transport::{PlayerMessage, PlayerTransport, ServerMessage, TransportEvent};
