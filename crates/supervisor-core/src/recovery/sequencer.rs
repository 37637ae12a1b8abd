//! Skip-within-playlist and playlist-advance logic.
//!
//! Kept separate from `engine.rs` because both operations share the same
//! "always flush state immediately" discipline distinct from the
//! debounced writes heartbeats produce, and grouping them here keeps that
//! discipline easy to audit in one place.

use std::sync::Arc;

use crate::state_store::StateUpdate;
use crate::transport::ServerMessage;

use super::engine::RecoveryEngine;

impl RecoveryEngine {
    /// Skips forward from `from_index` within the current playlist,
    /// wrapping to the next configured playlist if this was the last video.
    pub(super) async fn skip(self: &Arc<Self>, from_index: usize, reason: &str) {
        let (_, total_videos) = self.skip_target();
        let next_index = from_index + 1;

        if total_videos == 0 || next_index >= total_videos {
            self.advance_playlist(reason).await;
            return;
        }

        self.set_playlist_position_keep_playlist(next_index, total_videos);
        self.state_store.update(StateUpdate {
            video_index: Some(next_index),
            current_time: Some(0.0),
            ..Default::default()
        });
        self.state_store.flush().await;
        self.transport.send(ServerMessage::Skip { index: next_index });
        self.events.emit(&format!("Skipped to video {next_index}: {reason}"));
    }

    /// Advances to the next configured playlist, wrapping around to the
    /// first when the last one finishes. A no-op (besides logging) when
    /// only one playlist is configured, since that playlist already loops.
    pub(super) async fn advance_playlist(self: &Arc<Self>, reason: &str) {
        let playlist_count = self.config.playlists.len();
        if playlist_count == 0 {
            log::warn!("[Recovery] cannot advance playlist: none configured");
            return;
        }

        let current_playlist_index = self.skip_target_playlist_index();
        let next_playlist_index = if playlist_count == 1 {
            current_playlist_index
        } else {
            (current_playlist_index + 1) % playlist_count
        };

        self.set_playlist_position(next_playlist_index, 0, 0);
        self.state_store.update(StateUpdate {
            playlist_index: Some(next_playlist_index),
            video_index: Some(0),
            video_id: Some(String::new()),
            current_time: Some(0.0),
            ..Default::default()
        });
        self.state_store.flush().await;

        let playlist = &self.config.playlists[next_playlist_index];
        self.transport.send(ServerMessage::LoadPlaylist {
            playlist_id: playlist.id.clone(),
            index: 0,
            loop_playlist: playlist_count == 1,
            start_time: Some(0.0),
        });
        self.events.emit(&format!(
            "Advanced to playlist {next_playlist_index} ({reason})"
        ));
    }
}

#[cfg(test)]
mod tests {
    // The engine's skip/advance behavior is exercised indirectly through
    // the on_error and on_state_change handlers in `engine.rs`'s own test
    // module, since both require a fully wired `RecoveryEngine`.
}
