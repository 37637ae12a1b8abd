//! Wire messages exchanged with the player over the duplex socket.

use serde::{Deserialize, Serialize};

/// Messages sent by the player to the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerMessage {
    /// The player page has loaded and is ready to receive a playlist.
    Ready,

    /// Periodic liveness/progress report.
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        video_index: usize,
        #[serde(default)]
        video_id: String,
        #[serde(default)]
        video_title: String,
        player_state: i32,
        #[serde(default)]
        current_time: f64,
        #[serde(default)]
        video_duration: f64,
        #[serde(default)]
        next_video_id: String,
        #[serde(default)]
        volume: Option<u8>,
        #[serde(default)]
        muted: Option<bool>,
        #[serde(default)]
        playback_quality: Option<String>,
    },

    /// The embedded widget's player state changed.
    #[serde(rename_all = "camelCase")]
    StateChange {
        player_state: i32,
        video_index: usize,
        #[serde(default)]
        video_id: String,
        #[serde(default)]
        video_title: String,
    },

    /// The playlist finished loading in the widget.
    #[serde(rename_all = "camelCase")]
    PlaylistLoaded { total_videos: usize },

    /// The embedded widget reported a playback error.
    #[serde(rename_all = "camelCase")]
    Error {
        error_code: i32,
        video_index: usize,
        #[serde(default)]
        video_id: String,
    },
}

/// Messages sent by the server to the player.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Load a playlist at a given video index, optionally looping and
    /// optionally seeking to `start_time`.
    #[serde(rename_all = "camelCase")]
    LoadPlaylist {
        playlist_id: String,
        index: usize,
        #[serde(rename = "loop")]
        loop_playlist: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time: Option<f64>,
    },

    /// Re-issue the current video (used for `RetryCurrent` recovery).
    RetryCurrent,

    /// Resume a paused player.
    Resume,

    /// Jump to a specific video index within the current playlist.
    Skip { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_message_deserializes_with_defaults() {
        let json = r#"{"type":"heartbeat","videoIndex":2,"playerState":1}"#;
        let msg: PlayerMessage = serde_json::from_str(json).unwrap();
        match msg {
            PlayerMessage::Heartbeat {
                video_index,
                player_state,
                current_time,
                ..
            } => {
                assert_eq!(video_index, 2);
                assert_eq!(player_state, 1);
                assert_eq!(current_time, 0.0);
            }
            _ => panic!("expected Heartbeat"),
        }
    }

    #[test]
    fn load_playlist_serializes_without_start_time_when_none() {
        let msg = ServerMessage::LoadPlaylist {
            playlist_id: "PL1".into(),
            index: 0,
            loop_playlist: true,
            start_time: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("startTime"));
        assert!(json.contains("\"loop\":true"));
    }

    #[test]
    fn ready_and_error_round_trip() {
        let ready: PlayerMessage = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert!(matches!(ready, PlayerMessage::Ready));

        let err: PlayerMessage =
            serde_json::from_str(r#"{"type":"error","errorCode":150,"videoIndex":1}"#).unwrap();
        match err {
            PlayerMessage::Error {
                error_code,
                video_index,
                ..
            } => {
                assert_eq!(error_code, 150);
                assert_eq!(video_index, 1);
            }
            _ => panic!("expected Error"),
        }
    }
}
