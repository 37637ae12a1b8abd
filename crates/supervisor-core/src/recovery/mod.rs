//! The recovery engine: heartbeat watchdog, stall/quality/non-playing
//! detectors, the escalation state machine, and the playlist sequencer.
//!
//! This is the largest and most behaviorally dense component in the
//! crate. All mutable recovery state is owned by exactly one logical
//! task (the loop spawned by [`engine::RecoveryEngine::run`]); see the
//! module docs on `engine` for the serialization discipline.

pub mod engine;
mod sequencer;

pub use engine::{EscalationFire, RecoveryConfig, RecoveryEngine, RecoveryStep};

use serde::{Deserialize, Serialize};

/// An entry in the configured playlist list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// Opaque, non-empty playlist identifier.
    pub id: String,
    /// Optional human-readable name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Coarse playback-quality ranking, ordered worst to best.
///
/// Declaration order doubles as rank order via the derived `Ord` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityRank {
    Small,
    Medium,
    Large,
    Hd720,
    Hd1080,
    Hd1440,
    Hd2160,
    Highres,
}

impl QualityRank {
    /// Parses the widget's quality label, if recognized.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            "hd720" => Some(Self::Hd720),
            "hd1080" => Some(Self::Hd1080),
            "hd1440" => Some(Self::Hd1440),
            "hd2160" => Some(Self::Hd2160),
            "highres" => Some(Self::Highres),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_rank_orders_worst_to_best() {
        assert!(QualityRank::Small < QualityRank::Hd1080);
        assert!(QualityRank::Hd2160 < QualityRank::Highres);
    }

    #[test]
    fn quality_rank_parse_rejects_unknown_labels() {
        assert_eq!(QualityRank::parse("potato"), None);
        assert_eq!(QualityRank::parse("hd720"), Some(QualityRank::Hd720));
    }
}
