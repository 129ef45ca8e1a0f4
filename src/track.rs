//! Track snapshot and transport state shared by every component.

use serde::{Serialize, Serializer};
use std::fmt;

/// Transport state reported by the player. Only equality is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Stopped,
    Playing,
    Paused,
    FastForwarding,
    Rewinding,
}

impl PlayerState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::FastForwarding => "Fast Forwarding",
            Self::Rewinding => "Rewinding",
        }
    }

    /// Stopped and Paused never get a published activity; presence is cleared instead.
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Stopped | Self::Paused)
    }

    /// Music.app `player state as string`: "playing", "paused", "fast forwarding", ...
    #[must_use]
    pub fn from_music(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "playing" => Self::Playing,
            "paused" => Self::Paused,
            "fast forwarding" => Self::FastForwarding,
            "rewinding" => Self::Rewinding,
            _ => Self::Stopped,
        }
    }

    /// MPRIS `PlaybackStatus`: "Playing" | "Paused" | "Stopped".
    #[must_use]
    pub fn from_mpris(s: &str) -> Self {
        match s.trim() {
            "Playing" => Self::Playing,
            "Paused" => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Serialized as its display label ("Fast Forwarding", not the variant name).
impl Serialize for PlayerState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// One observation of the loaded track.
///
/// An invalid snapshot (`valid == false`) carries no data: every field is empty
/// and `state` is `Stopped`. Construct those with [`TrackSnapshot::invalid`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSnapshot {
    pub valid: bool,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub genre: Option<String>,
    pub persistent_id: Option<String>,
    pub database_id: Option<i64>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub track_count: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_count: Option<u32>,
    /// Seconds, never negative.
    pub duration: Option<f64>,
    pub played_count: Option<u32>,
    /// 0..=100
    pub rating: Option<u8>,
    /// Epoch seconds.
    pub played_date: Option<i64>,
    pub state: PlayerState,
}

impl TrackSnapshot {
    #[must_use]
    pub fn invalid() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.valid && self.state == PlayerState::Playing
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.valid && self.state == PlayerState::Paused
    }

    /// Re-derive the playing/paused flags from a fresh transport state.
    /// Invalid snapshots stay `Stopped`.
    pub fn set_state(&mut self, state: PlayerState) {
        if self.valid {
            self.state = state;
        }
    }

    /// Clamp numeric fields into their documented ranges.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if !self.valid {
            return Self::invalid();
        }
        self.duration = self.duration.filter(|d| d.is_finite()).map(|d| d.max(0.0));
        self.rating = self.rating.map(|r| r.min(100));
        self
    }
}
