//! Media player adapters.
//!
//! Every query shells out to a short-lived helper (`osascript`, `playerctl`) or
//! asks the session bus, so whatever the automation layer allocates is released
//! when the call returns. None of the queries fail: an unreachable player reads
//! as "not running", `Stopped`, position `0.0` and an invalid snapshot.

use std::process::Stdio;

use tokio::process::Command;

use crate::config::{Backend, SourceConfig};
use crate::track::{PlayerState, TrackSnapshot};

pub mod mpris;
pub mod music;

pub use mpris::MprisSource;
pub use music::MusicSource;

/// Separator used between fields in helper output. Titles may contain `|`.
pub(crate) const FIELD_SEP: char = '\u{1f}';

#[allow(async_fn_in_trait)]
pub trait Source {
    async fn is_running(&self) -> bool;
    async fn fetch_snapshot(&self) -> TrackSnapshot;
    async fn player_state(&self) -> PlayerState;
    async fn position(&self) -> f64;
}

/// The adapter selected by `[source] backend`.
pub enum AnySource {
    Music(MusicSource),
    Mpris(MprisSource),
}

impl AnySource {
    pub async fn from_config(cfg: &SourceConfig) -> anyhow::Result<Self> {
        Ok(match cfg.backend {
            Backend::Music => Self::Music(MusicSource::new(&cfg.app_name)),
            Backend::Mpris => Self::Mpris(MprisSource::connect(&cfg.player).await?),
        })
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Music(_) => "music",
            Self::Mpris(_) => "mpris",
        }
    }
}

impl Source for AnySource {
    async fn is_running(&self) -> bool {
        match self {
            Self::Music(s) => s.is_running().await,
            Self::Mpris(s) => s.is_running().await,
        }
    }

    async fn fetch_snapshot(&self) -> TrackSnapshot {
        match self {
            Self::Music(s) => s.fetch_snapshot().await,
            Self::Mpris(s) => s.fetch_snapshot().await,
        }
    }

    async fn player_state(&self) -> PlayerState {
        match self {
            Self::Music(s) => s.player_state().await,
            Self::Mpris(s) => s.player_state().await,
        }
    }

    async fn position(&self) -> f64 {
        match self {
            Self::Music(s) => s.position().await,
            Self::Mpris(s) => s.position().await,
        }
    }
}

/// Run a helper and return its trimmed stdout, or `None` if it could not be
/// spawned or exited non-zero.
pub(crate) async fn run_capture(program: &str, args: &[&str]) -> Option<String> {
    let out = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;
    match out {
        Ok(o) if o.status.success() => {
            Some(String::from_utf8_lossy(&o.stdout).trim_end_matches(['\n', '\r']).to_string())
        }
        Ok(o) => {
            log::debug!("{program} exited with {}", o.status);
            None
        }
        Err(e) => {
            log::debug!("{program} spawn failed: {e}");
            None
        }
    }
}

// ------------------------- Field parsing -------------------------

pub(crate) fn text(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() || t == "missing value" {
        None
    } else {
        Some(t.to_string())
    }
}

/// Parse a real number printed by a helper. AppleScript uses the user's locale,
/// so a decimal comma is accepted.
pub(crate) fn real(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    t.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Non-negative integer; zero means "not set" for the counters the players report.
pub(crate) fn count(s: &str) -> Option<u32> {
    let v = real(s)?;
    if v <= 0.0 || v > f64::from(u32::MAX) {
        return None;
    }
    Some(v.round() as u32)
}

pub(crate) fn rating(s: &str) -> Option<u8> {
    let v = real(s)?;
    if v < 0.0 {
        return None;
    }
    Some(v.round().min(100.0) as u8)
}
