//! MPRIS players on the session bus.
//!
//! The bus is only asked which players exist; metadata, status and position go
//! through `playerctl`, one process per query.

use anyhow::{Context, Result};
use zbus::{fdo::DBusProxy, Connection};

use crate::track::{PlayerState, TrackSnapshot};

use super::{count, rating, real, run_capture, text, Source, FIELD_SEP};

const PLAYERCTL: &str = "playerctl";
const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
const TRACK_MARKER: &str = "ok";

const TRACK_KEYS: [&str; 13] = [
    "xesam:title",
    "xesam:artist",
    "xesam:album",
    "xesam:albumArtist",
    "xesam:composer",
    "xesam:genre",
    "mpris:trackid",
    "xesam:contentCreated",
    "xesam:trackNumber",
    "xesam:discNumber",
    "mpris:length",
    "xesam:useCount",
    "xesam:userRating",
];
const LAST_USED_KEY: &str = "xesam:lastUsed";

pub struct MprisSource {
    conn: Connection,
    player: String,
    format: String,
}

impl MprisSource {
    pub async fn connect(player: &str) -> Result<Self> {
        let conn = Connection::session().await.context("dbus session")?;
        Ok(Self {
            conn,
            player: player.to_string(),
            format: track_format(),
        })
    }

    /// Short player name (`spotify`, `firefox.instance_1_240`) of the first
    /// player on the bus whose name starts with the configured prefix.
    async fn resolve_player(&self) -> Option<String> {
        let dbus = match DBusProxy::new(&self.conn).await {
            Ok(p) => p,
            Err(e) => {
                log::debug!("mpris: dbus proxy failed: {e}");
                return None;
            }
        };
        let names = match dbus.list_names().await {
            Ok(n) => n,
            Err(e) => {
                log::debug!("mpris: list_names failed: {e}");
                return None;
            }
        };
        select_player(names.iter().map(|n| n.to_string()), &self.player)
    }

    async fn playerctl(&self, name: &str, args: &[&str]) -> Option<String> {
        let mut argv = vec!["-p", name];
        argv.extend_from_slice(args);
        run_capture(PLAYERCTL, &argv).await
    }
}

impl Source for MprisSource {
    async fn is_running(&self) -> bool {
        self.resolve_player().await.is_some()
    }

    async fn fetch_snapshot(&self) -> TrackSnapshot {
        let Some(name) = self.resolve_player().await else {
            return TrackSnapshot::invalid();
        };
        match self.playerctl(&name, &["metadata", "--format", &self.format]).await {
            Some(out) => parse_track(&out),
            None => TrackSnapshot::invalid(),
        }
    }

    async fn player_state(&self) -> PlayerState {
        let Some(name) = self.resolve_player().await else {
            return PlayerState::Stopped;
        };
        self.playerctl(&name, &["status"])
            .await
            .map_or(PlayerState::Stopped, |s| PlayerState::from_mpris(&s))
    }

    async fn position(&self) -> f64 {
        let Some(name) = self.resolve_player().await else {
            return 0.0;
        };
        self.playerctl(&name, &["position"])
            .await
            .and_then(|s| real(&s))
            .map_or(0.0, |p| p.max(0.0))
    }
}

fn select_player(names: impl Iterator<Item = String>, wanted: &str) -> Option<String> {
    let mut players: Vec<String> = names
        .filter_map(|n| n.strip_prefix(MPRIS_PREFIX).map(str::to_string))
        .filter(|p| p.starts_with(wanted))
        .collect();
    players.sort();
    players.into_iter().next()
}

fn track_format() -> String {
    let sep = FIELD_SEP.to_string();
    std::iter::once(TRACK_MARKER.to_string())
        .chain(TRACK_KEYS.iter().map(|k| format!("{{{{{k}}}}}")))
        .chain(std::iter::once(format!("{{{{{LAST_USED_KEY}}}}}")))
        .collect::<Vec<_>>()
        .join(&sep)
}

fn parse_track(out: &str) -> TrackSnapshot {
    let parts: Vec<&str> = out.split(FIELD_SEP).collect();
    if parts.len() != TRACK_KEYS.len() + 2 || parts[0].trim() != TRACK_MARKER {
        log::debug!("mpris: unexpected metadata output ({} fields)", parts.len());
        return TrackSnapshot::invalid();
    }
    let f = &parts[1..];
    // A player with no loaded track still answers, just with empty fields.
    if f[0].trim().is_empty() && f[10].trim().is_empty() {
        return TrackSnapshot::invalid();
    }

    TrackSnapshot {
        valid: true,
        title: text(f[0]),
        artist: text(f[1]),
        album: text(f[2]),
        album_artist: text(f[3]),
        composer: text(f[4]),
        genre: text(f[5]),
        persistent_id: text(f[6]),
        database_id: None,
        year: f[7].trim().get(..4).and_then(count),
        track_number: count(f[8]),
        track_count: None,
        disc_number: count(f[9]),
        disc_count: None,
        duration: real(f[10]).map(|us| us / 1_000_000.0),
        played_count: count(f[11]),
        rating: real(f[12]).and_then(|r| rating(&(r * 100.0).to_string())),
        played_date: chrono::DateTime::parse_from_rfc3339(f[13].trim())
            .ok()
            .map(|d| d.timestamp()),
        state: PlayerState::Stopped,
    }
    .normalized()
}
