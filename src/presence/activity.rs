//! The "Listening to ..." activity and its Discord payload.

use serde_json::{json, Map, Value};

use crate::config::Presentation;
use crate::track::{PlayerState, TrackSnapshot};
use crate::util::truncate;

/// Discord's activity type for "Listening to".
const LISTENING: u8 = 2;
/// Discord rejects text fields outside 2..=128 characters.
const TEXT_MIN: usize = 2;
const TEXT_MAX: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub state: PlayerState,
    /// Seconds into the track.
    pub position: f64,
    /// Seconds, 0 when unknown.
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    /// Epoch milliseconds.
    pub start: i64,
    pub end: i64,
}

impl Activity {
    #[must_use]
    pub fn from_snapshot(snapshot: &TrackSnapshot, state: PlayerState, position: f64) -> Self {
        Self {
            title: snapshot.title.clone(),
            artist: snapshot.artist.clone(),
            album: snapshot.album.clone(),
            state,
            position,
            duration: snapshot.duration.unwrap_or(0.0),
        }
    }

    /// `start = now - position`, `end = now + (duration - position)`, so the
    /// client can count down on its own. Only while actually playing with a
    /// known position and duration.
    #[must_use]
    pub fn timestamps(&self, now: f64) -> Option<Timestamps> {
        if self.state != PlayerState::Playing || self.position <= 0.0 || self.duration <= 0.0 {
            return None;
        }
        let remaining = (self.duration - self.position).max(0.0);
        Some(Timestamps {
            start: ((now - self.position) * 1000.0).round() as i64,
            end: ((now + remaining) * 1000.0).round() as i64,
        })
    }

    /// `activity` argument of a `SET_ACTIVITY` command.
    #[must_use]
    pub fn to_payload(&self, now: f64, large_image: &str, presentation: &Presentation) -> Value {
        let title = self.title.as_deref().unwrap_or("Unknown track");
        let state = match self.artist.as_deref() {
            Some(artist) => format!(
                "by {}",
                truncate(artist, presentation.truncate_artist.min(TEXT_MAX - 3))
            ),
            None => self.state.label().to_string(),
        };

        let mut activity = Map::new();
        activity.insert("type".into(), json!(LISTENING));
        activity.insert(
            "details".into(),
            json!(discord_text(&truncate(title, presentation.truncate_title))),
        );
        activity.insert("state".into(), json!(discord_text(&state)));

        if let Some(ts) = self.timestamps(now) {
            activity.insert("timestamps".into(), json!({ "start": ts.start, "end": ts.end }));
        }

        let mut assets = Map::new();
        if !large_image.is_empty() {
            assets.insert("large_image".into(), json!(large_image));
        }
        if let Some(album) = self.album.as_deref() {
            assets.insert("large_text".into(), json!(discord_text(album)));
        }
        if !assets.is_empty() {
            activity.insert("assets".into(), Value::Object(assets));
        }
        Value::Object(activity)
    }
}

/// Fit a string into Discord's text bounds; short strings are padded with
/// zero-width spaces.
fn discord_text(s: &str) -> String {
    let mut out = truncate(s, TEXT_MAX);
    while out.chars().count() < TEXT_MIN {
        out.push('\u{200b}');
    }
    out
}
