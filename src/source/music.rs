//! Apple Music (macOS) through `osascript`.
//!
//! Each script starts by checking `application "<name>" is running`; querying a
//! closed app through a `tell` block would launch it.

use crate::track::{PlayerState, TrackSnapshot};
use crate::util::now_epoch;

use super::{count, rating, real, run_capture, text, Source, FIELD_SEP};

const OSASCRIPT: &str = "osascript";

/// Track properties read in order, each inside its own `try` so one missing
/// property leaves only that slot empty.
const TRACK_PROPS: [&str; 16] = [
    "name",
    "artist",
    "album",
    "album artist",
    "composer",
    "genre",
    "persistent ID",
    "database ID",
    "year",
    "track number",
    "track count",
    "disc number",
    "disc count",
    "duration",
    "played count",
    "rating",
];

/// Leading marker + props + played-date offset.
const TRACK_SLOTS: usize = 1 + TRACK_PROPS.len() + 1;
const TRACK_MARKER: &str = "ok";

#[derive(Debug, Clone)]
pub struct MusicSource {
    running_script: String,
    state_script: String,
    position_script: String,
    track_script: String,
}

impl MusicSource {
    #[must_use]
    pub fn new(app_name: &str) -> Self {
        let app = escape(app_name);
        Self {
            running_script: format!("return application \"{app}\" is running"),
            state_script: format!(
                "if application \"{app}\" is running then\n\
                 \ttell application \"{app}\" to return (player state as string)\n\
                 end if\n\
                 return \"stopped\""
            ),
            position_script: format!(
                "if application \"{app}\" is running then\n\
                 \ttry\n\
                 \t\ttell application \"{app}\" to return (player position as string)\n\
                 \tend try\n\
                 end if\n\
                 return \"0\""
            ),
            track_script: track_script(&app),
        }
    }

    async fn osascript(&self, script: &str) -> Option<String> {
        run_capture(OSASCRIPT, &["-e", script]).await
    }
}

impl Source for MusicSource {
    async fn is_running(&self) -> bool {
        self.osascript(&self.running_script)
            .await
            .is_some_and(|s| s.trim() == "true")
    }

    async fn fetch_snapshot(&self) -> TrackSnapshot {
        if !self.is_running().await {
            return TrackSnapshot::invalid();
        }
        let Some(out) = self.osascript(&self.track_script).await else {
            return TrackSnapshot::invalid();
        };
        parse_track(&out, now_epoch())
    }

    async fn player_state(&self) -> PlayerState {
        self.osascript(&self.state_script)
            .await
            .map_or(PlayerState::Stopped, |s| PlayerState::from_music(&s))
    }

    async fn position(&self) -> f64 {
        self.osascript(&self.position_script)
            .await
            .and_then(|s| real(&s))
            .map_or(0.0, |p| p.max(0.0))
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn track_script(app: &str) -> String {
    let mut s = format!(
        "if application \"{app}\" is not running then return \"\"\n\
         tell application \"{app}\"\n\
         \ttry\n\
         \t\tset t to current track\n\
         \ton error\n\
         \t\treturn \"\"\n\
         \tend try\n\
         \tset sep to (character id 31)\n\
         \tset out to \"{TRACK_MARKER}\"\n"
    );
    for prop in TRACK_PROPS {
        s.push_str(&format!(
            "\ttry\n\
             \t\tset v to (({prop} of t) as string)\n\
             \ton error\n\
             \t\tset v to \"\"\n\
             \tend try\n\
             \tset out to out & sep & v\n"
        ));
    }
    // Date arithmetic yields seconds, which avoids parsing a localized date string.
    s.push_str(
        "\ttry\n\
         \t\tset v to (((played date of t) - (current date)) as string)\n\
         \ton error\n\
         \t\tset v to \"\"\n\
         \tend try\n\
         \tset out to out & sep & v\n\
         \treturn out\n\
         end tell",
    );
    s
}

/// Parse the track script output. `now` anchors the played-date offset.
fn parse_track(out: &str, now: f64) -> TrackSnapshot {
    let parts: Vec<&str> = out.split(FIELD_SEP).collect();
    if parts.len() != TRACK_SLOTS || parts[0].trim() != TRACK_MARKER {
        if !out.trim().is_empty() {
            log::debug!("music: unexpected track output ({} fields)", parts.len());
        }
        return TrackSnapshot::invalid();
    }
    let f = &parts[1..];
    let played_date = real(f[16]).map(|offset| (now + offset).round() as i64);

    TrackSnapshot {
        valid: true,
        title: text(f[0]),
        artist: text(f[1]),
        album: text(f[2]),
        album_artist: text(f[3]),
        composer: text(f[4]),
        genre: text(f[5]),
        persistent_id: text(f[6]),
        database_id: real(f[7]).map(|v| v.round() as i64),
        year: count(f[8]),
        track_number: count(f[9]),
        track_count: count(f[10]),
        disc_number: count(f[11]),
        disc_count: count(f[12]),
        duration: real(f[13]),
        played_count: count(f[14]),
        rating: rating(f[15]),
        played_date,
        state: PlayerState::Stopped,
    }
    .normalized()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(fields: &[&str]) -> String {
        let sep = FIELD_SEP.to_string();
        std::iter::once(TRACK_MARKER)
            .chain(fields.iter().copied())
            .collect::<Vec<_>>()
            .join(&sep)
    }

    #[test]
    fn parses_full_track() {
        let out = line(&[
            "Teardrop",
            "Massive Attack",
            "Mezzanine",
            "Massive Attack",
            "",
            "Trip-Hop",
            "A1B2C3D4E5F60718",
            "4242",
            "1998",
            "3",
            "11",
            "1",
            "1",
            "330,5",
            "17",
            "80",
            "-3600",
        ]);
        let s = parse_track(&out, 1_700_000_000.0);
        assert!(s.is_valid());
        assert_eq!(s.title.as_deref(), Some("Teardrop"));
        assert_eq!(s.album.as_deref(), Some("Mezzanine"));
        assert_eq!(s.composer, None);
        assert_eq!(s.persistent_id.as_deref(), Some("A1B2C3D4E5F60718"));
        assert_eq!(s.database_id, Some(4242));
        assert_eq!(s.year, Some(1998));
        assert_eq!(s.track_number, Some(3));
        assert_eq!(s.duration, Some(330.5));
        assert_eq!(s.rating, Some(80));
        assert_eq!(s.played_date, Some(1_699_996_400));
        assert_eq!(s.state, PlayerState::Stopped);
    }

    #[test]
    fn missing_fields_stay_empty() {
        let mut fields = vec![""; TRACK_PROPS.len() + 1];
        fields[0] = "Untitled stream";
        let s = parse_track(&line(&fields), 0.0);
        assert!(s.is_valid());
        assert_eq!(s.title.as_deref(), Some("Untitled stream"));
        assert_eq!(s.artist, None);
        assert_eq!(s.duration, None);
        assert_eq!(s.played_date, None);
    }

    #[test]
    fn no_track_is_invalid() {
        assert!(!parse_track("", 0.0).is_valid());
        assert!(!parse_track("garbage", 0.0).is_valid());
    }

    #[test]
    fn scripts_guard_on_running() {
        let src = MusicSource::new("Music");
        assert!(src.track_script.starts_with("if application \"Music\" is not running"));
        assert!(src.state_script.starts_with("if application \"Music\" is running"));
        assert!(src.position_script.contains("player position"));
        assert_eq!(src.track_script.matches("on error").count(), TRACK_PROPS.len() + 2);
    }

    #[test]
    fn app_name_is_escaped() {
        let src = MusicSource::new("My \"Player\"");
        assert!(src.running_script.contains("application \"My \\\"Player\\\"\""));
    }
}
