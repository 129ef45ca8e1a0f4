use std::{env, path::PathBuf};

use serde_json::json;

use music_presence::{
    config,
    util::{fmt_time, truncate},
    AnySource, PlayerState, Source, TrackSnapshot,
};

fn usage() {
    eprintln!(
        "{}",
        r#"Usage:
  music-presencec status [--config <path>]
  music-presencec label [--format <fmt>] [--truncate <n>] [--config <path>]

Queries the configured player once; Discord is not contacted.

label defaults:
  --format "{artist}{sep}{title}"
  placeholders: {artist} {title} {album} {state} {sep}
  where sep = " - " if both artist & title are non-empty, else ""
"#
    );
}

#[derive(Debug, PartialEq, Eq)]
enum Cmd {
    Status,
    Label {
        format: Option<String>,
        truncate: Option<usize>,
    },
}

/// `None` means "print usage and exit 2".
fn parse_args(mut args: Vec<String>) -> Option<(Cmd, Option<PathBuf>)> {
    let mut config_arg: Option<PathBuf> = None;
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--config" {
            if i + 1 >= args.len() {
                return None;
            }
            config_arg = Some(PathBuf::from(args.remove(i + 1)));
            args.remove(i);
        } else {
            i += 1;
        }
    }
    if args.is_empty() {
        return None;
    }

    let cmd = args.remove(0);
    let cmd = match cmd.as_str() {
        "status" if args.is_empty() => Cmd::Status,
        "label" => {
            let mut format = None;
            let mut truncate = None;
            let mut rest = args.into_iter();
            while let Some(flag) = rest.next() {
                match (flag.as_str(), rest.next()) {
                    ("--format", Some(v)) => format = Some(v),
                    ("--truncate", Some(v)) => truncate = Some(v.parse::<usize>().ok()?),
                    _ => return None,
                }
            }
            Cmd::Label { format, truncate }
        }
        _ => return None,
    };
    Some((cmd, config_arg))
}

#[tokio::main]
async fn main() {
    let Some((cmd, config_arg)) = parse_args(env::args().skip(1).collect()) else {
        usage();
        std::process::exit(2);
    };

    let cfg = match config::load_raw(config_arg.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("music-presencec: {e:#}");
            std::process::exit(1);
        }
    };
    let source = match AnySource::from_config(&cfg.source).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("music-presencec: {e:#}");
            std::process::exit(1);
        }
    };

    match cmd {
        Cmd::Status => run_status(&source).await,
        Cmd::Label { format, truncate } => {
            run_label(&source, format.as_deref(), truncate).await;
        }
    }
}

async fn run_status(source: &AnySource) {
    let running = source.is_running().await;
    let (track, state, position) = if running {
        let mut track = source.fetch_snapshot().await;
        let state = source.player_state().await;
        track.set_state(state);
        (track, state, source.position().await)
    } else {
        (TrackSnapshot::invalid(), PlayerState::default(), 0.0)
    };
    let out = json!({
        "source": source.name(),
        "running": running,
        "state": state,
        "position": position,
        "positionStr": fmt_time(position),
        "isPlaying": track.is_playing(),
        "isPaused": track.is_paused(),
        "track": track,
    });
    match serde_json::to_string_pretty(&out) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("music-presencec: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_label(source: &AnySource, format: Option<&str>, trunc: Option<usize>) {
    let track = source.fetch_snapshot().await;
    if !track.is_valid() {
        println!();
        return;
    }
    let state = source.player_state().await;
    println!(
        "{}",
        format_label(
            track.artist.as_deref().unwrap_or(""),
            track.title.as_deref().unwrap_or(""),
            track.album.as_deref().unwrap_or(""),
            state.label(),
            format,
            trunc,
        )
    );
}

fn format_label(
    artist: &str,
    title: &str,
    album: &str,
    state: &str,
    fmt: Option<&str>,
    trunc: Option<usize>,
) -> String {
    let sep = if !artist.is_empty() && !title.is_empty() { " - " } else { "" };
    let out = fmt.map_or_else(
        || format!("{artist}{sep}{title}"),
        |f| {
            f.replace("{artist}", artist)
                .replace("{title}", title)
                .replace("{album}", album)
                .replace("{state}", state)
                .replace("{sep}", sep)
        },
    );
    match trunc {
        Some(n) => truncate(&out, n),
        None => out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_label() {
        assert_eq!(format_label("Air", "La femme d'argent", "", "Playing", None, None), "Air - La femme d'argent");
        assert_eq!(format_label("", "Intro", "", "Playing", None, None), "Intro");
    }

    #[test]
    fn custom_label_and_truncate() {
        let s = format_label("Air", "Talisman", "Moon Safari", "Paused", Some("[{state}] {title} / {album}"), None);
        assert_eq!(s, "[Paused] Talisman / Moon Safari");
        assert_eq!(format_label("Air", "Talisman", "", "", None, Some(5)), "Air …");
    }

    fn argv(s: &[&str]) -> Vec<String> {
        s.iter().map(|a| (*a).to_string()).collect()
    }

    #[test]
    fn config_without_command_is_usage() {
        assert_eq!(parse_args(argv(&["--config", "/tmp/cfg.toml"])), None);
        assert_eq!(parse_args(argv(&["status", "--config"])), None);
        assert_eq!(parse_args(argv(&[])), None);
    }

    #[test]
    fn unknown_command_is_usage() {
        assert_eq!(parse_args(argv(&["play"])), None);
        assert_eq!(parse_args(argv(&["status", "extra"])), None);
        assert_eq!(parse_args(argv(&["label", "--bogus", "x"])), None);
        assert_eq!(parse_args(argv(&["label", "--format"])), None);
    }

    #[test]
    fn bad_truncate_is_usage() {
        assert_eq!(parse_args(argv(&["label", "--truncate", "abc"])), None);
        assert_eq!(parse_args(argv(&["label", "--truncate", "-3"])), None);
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_args(argv(&["--config", "/tmp/cfg.toml", "status"])),
            Some((Cmd::Status, Some(PathBuf::from("/tmp/cfg.toml"))))
        );
        assert_eq!(
            parse_args(argv(&["label", "--truncate", "40", "--config", "c.toml", "--format", "{title}"])),
            Some((
                Cmd::Label {
                    format: Some("{title}".into()),
                    truncate: Some(40),
                },
                Some(PathBuf::from("c.toml"))
            ))
        );
    }
}
