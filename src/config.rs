//! `$XDG_CONFIG_HOME/music-presence/config.toml`
//!
//! Every field has a default except the Discord application id, which may also
//! come from `MUSIC_PRESENCE_APP_ID`. The daemon only ever sees a validated
//! [`Settings`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::util::expand;

pub const MIN_INTERVAL_MS: u64 = 100;
pub const ENV_APP_ID: &str = "MUSIC_PRESENCE_APP_ID";
pub const ENV_INTERVAL_MS: &str = "MUSIC_PRESENCE_INTERVAL_MS";

// ------------------------- File schema -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discord: Discord,
    #[serde(default)]
    pub polling: Polling,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub presentation: Presentation,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Deserialize)]
pub struct Discord {
    #[serde(default)]
    pub application_id: Option<u64>,
    #[serde(default = "default_large_image")]
    pub large_image: String,
    #[serde(default)]
    pub ipc_path: Option<String>,
}
fn default_large_image() -> String {
    "applemusic".into()
}
impl Default for Discord {
    fn default() -> Self {
        Self {
            application_id: None,
            large_image: default_large_image(),
            ipc_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Polling {
    #[serde(default = "d500")]
    pub interval_ms: u64,
}
fn d500() -> u64 {
    500
}
impl Default for Polling {
    fn default() -> Self {
        Self { interval_ms: d500() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Music,
    Mpris,
}
impl Default for Backend {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Music
        } else {
            Self::Mpris
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub backend: Backend,
    /// MPRIS player name prefix, e.g. "spotify". Empty matches any player.
    #[serde(default = "default_player")]
    pub player: String,
    /// AppleScript application name.
    #[serde(default = "default_app_name")]
    pub app_name: String,
}
fn default_player() -> String {
    "spotify".into()
}
fn default_app_name() -> String {
    "Music".into()
}
impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            player: default_player(),
            app_name: default_app_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Presentation {
    #[serde(default = "d128usize")]
    pub truncate_title: usize,
    #[serde(default = "d128usize")]
    pub truncate_artist: usize,
}
fn d128usize() -> usize {
    128
}
impl Default for Presentation {
    fn default() -> Self {
        Self {
            truncate_title: d128usize(),
            truncate_artist: d128usize(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Logging {
    #[serde(default = "default_level")]
    pub level: String,
}
fn default_level() -> String {
    "info".into()
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

// ------------------------- Validated settings -------------------------

#[derive(Debug, Clone)]
pub struct PresenceSettings {
    pub application_id: u64,
    pub large_image: String,
    pub ipc_path: Option<PathBuf>,
    pub presentation: Presentation,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub interval: Duration,
    pub source: SourceConfig,
    pub presence: PresenceSettings,
    pub log_level: String,
}

impl Config {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing toml")
    }

    /// Apply `MUSIC_PRESENCE_*` overrides from `lookup` (normally `std::env::var`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup(ENV_APP_ID) {
            let id = v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{ENV_APP_ID}={v:?} is not an application id"))?;
            self.discord.application_id = Some(id);
        }
        if let Some(v) = lookup(ENV_INTERVAL_MS) {
            self.polling.interval_ms = v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{ENV_INTERVAL_MS}={v:?} is not a number"))?;
        }
        Ok(())
    }

    pub fn into_settings(self) -> Result<Settings> {
        let application_id = match self.discord.application_id {
            Some(0) => bail!("discord.application_id must not be 0"),
            Some(id) => id,
            None => bail!("discord.application_id is required (or set {ENV_APP_ID})"),
        };
        if self.polling.interval_ms < MIN_INTERVAL_MS {
            bail!(
                "polling.interval_ms = {} is below the minimum of {MIN_INTERVAL_MS}",
                self.polling.interval_ms
            );
        }
        if self.presentation.truncate_title < 2 || self.presentation.truncate_artist < 2 {
            bail!("presentation.truncate_* must be at least 2");
        }
        Ok(Settings {
            interval: Duration::from_millis(self.polling.interval_ms),
            source: self.source,
            presence: PresenceSettings {
                application_id,
                large_image: self.discord.large_image,
                ipc_path: self.discord.ipc_path.as_deref().map(expand),
                presentation: self.presentation,
            },
            log_level: self.logging.level,
        })
    }
}

#[must_use]
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-presence").join("config.toml"))
}

/// Read the config file (explicit path, or the default location if present)
/// and apply environment overrides. Not validated.
pub fn load_raw(explicit: Option<&Path>) -> Result<Config> {
    let mut cfg = match explicit {
        Some(path) => read_file(path)?,
        None => match default_path() {
            Some(path) if path.is_file() => read_file(&path)?,
            _ => Config::default(),
        },
    };
    cfg.apply_env(|k| std::env::var(k).ok())?;
    Ok(cfg)
}

pub fn load(explicit: Option<&Path>) -> Result<Settings> {
    load_raw(explicit)?.into_settings()
}

fn read_file(path: &Path) -> Result<Config> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    Config::parse(&text).with_context(|| format!("in {}", path.display()))
}
