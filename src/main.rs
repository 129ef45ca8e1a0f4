//! music-presenced: mirror the current track into Discord Rich Presence.
//!
//! Usage: `music-presenced [config.toml]`. Without an argument the config is read
//! from `$XDG_CONFIG_HOME/music-presence/config.toml` when it exists.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use std::path::PathBuf;

use music_presence::{config, AnySource, DiscordIpc, Poller, Shutdown};

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg_path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = config::load(cfg_path.as_deref())?;
    init_logging(&settings.log_level);

    // Installed before anything slow so an early Ctrl-C still gets a clean exit.
    let shutdown = Shutdown::new();
    shutdown.listen().context("installing signal handlers")?;

    let source = AnySource::from_config(&settings.source).await?;
    log::info!("source: {}", source.name());

    let presence = match DiscordIpc::connect(&settings.presence).await {
        Ok(p) => p,
        Err(e) => {
            log::error!("discord connect failed: {e}");
            return Err(e).context("connecting to Discord");
        }
    };

    Poller::new(source, presence, settings.interval, shutdown)
        .run()
        .await;
    Ok(())
}
