//! music-presence: mirror the local player's "now playing" into Discord Rich Presence.
//! - Polls one player (Apple Music via osascript, or an MPRIS player) on a fixed interval.
//! - Full track metadata is cached for a second; transport state is re-read every tick.
//! - Publishes only when the title or the playing/paused state changes.
//! - Talks to Discord over its local IPC socket; SIGINT/SIGTERM clear presence before exit.

#![deny(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery, clippy::perf)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::future_not_send
)]

pub mod cache;
pub mod change;
pub mod config;
pub mod poller;
pub mod presence;
pub mod shutdown;
pub mod source;
pub mod track;
pub mod util;

pub use cache::TrackCache;
pub use change::{Changes, PublishedState};
pub use poller::{Outcome, Poller};
pub use presence::{Activity, DiscordIpc, Presence, PresenceError};
pub use shutdown::Shutdown;
pub use source::{AnySource, Source};
pub use track::{PlayerState, TrackSnapshot};
