//! Presence publishing: the interface the poll loop drives, and the Discord
//! local RPC client that implements it.

pub mod activity;
pub mod ipc;

pub use activity::{Activity, Timestamps};
pub use ipc::DiscordIpc;

#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("no discord ipc socket found (is Discord running?)")]
    NoSocket,
    #[error("discord ipc io: {0}")]
    Io(#[from] std::io::Error),
    #[error("discord ipc payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("discord closed the connection: {0}")]
    Closed(String),
    #[error("discord handshake timed out")]
    Timeout,
    #[error("discord protocol: {0}")]
    Protocol(String),
    #[error("not connected to discord")]
    Disconnected,
}

/// A live presence session. `connect` is backend specific; see [`DiscordIpc::connect`].
#[allow(async_fn_in_trait)]
pub trait Presence {
    /// Show a "listening" activity.
    async fn publish(&mut self, activity: &Activity) -> Result<(), PresenceError>;
    /// Remove whatever is shown. Fine to call when nothing is.
    async fn clear(&mut self) -> Result<(), PresenceError>;
    /// Service the connection once. No-op while disconnected.
    async fn pump_events(&mut self) -> Result<(), PresenceError>;
    /// End the session. Called once, at shutdown.
    async fn disconnect(&mut self) -> Result<(), PresenceError>;
}
