//! Discord local RPC over its unix socket.
//!
//! Frames are an 8-byte little-endian header (opcode, payload length) followed
//! by a JSON payload. Replies to `SET_ACTIVITY` are not awaited inline; they
//! queue on the socket and `pump_events` drains them without blocking.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::{json, Value};
use std::{io::ErrorKind, path::PathBuf, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
};

use crate::config::{PresenceSettings, Presentation};
use crate::util::{now_epoch, runtime_dir};

use super::{Activity, Presence, PresenceError};

const RPC_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;
const MAX_FRAME: usize = 64 * 1024;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const SOCKET_SLOTS: u32 = 10;
/// Sub-directories used by sandboxed Discord builds (Flatpak, Snap).
const SANDBOX_DIRS: [&str; 3] = ["", "app/com.discordapp.Discord", "snap.discord"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl Opcode {
    const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Handshake),
            1 => Some(Self::Frame),
            2 => Some(Self::Close),
            3 => Some(Self::Ping),
            4 => Some(Self::Pong),
            _ => None,
        }
    }
}

pub(crate) fn encode(op: Opcode, payload: &Value) -> Result<Bytes, PresenceError> {
    let body = serde_json::to_vec(payload)?;
    let len = u32::try_from(body.len())
        .map_err(|_| PresenceError::Protocol("payload too large".into()))?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    buf.put_u32_le(op as u32);
    buf.put_u32_le(len);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Take one complete frame off the front of `buf`, if there is one.
pub(crate) fn decode(buf: &mut BytesMut) -> Result<Option<(Opcode, Value)>, PresenceError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let mut header = &buf[..HEADER_LEN];
    let raw_op = header.get_u32_le();
    let len = header.get_u32_le() as usize;
    if len > MAX_FRAME {
        return Err(PresenceError::Protocol(format!("frame of {len} bytes")));
    }
    if buf.len() < HEADER_LEN + len {
        return Ok(None);
    }
    let op = Opcode::from_u32(raw_op)
        .ok_or_else(|| PresenceError::Protocol(format!("unknown opcode {raw_op}")))?;
    buf.advance(HEADER_LEN);
    let body = buf.split_to(len);
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok(Some((op, value)))
}

/// `discord-ipc-N` paths to try, in order.
#[must_use]
pub fn socket_candidates() -> Vec<PathBuf> {
    let mut bases: Vec<PathBuf> = Vec::new();
    for var in ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"] {
        if let Ok(v) = std::env::var(var) {
            if !v.is_empty() {
                bases.push(PathBuf::from(v));
            }
        }
    }
    bases.push(PathBuf::from(runtime_dir()));
    bases.push(PathBuf::from("/tmp"));
    let mut seen = Vec::new();
    bases.retain(|b| {
        if seen.contains(b) {
            false
        } else {
            seen.push(b.clone());
            true
        }
    });

    let mut out = Vec::new();
    for base in &bases {
        for sub in SANDBOX_DIRS {
            for i in 0..SOCKET_SLOTS {
                out.push(base.join(sub).join(format!("discord-ipc-{i}")));
            }
        }
    }
    out
}

fn close_reason(v: &Value) -> String {
    v.get("message")
        .and_then(Value::as_str)
        .unwrap_or("no reason given")
        .to_string()
}

pub struct DiscordIpc {
    stream: Option<UnixStream>,
    buf: BytesMut,
    pid: u32,
    nonce: u64,
    large_image: String,
    presentation: Presentation,
}

impl DiscordIpc {
    /// Single attempt: find a socket, handshake, wait for `READY`.
    pub async fn connect(settings: &PresenceSettings) -> Result<Self, PresenceError> {
        let candidates = match &settings.ipc_path {
            Some(p) => vec![p.clone()],
            None => socket_candidates(),
        };
        let mut last_err = None;
        for path in candidates {
            match UnixStream::connect(&path).await {
                Ok(stream) => {
                    log::debug!("discord: connected to {}", path.display());
                    return Self::from_stream(stream, settings).await;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    log::debug!("discord: {} unusable: {e}", path.display());
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.map_or(PresenceError::NoSocket, PresenceError::Io))
    }

    pub(crate) async fn from_stream(
        stream: UnixStream,
        settings: &PresenceSettings,
    ) -> Result<Self, PresenceError> {
        let mut ipc = Self {
            stream: Some(stream),
            buf: BytesMut::with_capacity(4096),
            pid: std::process::id(),
            nonce: 0,
            large_image: settings.large_image.clone(),
            presentation: settings.presentation,
        };
        let hello = json!({ "v": RPC_VERSION, "client_id": settings.application_id.to_string() });
        ipc.send(Opcode::Handshake, &hello).await?;
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, ipc.wait_ready()).await {
            Ok(r) => r?,
            Err(_) => return Err(PresenceError::Timeout),
        }
        Ok(ipc)
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn wait_ready(&mut self) -> Result<(), PresenceError> {
        loop {
            let (op, v) = self.read_frame().await?;
            match op {
                Opcode::Frame if v["evt"] == "READY" => {
                    if let Some(user) = v["data"]["user"]["username"].as_str() {
                        log::info!("discord: ready as {user}");
                    }
                    return Ok(());
                }
                Opcode::Close => return Err(PresenceError::Closed(close_reason(&v))),
                Opcode::Ping => self.send(Opcode::Pong, &v).await?,
                _ => log::debug!("discord: ignoring {op:?} before READY"),
            }
        }
    }

    async fn read_frame(&mut self) -> Result<(Opcode, Value), PresenceError> {
        loop {
            if let Some(frame) = decode(&mut self.buf)? {
                return Ok(frame);
            }
            let stream = self.stream.as_mut().ok_or(PresenceError::Disconnected)?;
            if stream.read_buf(&mut self.buf).await? == 0 {
                return Err(PresenceError::Closed("eof".into()));
            }
        }
    }

    async fn send(&mut self, op: Opcode, payload: &Value) -> Result<(), PresenceError> {
        let frame = encode(op, payload)?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(PresenceError::Disconnected);
        };
        if let Err(e) = stream.write_all(&frame).await {
            self.drop_connection();
            return Err(e.into());
        }
        Ok(())
    }

    async fn set_activity(&mut self, activity: Value) -> Result<(), PresenceError> {
        self.nonce += 1;
        let payload = json!({
            "cmd": "SET_ACTIVITY",
            "args": { "pid": self.pid, "activity": activity },
            "nonce": format!("{}-{}", self.pid, self.nonce),
        });
        self.send(Opcode::Frame, &payload).await
    }

    fn drop_connection(&mut self) {
        if self.stream.take().is_some() {
            log::warn!("discord: connection lost");
        }
        self.buf.clear();
    }

    /// Read whatever is already buffered on the socket without waiting.
    fn drain_socket(&mut self) -> Result<(), PresenceError> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(());
        };
        loop {
            match stream.try_read_buf(&mut self.buf) {
                Ok(0) => return Err(PresenceError::Closed("eof".into())),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Presence for DiscordIpc {
    async fn publish(&mut self, activity: &Activity) -> Result<(), PresenceError> {
        if !self.is_connected() {
            return Err(PresenceError::Disconnected);
        }
        let payload = activity.to_payload(now_epoch(), &self.large_image, &self.presentation);
        self.set_activity(payload).await
    }

    async fn clear(&mut self) -> Result<(), PresenceError> {
        if !self.is_connected() {
            return Ok(());
        }
        self.set_activity(Value::Null).await
    }

    async fn pump_events(&mut self) -> Result<(), PresenceError> {
        if !self.is_connected() {
            return Ok(());
        }
        if let Err(e) = self.drain_socket() {
            self.drop_connection();
            return Err(e);
        }
        loop {
            let (op, v) = match decode(&mut self.buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => {
                    self.drop_connection();
                    return Err(e);
                }
            };
            match op {
                Opcode::Ping => self.send(Opcode::Pong, &v).await?,
                Opcode::Close => {
                    self.drop_connection();
                    return Err(PresenceError::Closed(close_reason(&v)));
                }
                Opcode::Frame if v["evt"] == "ERROR" => {
                    log::warn!(
                        "discord: {} rejected: {}",
                        v["cmd"].as_str().unwrap_or("command"),
                        v["data"]["message"].as_str().unwrap_or("unknown error")
                    );
                }
                Opcode::Frame => log::trace!("discord: {} ok", v["cmd"].as_str().unwrap_or("?")),
                Opcode::Handshake | Opcode::Pong => {}
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), PresenceError> {
        if let Some(mut stream) = self.stream.take() {
            let bye = encode(Opcode::Close, &json!({}))?;
            if let Err(e) = stream.write_all(&bye).await {
                log::debug!("discord: close frame not sent: {e}");
            }
            if let Err(e) = stream.shutdown().await {
                log::debug!("discord: socket shutdown: {e}");
            }
            log::info!("discord: disconnected");
        }
        self.buf.clear();
        Ok(())
    }
}
