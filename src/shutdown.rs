use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    signal::unix::{signal, SignalKind},
    task::JoinHandle,
};

/// Shared "please stop" flag. The signal task only ever sets it; the poll loop
/// reads it at the top of each iteration and does the cleanup itself.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Route SIGINT and SIGTERM to [`Shutdown::request`]. Both are treated the same.
    pub fn listen(&self) -> std::io::Result<JoinHandle<()>> {
        let mut int = signal(SignalKind::interrupt())?;
        let mut term = signal(SignalKind::terminate())?;
        let this = self.clone();
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    v = int.recv() => if v.is_none() { break },
                    v = term.recv() => if v.is_none() { break },
                }
                this.request();
            }
        }))
    }
}
