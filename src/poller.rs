//! The poll loop: source → cache → change detection → presence.
//!
//! One iteration at a time, on the caller's task. Shutdown is cooperative: the
//! flag is checked between iterations, never inside one.

use tokio::time::Duration;

use crate::cache::TrackCache;
use crate::change::PublishedState;
use crate::presence::{Activity, Presence};
use crate::shutdown::Shutdown;
use crate::source::Source;
use crate::track::TrackSnapshot;

/// Back-off while the player is closed.
pub const NOT_RUNNING_DELAY: Duration = Duration::from_secs(2);
/// Back-off while the player is open with nothing loaded.
pub const NO_TRACK_DELAY: Duration = Duration::from_secs(1);

/// What one iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NotRunning,
    NoTrack,
    Unchanged,
    Published,
    Cleared,
}

impl Outcome {
    #[must_use]
    pub const fn delay(self, interval: Duration) -> Duration {
        match self {
            Self::NotRunning => NOT_RUNNING_DELAY,
            Self::NoTrack => NO_TRACK_DELAY,
            Self::Unchanged | Self::Published | Self::Cleared => interval,
        }
    }
}

pub struct Poller<S, P> {
    source: S,
    presence: P,
    cache: TrackCache,
    published: PublishedState,
    interval: Duration,
    shutdown: Shutdown,
}

impl<S: Source, P: Presence> Poller<S, P> {
    #[must_use]
    pub fn new(source: S, presence: P, interval: Duration, shutdown: Shutdown) -> Self {
        Self {
            source,
            presence,
            cache: TrackCache::default(),
            published: PublishedState::default(),
            interval,
            shutdown,
        }
    }

    /// Poll until shutdown is requested, then clean up.
    pub async fn run(mut self) {
        log::info!("polling every {}ms", self.interval.as_millis());
        while !self.shutdown.is_requested() {
            let outcome = self.tick().await;
            tokio::time::sleep(outcome.delay(self.interval)).await;
        }
        self.finish().await;
    }

    /// One iteration. The presence connection is serviced whatever happened.
    pub async fn tick(&mut self) -> Outcome {
        let outcome = self.observe().await;
        if let Err(e) = self.presence.pump_events().await {
            log::warn!("presence: {e}");
        }
        outcome
    }

    async fn observe(&mut self) -> Outcome {
        if !self.source.is_running().await {
            self.cache.invalidate();
            self.withdraw("player not running").await;
            return Outcome::NotRunning;
        }

        let snapshot = self.cache.get(&self.source).await;
        if !snapshot.is_valid() {
            self.withdraw("no track loaded").await;
            return Outcome::NoTrack;
        }

        let state = snapshot.state;
        let changes = self.published.detect(snapshot.title.as_deref(), state);
        if !changes.any() {
            return Outcome::Unchanged;
        }

        // Track change wins the log line even when the new track is paused;
        // clear vs publish below depends on the state alone.
        if changes.track_changed {
            log::info!("now playing: {} [{state}]", describe(&snapshot));
            log::debug!(
                "track ids: persistent={:?} database={:?}",
                snapshot.persistent_id,
                snapshot.database_id
            );
        } else {
            log::info!("state: {state}");
        }
        self.published.record(snapshot.title.as_deref(), state);

        if state.is_idle() {
            if let Err(e) = self.presence.clear().await {
                log::warn!("presence clear failed: {e}");
            }
            Outcome::Cleared
        } else {
            let position = self.source.position().await;
            let activity = Activity::from_snapshot(&snapshot, state, position);
            if let Err(e) = self.presence.publish(&activity).await {
                log::warn!("presence publish failed: {e}");
            }
            Outcome::Published
        }
    }

    /// Clear presence if anything was published, and forget it.
    async fn withdraw(&mut self, why: &str) {
        if !self.published.is_set() {
            return;
        }
        log::info!("{why}; clearing presence");
        if let Err(e) = self.presence.clear().await {
            log::warn!("presence clear failed: {e}");
        }
        self.published.reset();
    }

    async fn cleanup(&mut self) {
        if let Err(e) = self.presence.clear().await {
            log::warn!("presence clear failed: {e}");
        }
        self.cache.invalidate();
        self.published.reset();
        if let Err(e) = self.presence.disconnect().await {
            log::warn!("presence disconnect failed: {e}");
        }
    }

    /// Terminal pass: clear, drop the cache and published state, disconnect.
    /// Consumes the poller, so it runs once.
    pub async fn finish(mut self) {
        log::info!("shutting down");
        self.cleanup().await;
    }
}

fn describe(s: &TrackSnapshot) -> String {
    let title = s.title.as_deref().unwrap_or("(untitled)");
    let mut out = match s.artist.as_deref() {
        Some(a) => format!("{a} - {title}"),
        None => title.to_string(),
    };
    if let Some(album) = s.album.as_deref() {
        out.push_str(&format!(" ({album})"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::FakeSource;
    use crate::presence::PresenceError;
    use crate::track::PlayerState;
    use crate::util::now_epoch;
    use std::{cell::RefCell, rc::Rc};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Publish(Activity),
        Clear,
        Pump,
        Disconnect,
    }

    #[derive(Default)]
    struct FakePresence {
        calls: Rc<RefCell<Vec<Call>>>,
        fail: bool,
        stop_after_pumps: Option<(usize, Shutdown)>,
    }

    impl Presence for FakePresence {
        async fn publish(&mut self, activity: &Activity) -> Result<(), PresenceError> {
            self.calls.borrow_mut().push(Call::Publish(activity.clone()));
            if self.fail {
                return Err(PresenceError::Disconnected);
            }
            Ok(())
        }

        async fn clear(&mut self) -> Result<(), PresenceError> {
            self.calls.borrow_mut().push(Call::Clear);
            if self.fail {
                return Err(PresenceError::Disconnected);
            }
            Ok(())
        }

        async fn pump_events(&mut self) -> Result<(), PresenceError> {
            let mut calls = self.calls.borrow_mut();
            calls.push(Call::Pump);
            if let Some((n, shutdown)) = &self.stop_after_pumps {
                if calls.iter().filter(|c| **c == Call::Pump).count() >= *n {
                    shutdown.request();
                }
            }
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), PresenceError> {
            self.calls.borrow_mut().push(Call::Disconnect);
            Ok(())
        }
    }

    type Log = Rc<RefCell<Vec<Call>>>;

    fn poller(src: FakeSource) -> (Poller<FakeSource, FakePresence>, Log) {
        let presence = FakePresence::default();
        let log = presence.calls.clone();
        let p = Poller::new(src, presence, Duration::from_millis(500), Shutdown::new());
        (p, log)
    }

    /// Calls other than the per-iteration pump.
    fn effects(log: &Log) -> Vec<Call> {
        log.borrow().iter().filter(|c| **c != Call::Pump).cloned().collect()
    }

    fn publishes(log: &Log) -> usize {
        log.borrow().iter().filter(|c| matches!(c, Call::Publish(_))).count()
    }

    fn clears(log: &Log) -> usize {
        log.borrow().iter().filter(|c| **c == Call::Clear).count()
    }

    #[tokio::test(start_paused = true)]
    async fn first_playing_tick_publishes_countdown() {
        let src = FakeSource::playing("Mysterons");
        src.position.set(60.0);
        let (mut p, log) = poller(src);

        assert_eq!(p.tick().await, Outcome::Published);
        let calls = effects(&log);
        assert_eq!(calls.len(), 1);
        let Call::Publish(activity) = &calls[0] else {
            panic!("expected publish, got {calls:?}");
        };
        assert_eq!(activity.title.as_deref(), Some("Mysterons"));
        assert_eq!(activity.position, 60.0);
        assert_eq!(activity.duration, 240.0);

        let now = now_epoch();
        let ts = activity.timestamps(now).unwrap();
        let now_ms = (now * 1000.0).round() as i64;
        assert!(ts.start <= now_ms && now_ms <= ts.end);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_tick_only_pumps() {
        let (mut p, log) = poller(FakeSource::playing("Mysterons"));
        p.tick().await;
        log.borrow_mut().clear();

        assert_eq!(p.tick().await, Outcome::Unchanged);
        assert_eq!(*log.borrow(), vec![Call::Pump]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_clears_once_without_publishing() {
        let (mut p, log) = poller(FakeSource::playing("Mysterons"));
        p.tick().await;
        log.borrow_mut().clear();

        p.source.state.set(PlayerState::Paused);
        assert_eq!(p.tick().await, Outcome::Cleared);
        assert_eq!(p.tick().await, Outcome::Unchanged);
        assert_eq!(clears(&log), 1);
        assert_eq!(publishes(&log), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_publishes_again() {
        let (mut p, log) = poller(FakeSource::playing("Mysterons"));
        p.tick().await;
        p.source.state.set(PlayerState::Paused);
        p.tick().await;
        p.source.state.set(PlayerState::Playing);
        assert_eq!(p.tick().await, Outcome::Published);
        assert_eq!(publishes(&log), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn track_change_publishes_once() {
        let (mut p, log) = poller(FakeSource::playing("Mysterons"));
        p.tick().await;
        log.borrow_mut().clear();

        p.source.set_track("Sour Times");
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(p.tick().await, Outcome::Published);
        p.tick().await;

        let calls = effects(&log);
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::Publish(a) if a.title.as_deref() == Some("Sour Times")));
    }

    #[tokio::test(start_paused = true)]
    async fn new_track_while_paused_clears() {
        let (mut p, log) = poller(FakeSource::playing("Mysterons"));
        p.tick().await;
        log.borrow_mut().clear();

        p.source.set_track("Wandering Star");
        p.source.state.set(PlayerState::Paused);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(p.tick().await, Outcome::Cleared);
        assert_eq!(effects(&log), vec![Call::Clear]);
        assert_eq!(p.published.title(), Some("Wandering Star"));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_forward_still_publishes() {
        let src = FakeSource::playing("Numb");
        src.state.set(PlayerState::FastForwarding);
        let (mut p, log) = poller(src);
        assert_eq!(p.tick().await, Outcome::Published);
        assert_eq!(publishes(&log), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn player_quit_clears_and_resets() {
        let (mut p, log) = poller(FakeSource::playing("Mysterons"));
        p.tick().await;
        log.borrow_mut().clear();

        p.source.running.set(false);
        let out = p.tick().await;
        assert_eq!(out, Outcome::NotRunning);
        assert_eq!(out.delay(p.interval), NOT_RUNNING_DELAY);
        assert_eq!(effects(&log), vec![Call::Clear]);
        assert!(!p.published.is_set());
        assert!(p.cache.is_empty());

        // Nothing published any more: no second clear.
        p.tick().await;
        assert_eq!(clears(&log), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_player_never_fetches() {
        let src = FakeSource::default();
        let (mut p, log) = poller(src);
        assert_eq!(p.tick().await, Outcome::NotRunning);
        assert_eq!(p.source.fetches.get(), 0);
        assert!(effects(&log).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_player_backs_off() {
        let (mut p, log) = poller(FakeSource::playing("Mysterons"));
        p.tick().await;
        log.borrow_mut().clear();

        *p.source.track.borrow_mut() = TrackSnapshot::invalid();
        tokio::time::advance(Duration::from_secs(1)).await;
        let out = p.tick().await;
        assert_eq!(out, Outcome::NoTrack);
        assert_eq!(out.delay(p.interval), NO_TRACK_DELAY);
        assert_eq!(effects(&log), vec![Call::Clear]);
        assert!(!p.published.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn every_branch_pumps() {
        let (mut p, log) = poller(FakeSource::playing("Mysterons"));
        p.tick().await; // published
        p.tick().await; // unchanged
        p.source.state.set(PlayerState::Paused);
        p.tick().await; // cleared
        p.source.running.set(false);
        p.tick().await; // not running
        let pumps = log.borrow().iter().filter(|c| **c == Call::Pump).count();
        assert_eq!(pumps, 4);
        assert_eq!(log.borrow().last(), Some(&Call::Pump));
    }

    #[tokio::test(start_paused = true)]
    async fn publisher_failures_are_swallowed() {
        let presence = FakePresence {
            fail: true,
            ..FakePresence::default()
        };
        let log = presence.calls.clone();
        let mut p = Poller::new(
            FakeSource::playing("Mysterons"),
            presence,
            Duration::from_millis(500),
            Shutdown::new(),
        );
        assert_eq!(p.tick().await, Outcome::Published);
        // The failed publish still counts as sent; no retry on the next tick.
        assert_eq!(p.tick().await, Outcome::Unchanged);
        assert_eq!(publishes(&log), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_from_fresh_start() {
        let (mut p, log) = poller(FakeSource::playing("Mysterons"));
        p.cleanup().await;
        assert_eq!(effects(&log), vec![Call::Clear, Call::Disconnect]);
        assert!(p.cache.is_empty());
        assert!(!p.published.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_after_publish() {
        let (mut p, log) = poller(FakeSource::playing("Mysterons"));
        p.tick().await;
        assert!(!p.cache.is_empty());
        log.borrow_mut().clear();

        p.cleanup().await;
        assert_eq!(effects(&log), vec![Call::Clear, Call::Disconnect]);
        assert!(p.cache.is_empty());
        assert!(!p.published.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_requested_before_start() {
        let (p, log) = poller(FakeSource::playing("Mysterons"));
        p.shutdown.request();
        p.run().await;
        assert_eq!(*log.borrow(), vec![Call::Clear, Call::Disconnect]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_finishes_the_iteration_then_cleans_up() {
        let shutdown = Shutdown::new();
        let presence = FakePresence {
            stop_after_pumps: Some((3, shutdown.clone())),
            ..FakePresence::default()
        };
        let log = presence.calls.clone();
        let p = Poller::new(
            FakeSource::playing("Mysterons"),
            presence,
            Duration::from_millis(500),
            shutdown,
        );
        p.run().await;

        let calls = log.borrow().clone();
        assert_eq!(calls.iter().filter(|c| **c == Call::Pump).count(), 3);
        assert_eq!(&calls[calls.len() - 2..], &[Call::Clear, Call::Disconnect]);
        assert_eq!(calls.iter().filter(|c| **c == Call::Disconnect).count(), 1);
    }

    #[tokio::test]
    async fn sigterm_ends_run_with_cleanup() {
        use crate::shutdown::tests::raise;
        use nix::sys::signal::Signal;

        let shutdown = Shutdown::new();
        let listener = shutdown.listen().unwrap();
        let presence = FakePresence::default();
        let log = presence.calls.clone();
        let p = Poller::new(
            FakeSource::playing("Mysterons"),
            presence,
            Duration::from_millis(20),
            shutdown,
        );
        let signal_later = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            raise(Signal::SIGTERM);
        };
        let ((), ()) = tokio::join!(p.run(), signal_later);
        listener.abort();

        let calls = log.borrow().clone();
        assert_eq!(&calls[calls.len() - 2..], &[Call::Clear, Call::Disconnect]);
        assert_eq!(calls.iter().filter(|c| **c == Call::Disconnect).count(), 1);
    }

    #[test]
    fn describe_track() {
        let s = TrackSnapshot {
            valid: true,
            title: Some("Protection".into()),
            artist: Some("Massive Attack".into()),
            album: Some("Protection".into()),
            ..TrackSnapshot::default()
        };
        assert_eq!(describe(&s), "Massive Attack - Protection (Protection)");
        assert_eq!(describe(&TrackSnapshot::default()), "(untitled)");
    }
}
