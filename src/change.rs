//! What was last sent to the presence service, and whether the current
//! observation differs from it.
//!
//! Title and transport state are separate axes: a Playing→Paused transition
//! must not be reported as a new track, and "no track" is itself a title value.

use crate::track::PlayerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Changes {
    pub track_changed: bool,
    pub state_changed: bool,
}

impl Changes {
    #[must_use]
    pub const fn any(self) -> bool {
        self.track_changed || self.state_changed
    }
}

#[must_use]
pub fn track_changed(last: Option<&str>, current: Option<&str>) -> bool {
    last != current
}

#[must_use]
pub fn state_changed(last: Option<PlayerState>, current: PlayerState) -> bool {
    last != Some(current)
}

/// Last title/state handed to the publisher. Owned by the poll loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedState {
    title: Option<String>,
    state: Option<PlayerState>,
}

impl PublishedState {
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub const fn state(&self) -> Option<PlayerState> {
        self.state
    }

    /// Something has been recorded since the last reset.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.title.is_some() || self.state.is_some()
    }

    #[must_use]
    pub fn detect(&self, title: Option<&str>, state: PlayerState) -> Changes {
        Changes {
            track_changed: track_changed(self.title(), title),
            state_changed: state_changed(self.state, state),
        }
    }

    pub fn record(&mut self, title: Option<&str>, state: PlayerState) {
        self.title = title.map(str::to_string);
        self.state = Some(state);
    }

    pub fn reset(&mut self) {
        self.title = None;
        self.state = None;
    }
}
