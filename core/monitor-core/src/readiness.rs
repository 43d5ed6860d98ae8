//! Loading state of the image stream.
//!
//! Each stream attempt is keyed by a [`StreamEpoch`]. The tracker reports
//! "loading" from the start of an attempt until the first of: the stream
//! loaded, the stream failed, or the fallback timeout fired. Events for any
//! epoch other than the active one are stale and change nothing.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StreamEpoch(pub u64);

impl StreamEpoch {
    pub fn next(self) -> Self {
        StreamEpoch(self.0.wrapping_add(1))
    }
}

impl fmt::Display for StreamEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// This event ended the loading state.
    Resolved,
    /// The attempt is current but something else resolved it first.
    AlreadyResolved,
    /// The event belongs to a superseded attempt or no attempt is active.
    Stale,
}

#[derive(Debug, Default)]
pub struct StreamReadinessTracker {
    active: Option<StreamEpoch>,
    loading: bool,
}

impl StreamReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new attempt, superseding any previous one.
    pub fn begin(&mut self, epoch: StreamEpoch) {
        self.active = Some(epoch);
        self.loading = true;
    }

    pub fn on_loaded(&mut self, epoch: StreamEpoch) -> Resolution {
        self.resolve(epoch)
    }

    pub fn on_failed(&mut self, epoch: StreamEpoch) -> Resolution {
        self.resolve(epoch)
    }

    pub fn on_timeout(&mut self, epoch: StreamEpoch) -> Resolution {
        self.resolve(epoch)
    }

    /// No stream is active; loading is forced off.
    pub fn deactivate(&mut self) {
        self.active = None;
        self.loading = false;
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn active(&self) -> Option<StreamEpoch> {
        self.active
    }

    fn resolve(&mut self, epoch: StreamEpoch) -> Resolution {
        if self.active != Some(epoch) {
            return Resolution::Stale;
        }
        if !self.loading {
            return Resolution::AlreadyResolved;
        }
        self.loading = false;
        Resolution::Resolved
    }
}
