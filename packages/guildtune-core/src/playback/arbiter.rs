//! Connection ownership between the track side and the utterance side.
//!
//! Both sides stream to the same exclusive connection, so each stream runs
//! under a lease. The policy is tracks first, announcements in the gaps:
//!
//! - a running stream is never preempted;
//! - an utterance is granted only while the lease is free and the track side
//!   has nothing waiting (the track side is idle or its track is paused);
//! - a track advance or resume requested while an utterance is on air is
//!   recorded as demand and served as soon as that utterance releases.
//!
//! The arbiter is plain state owned by the entity worker; it performs no I/O.

use super::types::{JobId, PlaybackId};

/// Who currently streams on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lease {
    Free,
    Track(PlaybackId),
    Utterance(JobId),
}

/// Track-side work waiting for an utterance to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackDemand {
    #[default]
    None,
    /// Start the next queue entry.
    Advance,
    /// Resume the paused current track.
    Resume,
}

#[derive(Debug)]
pub struct ConnectionArbiter {
    lease: Lease,
    demand: TrackDemand,
}

impl Default for ConnectionArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionArbiter {
    pub fn new() -> Self {
        Self {
            lease: Lease::Free,
            demand: TrackDemand::None,
        }
    }

    pub fn lease(&self) -> Lease {
        self.lease
    }

    pub fn demand(&self) -> TrackDemand {
        self.demand
    }

    /// True while an utterance holds the connection.
    pub fn utterance_on_air(&self) -> bool {
        matches!(self.lease, Lease::Utterance(_))
    }

    /// Asks for the connection on behalf of the track side.
    ///
    /// Returns `true` when the track side may stream now. Otherwise the
    /// demand is recorded (replacing any earlier one) and `false` is returned.
    pub fn request_track(&mut self, demand: TrackDemand) -> bool {
        match self.lease {
            Lease::Free | Lease::Track(_) => true,
            Lease::Utterance(_) => {
                self.demand = demand;
                false
            }
        }
    }

    /// Records that the track stream `playback` now holds the connection.
    pub fn grant_track(&mut self, playback: PlaybackId) {
        debug_assert!(!self.utterance_on_air());
        self.lease = Lease::Track(playback);
        self.demand = TrackDemand::None;
    }

    /// Releases a track lease (pause, stop, end of stream).
    pub fn release_track(&mut self) {
        if matches!(self.lease, Lease::Track(_)) {
            self.lease = Lease::Free;
        }
    }

    /// Grants the connection to `job` if the policy allows it right now.
    pub fn try_grant_utterance(&mut self, job: JobId) -> bool {
        if self.lease == Lease::Free && self.demand == TrackDemand::None {
            self.lease = Lease::Utterance(job);
            true
        } else {
            false
        }
    }

    /// Releases `job`'s lease and hands back any demand that was waiting.
    ///
    /// Releasing a job that does not hold the lease changes nothing.
    pub fn release_utterance(&mut self, job: JobId) -> TrackDemand {
        if self.lease == Lease::Utterance(job) {
            self.lease = Lease::Free;
            std::mem::take(&mut self.demand)
        } else {
            TrackDemand::None
        }
    }

    /// Drops any waiting track demand (stop, leave).
    pub fn clear_demand(&mut self) {
        self.demand = TrackDemand::None;
    }
}
