//! Channel access arbitration
//!
//! The PHY keeps its own view of the shared channel (`ChannelAccess`) and
//! asks a `ChannelAccessManager` for the medium when it has something to send.
//! A manager may grant in the same call or deliver the grant later.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::LayerError;

/// PHY view of the shared channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelStatus {
    None,
    Requested,
    Granted,
}

/// Answer of a manager to an access request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Channel is ours right now, for the given time
    Granted(Duration),
    /// Channel will be granted after `delay`, for `duration`
    GrantAfter { delay: Duration, duration: Duration },
    /// The manager will not answer by itself; a grant may still be injected
    Pending,
}

/// Contention procedure used to acquire the medium
pub trait ChannelAccessManager: Send {
    fn request_access(&mut self, now: Duration) -> AccessDecision;
}

/// Channel always available; every request is granted in the same call
#[derive(Debug, Clone)]
pub struct AlwaysOnAccessManager {
    grant_duration: Duration,
}

impl AlwaysOnAccessManager {
    pub fn new(grant_duration: Duration) -> Self {
        Self { grant_duration }
    }
}

impl Default for AlwaysOnAccessManager {
    fn default() -> Self {
        // long enough to never run out during a run
        Self::new(Duration::from_secs(3600))
    }
}

impl ChannelAccessManager for AlwaysOnAccessManager {
    fn request_access(&mut self, _now: Duration) -> AccessDecision {
        AccessDecision::Granted(self.grant_duration)
    }
}

/// Deterministic contention: every request is granted after a fixed delay
#[derive(Debug, Clone)]
pub struct DelayedAccessManager {
    delay: Duration,
    grant_duration: Duration,
    requests: u64,
}

impl DelayedAccessManager {
    pub fn new(delay: Duration, grant_duration: Duration) -> Self {
        Self { delay, grant_duration, requests: 0 }
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }
}

impl ChannelAccessManager for DelayedAccessManager {
    fn request_access(&mut self, now: Duration) -> AccessDecision {
        self.requests += 1;
        debug!("Access request #{} at {:?}, grant in {:?}", self.requests, now, self.delay);
        if self.delay.is_zero() {
            AccessDecision::Granted(self.grant_duration)
        } else {
            AccessDecision::GrantAfter { delay: self.delay, duration: self.grant_duration }
        }
    }
}

/// A grant as armed by the PHY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessGrant {
    /// Loss-timer generation; only the latest one may revoke the grant
    pub generation: u64,
    /// Whole slots covered by the granted time
    pub slots: u64,
    /// When the loss timer fires
    pub lost_at: Duration,
}

/// Channel access state machine: None -> Requested -> Granted -> None
#[derive(Debug, Clone)]
pub struct ChannelAccess {
    status: ChannelStatus,
    generation: u64,
}

impl Default for ChannelAccess {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelAccess {
    pub fn new() -> Self {
        Self { status: ChannelStatus::None, generation: 0 }
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn is_granted(&self) -> bool {
        self.status == ChannelStatus::Granted
    }

    /// Mark a request as outstanding; only one may be outstanding at a time
    pub fn request(&mut self) -> Result<(), LayerError> {
        if self.status != ChannelStatus::None {
            return Err(LayerError::AccessAlreadyRequested);
        }
        self.status = ChannelStatus::Requested;
        Ok(())
    }

    /// Take the channel for `duration` starting at `now`
    ///
    /// The grant covers as many whole slots as fit in `duration`; the loss
    /// timer fires 1 ns before the last covered slot ends. Arming supersedes
    /// any earlier loss timer.
    pub fn grant(&mut self, now: Duration, duration: Duration, slot_period: Duration) -> AccessGrant {
        self.status = ChannelStatus::Granted;
        self.generation += 1;

        let slots = (duration.as_nanos() / slot_period.as_nanos().max(1)) as u64;
        let covered = Duration::from_nanos(slot_period.as_nanos() as u64 * slots);
        let lost_at = (now + covered).saturating_sub(Duration::from_nanos(1)).max(now);

        info!("Channel access granted for {:?}: {} slots, lost at {:?}", duration, slots, lost_at);
        AccessGrant { generation: self.generation, slots, lost_at }
    }

    /// Loss-timer expiry; stale generations are ignored
    pub fn lose(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.status != ChannelStatus::Granted {
            debug!("Ignoring stale channel loss timer {}", generation);
            return false;
        }
        debug!("Channel access lost");
        self.status = ChannelStatus::None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLOT: Duration = Duration::from_nanos(1_000);

    #[test]
    fn test_single_outstanding_request() {
        let mut access = ChannelAccess::new();
        access.request().unwrap();
        assert_eq!(access.status(), ChannelStatus::Requested);
        assert_eq!(access.request(), Err(LayerError::AccessAlreadyRequested));

        access.grant(Duration::ZERO, SLOT, SLOT);
        assert_eq!(access.request(), Err(LayerError::AccessAlreadyRequested));
    }

    #[test]
    fn test_loss_timer_covers_whole_slots() {
        let mut access = ChannelAccess::new();
        access.request().unwrap();
        let grant = access.grant(Duration::from_nanos(250), SLOT * 2 + Duration::from_nanos(999), SLOT);
        assert_eq!(grant.slots, 2);
        assert_eq!(grant.lost_at, Duration::from_nanos(250 + 2_000 - 1));
        assert!(access.is_granted());
        assert!(access.lose(grant.generation));
        assert_eq!(access.status(), ChannelStatus::None);
    }

    #[test]
    fn test_rearm_supersedes_old_timer() {
        let mut access = ChannelAccess::new();
        let first = access.grant(Duration::ZERO, SLOT, SLOT);
        let second = access.grant(Duration::from_nanos(500), SLOT * 3, SLOT);
        assert!(!access.lose(first.generation));
        assert!(access.is_granted());
        assert!(access.lose(second.generation));
    }

    #[test]
    fn test_sub_slot_grant_is_lost_immediately() {
        let mut access = ChannelAccess::new();
        let grant = access.grant(Duration::from_nanos(10), Duration::from_nanos(400), SLOT);
        assert_eq!(grant.slots, 0);
        assert_eq!(grant.lost_at, Duration::from_nanos(10));
    }

    #[test]
    fn test_managers() {
        let mut always = AlwaysOnAccessManager::new(SLOT);
        assert_eq!(always.request_access(Duration::ZERO), AccessDecision::Granted(SLOT));

        let mut delayed = DelayedAccessManager::new(Duration::from_nanos(30), SLOT * 2);
        assert_eq!(
            delayed.request_access(Duration::ZERO),
            AccessDecision::GrantAfter { delay: Duration::from_nanos(30), duration: SLOT * 2 }
        );
        assert_eq!(delayed.requests(), 1);
    }
}
