//! Discrete-event run loop for one gNB PHY
//!
//! Owns the event queue and the PHY and feeds events to it in time order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::EventQueue;
use tracing::{error, info};

use super::enb_phy::{EnbPhy, PhyEvent, PhyEventKind, PhyStats};
use crate::LayerError;

pub struct PhySimulator {
    queue: EventQueue<PhyEvent>,
    phy: EnbPhy,
    event_log: Option<Vec<(Duration, PhyEventKind)>>,
    stop: Option<Arc<AtomicBool>>,
}

impl PhySimulator {
    pub fn new(phy: EnbPhy) -> Self {
        Self { queue: EventQueue::new(), phy, event_log: None, stop: None }
    }

    /// Keep a log of every event run, with its firing time
    pub fn with_event_log(mut self) -> Self {
        self.event_log = Some(Vec::new());
        self
    }

    /// Stop the run at the next event once the flag is raised
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn start(&mut self) {
        self.phy.start(&mut self.queue);
    }

    /// Schedule an external event, e.g. a reception from the channel
    pub fn inject_at(&mut self, at: Duration, event: PhyEvent) {
        self.queue.schedule_at(at, event);
    }

    /// Run every event firing at or before `end`
    ///
    /// The first failing event aborts the run; the PHY state is left as it
    /// was when the error was raised.
    pub fn run_until(&mut self, end: Duration) -> Result<PhyStats, LayerError> {
        while let Some(next) = self.queue.peek_time() {
            if next > end {
                break;
            }
            if self.stop.as_ref().is_some_and(|s| s.load(Ordering::Relaxed)) {
                info!("Stop requested at {:?}", self.queue.now());
                break;
            }
            let Some((time, event)) = self.queue.pop_next() else {
                break;
            };
            if let Some(log) = self.event_log.as_mut() {
                log.push((time, event.kind()));
            }
            if let Err(e) = self.phy.handle(event, &mut self.queue) {
                error!("PHY event at {:?} failed: {}", time, e);
                return Err(e);
            }
        }
        Ok(self.phy.stats().clone())
    }

    pub fn now(&self) -> Duration {
        self.queue.now()
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn event_log(&self) -> &[(Duration, PhyEventKind)] {
        self.event_log.as_deref().unwrap_or(&[])
    }

    pub fn phy(&self) -> &EnbPhy {
        &self.phy
    }

    pub fn phy_mut(&mut self) -> &mut EnbPhy {
        &mut self.phy
    }
}
