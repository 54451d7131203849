//! Control-message delay line
//!
//! Messages handed over by the MAC wait `l1l2_ctrl_latency` DL control
//! phases before they are transmitted. Each bucket holds the messages of one
//! DL control phase; the front bucket is the next one to go on air.

use std::collections::VecDeque;

use interfaces::ControlMessage;
use tracing::trace;

#[derive(Debug)]
pub struct CtrlMsgQueue {
    buckets: VecDeque<Vec<ControlMessage>>,
}

impl CtrlMsgQueue {
    /// Delay line of `latency` buckets (at least one)
    pub fn new(latency: u32) -> Self {
        let buckets = (0..latency.max(1)).map(|_| Vec::new()).collect();
        Self { buckets }
    }

    /// Queue a MAC message behind the configured latency
    pub fn enqueue(&mut self, msg: ControlMessage) {
        trace!("Queueing {:?} with L1/L2 latency", msg.message_type());
        if let Some(back) = self.buckets.back_mut() {
            back.push(msg);
        }
    }

    /// Queue a PHY-generated message for the next DL control phase
    pub fn enqueue_now(&mut self, msg: ControlMessage) {
        trace!("Queueing {:?} for the next DL CTRL", msg.message_type());
        if let Some(front) = self.buckets.front_mut() {
            front.push(msg);
        }
    }

    /// True if nothing is due in the next DL control phase
    pub fn is_front_empty(&self) -> bool {
        self.buckets.front().map_or(true, Vec::is_empty)
    }

    /// Messages due now; the line advances by one bucket
    pub fn pop_front(&mut self) -> Vec<ControlMessage> {
        let due = self.buckets.pop_front().unwrap_or_default();
        self.buckets.push_back(Vec::new());
        due
    }

    /// Messages waiting in every bucket
    pub fn pending(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn latency(&self) -> usize {
        self.buckets.len()
    }
}
