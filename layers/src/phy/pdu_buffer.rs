//! DL MAC PDUs waiting for their data var-TTI
//!
//! PDUs are grouped into packet bursts keyed by slot and start symbol, the
//! routing tag each PDU carries.

use std::collections::HashMap;

use common::SfnSf;
use interfaces::{MacPdu, PacketBurst};
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct PduBuffer {
    bursts: HashMap<SfnSf, PacketBurst>,
}

impl PduBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pdu: MacPdu) {
        trace!("Buffering {} byte PDU for RNTI {} at {}", pdu.len(), pdu.rnti, pdu.sfn_sf);
        self.bursts.entry(pdu.sfn_sf).or_default().add(pdu);
    }

    /// Remove the burst of the var-TTI starting at `key`
    pub fn take(&mut self, key: &SfnSf) -> Option<PacketBurst> {
        self.bursts.remove(key)
    }

    pub fn contains(&self, key: &SfnSf) -> bool {
        self.bursts.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.bursts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bursts.is_empty()
    }

    /// Move bursts to the slots their plans were shifted to
    pub fn rekey(&mut self, remaps: &[(SfnSf, SfnSf)]) {
        let mut moved = Vec::new();
        for (old, new) in remaps {
            let keys: Vec<SfnSf> = self.bursts.keys().filter(|k| k.same_slot(old)).copied().collect();
            for key in keys {
                if let Some(mut burst) = self.bursts.remove(&key) {
                    let new_key = new.with_symbol(key.symbol);
                    debug!("Re-keying burst {} to {}", key, new_key);
                    burst.retag(new_key);
                    moved.push((new_key, burst));
                }
            }
        }
        // insert after every removal so chained remaps cannot overwrite each other
        self.bursts.extend(moved);
    }

    /// Drop bursts of slots before `sfn`; they can no longer be transmitted
    pub fn discard_before(&mut self, sfn: &SfnSf) -> usize {
        let before = self.bursts.len();
        let slot = sfn.with_symbol(0);
        self.bursts.retain(|key, _| key.with_symbol(0) >= slot);
        let dropped = before - self.bursts.len();
        if dropped > 0 {
            debug!("Dropped {} stale packet bursts before {}", dropped, sfn);
        }
        dropped
    }
}
