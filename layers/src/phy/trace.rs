//! Control-message traces
//!
//! Every control message the PHY transmits or forwards to the MAC leaves one
//! entry, keyed by slot, RNTI and component carrier.

use std::time::Duration;

use common::{CcId, Rnti, SfnSf};
use interfaces::MessageType;
use serde::Serialize;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CtrlDirection {
    Tx,
    Rx,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CtrlMsgTraceEntry {
    pub time: Duration,
    pub direction: CtrlDirection,
    pub sfn_sf: SfnSf,
    pub rnti: Rnti,
    pub cc_id: CcId,
    pub message_type: MessageType,
}

#[derive(Debug, Default)]
pub struct PhyTrace {
    entries: Vec<CtrlMsgTraceEntry>,
}

impl PhyTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        time: Duration,
        direction: CtrlDirection,
        sfn_sf: SfnSf,
        rnti: Rnti,
        cc_id: CcId,
        message_type: MessageType,
    ) {
        trace!(?direction, %sfn_sf, %rnti, ?message_type, "ctrl msg");
        self.entries.push(CtrlMsgTraceEntry { time, direction, sfn_sf, rnti, cc_id, message_type });
    }

    pub fn entries(&self) -> &[CtrlMsgTraceEntry] {
        &self.entries
    }

    pub fn rx(&self) -> impl Iterator<Item = &CtrlMsgTraceEntry> {
        self.entries.iter().filter(|e| e.direction == CtrlDirection::Rx)
    }

    pub fn tx(&self) -> impl Iterator<Item = &CtrlMsgTraceEntry> {
        self.entries.iter().filter(|e| e.direction == CtrlDirection::Tx)
    }

    /// One JSON object per line
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_and_json() {
        let mut trace = PhyTrace::new();
        trace.record(Duration::ZERO, CtrlDirection::Tx, SfnSf::new(0, 0, 0, 0), Rnti(0), CcId(0), MessageType::Mib);
        trace.record(
            Duration::from_nanos(5),
            CtrlDirection::Rx,
            SfnSf::new(0, 0, 0, 1),
            Rnti(4),
            CcId(0),
            MessageType::Bsr,
        );

        assert_eq!(trace.tx().count(), 1);
        assert_eq!(trace.rx().next().map(|e| e.rnti), Some(Rnti(4)));

        let json = trace.to_json_lines().unwrap();
        assert_eq!(json.lines().count(), 2);
        assert!(json.contains("\"message_type\":\"Bsr\""));
    }
}
