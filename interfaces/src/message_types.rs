//! Control-plane message types exchanged between the PHY and the MAC
//!
//! Every message is a variant of [`ControlMessage`]; the variant is its
//! message-type tag. Messages are built once and moved along until they are
//! dispatched.

use std::sync::Arc;

use common::{Rnti, SfnSf, TddSlotType};
use serde::{Deserialize, Serialize};

use crate::dci::DciInfoElementTdma;

/// Message-type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Downlink or uplink grant
    DciTdma,
    /// Downlink channel quality report
    DlCqi,
    /// Buffer status report
    Bsr,
    /// Master information block
    Mib,
    /// System information block type 1
    Sib1,
    /// Random access preamble
    RachPreamble,
    /// Random access response
    Rar,
    /// Downlink HARQ feedback
    DlHarq,
    /// Uplink HARQ feedback
    UlHarq,
    /// Scheduling request
    Sr,
}

/// Master information block contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterInformationBlock {
    /// Downlink bandwidth, in resource block groups
    pub dl_bandwidth: u16,
    pub system_frame_number: u16,
}

/// System information block type 1 contents
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemInformationBlockType1 {
    /// Encoded PLMN identity
    pub plmn_identity: [u8; 3],
    pub cell_identity: u32,
    pub tracking_area_code: u32,
    pub cell_barred: bool,
    /// Minimum required RX level, in 2 dB steps
    pub q_rx_lev_min: i8,
    pub q_rx_lev_min_offset: u8,
    pub freq_band_list: Vec<u16>,
}

/// SIB1 with the TDD pattern advertised alongside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sib1Message {
    pub sib1: SystemInformationBlockType1,
    pub tdd_pattern: Vec<TddSlotType>,
}

/// A grant wrapped for transmission
#[derive(Debug, Clone, PartialEq)]
pub struct DciMessage {
    pub dci: Arc<DciInfoElementTdma>,
    /// Slot the grant is transmitted in
    pub sfn_sf: SfnSf,
    /// Slots between the grant and the allocation it describes
    pub k_delay: Option<u32>,
}

impl DciMessage {
    pub fn new(dci: Arc<DciInfoElementTdma>, sfn_sf: SfnSf) -> Self {
        Self { dci, sfn_sf, k_delay: None }
    }

    pub fn with_k_delay(mut self, k: u32) -> Self {
        self.k_delay = Some(k);
        self
    }
}

/// Shape of a CQI report
#[derive(Debug, Clone, PartialEq)]
pub enum CqiReport {
    /// One value for the whole carrier
    Wideband(u8),
    /// One value per resource block
    PerRb(Vec<u8>),
}

/// Downlink channel quality reported by a UE
#[derive(Debug, Clone, PartialEq)]
pub struct DlCqiInfo {
    pub rnti: Rnti,
    pub report: CqiReport,
}

/// MAC control element carrying a buffer status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacCeElement {
    pub rnti: Rnti,
    /// Buffer size index per logical channel group
    pub buffer_status: Vec<u8>,
}

/// One random access response entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarElement {
    pub rap_id: u32,
    /// Temporary C-RNTI assigned to the preamble sender
    pub rnti: Rnti,
}

/// Random access response addressed to an RA-RNTI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarMessage {
    pub ra_rnti: Rnti,
    pub rars: Vec<RarElement>,
}

/// HARQ acknowledgement state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarqStatus {
    Ack,
    Nack,
}

/// Downlink HARQ feedback sent by a UE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DlHarqInfo {
    pub rnti: Rnti,
    pub harq_process_id: u8,
    pub status: HarqStatus,
    pub num_retx: u8,
}

/// Uplink HARQ feedback produced by the receive chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UlHarqInfo {
    pub rnti: Rnti,
    pub harq_process_id: u8,
    pub status: HarqStatus,
    pub num_retx: u8,
}

/// Control-plane message
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Mib(MasterInformationBlock),
    Sib1(Sib1Message),
    SchedulingRequest { rnti: Rnti },
    Dci(DciMessage),
    DlCqi(DlCqiInfo),
    Bsr(MacCeElement),
    RachPreamble { rap_id: u32 },
    Rar(RarMessage),
    DlHarq(DlHarqInfo),
    UlHarq(UlHarqInfo),
}

impl ControlMessage {
    /// Message-type tag of this message
    pub fn message_type(&self) -> MessageType {
        match self {
            ControlMessage::Mib(_) => MessageType::Mib,
            ControlMessage::Sib1(_) => MessageType::Sib1,
            ControlMessage::SchedulingRequest { .. } => MessageType::Sr,
            ControlMessage::Dci(_) => MessageType::DciTdma,
            ControlMessage::DlCqi(_) => MessageType::DlCqi,
            ControlMessage::Bsr(_) => MessageType::Bsr,
            ControlMessage::RachPreamble { .. } => MessageType::RachPreamble,
            ControlMessage::Rar(_) => MessageType::Rar,
            ControlMessage::DlHarq(_) => MessageType::DlHarq,
            ControlMessage::UlHarq(_) => MessageType::UlHarq,
        }
    }

    /// UE the message refers to, when it names one
    pub fn rnti(&self) -> Option<Rnti> {
        match self {
            ControlMessage::SchedulingRequest { rnti } => Some(*rnti),
            ControlMessage::Dci(m) => Some(m.dci.rnti),
            ControlMessage::DlCqi(m) => Some(m.rnti),
            ControlMessage::Bsr(m) => Some(m.rnti),
            ControlMessage::Rar(m) => Some(m.ra_rnti),
            ControlMessage::DlHarq(m) => Some(m.rnti),
            ControlMessage::UlHarq(m) => Some(m.rnti),
            ControlMessage::Mib(_) | ControlMessage::Sib1(_) | ControlMessage::RachPreamble { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dci::{DciFormat, RbgBitmask};

    #[test]
    fn test_message_tags() {
        let dci = DciInfoElementTdma::data(Rnti(7), DciFormat::Dl)
            .symbols(1, 4)
            .tb_size(64)
            .rbg_bitmask(RbgBitmask::full(2))
            .build()
            .unwrap();
        let msg = ControlMessage::Dci(DciMessage::new(Arc::new(dci), SfnSf::default()).with_k_delay(2));
        assert_eq!(msg.message_type(), MessageType::DciTdma);
        assert_eq!(msg.rnti(), Some(Rnti(7)));

        let msg = ControlMessage::RachPreamble { rap_id: 12 };
        assert_eq!(msg.message_type(), MessageType::RachPreamble);
        assert_eq!(msg.rnti(), None);

        let msg = ControlMessage::DlHarq(DlHarqInfo {
            rnti: Rnti(3),
            harq_process_id: 1,
            status: HarqStatus::Nack,
            num_retx: 0,
        });
        assert_eq!(msg.message_type(), MessageType::DlHarq);
        assert_eq!(msg.rnti(), Some(Rnti(3)));
    }

    #[test]
    fn test_tags_serialize_by_name() {
        let json = serde_json::to_string(&MessageType::RachPreamble).unwrap();
        assert_eq!(json, "\"RachPreamble\"");
        let back: HarqStatus = serde_json::from_str("\"Nack\"").unwrap();
        assert_eq!(back, HarqStatus::Nack);
    }
}
