//! Medium Access Control (MAC) side of the PHY timeline
//!
//! Defines the service access points between the PHY and the MAC and a
//! reference scheduler that drives simulated runs.

pub mod scheduler;
pub mod sib1;

#[cfg(test)]
pub(crate) mod scripted;

use common::SfnSf;
use interfaces::message_types::UlHarqInfo;
use interfaces::{ControlMessage, MacPdu, SlotAllocInfo};
use serde::Serialize;

use crate::phy::PhyMacConfig;

pub use scheduler::{RoundRobinScheduler, UeTraffic};
pub use sib1::{default_sib1_config, CellSelectionInfo, Sib1Config, Sib1Generator};

/// Kind of UL channel a CQI report was measured on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UlCqiType {
    Pusch,
    Pucch,
    Srs,
}

/// UL channel quality measured by the receive chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UlCqiReport {
    /// Slot and var-TTI start symbol of the measured transmission
    pub sfn_sf: SfnSf,
    pub cqi_type: UlCqiType,
    /// Linear SINR per resource block
    pub sinr: Vec<f64>,
}

/// Operations the PHY offers to the MAC
pub trait PhySapProvider {
    /// Hand over the plan of a future slot
    fn set_slot_alloc_info(&mut self, plan: SlotAllocInfo);

    /// Hand over a DL PDU; its tag names the slot and start symbol it goes out in
    fn send_mac_pdu(&mut self, pdu: MacPdu);

    /// Queue a control message behind the L1/L2 control latency
    fn send_control_message(&mut self, msg: ControlMessage);

    fn config(&self) -> &PhyMacConfig;
}

/// Operations the MAC offers to the PHY
pub trait MacPhySapUser: Send {
    /// A new slot is about to execute; last chance to add UL allocations
    fn slot_ul_indication(&mut self, sfn: SfnSf, phy: &mut dyn PhySapProvider);

    /// A new slot is about to execute; last chance to add DL allocations
    fn slot_dl_indication(&mut self, sfn: SfnSf, phy: &mut dyn PhySapProvider);

    fn receive_control_message(&mut self, msg: ControlMessage);

    fn receive_rach_preamble(&mut self, rap_id: u32);

    fn ul_harq_feedback(&mut self, info: UlHarqInfo);

    /// Decoded UL PDU
    fn receive_phy_pdu(&mut self, pdu: MacPdu);

    fn ul_cqi_report(&mut self, report: UlCqiReport);
}
