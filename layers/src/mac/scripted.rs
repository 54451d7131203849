//! MAC double for timeline tests
//!
//! Records everything the PHY hands it. Plans and PDUs queued with
//! `install_on_indication` are handed to the PHY on the next DL indication.

use std::sync::{Arc, Mutex, MutexGuard};

use common::SfnSf;
use interfaces::message_types::UlHarqInfo;
use interfaces::{ControlMessage, MacPdu, SlotAllocInfo};

use super::{MacPhySapUser, PhySapProvider, UlCqiReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indication {
    Ul(SfnSf),
    Dl(SfnSf),
}

#[derive(Debug, Default)]
pub struct ScriptState {
    pub indications: Vec<Indication>,
    pub ctrl_msgs: Vec<ControlMessage>,
    pub rach_preambles: Vec<u32>,
    pub ul_harq: Vec<UlHarqInfo>,
    pub pdus: Vec<MacPdu>,
    pub ul_cqi: Vec<UlCqiReport>,
    pending_plans: Vec<SlotAllocInfo>,
    pending_pdus: Vec<MacPdu>,
    pending_ctrl: Vec<ControlMessage>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedMac {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedMac {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn install_on_indication(&self, plan: SlotAllocInfo, pdus: Vec<MacPdu>) {
        let mut state = self.state();
        state.pending_plans.push(plan);
        state.pending_pdus.extend(pdus);
    }

    pub fn send_on_indication(&self, msg: ControlMessage) {
        self.state().pending_ctrl.push(msg);
    }
}

impl MacPhySapUser for ScriptedMac {
    fn slot_ul_indication(&mut self, sfn: SfnSf, _phy: &mut dyn PhySapProvider) {
        self.state().indications.push(Indication::Ul(sfn));
    }

    fn slot_dl_indication(&mut self, sfn: SfnSf, phy: &mut dyn PhySapProvider) {
        let mut state = self.state();
        state.indications.push(Indication::Dl(sfn));
        for plan in state.pending_plans.drain(..) {
            phy.set_slot_alloc_info(plan);
        }
        for pdu in state.pending_pdus.drain(..) {
            phy.send_mac_pdu(pdu);
        }
        for msg in state.pending_ctrl.drain(..) {
            phy.send_control_message(msg);
        }
    }

    fn receive_control_message(&mut self, msg: ControlMessage) {
        self.state().ctrl_msgs.push(msg);
    }

    fn receive_rach_preamble(&mut self, rap_id: u32) {
        self.state().rach_preambles.push(rap_id);
    }

    fn ul_harq_feedback(&mut self, info: UlHarqInfo) {
        self.state().ul_harq.push(info);
    }

    fn receive_phy_pdu(&mut self, pdu: MacPdu) {
        self.state().pdus.push(pdu);
    }

    fn ul_cqi_report(&mut self, report: UlCqiReport) {
        self.state().ul_cqi.push(report);
    }
}
