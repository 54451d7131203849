//! Transmit/receive boundary of the PHY timeline
//!
//! The signal-level behaviour behind these calls (propagation, interference,
//! beamforming math) lives outside this workspace. The timeline only needs to
//! tell the boundary what to do and when.

use std::time::Duration;

use common::{BeamId, Imsi, Rnti};

use crate::mac_pdu::PacketBurst;
use crate::message_types::ControlMessage;

/// A UE device attached to the cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UeDevice {
    pub imsi: Imsi,
    pub rnti: Rnti,
}

/// Uplink transport block the receive chain should expect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedTb {
    pub rnti: Rnti,
    pub ndi: bool,
    pub tb_size: u32,
    pub mcs: u8,
    /// Resource blocks the UE transmits on
    pub rb_assignment: Vec<u32>,
    pub harq_process: u8,
    pub rv: u8,
    pub is_downlink: bool,
    pub sym_start: u8,
    pub num_sym: u8,
}

/// Spectrum side of the boundary
pub trait SpectrumPhy: Send {
    /// Set the resource blocks the next transmission occupies
    fn set_active_rbs(&mut self, now: Duration, rbs: &[u32]);

    /// Transmit a batch of control messages for `duration`
    fn start_tx_dl_control_frames(&mut self, now: Duration, msgs: Vec<ControlMessage>, duration: Duration);

    /// Transmit a payload batch for `duration` starting at symbol `sym_start`
    fn start_tx_data_frames(&mut self, now: Duration, burst: PacketBurst, duration: Duration, sym_start: u8);

    /// Register an uplink transport block expected in the coming window
    fn add_expected_tb(&mut self, now: Duration, tb: ExpectedTb);
}

/// Antenna side of the boundary
pub trait BeamformingAntenna: Send {
    /// Point the beam at a UE
    fn change_beamforming_vector(&mut self, now: Duration, device: &UeDevice);

    /// Reset to the omnidirectional pattern
    fn change_to_omni_tx(&mut self, now: Duration);

    /// Beam currently associated with a UE
    fn beam_id(&self, device: &UeDevice) -> BeamId;

    /// Recompute the beam towards a UE
    fn perform_beamforming(&mut self, now: Duration, device: &UeDevice);
}
