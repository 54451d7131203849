//! Recording boundary
//!
//! Implements both boundary traits by appending every call to a shared log.
//! Clones share the same log, so a handle kept outside the PHY can inspect
//! what the PHY did.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use common::BeamId;

use crate::mac_pdu::PacketBurst;
use crate::message_types::ControlMessage;
use crate::spectrum::{BeamformingAntenna, ExpectedTb, SpectrumPhy, UeDevice};

/// One call made on the boundary
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryEvent {
    ActiveRbs { at: Duration, rbs: Vec<u32> },
    CtrlTx { at: Duration, msgs: Vec<ControlMessage>, duration: Duration },
    DataTx { at: Duration, burst: PacketBurst, duration: Duration, sym_start: u8 },
    ExpectedTb { at: Duration, tb: ExpectedTb },
    Beam { at: Duration, device: UeDevice },
    Omni { at: Duration },
    Beamforming { at: Duration, device: UeDevice },
}

#[derive(Debug, Default)]
struct RecorderState {
    events: Vec<BoundaryEvent>,
    beams: HashMap<UeDevice, BeamId>,
}

/// Boundary that records instead of transmitting
#[derive(Debug, Clone, Default)]
pub struct RecordingSpectrum {
    state: Arc<Mutex<RecorderState>>,
}

impl RecordingSpectrum {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        // The log stays usable even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of every recorded call
    pub fn events(&self) -> Vec<BoundaryEvent> {
        self.lock().events.clone()
    }

    /// Control batches transmitted so far
    pub fn ctrl_transmissions(&self) -> Vec<(Duration, Vec<ControlMessage>, Duration)> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                BoundaryEvent::CtrlTx { at, msgs, duration } => Some((*at, msgs.clone(), *duration)),
                _ => None,
            })
            .collect()
    }

    /// Payload batches transmitted so far
    pub fn data_transmissions(&self) -> Vec<(Duration, PacketBurst, Duration)> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                BoundaryEvent::DataTx { at, burst, duration, .. } => Some((*at, burst.clone(), *duration)),
                _ => None,
            })
            .collect()
    }

    /// Expected uplink transport blocks registered so far
    pub fn expected_tbs(&self) -> Vec<ExpectedTb> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                BoundaryEvent::ExpectedTb { tb, .. } => Some(tb.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }

    /// Preset the beam reported for a UE
    pub fn set_beam(&self, device: UeDevice, beam: BeamId) {
        self.lock().beams.insert(device, beam);
    }
}

impl SpectrumPhy for RecordingSpectrum {
    fn set_active_rbs(&mut self, now: Duration, rbs: &[u32]) {
        self.lock().events.push(BoundaryEvent::ActiveRbs { at: now, rbs: rbs.to_vec() });
    }

    fn start_tx_dl_control_frames(&mut self, now: Duration, msgs: Vec<ControlMessage>, duration: Duration) {
        self.lock().events.push(BoundaryEvent::CtrlTx { at: now, msgs, duration });
    }

    fn start_tx_data_frames(&mut self, now: Duration, burst: PacketBurst, duration: Duration, sym_start: u8) {
        self.lock().events.push(BoundaryEvent::DataTx { at: now, burst, duration, sym_start });
    }

    fn add_expected_tb(&mut self, now: Duration, tb: ExpectedTb) {
        self.lock().events.push(BoundaryEvent::ExpectedTb { at: now, tb });
    }
}

impl BeamformingAntenna for RecordingSpectrum {
    fn change_beamforming_vector(&mut self, now: Duration, device: &UeDevice) {
        self.lock().events.push(BoundaryEvent::Beam { at: now, device: *device });
    }

    fn change_to_omni_tx(&mut self, now: Duration) {
        self.lock().events.push(BoundaryEvent::Omni { at: now });
    }

    fn beam_id(&self, device: &UeDevice) -> BeamId {
        self.lock().beams.get(device).copied().unwrap_or(BeamId::DEFAULT)
    }

    fn perform_beamforming(&mut self, now: Duration, device: &UeDevice) {
        self.lock().events.push(BoundaryEvent::Beamforming { at: now, device: *device });
    }
}
