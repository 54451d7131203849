//! Receive side of the gNB PHY: UL control, HARQ, data and SINR

use std::time::Duration;

use common::{EventQueue, Rnti};
use interfaces::message_types::UlHarqInfo;
use interfaces::{ControlMessage, MacPdu};
use tracing::{debug, trace};

use super::{EnbPhy, PhyEvent};
use crate::mac::{UlCqiReport, UlCqiType};
use crate::phy::trace::CtrlDirection;
use crate::LayerError;

impl EnbPhy {
    /// Dispatch control messages received over the air to the MAC
    pub(super) fn phy_ctrl_messages_received(
        &mut self,
        msgs: Vec<ControlMessage>,
        now: Duration,
    ) -> Result<(), LayerError> {
        for msg in msgs {
            let msg_type = msg.message_type();
            match msg {
                ControlMessage::RachPreamble { rap_id } => {
                    if self.cell_id.0 == 0 {
                        return Err(LayerError::CellIdNotConfigured);
                    }
                    debug!("Received RACH preamble {}", rap_id);
                    self.mac.receive_rach_preamble(rap_id);
                    self.record_rx(now, Rnti(0), msg_type);
                }
                ControlMessage::DlHarq(info) => {
                    if !self.attached.contains(&info.rnti) {
                        debug!("DL HARQ from RNTI {} which is not attached, dropping", info.rnti);
                        self.stats.dropped_harq += 1;
                        continue;
                    }
                    self.record_rx(now, info.rnti, msg_type);
                    self.mac.receive_control_message(ControlMessage::DlHarq(info));
                }
                other => {
                    let rnti = other.rnti().unwrap_or(Rnti(0));
                    trace!("Received {:?} from RNTI {}", msg_type, rnti);
                    self.record_rx(now, rnti, msg_type);
                    self.mac.receive_control_message(other);
                }
            }
        }
        Ok(())
    }

    fn record_rx(&mut self, now: Duration, rnti: Rnti, msg_type: interfaces::MessageType) {
        let sfn = self.current.with_symbol(self.curr_sym_start as u32);
        self.trace.record(now, CtrlDirection::Rx, sfn, rnti, self.config.cc_id, msg_type);
        self.stats.ctrl_msgs_rx += 1;
    }

    /// UL HARQ outcome; only attached UEs reach the MAC
    pub(super) fn receive_ul_harq_feedback(&mut self, info: UlHarqInfo) {
        if !self.attached.contains(&info.rnti) {
            debug!("UL HARQ for RNTI {} which is not attached, dropping", info.rnti);
            self.stats.dropped_harq += 1;
            return;
        }
        self.mac.ul_harq_feedback(info);
    }

    /// A decoded UL PDU reaches the MAC once the TB decode latency has elapsed
    pub(super) fn phy_data_packet_received(&mut self, pdu: MacPdu, queue: &mut EventQueue<PhyEvent>) {
        trace!("UL PDU of {} bytes from RNTI {}", pdu.len(), pdu.rnti);
        queue.schedule(self.config.tb_decode_latency, PhyEvent::DeliverPhyPdu(pdu));
    }

    /// Turn the per-RB SINR of the last UL data reception into a PUSCH CQI report
    pub(super) fn generate_data_cqi_report(&mut self, sinr: Vec<f64>) {
        let report = UlCqiReport {
            sfn_sf: self.current.with_symbol(self.curr_sym_start as u32),
            cqi_type: UlCqiType::Pusch,
            sinr,
        };
        debug!("UL CQI report for {} over {} RBs", report.sfn_sf, report.sinr.len());
        self.mac.ul_cqi_report(report);
    }
}
