//! gNB PHY frame state machine
//!
//! Drives one component carrier slot by slot: pulls the slot plan, contends
//! for the channel, then walks the var-TTIs of the plan in symbol order. All
//! transitions are events on the discrete-event queue owned by the caller.

mod ctrl_rx;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::{BeamId, CellId, EventQueue, Imsi, Rnti, SfnSf};
use interfaces::message_types::{DciMessage, MasterInformationBlock, Sib1Message, SystemInformationBlockType1, UlHarqInfo};
use interfaces::{
    BeamformingAntenna, ControlMessage, DciFormat, DciInfoElementTdma, ExpectedTb, MacPdu, PacketBurst,
    SlotAllocInfo, SpectrumPhy, UeDevice, VarTtiAllocInfo, VarTtiType,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::channel_access::{AccessDecision, AlwaysOnAccessManager, ChannelAccess, ChannelAccessManager, ChannelStatus};
use super::config::PhyMacConfig;
use super::ctrl_queue::CtrlMsgQueue;
use super::pdu_buffer::PduBuffer;
use super::rbg_table::RbgAllocationTable;
use super::slot_alloc::SlotAllocStore;
use super::trace::{CtrlDirection, PhyTrace};
use crate::mac::{MacPhySapUser, PhySapProvider};
use crate::LayerError;

/// Guard between var-TTIs and around data transmissions
const GUARD: Duration = Duration::from_nanos(1);

/// Events of the PHY timeline
#[derive(Debug, Clone)]
pub enum PhyEvent {
    StartSlot(SfnSf),
    StartVarTti,
    EndVarTti,
    EndSlot,
    SendDataChannels { burst: PacketBurst, duration: Duration, alloc: VarTtiAllocInfo },
    ChannelAccessGranted { duration: Duration },
    ChannelAccessLost { generation: u64 },
    BeamformingTimer,
    /// Control messages received over the air
    RxCtrlMessages(Vec<ControlMessage>),
    /// UL HARQ outcome from the receive chain
    RxUlHarq(UlHarqInfo),
    /// UL PDU received; reaches the MAC after the TB decode latency
    RxDataPdu(MacPdu),
    DeliverPhyPdu(MacPdu),
    /// Per-RB SINR of the last UL data reception
    RxUlSinr(Vec<f64>),
}

/// Discriminant of a `PhyEvent`, for event logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PhyEventKind {
    StartSlot,
    StartVarTti,
    EndVarTti,
    EndSlot,
    SendDataChannels,
    ChannelAccessGranted,
    ChannelAccessLost,
    BeamformingTimer,
    RxCtrlMessages,
    RxUlHarq,
    RxDataPdu,
    DeliverPhyPdu,
    RxUlSinr,
}

impl PhyEvent {
    pub fn kind(&self) -> PhyEventKind {
        match self {
            PhyEvent::StartSlot(_) => PhyEventKind::StartSlot,
            PhyEvent::StartVarTti => PhyEventKind::StartVarTti,
            PhyEvent::EndVarTti => PhyEventKind::EndVarTti,
            PhyEvent::EndSlot => PhyEventKind::EndSlot,
            PhyEvent::SendDataChannels { .. } => PhyEventKind::SendDataChannels,
            PhyEvent::ChannelAccessGranted { .. } => PhyEventKind::ChannelAccessGranted,
            PhyEvent::ChannelAccessLost { .. } => PhyEventKind::ChannelAccessLost,
            PhyEvent::BeamformingTimer => PhyEventKind::BeamformingTimer,
            PhyEvent::RxCtrlMessages(_) => PhyEventKind::RxCtrlMessages,
            PhyEvent::RxUlHarq(_) => PhyEventKind::RxUlHarq,
            PhyEvent::RxDataPdu(_) => PhyEventKind::RxDataPdu,
            PhyEvent::DeliverPhyPdu(_) => PhyEventKind::DeliverPhyPdu,
            PhyEvent::RxUlSinr(_) => PhyEventKind::RxUlSinr,
        }
    }
}

/// Counters of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhyStats {
    pub slots_started: u64,
    pub empty_slots: u64,
    pub slots_ended: u64,
    pub var_ttis: u64,
    /// Slots re-queued because the channel was not available
    pub deferred_slots: u64,
    /// Slots let go with nothing to send and no channel
    pub abandoned_slots: u64,
    pub access_requests: u64,
    pub access_grants: u64,
    pub access_losses: u64,
    pub ul_indications: u64,
    pub dl_indications: u64,
    pub ctrl_msgs_tx: u64,
    pub ctrl_msgs_rx: u64,
    pub dropped_harq: u64,
    pub data_bursts_tx: u64,
    pub expected_tbs: u64,
}

/// Plan of a slot carrying only the DL and UL control var-TTIs
pub fn ctrl_slot_plan(config: &PhyMacConfig, sfn: SfnSf) -> SlotAllocInfo {
    let mut plan = SlotAllocInfo::new(sfn.with_symbol(0));
    if config.dl_ctrl_symbols > 0 {
        plan.push(VarTtiAllocInfo::omni(DciInfoElementTdma::ctrl(
            DciFormat::Dl,
            0,
            config.dl_ctrl_symbols,
            config.bandwidth_in_rbg,
        )));
    }
    if config.ul_ctrl_symbols > 0 {
        plan.push(VarTtiAllocInfo::omni(DciInfoElementTdma::ctrl(
            DciFormat::Ul,
            config.symbols_per_slot - config.ul_ctrl_symbols,
            config.ul_ctrl_symbols,
            config.bandwidth_in_rbg,
        )));
    }
    plan
}

/// Provider handed to the MAC during slot indications
struct PhySap<'a> {
    config: &'a PhyMacConfig,
    store: &'a mut SlotAllocStore,
    pdus: &'a mut PduBuffer,
    ctrl_queue: &'a mut CtrlMsgQueue,
}

impl PhySapProvider for PhySap<'_> {
    fn set_slot_alloc_info(&mut self, plan: SlotAllocInfo) {
        self.store.set_slot_alloc_info(plan);
    }

    fn send_mac_pdu(&mut self, pdu: MacPdu) {
        self.pdus.add(pdu);
    }

    fn send_control_message(&mut self, msg: ControlMessage) {
        self.ctrl_queue.enqueue(msg);
    }

    fn config(&self) -> &PhyMacConfig {
        self.config
    }
}

/// gNB PHY of one component carrier
pub struct EnbPhy {
    config: PhyMacConfig,
    cell_id: CellId,
    spectrum: Box<dyn SpectrumPhy>,
    antenna: Box<dyn BeamformingAntenna>,
    mac: Box<dyn MacPhySapUser>,
    cam: Box<dyn ChannelAccessManager>,

    store: SlotAllocStore,
    pdus: PduBuffer,
    ctrl_queue: CtrlMsgQueue,
    rbg_table: RbgAllocationTable,
    access: ChannelAccess,

    registered_imsis: BTreeSet<Imsi>,
    devices: Vec<UeDevice>,
    attached: BTreeSet<Rnti>,
    sib1: Sib1Message,

    current: SfnSf,
    last_slot_start: Duration,
    var_tti_num: usize,
    curr_sym_start: u8,
    curr_plan: SlotAllocInfo,
    perform_beamforming: bool,

    trace: PhyTrace,
    stats: PhyStats,
}

impl EnbPhy {
    /// Create the PHY; channel access defaults to always granted
    pub fn new(
        config: PhyMacConfig,
        cell_id: CellId,
        spectrum: Box<dyn SpectrumPhy>,
        antenna: Box<dyn BeamformingAntenna>,
        mac: Box<dyn MacPhySapUser>,
    ) -> Result<Self, LayerError> {
        config.validate()?;
        info!(
            "Creating gNB PHY: cell {}, {} kHz SCS, slot {:?}, {} RBGs",
            cell_id.0,
            config.scs.khz(),
            config.slot_period(),
            config.bandwidth_in_rbg
        );

        Ok(Self {
            ctrl_queue: CtrlMsgQueue::new(config.l1l2_ctrl_latency),
            rbg_table: RbgAllocationTable::new(config.bandwidth_in_rbg),
            config,
            cell_id,
            spectrum,
            antenna,
            mac,
            cam: Box::new(AlwaysOnAccessManager::default()),
            store: SlotAllocStore::new(),
            pdus: PduBuffer::new(),
            access: ChannelAccess::new(),
            registered_imsis: BTreeSet::new(),
            devices: Vec::new(),
            attached: BTreeSet::new(),
            sib1: Sib1Message { sib1: SystemInformationBlockType1::default(), tdd_pattern: Vec::new() },
            current: SfnSf::default(),
            last_slot_start: Duration::ZERO,
            var_tti_num: 0,
            curr_sym_start: 0,
            curr_plan: SlotAllocInfo::default(),
            perform_beamforming: false,
            trace: PhyTrace::new(),
            stats: PhyStats::default(),
        })
    }

    /// Replace the channel access manager
    pub fn set_cam(&mut self, cam: Box<dyn ChannelAccessManager>) {
        self.cam = cam;
    }

    /// SIB1 broadcast at the start of every second half-frame
    pub fn set_sib1(&mut self, sib1: Sib1Message) {
        self.sib1 = sib1;
    }

    /// Fill the first L1/L2-latency slots with control-only plans, so the
    /// pipeline runs until the MAC's own plans arrive
    pub fn install_initial_ctrl_slots(&mut self) {
        let first = SfnSf::default();
        for i in 0..self.config.l1l2_ctrl_latency {
            let sfn = first.increase_no_of_slots_with_latency(
                i,
                self.config.slots_per_subframe,
                self.config.subframes_per_frame,
            );
            self.store.set_slot_alloc_info(ctrl_slot_plan(&self.config, sfn));
        }
    }

    /// Schedule the first slot and the beamforming timer
    pub fn start(&mut self, queue: &mut EventQueue<PhyEvent>) {
        info!("Starting gNB PHY timeline at {:?}", queue.now());
        queue.schedule(Duration::ZERO, PhyEvent::StartSlot(SfnSf::default()));
        if !self.config.beamforming_periodicity.is_zero() {
            queue.schedule(self.config.beamforming_periodicity, PhyEvent::BeamformingTimer);
        }
    }

    /// Run one event
    pub fn handle(&mut self, event: PhyEvent, queue: &mut EventQueue<PhyEvent>) -> Result<(), LayerError> {
        match event {
            PhyEvent::StartSlot(sfn) => self.start_slot(sfn, queue),
            PhyEvent::StartVarTti => self.start_var_tti(queue),
            PhyEvent::EndVarTti => self.end_var_tti(queue),
            PhyEvent::EndSlot => self.end_slot(queue),
            PhyEvent::SendDataChannels { burst, duration, alloc } => {
                self.send_data_channels(burst, duration, &alloc, queue.now())
            }
            PhyEvent::ChannelAccessGranted { duration } => {
                self.channel_access_granted(duration, queue);
                Ok(())
            }
            PhyEvent::ChannelAccessLost { generation } => {
                if self.access.lose(generation) {
                    self.stats.access_losses += 1;
                }
                Ok(())
            }
            PhyEvent::BeamformingTimer => {
                self.expire_beamforming_timer(queue);
                Ok(())
            }
            PhyEvent::RxCtrlMessages(msgs) => self.phy_ctrl_messages_received(msgs, queue.now()),
            PhyEvent::RxUlHarq(info) => {
                self.receive_ul_harq_feedback(info);
                Ok(())
            }
            PhyEvent::RxDataPdu(pdu) => {
                self.phy_data_packet_received(pdu, queue);
                Ok(())
            }
            PhyEvent::DeliverPhyPdu(pdu) => {
                self.mac.receive_phy_pdu(pdu);
                Ok(())
            }
            PhyEvent::RxUlSinr(sinr) => {
                self.generate_data_cqi_report(sinr);
                Ok(())
            }
        }
    }

    fn start_slot(&mut self, sfn: SfnSf, queue: &mut EventQueue<PhyEvent>) -> Result<(), LayerError> {
        self.current = sfn.with_symbol(0);
        self.last_slot_start = queue.now();
        self.var_tti_num = 0;
        self.stats.slots_started += 1;

        self.curr_plan = self.store.retrieve_current(self.current)?;

        if self.curr_plan.is_empty() {
            info!("gNB start empty slot {}, scheduling directly the end of the slot", self.current);
            self.stats.empty_slots += 1;
            queue.schedule(self.config.slot_period(), PhyEvent::EndSlot);
            return Ok(());
        }

        if self.current.slot == 0 {
            if self.current.subframe == 0 {
                self.queue_mib();
            } else if self.current.subframe == 5 {
                self.queue_sib();
            }
        }

        if self.access.is_granted() {
            debug!("Channel granted; slot indications and start of slot {}", self.current);
            self.slot_indications(self.current);
            self.absorb_late_plan();
            return self.do_start_slot(queue);
        }

        let ul_sfn = self.current.calculate_uplink_slot(
            self.config.ul_sched_delay,
            self.config.slots_per_subframe,
            self.config.subframes_per_frame,
        );
        let has_ul_data = self.config.ul_sched_delay > 0
            && self.store.peek(&ul_sfn).is_some_and(SlotAllocInfo::contains_data_allocation);
        let has_data = self.curr_plan.contains_data_allocation();
        let has_ctrl = !self.ctrl_queue.is_front_empty();

        if has_data || has_ctrl || has_ul_data {
            if self.access.status() == ChannelStatus::None {
                debug!("Channel not granted, requesting it");
                self.request_access(queue)?;
                if self.access.is_granted() {
                    // the manager granted within the request
                    debug!("Channel granted synchronously; slot indications and start of slot {}", self.current);
                    self.slot_indications(self.current.with_symbol(self.var_tti_num as u32));
                    self.absorb_late_plan();
                    return self.do_start_slot(queue);
                }
            }

            info!(
                "Deferring allocation of {} (data: {}, ctrl: {}, UL data: {})",
                self.current, has_data, has_ctrl, has_ul_data
            );
            let plan = std::mem::take(&mut self.curr_plan);
            self.defer_plan(plan);
        } else {
            debug!("Channel not granted and nothing to send; slot indications only for {}", self.current);
            self.slot_indications(self.current.with_symbol(self.var_tti_num as u32));
            self.stats.abandoned_slots += 1;
            if let Some(late) = self.store.take(&self.current) {
                // added for a slot that is not transmitted
                self.defer_plan(late);
            }
        }

        queue.schedule(self.config.slot_period().saturating_sub(GUARD), PhyEvent::EndSlot);
        Ok(())
    }

    /// Re-queue a plan at the front of the store under the next slot
    fn defer_plan(&mut self, plan: SlotAllocInfo) {
        let new_sfn = self.current.increase_no_of_slots(self.config.slots_per_subframe, self.config.subframes_per_frame);
        info!("Queueing allocation of {} in front for {}", self.current, new_sfn);
        let remaps = self.store.push_front(
            new_sfn,
            plan,
            self.config.slots_per_subframe,
            self.config.subframes_per_frame,
        );
        self.pdus.rekey(&remaps);
        self.stats.deferred_slots += 1;
    }

    /// Var-TTIs the MAC added for the starting slot during the indications
    fn absorb_late_plan(&mut self) {
        if let Some(late) = self.store.take(&self.current) {
            debug!("MAC added {} var-TTIs to slot {} during the indications", late.len(), self.current);
            self.curr_plan.merge(late);
        }
    }

    fn request_access(&mut self, queue: &mut EventQueue<PhyEvent>) -> Result<(), LayerError> {
        self.access.request()?;
        self.stats.access_requests += 1;

        match self.cam.request_access(queue.now()) {
            AccessDecision::Granted(duration) => self.channel_access_granted(duration, queue),
            AccessDecision::GrantAfter { delay, duration } => {
                queue.schedule(delay, PhyEvent::ChannelAccessGranted { duration });
            }
            AccessDecision::Pending => debug!("Channel access pending"),
        }
        Ok(())
    }

    fn channel_access_granted(&mut self, duration: Duration, queue: &mut EventQueue<PhyEvent>) {
        if self.access.status() != ChannelStatus::Requested {
            warn!("Channel access granted while {:?}", self.access.status());
        }
        let grant = self.access.grant(queue.now(), duration, self.config.slot_period());
        self.stats.access_grants += 1;
        queue.schedule_at(grant.lost_at, PhyEvent::ChannelAccessLost { generation: grant.generation });
    }

    fn slot_indications(&mut self, sfn: SfnSf) {
        let mut sap = PhySap {
            config: &self.config,
            store: &mut self.store,
            pdus: &mut self.pdus,
            ctrl_queue: &mut self.ctrl_queue,
        };
        self.mac.slot_ul_indication(sfn, &mut sap);
        self.mac.slot_dl_indication(sfn, &mut sap);
        self.stats.ul_indications += 1;
        self.stats.dl_indications += 1;
    }

    fn do_start_slot(&mut self, queue: &mut EventQueue<PhyEvent>) -> Result<(), LayerError> {
        check_plan_timeline(&self.curr_plan, self.config.symbols_per_slot)?;
        info!("gNB start slot {} with {} var-TTIs", self.current, self.curr_plan.len());
        let first = self.alloc_at(self.var_tti_num)?;
        let start = self.last_slot_start + self.config.symbol_period() * first.dci.sym_start as u32;
        queue.schedule_at(start, PhyEvent::StartVarTti);
        Ok(())
    }

    fn alloc_at(&self, index: usize) -> Result<VarTtiAllocInfo, LayerError> {
        self.curr_plan.var_tti_alloc_info.get(index).cloned().ok_or_else(|| {
            LayerError::InvalidDci(format!("no var-TTI {} in slot {}", index, self.current))
        })
    }

    fn start_var_tti(&mut self, queue: &mut EventQueue<PhyEvent>) -> Result<(), LayerError> {
        let now = queue.now();
        // control is always omni
        self.antenna.change_to_omni_tx(now);

        let alloc = self.alloc_at(self.var_tti_num)?;
        self.curr_sym_start = alloc.dci.sym_start;
        self.stats.var_ttis += 1;
        debug!("Starting var-TTI {} on the air at {}", self.var_tti_num, self.current.with_symbol(self.var_tti_num as u32));

        let period = match (alloc.dci.var_tti_type, alloc.dci.format) {
            (VarTtiType::CtrlData, format) => {
                return Err(LayerError::InvalidVarTtiKind { sym_start: alloc.dci.sym_start, format });
            }
            (VarTtiType::Ctrl, DciFormat::Dl) => self.dl_ctrl(&alloc.dci, now)?,
            (VarTtiType::Ctrl, DciFormat::Ul) => self.ul_ctrl(&alloc.dci),
            (VarTtiType::Data, DciFormat::Dl) => self.dl_data(&alloc, queue),
            (VarTtiType::Data, DciFormat::Ul) => self.ul_data(&alloc.dci, now)?,
        };

        queue.schedule(period, PhyEvent::EndVarTti);
        Ok(())
    }

    fn dl_ctrl(&mut self, dci: &DciInfoElementTdma, now: Duration) -> Result<Duration, LayerError> {
        if self.perform_beamforming {
            self.perform_beamforming = false;
            for device in &self.devices {
                self.antenna.perform_beamforming(now, device);
            }
        }

        if dci.num_sym != self.config.dl_ctrl_symbols {
            return Err(LayerError::CtrlSymbolMismatch { expected: self.config.dl_ctrl_symbols, actual: dci.num_sym });
        }

        let sfn = self.current.with_symbol(self.var_tti_num as u32);
        self.rbg_table.clear();

        let mut msgs = self.ctrl_queue.pop_front();
        msgs.extend(self.retrieve_msgs_from_dcis(sfn)?);

        let period = self.config.symbol_period() * self.config.dl_ctrl_symbols as u32;

        if msgs.is_empty() {
            debug!("Scheduled time for DL CTRL at {} but no messages to send", sfn);
            return Ok(period);
        }

        debug!(
            "gNB TXing DL CTRL with {} msgs, slot {} symbols {}-{}, end {:?}",
            msgs.len(),
            self.current,
            dci.sym_start,
            dci.sym_end() - 1,
            now + period - GUARD
        );
        let trace_sfn = self.current.with_symbol(dci.sym_start as u32);
        for msg in &msgs {
            self.trace.record(now, CtrlDirection::Tx, trace_sfn, dci.rnti, self.config.cc_id, msg.message_type());
        }
        self.stats.ctrl_msgs_tx += msgs.len() as u64;

        // control ends before the data period starts
        self.send_ctrl_channels(msgs, period - GUARD, now);
        Ok(period)
    }

    fn retrieve_msgs_from_dcis(&mut self, sfn: SfnSf) -> Result<Vec<ControlMessage>, LayerError> {
        let symbols_per_slot = self.config.symbols_per_slot;
        let mut msgs = Vec::new();
        let mut last_dl = 0;

        for alloc in &self.curr_plan.var_tti_alloc_info {
            let dci = &alloc.dci;
            match (dci.var_tti_type, dci.format) {
                (VarTtiType::Ctrl, DciFormat::Ul) => {
                    debug!("To send, UL CTRL for all UEs");
                    msgs.push(ControlMessage::Dci(DciMessage::new(Arc::clone(dci), sfn)));
                }
                (VarTtiType::Ctrl, DciFormat::Dl) | (_, DciFormat::Ul) => {}
                (_, DciFormat::Dl) => {
                    check_grant(dci, &mut last_dl, symbols_per_slot)?;
                    self.rbg_table.store(dci)?;
                    debug!("To send, DL DCI for UE {}", dci.rnti);
                    msgs.push(ControlMessage::Dci(DciMessage::new(Arc::clone(dci), sfn)));
                }
            }
        }

        // UL grants are announced ul_sched_delay slots ahead of the transmission
        let delay = self.config.ul_sched_delay;
        let ul_grants = if delay > 0 {
            let ul_sfn = sfn.calculate_uplink_slot(delay, self.config.slots_per_subframe, self.config.subframes_per_frame);
            self.store.peek(&ul_sfn).map(ul_data_grants).unwrap_or_default()
        } else {
            ul_data_grants(&self.curr_plan)
        };

        let mut last_ul = 0;
        for dci in ul_grants {
            check_grant(&dci, &mut last_ul, symbols_per_slot)?;
            debug!("To send, UL DCI for UE {}", dci.rnti);
            let msg = DciMessage::new(dci, sfn);
            msgs.push(ControlMessage::Dci(if delay > 0 { msg.with_k_delay(delay) } else { msg }));
        }

        Ok(msgs)
    }

    fn send_ctrl_channels(&mut self, msgs: Vec<ControlMessage>, duration: Duration, now: Duration) {
        self.spectrum.set_active_rbs(now, &self.config.full_bandwidth_rbs());
        self.spectrum.start_tx_dl_control_frames(now, msgs, duration);
    }

    fn ul_ctrl(&mut self, dci: &DciInfoElementTdma) -> Duration {
        let period = self.config.symbol_period() * self.config.ul_ctrl_symbols as u32;
        debug!("gNB RXing UL CTRL slot {} symbols {}-{}", self.current, dci.sym_start, dci.sym_end() - 1);
        period
    }

    fn dl_data(&mut self, alloc: &VarTtiAllocInfo, queue: &mut EventQueue<PhyEvent>) -> Duration {
        let dci = &alloc.dci;
        let period = self.config.symbol_period() * dci.num_sym as u32;
        let key = self.current.with_symbol(dci.sym_start as u32);

        let burst = match self.pdus.take(&key) {
            Some(burst) if !burst.is_empty() => burst,
            _ => {
                // scheduled, but nothing was queued for this UE
                debug!("No PDU buffered for RNTI {} at {}, sending an empty one", dci.rnti, key);
                std::iter::once(MacPdu::empty(key, dci.rnti)).collect()
            }
        };

        debug!(
            "gNB TXing DL DATA slot {} symbols {}-{}, {} bytes",
            self.current,
            dci.sym_start,
            dci.sym_end() - 1,
            burst.total_bytes()
        );

        queue.schedule(
            GUARD,
            PhyEvent::SendDataChannels {
                burst,
                duration: period.saturating_sub(GUARD * 2),
                alloc: alloc.clone(),
            },
        );
        period
    }

    fn ul_data(&mut self, dci: &DciInfoElementTdma, now: Duration) -> Result<Duration, LayerError> {
        if dci.rbg_bitmask.width() != self.config.bandwidth_in_rbg {
            return Err(LayerError::RbgWidthMismatch {
                expected: self.config.bandwidth_in_rbg,
                actual: dci.rbg_bitmask.width(),
            });
        }
        if !dci.rbg_bitmask.is_fully_set() {
            return Err(LayerError::NonContiguousUlAllocation {
                rnti: dci.rnti,
                set: dci.rbg_bitmask.count_set(),
                width: dci.rbg_bitmask.width(),
            });
        }

        let period = self.config.symbol_period() * dci.num_sym as u32;

        self.spectrum.add_expected_tb(
            now,
            ExpectedTb {
                rnti: dci.rnti,
                ndi: dci.ndi,
                tb_size: dci.tb_size,
                mcs: dci.mcs,
                rb_assignment: dci.rbg_bitmask.to_rb_assignment(self.config.rb_per_rbg),
                harq_process: dci.harq_process,
                rv: dci.rv,
                is_downlink: false,
                sym_start: dci.sym_start,
                num_sym: dci.num_sym,
            },
        );
        self.stats.expected_tbs += 1;

        let device = self.device_for(dci.rnti).ok_or(LayerError::UnknownUe(dci.rnti))?;
        self.antenna.change_beamforming_vector(now, &device);

        debug!("gNB RXing UL DATA slot {} symbols {}-{} from RNTI {}", self.current, dci.sym_start, dci.sym_end() - 1, dci.rnti);
        Ok(period)
    }

    fn end_var_tti(&mut self, queue: &mut EventQueue<PhyEvent>) -> Result<(), LayerError> {
        let now = queue.now();
        loop {
            let last = self.alloc_at(self.var_tti_num)?;
            debug!("DCI started at symbol {} which lasted for {} symbols finished", last.dci.sym_start, last.dci.num_sym);
            self.antenna.change_to_omni_tx(now);

            if self.var_tti_num + 1 >= self.curr_plan.len() {
                return self.end_slot(queue);
            }

            self.var_tti_num += 1;
            let next = self.alloc_at(self.var_tti_num)?;

            if next.dci.sym_start == last.dci.sym_start {
                debug!(
                    "DCI {} for UE {} starts from symbol {} as well, ignoring at PHY",
                    self.var_tti_num, next.dci.rnti, next.dci.sym_start
                );
                continue;
            }

            let start = self.last_slot_start + self.config.symbol_period() * next.dci.sym_start as u32;
            if start < now {
                let elapsed = (now - self.last_slot_start).as_nanos();
                let previous_end = elapsed.div_ceil(self.config.symbol_period().as_nanos()) as u32;
                return Err(LayerError::VarTtiOverlap { sym_start: next.dci.sym_start, previous_end });
            }
            debug!("DCI {} for UE {} scheduled at {:?}", self.var_tti_num, next.dci.rnti, start);
            queue.schedule_at(start, PhyEvent::StartVarTti);
            return Ok(());
        }
    }

    fn end_slot(&mut self, queue: &mut EventQueue<PhyEvent>) -> Result<(), LayerError> {
        let now = queue.now();
        let next_slot_start = self.last_slot_start + self.config.slot_period();
        if next_slot_start < now {
            return Err(LayerError::SlotOverrun { next_slot_start, now });
        }

        let next = self.current.increase_no_of_slots(self.config.slots_per_subframe, self.config.subframes_per_frame);
        self.pdus.discard_before(&next);
        self.stats.slots_ended += 1;

        queue.schedule_at(next_slot_start, PhyEvent::StartSlot(next));
        Ok(())
    }

    fn send_data_channels(
        &mut self,
        burst: PacketBurst,
        duration: Duration,
        alloc: &VarTtiAllocInfo,
        now: Duration,
    ) -> Result<(), LayerError> {
        if alloc.is_omni {
            self.antenna.change_to_omni_tx(now);
        } else {
            let device = self.device_for(alloc.dci.rnti).ok_or(LayerError::UnknownUe(alloc.dci.rnti))?;
            self.antenna.change_beamforming_vector(now, &device);
        }

        // the RBGs of every var-TTI starting at this symbol were merged during DL CTRL
        let rbs = self.rbg_table.rb_assignment(alloc.dci.sym_start, self.config.rb_per_rbg)?;
        self.spectrum.set_active_rbs(now, &rbs);
        self.spectrum.start_tx_data_frames(now, burst, duration, alloc.dci.sym_start);
        self.stats.data_bursts_tx += 1;
        Ok(())
    }

    fn expire_beamforming_timer(&mut self, queue: &mut EventQueue<PhyEvent>) {
        info!("Beamforming timer expired; programming a beamforming");
        self.perform_beamforming = true;
        queue.schedule(self.config.beamforming_periodicity, PhyEvent::BeamformingTimer);
    }

    fn queue_mib(&mut self) {
        let mib = MasterInformationBlock {
            dl_bandwidth: self.config.bandwidth_in_rbg as u16,
            system_frame_number: self.current.frame,
        };
        self.ctrl_queue.enqueue_now(ControlMessage::Mib(mib));
    }

    fn queue_sib(&mut self) {
        self.ctrl_queue.enqueue_now(ControlMessage::Sib1(self.sib1.clone()));
    }

    fn device_for(&self, rnti: Rnti) -> Option<UeDevice> {
        self.devices.iter().find(|d| d.rnti == rnti).copied()
    }

    /// Register a UE device; a second registration of the same IMSI is refused
    pub fn register_ue(&mut self, device: UeDevice) -> bool {
        if !self.registered_imsis.insert(device.imsi) {
            warn!("UE with IMSI {} already registered", device.imsi.0);
            return false;
        }
        info!("Registered UE IMSI {} RNTI {}", device.imsi.0, device.rnti);
        self.devices.push(device);
        true
    }

    /// Mark an RNTI as attached
    pub fn add_ue(&mut self, rnti: Rnti) {
        if self.attached.insert(rnti) {
            debug!("RNTI {} attached", rnti);
        }
    }

    pub fn remove_ue(&mut self, rnti: Rnti) -> Result<(), LayerError> {
        if !self.attached.remove(&rnti) {
            return Err(LayerError::UeNotAttached(rnti));
        }
        debug!("RNTI {} detached", rnti);
        Ok(())
    }

    /// Beam the antenna currently uses towards a UE, or the default beam
    pub fn beam_id(&self, rnti: Rnti) -> BeamId {
        self.device_for(rnti)
            .map(|device| self.antenna.beam_id(&device))
            .unwrap_or(BeamId::DEFAULT)
    }

    pub fn config(&self) -> &PhyMacConfig {
        &self.config
    }

    pub fn cell_id(&self) -> CellId {
        self.cell_id
    }

    pub fn channel_status(&self) -> ChannelStatus {
        self.access.status()
    }

    pub fn current_slot(&self) -> SfnSf {
        self.current
    }

    pub fn store(&self) -> &SlotAllocStore {
        &self.store
    }

    pub fn pdu_buffer(&self) -> &PduBuffer {
        &self.pdus
    }

    pub fn rbg_table(&self) -> &RbgAllocationTable {
        &self.rbg_table
    }

    pub fn ctrl_queue(&self) -> &CtrlMsgQueue {
        &self.ctrl_queue
    }

    pub fn is_attached(&self, rnti: Rnti) -> bool {
        self.attached.contains(&rnti)
    }

    pub fn trace(&self) -> &PhyTrace {
        &self.trace
    }

    pub fn stats(&self) -> &PhyStats {
        &self.stats
    }
}

impl PhySapProvider for EnbPhy {
    fn set_slot_alloc_info(&mut self, plan: SlotAllocInfo) {
        self.store.set_slot_alloc_info(plan);
    }

    fn send_mac_pdu(&mut self, pdu: MacPdu) {
        self.pdus.add(pdu);
    }

    fn send_control_message(&mut self, msg: ControlMessage) {
        self.ctrl_queue.enqueue(msg);
    }

    fn config(&self) -> &PhyMacConfig {
        &self.config
    }
}

fn ul_data_grants(plan: &SlotAllocInfo) -> Vec<Arc<DciInfoElementTdma>> {
    plan.var_tti_alloc_info
        .iter()
        .filter(|a| a.dci.var_tti_type != VarTtiType::Ctrl && a.dci.format == DciFormat::Ul)
        .map(|a| Arc::clone(&a.dci))
        .collect()
}

/// Var-TTIs must fit the slot and follow each other without overlapping;
/// var-TTIs sharing a start symbol run as one
fn check_plan_timeline(plan: &SlotAllocInfo, symbols_per_slot: u8) -> Result<(), LayerError> {
    let mut group_start = 0u8;
    let mut group_end = 0u32;

    for alloc in &plan.var_tti_alloc_info {
        let dci = &alloc.dci;
        if dci.sym_end() > symbols_per_slot as u32 {
            return Err(LayerError::AllocationOverflow {
                rnti: dci.rnti,
                sym_start: dci.sym_start,
                num_sym: dci.num_sym,
                symbols_per_slot,
            });
        }
        if dci.sym_start < group_start {
            return Err(LayerError::SymbolRegression {
                format: dci.format,
                previous: group_start,
                current: dci.sym_start,
            });
        }
        if dci.sym_start == group_start {
            group_end = group_end.max(dci.sym_end());
        } else if (dci.sym_start as u32) < group_end {
            return Err(LayerError::VarTtiOverlap { sym_start: dci.sym_start, previous_end: group_end });
        } else {
            group_start = dci.sym_start;
            group_end = dci.sym_end();
        }
    }
    Ok(())
}

/// Contract every data grant of a DL control batch must honour
fn check_grant(dci: &DciInfoElementTdma, last_sym_start: &mut u8, symbols_per_slot: u8) -> Result<(), LayerError> {
    if dci.tb_size == 0 {
        return Err(LayerError::EmptyTransportBlock(dci.rnti));
    }
    if dci.sym_start < *last_sym_start {
        return Err(LayerError::SymbolRegression {
            format: dci.format,
            previous: *last_sym_start,
            current: dci.sym_start,
        });
    }
    if dci.sym_end() > symbols_per_slot as u32 {
        return Err(LayerError::AllocationOverflow {
            rnti: dci.rnti,
            sym_start: dci.sym_start,
            num_sym: dci.num_sym,
            symbols_per_slot,
        });
    }
    *last_sym_start = dci.sym_start;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use interfaces::RbgBitmask;

    fn data(rnti: u16, format: DciFormat, sym_start: u8, num_sym: u8) -> VarTtiAllocInfo {
        VarTtiAllocInfo::new(
            DciInfoElementTdma::data(Rnti(rnti), format)
                .symbols(sym_start, num_sym)
                .tb_size(20)
                .rbg_bitmask(RbgBitmask::full(4))
                .build()
                .unwrap(),
        )
    }

    fn plan(allocs: Vec<VarTtiAllocInfo>) -> SlotAllocInfo {
        let mut plan = SlotAllocInfo::new(SfnSf::default());
        for alloc in allocs {
            plan.push(alloc);
        }
        plan
    }

    #[test]
    fn test_shared_start_symbols_run_as_one() {
        let plan = plan(vec![
            VarTtiAllocInfo::omni(DciInfoElementTdma::ctrl(DciFormat::Dl, 0, 1, 4)),
            data(1, DciFormat::Dl, 1, 6),
            data(2, DciFormat::Dl, 1, 9),
            data(3, DciFormat::Ul, 10, 3),
            VarTtiAllocInfo::omni(DciInfoElementTdma::ctrl(DciFormat::Ul, 13, 1, 4)),
        ]);
        assert_eq!(check_plan_timeline(&plan, 14), Ok(()));
    }

    #[test]
    fn test_dl_and_ul_windows_must_not_overlap() {
        let plan = plan(vec![
            VarTtiAllocInfo::omni(DciInfoElementTdma::ctrl(DciFormat::Dl, 0, 1, 4)),
            data(1, DciFormat::Dl, 1, 6),
            data(2, DciFormat::Dl, 1, 9),
            data(3, DciFormat::Ul, 8, 2),
        ]);
        assert_eq!(
            check_plan_timeline(&plan, 14),
            Err(LayerError::VarTtiOverlap { sym_start: 8, previous_end: 10 })
        );
    }

    #[test]
    fn test_ctrl_var_tti_must_fit_the_slot() {
        let plan = plan(vec![VarTtiAllocInfo::omni(DciInfoElementTdma::ctrl(DciFormat::Ul, 12, 2, 4))]);
        assert_eq!(
            check_plan_timeline(&plan, 12),
            Err(LayerError::AllocationOverflow { rnti: Rnti(0), sym_start: 12, num_sym: 2, symbols_per_slot: 12 })
        );
    }

    #[test]
    fn test_unsorted_plan_regresses() {
        let mut plan = SlotAllocInfo::new(SfnSf::default());
        plan.var_tti_alloc_info = vec![data(1, DciFormat::Dl, 5, 2), data(1, DciFormat::Dl, 2, 2)];
        assert_eq!(
            check_plan_timeline(&plan, 14),
            Err(LayerError::SymbolRegression { format: DciFormat::Dl, previous: 5, current: 2 })
        );
    }

    #[test]
    fn test_grant_contract() {
        let mut last = 0;
        assert_eq!(check_grant(&data(1, DciFormat::Ul, 4, 2).dci, &mut last, 14), Ok(()));
        assert_eq!(last, 4);
        assert_eq!(
            check_grant(&data(2, DciFormat::Ul, 3, 2).dci, &mut last, 14),
            Err(LayerError::SymbolRegression { format: DciFormat::Ul, previous: 4, current: 3 })
        );

        let empty = DciInfoElementTdma { tb_size: 0, ..(*data(3, DciFormat::Dl, 5, 1).dci).clone() };
        assert_eq!(check_grant(&empty, &mut last, 14), Err(LayerError::EmptyTransportBlock(Rnti(3))));
    }
}
