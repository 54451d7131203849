//! MAC Scheduler Implementation
//!
//! Static round-robin pattern used to drive the PHY timeline. Every DL
//! indication plans the slot one L1/L2 control latency ahead: DL control,
//! at most one DL data var-TTI, an optional UL data var-TTI and UL control.

use std::collections::VecDeque;

use bytes::Bytes;
use common::{Rnti, SfnSf};
use interfaces::message_types::{CqiReport, HarqStatus, RarElement, RarMessage, UlHarqInfo};
use interfaces::{ControlMessage, DciFormat, DciInfoElementTdma, MacPdu, RbgBitmask, VarTtiAllocInfo};
use tracing::{debug, info, trace, warn};

use super::{MacPhySapUser, PhySapProvider, UlCqiReport};
use crate::phy::ctrl_slot_plan;
use crate::phy::PhyMacConfig;

/// Logical channel of scheduled user data
const LCID_DATA: u8 = 4;

/// Number of HARQ processes cycled per UE
const NUM_HARQ_PROCESSES: u8 = 16;

/// First temporary C-RNTI handed out in random access responses
const FIRST_TC_RNTI: u16 = 0x4601;

/// Bytes assumed per buffer size index of a BSR
const BSR_BYTES_PER_INDEX: u32 = 8;

/// Traffic profile of a UE known to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeTraffic {
    pub rnti: Rnti,
    /// Size of the DL PDU generated per slot; zero means no generated traffic
    pub dl_pdu_bytes: usize,
}

#[derive(Debug)]
struct UeContext {
    traffic: UeTraffic,
    dl_queue: VecDeque<Bytes>,
    next_harq: u8,
    /// Bytes the UE reported waiting in its UL buffers
    ul_pending: u32,
    last_cqi: Option<u8>,
}

impl UeContext {
    fn new(traffic: UeTraffic) -> Self {
        Self { traffic, dl_queue: VecDeque::new(), next_harq: 0, ul_pending: 0, last_cqi: None }
    }

    fn take_harq(&mut self) -> u8 {
        let id = self.next_harq;
        self.next_harq = (self.next_harq + 1) % NUM_HARQ_PROCESSES;
        id
    }
}

/// Round-robin reference scheduler
#[derive(Debug, Default)]
pub struct RoundRobinScheduler {
    ues: Vec<UeContext>,
    next_dl: usize,
    next_ul: usize,
    pending_rars: Vec<RarElement>,
    next_tc_rnti: u16,
    dl_grants: u64,
    ul_grants: u64,
    ul_bytes: u64,
}

impl RoundRobinScheduler {
    pub fn new() -> Self {
        Self { next_tc_rnti: FIRST_TC_RNTI, ..Default::default() }
    }

    /// Serve a UE; generated traffic, if any, is queued every slot
    pub fn add_ue(&mut self, traffic: UeTraffic) {
        if self.ues.iter().any(|ue| ue.traffic.rnti == traffic.rnti) {
            warn!("UE {} already scheduled", traffic.rnti);
            return;
        }
        info!("Scheduling UE {} ({} B per slot)", traffic.rnti, traffic.dl_pdu_bytes);
        self.ues.push(UeContext::new(traffic));
    }

    /// Queue one DL PDU payload for a UE
    pub fn enqueue_dl_data(&mut self, rnti: Rnti, payload: Bytes) -> bool {
        match self.ues.iter_mut().find(|ue| ue.traffic.rnti == rnti) {
            Some(ue) if !payload.is_empty() => {
                ue.dl_queue.push_back(payload);
                true
            }
            Some(_) => false,
            None => {
                debug!("Dropping DL data for unknown RNTI {}", rnti);
                false
            }
        }
    }

    pub fn dl_grants(&self) -> u64 {
        self.dl_grants
    }

    pub fn ul_grants(&self) -> u64 {
        self.ul_grants
    }

    fn generate_traffic(&mut self) {
        for ue in &mut self.ues {
            if ue.traffic.dl_pdu_bytes > 0 {
                ue.dl_queue.push_back(Bytes::from(vec![0xA5; ue.traffic.dl_pdu_bytes]));
            }
        }
    }

    /// Next UE in round-robin order matching `pred`, advancing `cursor` past it
    fn next_ue(ues: &[UeContext], cursor: &mut usize, pred: impl Fn(&UeContext) -> bool) -> Option<usize> {
        let n = ues.len();
        let found = (0..n).map(|i| (*cursor + i) % n).find(|&i| pred(&ues[i]))?;
        *cursor = (found + 1) % n;
        Some(found)
    }

    fn plan_slot(&mut self, target: SfnSf, config: &PhyMacConfig, phy: &mut dyn PhySapProvider) {
        let mut plan = ctrl_slot_plan(config, target);

        let data_start = config.dl_ctrl_symbols;
        let data_end = config.symbols_per_slot - config.ul_ctrl_symbols;
        if data_end <= data_start {
            phy.set_slot_alloc_info(plan);
            return;
        }

        let ul = Self::next_ue(&self.ues, &mut self.next_ul, |ue| ue.ul_pending > 0);
        let dl_end = match ul {
            Some(_) if data_end - data_start >= 2 => data_start + (data_end - data_start) / 2,
            _ => data_end,
        };

        if let Some(i) = Self::next_ue(&self.ues, &mut self.next_dl, |ue| !ue.dl_queue.is_empty()) {
            let ue = &mut self.ues[i];
            if let Some(payload) = ue.dl_queue.pop_front() {
                let harq = ue.take_harq();
                let dci = DciInfoElementTdma::data(ue.traffic.rnti, DciFormat::Dl)
                    .symbols(data_start, dl_end - data_start)
                    .tb_size(payload.len() as u32)
                    .mcs(ue.last_cqi.map_or(0, cqi_to_mcs))
                    .harq(harq, 0, true)
                    .rbg_bitmask(RbgBitmask::full(config.bandwidth_in_rbg))
                    .build();
                match dci {
                    Ok(dci) => {
                        trace!("DL grant {} B for UE {} in {}", payload.len(), dci.rnti, target);
                        phy.send_mac_pdu(MacPdu::new(
                            target.with_symbol(data_start as u32),
                            dci.rnti,
                            LCID_DATA,
                            payload,
                        ));
                        plan.push(VarTtiAllocInfo::new(dci));
                        self.dl_grants += 1;
                    }
                    Err(e) => warn!("Skipping DL grant for UE {}: {}", ue.traffic.rnti, e),
                }
            }
        }

        if let Some(i) = ul.filter(|_| dl_end < data_end) {
            let ue = &mut self.ues[i];
            let harq = ue.take_harq();
            let dci = DciInfoElementTdma::data(ue.traffic.rnti, DciFormat::Ul)
                .symbols(dl_end, data_end - dl_end)
                .tb_size(ue.ul_pending)
                .harq(harq, 0, true)
                .rbg_bitmask(RbgBitmask::full(config.bandwidth_in_rbg))
                .build();
            match dci {
                Ok(dci) => {
                    trace!("UL grant {} B for UE {} in {}", ue.ul_pending, dci.rnti, target);
                    ue.ul_pending = 0;
                    plan.push(VarTtiAllocInfo::new(dci));
                    self.ul_grants += 1;
                }
                Err(e) => warn!("Skipping UL grant for UE {}: {}", ue.traffic.rnti, e),
            }
        }

        phy.set_slot_alloc_info(plan);
    }
}

/// Rough CQI to MCS mapping
fn cqi_to_mcs(cqi: u8) -> u8 {
    (cqi.min(15) * 2).min(28)
}

impl MacPhySapUser for RoundRobinScheduler {
    fn slot_ul_indication(&mut self, sfn: SfnSf, _phy: &mut dyn PhySapProvider) {
        trace!("UL indication for {}", sfn);
    }

    fn slot_dl_indication(&mut self, sfn: SfnSf, phy: &mut dyn PhySapProvider) {
        let config = phy.config().clone();
        let target = sfn.increase_no_of_slots_with_latency(
            config.l1l2_ctrl_latency,
            config.slots_per_subframe,
            config.subframes_per_frame,
        );
        debug!("DL indication for {}, planning {}", sfn, target);

        if !self.pending_rars.is_empty() {
            let ra_rnti = Rnti(1 + 14 * sfn.slot);
            let rars = std::mem::take(&mut self.pending_rars);
            info!("Sending RAR to RA-RNTI {} with {} entries", ra_rnti, rars.len());
            phy.send_control_message(ControlMessage::Rar(RarMessage { ra_rnti, rars }));
        }

        self.generate_traffic();
        self.plan_slot(target, &config, phy);
    }

    fn receive_control_message(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Bsr(bsr) => {
                if let Some(ue) = self.ues.iter_mut().find(|ue| ue.traffic.rnti == bsr.rnti) {
                    ue.ul_pending = bsr.buffer_status.iter().map(|&b| b as u32 * BSR_BYTES_PER_INDEX).sum();
                    debug!("BSR from UE {}: {} B pending", bsr.rnti, ue.ul_pending);
                }
            }
            ControlMessage::SchedulingRequest { rnti } => {
                if let Some(ue) = self.ues.iter_mut().find(|ue| ue.traffic.rnti == rnti) {
                    ue.ul_pending = ue.ul_pending.max(BSR_BYTES_PER_INDEX);
                }
            }
            ControlMessage::DlCqi(cqi) => {
                if let Some(ue) = self.ues.iter_mut().find(|ue| ue.traffic.rnti == cqi.rnti) {
                    ue.last_cqi = match cqi.report {
                        CqiReport::Wideband(v) => Some(v),
                        CqiReport::PerRb(values) => values.iter().copied().min(),
                    };
                }
            }
            ControlMessage::DlHarq(harq) if harq.status == HarqStatus::Nack => {
                debug!("DL NACK from UE {} for process {}", harq.rnti, harq.harq_process_id);
            }
            other => trace!("Ignoring {:?}", other.message_type()),
        }
    }

    fn receive_rach_preamble(&mut self, rap_id: u32) {
        let rnti = Rnti(self.next_tc_rnti);
        self.next_tc_rnti = self.next_tc_rnti.wrapping_add(1);
        info!("RACH preamble {}, assigning TC-RNTI {}", rap_id, rnti);
        self.pending_rars.push(RarElement { rap_id, rnti });
    }

    fn ul_harq_feedback(&mut self, info: UlHarqInfo) {
        debug!("UL HARQ {:?} for UE {} process {}", info.status, info.rnti, info.harq_process_id);
    }

    fn receive_phy_pdu(&mut self, pdu: MacPdu) {
        self.ul_bytes += pdu.len() as u64;
        trace!("UL PDU {} B from UE {}, {} B total", pdu.len(), pdu.rnti, self.ul_bytes);
    }

    fn ul_cqi_report(&mut self, report: UlCqiReport) {
        trace!("UL CQI {:?} at {} over {} RBs", report.cqi_type, report.sfn_sf, report.sinr.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Bandwidth, SubcarrierSpacing};
    use interfaces::message_types::MacCeElement;
    use interfaces::{SlotAllocInfo, VarTtiType};

    struct FakePhy {
        config: PhyMacConfig,
        plans: Vec<SlotAllocInfo>,
        pdus: Vec<MacPdu>,
        ctrl: Vec<ControlMessage>,
    }

    impl FakePhy {
        fn new() -> Self {
            Self {
                config: PhyMacConfig::from_scs(SubcarrierSpacing::Scs30, Bandwidth::Bw20, false),
                plans: Vec::new(),
                pdus: Vec::new(),
                ctrl: Vec::new(),
            }
        }
    }

    impl PhySapProvider for FakePhy {
        fn set_slot_alloc_info(&mut self, plan: SlotAllocInfo) {
            self.plans.push(plan);
        }

        fn send_mac_pdu(&mut self, pdu: MacPdu) {
            self.pdus.push(pdu);
        }

        fn send_control_message(&mut self, msg: ControlMessage) {
            self.ctrl.push(msg);
        }

        fn config(&self) -> &PhyMacConfig {
            &self.config
        }
    }

    fn kinds(plan: &SlotAllocInfo) -> Vec<(VarTtiType, DciFormat, u8, u8)> {
        plan.var_tti_alloc_info
            .iter()
            .map(|a| (a.dci.var_tti_type, a.dci.format, a.dci.sym_start, a.dci.num_sym))
            .collect()
    }

    #[test]
    fn test_plans_latency_slots_ahead() {
        let mut phy = FakePhy::new();
        let mut scheduler = RoundRobinScheduler::new();

        scheduler.slot_dl_indication(SfnSf::new(0, 9, 1, 0), &mut phy);

        assert_eq!(phy.plans.len(), 1);
        assert_eq!(phy.plans[0].sfn_sf, SfnSf::new(1, 0, 1, 0));
        assert_eq!(
            kinds(&phy.plans[0]),
            vec![(VarTtiType::Ctrl, DciFormat::Dl, 0, 1), (VarTtiType::Ctrl, DciFormat::Ul, 13, 1)]
        );
        assert!(phy.pdus.is_empty());
    }

    #[test]
    fn test_round_robin_between_ues() {
        let mut phy = FakePhy::new();
        let mut scheduler = RoundRobinScheduler::new();
        scheduler.add_ue(UeTraffic { rnti: Rnti(10), dl_pdu_bytes: 0 });
        scheduler.add_ue(UeTraffic { rnti: Rnti(11), dl_pdu_bytes: 0 });
        for _ in 0..2 {
            assert!(scheduler.enqueue_dl_data(Rnti(10), Bytes::from_static(b"aaaa")));
            assert!(scheduler.enqueue_dl_data(Rnti(11), Bytes::from_static(b"bb")));
        }
        assert!(!scheduler.enqueue_dl_data(Rnti(12), Bytes::from_static(b"x")));

        let mut sfn = SfnSf::default();
        for _ in 0..4 {
            scheduler.slot_dl_indication(sfn, &mut phy);
            sfn = sfn.increase_no_of_slots(2, 10);
        }

        let served: Vec<_> = phy.pdus.iter().map(|p| p.rnti).collect();
        assert_eq!(served, vec![Rnti(10), Rnti(11), Rnti(10), Rnti(11)]);
        assert_eq!(phy.pdus[0].sfn_sf, SfnSf::new(0, 1, 0, 1));

        let dl = &phy.plans[0].var_tti_alloc_info[1].dci;
        assert_eq!((dl.sym_start, dl.num_sym, dl.tb_size), (1, 12, 4));
        assert_eq!(phy.plans[2].var_tti_alloc_info[1].dci.harq_process, 1);
        assert_eq!(scheduler.dl_grants(), 4);
    }

    #[test]
    fn test_bsr_reserves_ul_half_of_data_region() {
        let mut phy = FakePhy::new();
        let mut scheduler = RoundRobinScheduler::new();
        scheduler.add_ue(UeTraffic { rnti: Rnti(10), dl_pdu_bytes: 32 });
        scheduler.receive_control_message(ControlMessage::Bsr(MacCeElement { rnti: Rnti(10), buffer_status: vec![4] }));

        scheduler.slot_dl_indication(SfnSf::default(), &mut phy);
        assert_eq!(
            kinds(&phy.plans[0]),
            vec![
                (VarTtiType::Ctrl, DciFormat::Dl, 0, 1),
                (VarTtiType::Data, DciFormat::Dl, 1, 6),
                (VarTtiType::Data, DciFormat::Ul, 7, 6),
                (VarTtiType::Ctrl, DciFormat::Ul, 13, 1),
            ]
        );
        let ul = &phy.plans[0].var_tti_alloc_info[2].dci;
        assert_eq!(ul.tb_size, 4 * BSR_BYTES_PER_INDEX);
        assert!(ul.rbg_bitmask.is_fully_set());
        assert_eq!(scheduler.ul_grants(), 1);

        // served; the next slot is DL only
        scheduler.slot_dl_indication(SfnSf::new(0, 0, 1, 0), &mut phy);
        assert_eq!(phy.plans[1].len(), 3);
    }

    #[test]
    fn test_rach_answered_with_rar() {
        let mut phy = FakePhy::new();
        let mut scheduler = RoundRobinScheduler::new();
        scheduler.receive_rach_preamble(7);
        scheduler.receive_rach_preamble(9);

        scheduler.slot_dl_indication(SfnSf::new(0, 0, 1, 0), &mut phy);

        assert_eq!(
            phy.ctrl,
            vec![ControlMessage::Rar(RarMessage {
                ra_rnti: Rnti(15),
                rars: vec![
                    RarElement { rap_id: 7, rnti: Rnti(FIRST_TC_RNTI) },
                    RarElement { rap_id: 9, rnti: Rnti(FIRST_TC_RNTI + 1) },
                ],
            })]
        );

        scheduler.slot_dl_indication(SfnSf::new(0, 1, 0, 0), &mut phy);
        assert_eq!(phy.ctrl.len(), 1);
    }

    #[test]
    fn test_cqi_drives_mcs() {
        let mut phy = FakePhy::new();
        let mut scheduler = RoundRobinScheduler::new();
        scheduler.add_ue(UeTraffic { rnti: Rnti(3), dl_pdu_bytes: 10 });
        scheduler.receive_control_message(ControlMessage::DlCqi(interfaces::message_types::DlCqiInfo {
            rnti: Rnti(3),
            report: CqiReport::PerRb(vec![9, 7, 12]),
        }));

        scheduler.slot_dl_indication(SfnSf::default(), &mut phy);
        assert_eq!(phy.plans[0].var_tti_alloc_info[1].dci.mcs, 14);
    }
}
