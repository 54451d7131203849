//! Downlink Control Information and slot allocation plans
//!
//! A slot allocation plan is produced by the scheduler and consumed, one slot
//! at a time, by the PHY timeline. Each var-TTI allocation wraps one DCI.

use std::sync::Arc;

use common::{Rnti, SfnSf};
use serde::{Deserialize, Serialize};

use crate::InterfaceError;

/// Direction of a var-TTI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DciFormat {
    Dl,
    Ul,
}

/// What a var-TTI carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarTtiType {
    /// Control signalling only
    Ctrl,
    /// User data only
    Data,
    /// Control and data together. Never valid as an executing var-TTI.
    CtrlData,
}

/// Resource block group bitmask, one entry per RBG of the carrier
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RbgBitmask(Vec<bool>);

impl RbgBitmask {
    /// All groups enabled
    pub fn full(width: usize) -> Self {
        Self(vec![true; width])
    }

    /// No group enabled
    pub fn empty(width: usize) -> Self {
        Self(vec![false; width])
    }

    /// Enable exactly the listed groups
    pub fn from_indices(width: usize, groups: &[usize]) -> Self {
        let mut bits = vec![false; width];
        for &g in groups.iter().filter(|&&g| g < width) {
            bits[g] = true;
        }
        Self(bits)
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    pub fn is_set(&self, group: usize) -> bool {
        self.0.get(group).copied().unwrap_or(false)
    }

    pub fn count_set(&self) -> usize {
        self.0.iter().filter(|b| **b).count()
    }

    /// True if every group of the advertised width is enabled
    pub fn is_fully_set(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|b| *b)
    }

    /// Bitwise OR with another mask of the same width
    pub fn merge(&mut self, other: &RbgBitmask) -> Result<(), InterfaceError> {
        if other.width() != self.width() {
            return Err(InterfaceError::WidthMismatch {
                expected: self.width(),
                actual: other.width(),
            });
        }
        for (bit, o) in self.0.iter_mut().zip(other.0.iter()) {
            *bit |= *o;
        }
        Ok(())
    }

    /// Expand enabled groups into resource block indices
    pub fn to_rb_assignment(&self, rb_per_rbg: u32) -> Vec<u32> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .flat_map(|(g, _)| {
                let first = g as u32 * rb_per_rbg;
                first..first + rb_per_rbg
            })
            .collect()
    }
}

/// One grant: who, where in the slot, and how the transport block is coded
#[derive(Debug, Clone, PartialEq)]
pub struct DciInfoElementTdma {
    pub rnti: Rnti,
    pub format: DciFormat,
    pub var_tti_type: VarTtiType,
    /// First symbol of the var-TTI within the slot
    pub sym_start: u8,
    /// Number of symbols
    pub num_sym: u8,
    /// Transport block size in bytes
    pub tb_size: u32,
    pub mcs: u8,
    pub harq_process: u8,
    pub rv: u8,
    /// New data indicator
    pub ndi: bool,
    pub rbg_bitmask: RbgBitmask,
}

impl DciInfoElementTdma {
    /// Control var-TTI spanning the whole carrier
    pub fn ctrl(format: DciFormat, sym_start: u8, num_sym: u8, bandwidth_in_rbg: usize) -> Self {
        Self {
            rnti: Rnti(0),
            format,
            var_tti_type: VarTtiType::Ctrl,
            sym_start,
            num_sym,
            tb_size: 0,
            mcs: 0,
            harq_process: 0,
            rv: 0,
            ndi: false,
            rbg_bitmask: RbgBitmask::full(bandwidth_in_rbg),
        }
    }

    /// Start building a data grant
    pub fn data(rnti: Rnti, format: DciFormat) -> DciBuilder {
        DciBuilder {
            dci: Self {
                rnti,
                format,
                var_tti_type: VarTtiType::Data,
                sym_start: 0,
                num_sym: 0,
                tb_size: 0,
                mcs: 0,
                harq_process: 0,
                rv: 0,
                ndi: true,
                rbg_bitmask: RbgBitmask::default(),
            },
        }
    }

    /// Exclusive end symbol
    pub fn sym_end(&self) -> u32 {
        self.sym_start as u32 + self.num_sym as u32
    }
}

/// Builder for data grants; the DCI is immutable once built
#[derive(Debug, Clone)]
pub struct DciBuilder {
    dci: DciInfoElementTdma,
}

impl DciBuilder {
    pub fn symbols(mut self, sym_start: u8, num_sym: u8) -> Self {
        self.dci.sym_start = sym_start;
        self.dci.num_sym = num_sym;
        self
    }

    pub fn tb_size(mut self, tb_size: u32) -> Self {
        self.dci.tb_size = tb_size;
        self
    }

    pub fn mcs(mut self, mcs: u8) -> Self {
        self.dci.mcs = mcs;
        self
    }

    pub fn harq(mut self, harq_process: u8, rv: u8, ndi: bool) -> Self {
        self.dci.harq_process = harq_process;
        self.dci.rv = rv;
        self.dci.ndi = ndi;
        self
    }

    pub fn rbg_bitmask(mut self, mask: RbgBitmask) -> Self {
        self.dci.rbg_bitmask = mask;
        self
    }

    pub fn var_tti_type(mut self, var_tti_type: VarTtiType) -> Self {
        self.dci.var_tti_type = var_tti_type;
        self
    }

    pub fn build(self) -> Result<DciInfoElementTdma, InterfaceError> {
        if self.dci.num_sym == 0 {
            return Err(InterfaceError::InvalidDci("zero symbols".into()));
        }
        if self.dci.rbg_bitmask.width() == 0 {
            return Err(InterfaceError::InvalidDci("empty RBG bitmask".into()));
        }
        Ok(self.dci)
    }
}

/// One var-TTI of a slot plan
#[derive(Debug, Clone, PartialEq)]
pub struct VarTtiAllocInfo {
    pub dci: Arc<DciInfoElementTdma>,
    /// Transmit with the omni pattern instead of the UE beam
    pub is_omni: bool,
}

impl VarTtiAllocInfo {
    pub fn new(dci: DciInfoElementTdma) -> Self {
        Self { dci: Arc::new(dci), is_omni: false }
    }

    pub fn omni(dci: DciInfoElementTdma) -> Self {
        Self { dci: Arc::new(dci), is_omni: true }
    }
}

/// Allocation plan of one slot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SlotAllocInfo {
    pub sfn_sf: SfnSf,
    pub var_tti_alloc_info: Vec<VarTtiAllocInfo>,
}

impl SlotAllocInfo {
    pub fn new(sfn_sf: SfnSf) -> Self {
        Self { sfn_sf, var_tti_alloc_info: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.var_tti_alloc_info.is_empty()
    }

    pub fn len(&self) -> usize {
        self.var_tti_alloc_info.len()
    }

    /// Insert keeping var-TTIs sorted by symbol start; equal starts keep insertion order
    pub fn push(&mut self, alloc: VarTtiAllocInfo) {
        let pos = self
            .var_tti_alloc_info
            .partition_point(|a| a.dci.sym_start <= alloc.dci.sym_start);
        self.var_tti_alloc_info.insert(pos, alloc);
    }

    /// Absorb the var-TTIs of another plan for the same slot
    pub fn merge(&mut self, other: SlotAllocInfo) {
        for alloc in other.var_tti_alloc_info {
            self.push(alloc);
        }
    }

    /// True if any var-TTI carries user data
    pub fn contains_data_allocation(&self) -> bool {
        self.var_tti_alloc_info
            .iter()
            .any(|a| matches!(a.dci.var_tti_type, VarTtiType::Data | VarTtiType::CtrlData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(rnti: u16, start: u8, len: u8) -> VarTtiAllocInfo {
        VarTtiAllocInfo::new(
            DciInfoElementTdma::data(Rnti(rnti), DciFormat::Dl)
                .symbols(start, len)
                .tb_size(100)
                .rbg_bitmask(RbgBitmask::full(4))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_bitmask_merge_and_expand() {
        let mut a = RbgBitmask::from_indices(4, &[0]);
        a.merge(&RbgBitmask::from_indices(4, &[2])).unwrap();
        assert_eq!(a.count_set(), 2);
        assert!(!a.is_fully_set());
        assert_eq!(a.to_rb_assignment(2), vec![0, 1, 4, 5]);

        let err = a.merge(&RbgBitmask::full(3)).unwrap_err();
        assert!(matches!(err, InterfaceError::WidthMismatch { expected: 4, actual: 3 }));
    }

    #[test]
    fn test_builder_rejects_incomplete_dci() {
        assert!(DciInfoElementTdma::data(Rnti(1), DciFormat::Ul).tb_size(10).build().is_err());
        assert!(DciInfoElementTdma::data(Rnti(1), DciFormat::Ul).symbols(2, 3).build().is_err());
    }

    #[test]
    fn test_slot_plan_keeps_symbol_order() {
        let mut plan = SlotAllocInfo::new(SfnSf::new(0, 0, 0, 0));
        plan.push(data(1, 5, 2));
        plan.push(VarTtiAllocInfo::new(DciInfoElementTdma::ctrl(DciFormat::Dl, 0, 1, 4)));
        plan.push(data(2, 5, 2));
        let starts: Vec<_> = plan.var_tti_alloc_info.iter().map(|a| (a.dci.sym_start, a.dci.rnti.0)).collect();
        assert_eq!(starts, vec![(0, 0), (5, 1), (5, 2)]);
        assert!(plan.contains_data_allocation());
    }

    #[test]
    fn test_ctrl_only_plan_has_no_data() {
        let mut plan = SlotAllocInfo::new(SfnSf::default());
        plan.push(VarTtiAllocInfo::new(DciInfoElementTdma::ctrl(DciFormat::Dl, 0, 1, 4)));
        plan.push(VarTtiAllocInfo::new(DciInfoElementTdma::ctrl(DciFormat::Ul, 13, 1, 4)));
        assert!(!plan.contains_data_allocation());
    }
}
