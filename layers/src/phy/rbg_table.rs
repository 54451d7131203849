//! Per-symbol RBG allocation table
//!
//! Built during the DL control var-TTI from every DL data grant of the slot.
//! The data var-TTIs that follow look up the groups to enable by their start
//! symbol.

use std::collections::BTreeMap;

use interfaces::{DciInfoElementTdma, RbgBitmask};

use crate::LayerError;

#[derive(Debug, Clone)]
pub struct RbgAllocationTable {
    bandwidth_in_rbg: usize,
    per_symbol: BTreeMap<u8, RbgBitmask>,
}

impl RbgAllocationTable {
    pub fn new(bandwidth_in_rbg: usize) -> Self {
        Self { bandwidth_in_rbg, per_symbol: BTreeMap::new() }
    }

    pub fn clear(&mut self) {
        self.per_symbol.clear();
    }

    pub fn len(&self) -> usize {
        self.per_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_symbol.is_empty()
    }

    /// OR the grant's bitmask into the entry of its start symbol
    pub fn store(&mut self, dci: &DciInfoElementTdma) -> Result<(), LayerError> {
        if dci.rbg_bitmask.width() != self.bandwidth_in_rbg {
            return Err(LayerError::RbgWidthMismatch {
                expected: self.bandwidth_in_rbg,
                actual: dci.rbg_bitmask.width(),
            });
        }

        match self.per_symbol.get_mut(&dci.sym_start) {
            Some(existing) => existing.merge(&dci.rbg_bitmask)?,
            None => {
                self.per_symbol.insert(dci.sym_start, dci.rbg_bitmask.clone());
            }
        }
        Ok(())
    }

    pub fn get(&self, sym_start: u8) -> Option<&RbgBitmask> {
        self.per_symbol.get(&sym_start)
    }

    /// Resource blocks enabled for the var-TTIs starting at `sym_start`
    pub fn rb_assignment(&self, sym_start: u8, rb_per_rbg: u32) -> Result<Vec<u32>, LayerError> {
        self.get(sym_start)
            .map(|mask| mask.to_rb_assignment(rb_per_rbg))
            .ok_or(LayerError::MissingRbgAllocation(sym_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Rnti;
    use interfaces::DciFormat;

    fn grant(rnti: u16, start: u8, mask: RbgBitmask) -> DciInfoElementTdma {
        DciInfoElementTdma::data(Rnti(rnti), DciFormat::Dl)
            .symbols(start, 4)
            .tb_size(100)
            .rbg_bitmask(mask)
            .build()
            .unwrap()
    }

    #[test]
    fn test_same_start_symbol_merges() {
        let mut table = RbgAllocationTable::new(6);
        table.store(&grant(1, 2, RbgBitmask::from_indices(6, &[0, 1]))).unwrap();
        table.store(&grant(2, 2, RbgBitmask::from_indices(6, &[4]))).unwrap();
        table.store(&grant(3, 7, RbgBitmask::from_indices(6, &[5]))).unwrap();

        assert_eq!(table.len(), 2);
        let merged = table.get(2).unwrap();
        assert_eq!(merged.width(), 6);
        assert_eq!(merged.count_set(), 3);
        assert!(merged.is_set(4));
        assert_eq!(table.rb_assignment(7, 2).unwrap(), vec![10, 11]);
    }

    #[test]
    fn test_width_must_match_bandwidth() {
        let mut table = RbgAllocationTable::new(6);
        let err = table.store(&grant(1, 0, RbgBitmask::full(5))).unwrap_err();
        assert_eq!(err, LayerError::RbgWidthMismatch { expected: 6, actual: 5 });
        assert!(table.is_empty());
    }

    #[test]
    fn test_missing_entry() {
        let mut table = RbgAllocationTable::new(2);
        table.store(&grant(1, 1, RbgBitmask::full(2))).unwrap();
        table.clear();
        assert_eq!(table.rb_assignment(1, 4).unwrap_err(), LayerError::MissingRbgAllocation(1));
    }
}
