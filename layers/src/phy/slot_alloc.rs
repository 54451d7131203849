//! Slot Allocation Store
//!
//! Holds the slot plans handed over by the scheduler, oldest first. The front
//! plan is consumed once per slot; a slot that could not be transmitted is
//! pushed back to the front under the next slot's timestamp.

use std::collections::VecDeque;

use common::SfnSf;
use interfaces::SlotAllocInfo;
use tracing::{debug, trace};

use crate::LayerError;

/// Plans ordered by strictly increasing slot
#[derive(Debug, Default)]
pub struct SlotAllocStore {
    plans: VecDeque<SlotAllocInfo>,
}

impl SlotAllocStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Store a plan; a plan for an already stored slot is merged into it
    pub fn set_slot_alloc_info(&mut self, plan: SlotAllocInfo) {
        let key = slot_key(&plan.sfn_sf);
        let pos = self.plans.partition_point(|p| slot_key(&p.sfn_sf) < key);

        match self.plans.get_mut(pos) {
            Some(existing) if slot_key(&existing.sfn_sf) == key => {
                trace!("Merging {} var-TTIs into stored plan {}", plan.len(), existing.sfn_sf);
                existing.merge(plan);
            }
            _ => {
                trace!("Storing plan {} with {} var-TTIs", plan.sfn_sf, plan.len());
                self.plans.insert(pos, SlotAllocInfo { sfn_sf: plan.sfn_sf.with_symbol(0), ..plan });
            }
        }
    }

    /// True if a plan is stored for the slot of `sfn`
    pub fn exists(&self, sfn: &SfnSf) -> bool {
        self.peek(sfn).is_some()
    }

    /// Plan stored for the slot of `sfn`, without consuming it
    pub fn peek(&self, sfn: &SfnSf) -> Option<&SlotAllocInfo> {
        self.plans.iter().find(|p| p.sfn_sf.same_slot(sfn))
    }

    /// Remove and return the plan stored for the slot of `sfn`
    pub fn take(&mut self, sfn: &SfnSf) -> Option<SlotAllocInfo> {
        let pos = self.plans.iter().position(|p| p.sfn_sf.same_slot(sfn))?;
        self.plans.remove(pos)
    }

    /// Consume the plan for the slot that is starting
    ///
    /// A missing plan, or one that belongs to a later slot, yields an empty
    /// plan. A stored plan older than `expected` means the pipeline lost
    /// track of time and is reported as a mismatch.
    pub fn retrieve_current(&mut self, expected: SfnSf) -> Result<SlotAllocInfo, LayerError> {
        let expected = expected.with_symbol(0);
        let Some(front) = self.plans.front() else {
            return Ok(SlotAllocInfo::new(expected));
        };

        let front_key = slot_key(&front.sfn_sf);
        if front_key < slot_key(&expected) {
            return Err(LayerError::SlotMismatch { expected, actual: front.sfn_sf });
        }
        if front_key > slot_key(&expected) {
            return Ok(SlotAllocInfo::new(expected));
        }
        Ok(self.plans.pop_front().unwrap_or_else(|| SlotAllocInfo::new(expected)))
    }

    /// Re-queue a plan at the front of the store under `new_sfn`
    ///
    /// Stored plans that would collide are moved one slot later, cascading
    /// until the keys are strictly increasing again. Returns every
    /// (old slot, new slot) pair that moved, the re-queued plan first.
    pub fn push_front(
        &mut self,
        new_sfn: SfnSf,
        mut plan: SlotAllocInfo,
        slots_per_subframe: u16,
        subframes_per_frame: u8,
    ) -> Vec<(SfnSf, SfnSf)> {
        let new_sfn = new_sfn.with_symbol(0);
        let mut remaps = vec![(plan.sfn_sf.with_symbol(0), new_sfn)];
        plan.sfn_sf = new_sfn;

        let mut next_free = new_sfn.increase_no_of_slots(slots_per_subframe, subframes_per_frame);
        for stored in self.plans.iter_mut() {
            if slot_key(&stored.sfn_sf) >= slot_key(&next_free) {
                break;
            }
            debug!("Shifting plan {} to {}", stored.sfn_sf, next_free);
            remaps.push((stored.sfn_sf, next_free));
            stored.sfn_sf = next_free;
            next_free = next_free.increase_no_of_slots(slots_per_subframe, subframes_per_frame);
        }

        self.plans.push_front(plan);
        remaps
    }

    /// Slot timestamps currently stored, oldest first
    pub fn slots(&self) -> Vec<SfnSf> {
        self.plans.iter().map(|p| p.sfn_sf).collect()
    }
}

fn slot_key(sfn: &SfnSf) -> (u16, u8, u16) {
    (sfn.frame, sfn.subframe, sfn.slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Rnti;
    use interfaces::{DciFormat, DciInfoElementTdma, RbgBitmask, VarTtiAllocInfo};

    fn plan(frame: u16, subframe: u8, slot: u16, starts: &[u8]) -> SlotAllocInfo {
        let mut plan = SlotAllocInfo::new(SfnSf::new(frame, subframe, slot, 0));
        for &start in starts {
            plan.push(VarTtiAllocInfo::new(
                DciInfoElementTdma::data(Rnti(1), DciFormat::Dl)
                    .symbols(start, 1)
                    .tb_size(10)
                    .rbg_bitmask(RbgBitmask::full(2))
                    .build()
                    .unwrap(),
            ));
        }
        plan
    }

    #[test]
    fn test_retrieve_in_order() {
        let mut store = SlotAllocStore::new();
        store.set_slot_alloc_info(plan(0, 0, 1, &[2]));
        store.set_slot_alloc_info(plan(0, 0, 0, &[1]));
        assert_eq!(store.slots(), vec![SfnSf::new(0, 0, 0, 0), SfnSf::new(0, 0, 1, 0)]);

        let current = store.retrieve_current(SfnSf::new(0, 0, 0, 3)).unwrap();
        assert_eq!(current.sfn_sf, SfnSf::new(0, 0, 0, 0));
        assert_eq!(current.len(), 1);
        assert!(store.exists(&SfnSf::new(0, 0, 1, 0)));
        assert!(!store.exists(&SfnSf::new(0, 0, 0, 0)));
    }

    #[test]
    fn test_missing_or_future_plan_is_empty() {
        let mut store = SlotAllocStore::new();
        let empty = store.retrieve_current(SfnSf::new(2, 3, 0, 0)).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.sfn_sf, SfnSf::new(2, 3, 0, 0));

        store.set_slot_alloc_info(plan(2, 4, 0, &[0]));
        assert!(store.retrieve_current(SfnSf::new(2, 3, 0, 0)).unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_stale_plan_is_a_mismatch() {
        let mut store = SlotAllocStore::new();
        store.set_slot_alloc_info(plan(0, 1, 0, &[0]));
        let err = store.retrieve_current(SfnSf::new(0, 2, 0, 0)).unwrap_err();
        assert_eq!(
            err,
            LayerError::SlotMismatch { expected: SfnSf::new(0, 2, 0, 0), actual: SfnSf::new(0, 1, 0, 0) }
        );
    }

    #[test]
    fn test_same_slot_plans_merge() {
        let mut store = SlotAllocStore::new();
        store.set_slot_alloc_info(plan(1, 0, 0, &[5]));
        store.set_slot_alloc_info(plan(1, 0, 0, &[0, 9]));
        assert_eq!(store.len(), 1);
        let starts: Vec<u8> = store
            .peek(&SfnSf::new(1, 0, 0, 0))
            .unwrap()
            .var_tti_alloc_info
            .iter()
            .map(|a| a.dci.sym_start)
            .collect();
        assert_eq!(starts, vec![0, 5, 9]);
    }

    #[test]
    fn test_take_removes_only_that_slot() {
        let mut store = SlotAllocStore::new();
        store.set_slot_alloc_info(plan(0, 0, 0, &[0]));
        store.set_slot_alloc_info(plan(0, 0, 1, &[4, 7]));

        let taken = store.take(&SfnSf::new(0, 0, 1, 9)).unwrap();
        assert_eq!(taken.len(), 2);
        assert!(store.take(&SfnSf::new(0, 0, 1, 0)).is_none());
        assert_eq!(store.slots(), vec![SfnSf::new(0, 0, 0, 0)]);
    }

    #[test]
    fn test_push_front_cascades() {
        let mut store = SlotAllocStore::new();
        store.set_slot_alloc_info(plan(0, 0, 1, &[1]));
        store.set_slot_alloc_info(plan(0, 1, 0, &[2]));
        store.set_slot_alloc_info(plan(0, 2, 0, &[3]));

        let deferred = plan(0, 0, 0, &[0]);
        let remaps = store.push_front(SfnSf::new(0, 0, 1, 0), deferred, 2, 10);

        assert_eq!(
            remaps,
            vec![
                (SfnSf::new(0, 0, 0, 0), SfnSf::new(0, 0, 1, 0)),
                (SfnSf::new(0, 0, 1, 0), SfnSf::new(0, 1, 0, 0)),
                (SfnSf::new(0, 1, 0, 0), SfnSf::new(0, 1, 1, 0)),
            ]
        );
        assert_eq!(
            store.slots(),
            vec![
                SfnSf::new(0, 0, 1, 0),
                SfnSf::new(0, 1, 0, 0),
                SfnSf::new(0, 1, 1, 0),
                SfnSf::new(0, 2, 0, 0),
            ]
        );
        // the re-queued plan keeps its var-TTIs
        assert_eq!(store.peek(&SfnSf::new(0, 0, 1, 0)).unwrap().var_tti_alloc_info[0].dci.sym_start, 0);
    }

    #[test]
    fn test_push_front_into_empty_store() {
        let mut store = SlotAllocStore::new();
        let remaps = store.push_front(SfnSf::new(0, 9, 0, 0), plan(0, 8, 0, &[0]), 1, 10);
        assert_eq!(remaps.len(), 1);
        assert_eq!(store.retrieve_current(SfnSf::new(0, 9, 0, 0)).unwrap().len(), 1);
    }
}
