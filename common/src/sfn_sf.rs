//! Frame Timestamp
//!
//! `SfnSf` identifies a position on the slot grid: system frame number,
//! subframe, slot within the subframe, and an opaque symbol position.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Position on the slot grid
///
/// Ordering is lexicographic over (frame, subframe, slot, symbol). Slot
/// arithmetic never looks at `symbol`; it is carried through unchanged.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SfnSf {
    /// System frame number
    pub frame: u16,
    /// Subframe within the frame
    pub subframe: u8,
    /// Slot within the subframe
    pub slot: u16,
    /// Symbol (or var-TTI) position within the slot
    pub symbol: u32,
}

impl SfnSf {
    pub fn new(frame: u16, subframe: u8, slot: u16, symbol: u32) -> Self {
        Self { frame, subframe, slot, symbol }
    }

    /// Same slot, different symbol position
    pub fn with_symbol(self, symbol: u32) -> Self {
        Self { symbol, ..self }
    }

    /// True if both timestamps refer to the same slot, whatever the symbol
    pub fn same_slot(&self, other: &SfnSf) -> bool {
        self.frame == other.frame && self.subframe == other.subframe && self.slot == other.slot
    }

    /// Advance by one slot, wrapping slot into subframe and subframe into frame
    pub fn increase_no_of_slots(self, slots_per_subframe: u16, subframes_per_frame: u8) -> SfnSf {
        let mut ret = self;
        ret.slot += 1;
        if ret.slot >= slots_per_subframe {
            ret.slot = 0;
            ret.subframe += 1;
        }
        if ret.subframe >= subframes_per_frame {
            ret.subframe = 0;
            ret.frame = ret.frame.wrapping_add(1);
        }
        ret
    }

    /// Advance by `latency` slots
    pub fn increase_no_of_slots_with_latency(
        self,
        latency: u32,
        slots_per_subframe: u16,
        subframes_per_frame: u8,
    ) -> SfnSf {
        (0..latency).fold(self, |sfn, _| sfn.increase_no_of_slots(slots_per_subframe, subframes_per_frame))
    }

    /// Slot whose uplink grants are announced in this slot, given the UL scheduling delay
    pub fn calculate_uplink_slot(
        self,
        ul_sched_delay: u32,
        slots_per_subframe: u16,
        subframes_per_frame: u8,
    ) -> SfnSf {
        self.increase_no_of_slots_with_latency(ul_sched_delay, slots_per_subframe, subframes_per_frame)
    }

    /// Absolute slot index since frame 0, ignoring the symbol
    pub fn normalize(&self, slots_per_subframe: u16, subframes_per_frame: u8) -> u64 {
        let slots_per_frame = slots_per_subframe as u64 * subframes_per_frame as u64;
        self.frame as u64 * slots_per_frame
            + self.subframe as u64 * slots_per_subframe as u64
            + self.slot as u64
    }
}

impl fmt::Display for SfnSf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:5}/{:02}/{:02}/{:02}", self.frame, self.subframe, self.slot, self.symbol)
    }
}

impl fmt::Debug for SfnSf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:5}/{:02}/{:02}/{:02}", self.frame, self.subframe, self.slot, self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increase_wraps_subframe_and_frame() {
        let sfn = SfnSf::new(3, 9, 1, 0);
        let next = sfn.increase_no_of_slots(2, 10);
        assert_eq!(next, SfnSf::new(4, 0, 0, 0));

        let sfn = SfnSf::new(3, 4, 0, 0);
        assert_eq!(sfn.increase_no_of_slots(2, 10), SfnSf::new(3, 4, 1, 0));
        assert_eq!(sfn.increase_no_of_slots(1, 10), SfnSf::new(3, 5, 0, 0));
    }

    #[test]
    fn test_full_grid_returns_to_same_slot() {
        let (slots_per_sf, sf_per_frame) = (4u16, 10u8);
        let start = SfnSf::new(7, 3, 2, 5);
        let mut sfn = start;
        for _ in 0..(slots_per_sf as u32 * sf_per_frame as u32) {
            sfn = sfn.increase_no_of_slots(slots_per_sf, sf_per_frame);
        }
        assert_eq!(sfn.subframe, start.subframe);
        assert_eq!(sfn.slot, start.slot);
        assert_eq!(sfn.frame, start.frame + 1);
        // symbol position is carried, not counted
        assert_eq!(sfn.symbol, 5);
    }

    #[test]
    fn test_frame_number_wraps() {
        let sfn = SfnSf::new(u16::MAX, 9, 0, 0);
        assert_eq!(sfn.increase_no_of_slots(1, 10), SfnSf::new(0, 0, 0, 0));
    }

    #[test]
    fn test_uplink_slot_and_normalize() {
        let sfn = SfnSf::new(0, 9, 1, 0);
        let ul = sfn.calculate_uplink_slot(3, 2, 10);
        assert_eq!(ul, SfnSf::new(1, 1, 0, 0));
        assert_eq!(ul.normalize(2, 10) - sfn.normalize(2, 10), 3);
        assert_eq!(sfn.calculate_uplink_slot(0, 2, 10), sfn);
    }

    #[test]
    fn test_ordering() {
        assert!(SfnSf::new(1, 0, 0, 0) > SfnSf::new(0, 9, 3, 13));
        assert!(SfnSf::new(1, 2, 0, 0) < SfnSf::new(1, 2, 1, 0));
        assert!(SfnSf::new(1, 2, 1, 0) < SfnSf::new(1, 2, 1, 3));
        assert!(SfnSf::new(1, 2, 1, 0).same_slot(&SfnSf::new(1, 2, 1, 3)));
    }
}
