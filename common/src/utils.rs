//! Common Utilities
//!
//! Provides utility functions used across the gNB timeline

use tracing::trace;

use crate::types::SubcarrierSpacing;

/// Convert a byte slice to hex string for debugging
pub fn bytes_to_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Calculate resource blocks from bandwidth and subcarrier spacing
pub fn calculate_nrb(bandwidth_hz: u32, scs_khz: u16) -> u16 {
    // Each RB has 12 subcarriers
    const SUBCARRIERS_PER_RB: u32 = 12;

    let scs_hz = scs_khz as u32 * 1000;
    let total_subcarriers = bandwidth_hz / scs_hz;
    let nrb = total_subcarriers / SUBCARRIERS_PER_RB;

    trace!("Calculated {} RBs for {}Hz bandwidth with {}kHz SCS",
           nrb, bandwidth_hz, scs_khz);

    nrb as u16
}

/// Time utilities for slot/frame calculations
pub mod time {
    use super::SubcarrierSpacing;

    /// Subframes in one 10 ms frame
    pub const SUBFRAMES_PER_FRAME: u8 = 10;

    /// Nominal slot duration in nanoseconds for a subcarrier spacing
    pub fn slot_duration_ns(scs: SubcarrierSpacing) -> u64 {
        1_000_000 >> scs.numerology()
    }

    /// Number of slots per subframe (1 ms)
    pub fn slots_per_subframe(scs: SubcarrierSpacing) -> u16 {
        1 << scs.numerology()
    }

    /// Number of slots per frame (10 ms)
    pub fn slots_per_frame(scs: SubcarrierSpacing) -> u16 {
        slots_per_subframe(scs) * SUBFRAMES_PER_FRAME as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_hex() {
        let data = vec![0x12, 0x34, 0xAB, 0xCD];
        assert_eq!(bytes_to_hex(&data), "12 34 ab cd");
    }

    #[test]
    fn test_calculate_nrb() {
        // 20 MHz bandwidth with 30 kHz SCS
        assert_eq!(calculate_nrb(20_000_000, 30), 55);

        // 100 MHz bandwidth with 30 kHz SCS
        assert_eq!(calculate_nrb(100_000_000, 30), 277);
    }

    #[test]
    fn test_slot_duration() {
        assert_eq!(time::slot_duration_ns(SubcarrierSpacing::Scs15), 1_000_000);
        assert_eq!(time::slot_duration_ns(SubcarrierSpacing::Scs30), 500_000);
        assert_eq!(time::slot_duration_ns(SubcarrierSpacing::Scs120), 125_000);
        assert_eq!(time::slots_per_frame(SubcarrierSpacing::Scs60), 40);
    }
}
