//! PHY/MAC timing configuration
//!
//! One immutable record, built before the run and shared by every component
//! of the timeline.

use std::time::Duration;

use common::utils::time;
use common::{calculate_nrb, Bandwidth, CcId, SubcarrierSpacing};

use crate::LayerError;

/// Timing and bandwidth parameters of one component carrier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhyMacConfig {
    /// Subcarrier spacing
    pub scs: SubcarrierSpacing,
    /// OFDM symbols per slot (14 normal CP, 12 extended CP)
    pub symbols_per_slot: u8,
    /// Slots per 1 ms subframe
    pub slots_per_subframe: u16,
    /// Subframes per frame
    pub subframes_per_frame: u8,
    /// Symbols of the DL control var-TTI
    pub dl_ctrl_symbols: u8,
    /// Symbols of the UL control var-TTI
    pub ul_ctrl_symbols: u8,
    /// Slots between an UL grant and the UL transmission
    pub ul_sched_delay: u32,
    /// Carrier bandwidth in resource block groups
    pub bandwidth_in_rbg: usize,
    /// Resource blocks per group
    pub rb_per_rbg: u32,
    /// Component carrier index
    pub cc_id: CcId,
    /// Slots between the MAC handing over a control message and its transmission
    pub l1l2_ctrl_latency: u32,
    /// Delay between the end of a reception and the PDU reaching the MAC
    pub tb_decode_latency: Duration,
    /// Interval between beamforming refresh passes; zero disables them
    pub beamforming_periodicity: Duration,
}

impl PhyMacConfig {
    /// Build the default configuration for a numerology and carrier bandwidth
    pub fn from_scs(scs: SubcarrierSpacing, bandwidth: Bandwidth, extended_cp: bool) -> Self {
        let rb_per_rbg = 4;
        let nrb = calculate_nrb(bandwidth.as_hz(), scs.khz()) as u32;

        Self {
            scs,
            symbols_per_slot: if extended_cp { 12 } else { 14 },
            slots_per_subframe: time::slots_per_subframe(scs),
            subframes_per_frame: time::SUBFRAMES_PER_FRAME,
            dl_ctrl_symbols: 1,
            ul_ctrl_symbols: 1,
            ul_sched_delay: 1,
            bandwidth_in_rbg: (nrb / rb_per_rbg).max(1) as usize,
            rb_per_rbg,
            cc_id: CcId(0),
            l1l2_ctrl_latency: 2,
            tb_decode_latency: Duration::from_micros(100),
            beamforming_periodicity: Duration::from_millis(100),
        }
    }

    /// Duration of one symbol, in whole nanoseconds
    pub fn symbol_period(&self) -> Duration {
        let nominal = time::slot_duration_ns(self.scs);
        Duration::from_nanos(nominal / self.symbols_per_slot as u64)
    }

    /// Duration of one slot; always an exact multiple of the symbol period
    pub fn slot_period(&self) -> Duration {
        self.symbol_period() * self.symbols_per_slot as u32
    }

    /// Carrier bandwidth in resource blocks
    pub fn bandwidth_in_rbs(&self) -> u32 {
        self.bandwidth_in_rbg as u32 * self.rb_per_rbg
    }

    /// Every resource block of the carrier
    pub fn full_bandwidth_rbs(&self) -> Vec<u32> {
        (0..self.bandwidth_in_rbs()).collect()
    }

    pub fn slots_per_frame(&self) -> u32 {
        self.slots_per_subframe as u32 * self.subframes_per_frame as u32
    }

    /// Check the record is internally consistent
    pub fn validate(&self) -> Result<(), LayerError> {
        if self.symbols_per_slot == 0 {
            return Err(LayerError::InvalidConfiguration("symbols per slot must be positive".into()));
        }
        if self.slots_per_subframe == 0 || self.subframes_per_frame == 0 {
            return Err(LayerError::InvalidConfiguration("empty slot grid".into()));
        }
        if self.dl_ctrl_symbols as u32 + self.ul_ctrl_symbols as u32 > self.symbols_per_slot as u32 {
            return Err(LayerError::InvalidConfiguration(format!(
                "{} DL + {} UL control symbols do not fit a {}-symbol slot",
                self.dl_ctrl_symbols, self.ul_ctrl_symbols, self.symbols_per_slot
            )));
        }
        if self.bandwidth_in_rbg == 0 || self.rb_per_rbg == 0 {
            return Err(LayerError::InvalidConfiguration("bandwidth must span at least one RB".into()));
        }
        if self.l1l2_ctrl_latency == 0 {
            return Err(LayerError::InvalidConfiguration("L1/L2 control latency must be at least one slot".into()));
        }
        // Data var-TTIs are transmitted 1 ns late and end 2 ns early
        if self.symbol_period() < Duration::from_nanos(3) {
            return Err(LayerError::InvalidConfiguration("symbol period too short".into()));
        }
        Ok(())
    }
}
