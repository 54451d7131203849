//! System Information Block 1 (SIB1) Generation
//!
//! Builds the SIB1 broadcast by the PHY from the cell configuration, and a
//! compact byte encoding of it.

use bytes::{BufMut, Bytes, BytesMut};
use common::{CellId, PlmnId, Tac, TddSlotType};
use interfaces::message_types::{Sib1Message, SystemInformationBlockType1};
use tracing::{debug, info};

use crate::LayerError;

/// SIB1 configuration
#[derive(Debug, Clone)]
pub struct Sib1Config {
    /// Cell ID
    pub cell_id: CellId,
    /// PLMN identity (MCC + MNC)
    pub plmn_id: PlmnId,
    /// Tracking area code
    pub tac: Tac,
    /// Cell selection parameters
    pub cell_selection_info: CellSelectionInfo,
    /// Frequency band list
    pub freq_band_list: Vec<u16>,
    /// TDD pattern announced to UEs; empty for FDD
    pub tdd_pattern: Vec<TddSlotType>,
}

/// Cell selection information
#[derive(Debug, Clone, Copy)]
pub struct CellSelectionInfo {
    /// Minimum required RX level (value * 2 dBm)
    pub q_rx_lev_min: i8,
    /// Offset to q_rx_lev_min
    pub q_rx_lev_min_offset: u8,
}

impl Default for CellSelectionInfo {
    fn default() -> Self {
        Self {
            q_rx_lev_min: -70, // -140 dBm
            q_rx_lev_min_offset: 0,
        }
    }
}

/// SIB1 message generator
pub struct Sib1Generator {
    config: Sib1Config,
}

impl Sib1Generator {
    /// Create a new SIB1 generator
    pub fn new(config: Sib1Config) -> Result<Self, LayerError> {
        if config.tac.0 > 0xFF_FFFF {
            return Err(LayerError::InvalidConfiguration(format!("TAC {} exceeds 24 bits", config.tac.0)));
        }
        if config.freq_band_list.is_empty() {
            return Err(LayerError::InvalidConfiguration("SIB1 needs at least one frequency band".into()));
        }
        Ok(Self { config })
    }

    /// SIB1 as handed to the PHY
    pub fn generate_sib1(&self) -> Sib1Message {
        let sib1 = SystemInformationBlockType1 {
            plmn_identity: self.config.plmn_id.encode(),
            cell_identity: self.config.cell_id.0 as u32,
            tracking_area_code: self.config.tac.0,
            cell_barred: false,
            q_rx_lev_min: self.config.cell_selection_info.q_rx_lev_min,
            q_rx_lev_min_offset: self.config.cell_selection_info.q_rx_lev_min_offset,
            freq_band_list: self.config.freq_band_list.clone(),
        };
        debug!("Generated SIB1 for cell {} with {} TDD slots", sib1.cell_identity, self.config.tdd_pattern.len());
        Sib1Message { sib1, tdd_pattern: self.config.tdd_pattern.clone() }
    }

    /// Compact byte encoding of the SIB1
    pub fn encode(&self) -> Bytes {
        let msg = self.generate_sib1();
        let mut buffer = BytesMut::with_capacity(32 + msg.tdd_pattern.len());

        // Message type indicator
        buffer.put_u8(0x80);

        // PLMN Identity List
        buffer.put_u8(1);
        buffer.put_slice(&msg.sib1.plmn_identity);

        // Tracking Area Code (24 bits)
        let tac = msg.sib1.tracking_area_code;
        buffer.put_slice(&tac.to_be_bytes()[1..]);

        // Cell Identity (28 bits, left-aligned)
        buffer.put_u32(msg.sib1.cell_identity << 4);

        buffer.put_u8(msg.sib1.cell_barred as u8);

        // Cell Selection Info
        buffer.put_i8(msg.sib1.q_rx_lev_min);
        buffer.put_u8(msg.sib1.q_rx_lev_min_offset);

        // Frequency Band Indicator
        buffer.put_u8(msg.sib1.freq_band_list.len() as u8);
        for band in &msg.sib1.freq_band_list {
            buffer.put_u16(*band);
        }

        // TDD-UL-DL-ConfigCommon, one octet per slot
        buffer.put_u8(msg.tdd_pattern.len() as u8);
        for slot in &msg.tdd_pattern {
            buffer.put_u8(match slot {
                TddSlotType::Dl => 0,
                TddSlotType::S => 1,
                TddSlotType::F => 2,
                TddSlotType::Ul => 3,
            });
        }

        info!("Encoded SIB1 message: {} bytes", buffer.len());
        buffer.freeze()
    }
}

/// Create default SIB1 configuration for testing
pub fn default_sib1_config(cell_id: CellId) -> Sib1Config {
    Sib1Config {
        cell_id,
        plmn_id: PlmnId { mcc: [0, 0, 1], mnc: [0, 1, 0], mnc_len: 2 },
        tac: Tac(1),
        cell_selection_info: CellSelectionInfo::default(),
        freq_band_list: vec![78],
        tdd_pattern: vec![
            TddSlotType::Dl,
            TddSlotType::Dl,
            TddSlotType::Dl,
            TddSlotType::S,
            TddSlotType::Ul,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sib1_contents() {
        let generator = Sib1Generator::new(default_sib1_config(CellId(1))).unwrap();
        let msg = generator.generate_sib1();

        assert_eq!(msg.sib1.plmn_identity, [0x00, 0xF1, 0x10]);
        assert_eq!(msg.sib1.cell_identity, 1);
        assert_eq!(msg.sib1.tracking_area_code, 1);
        assert_eq!(msg.tdd_pattern.len(), 5);
    }

    #[test]
    fn test_sib1_encoding() {
        let generator = Sib1Generator::new(default_sib1_config(CellId(0x123))).unwrap();
        let encoded = generator.encode();

        assert_eq!(encoded[0], 0x80);
        assert_eq!(&encoded[2..5], &[0x00, 0xF1, 0x10]);
        assert_eq!(&encoded[5..8], &[0x00, 0x00, 0x01]);
        assert_eq!(&encoded[8..12], &(0x123u32 << 4).to_be_bytes());
        // header, PLMN, TAC, cell id, barred, selection, 1 band, 5 TDD slots
        assert_eq!(encoded.len(), 2 + 3 + 3 + 4 + 1 + 2 + 3 + 6);
        assert_eq!(encoded[encoded.len() - 2], 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = default_sib1_config(CellId(1));
        config.tac = Tac(0x100_0000);
        assert!(Sib1Generator::new(config).is_err());

        let mut config = default_sib1_config(CellId(1));
        config.freq_band_list.clear();
        assert!(Sib1Generator::new(config).is_err());
    }
}
