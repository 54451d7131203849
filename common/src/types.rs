//! Common Types for the gNB timeline
//!
//! Defines fundamental identifiers and radio parameters shared by every crate

use serde::{Deserialize, Serialize};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use thiserror::Error;

/// Errors raised while building common types from raw values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Invalid subcarrier spacing: {0} kHz")]
    InvalidScs(u32),

    #[error("Invalid bandwidth: {0} MHz")]
    InvalidBandwidth(u32),

    #[error("Invalid PLMN: {0}")]
    InvalidPlmn(String),
}

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Rnti(pub u16);

impl Rnti {
    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for Rnti {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscriber identity, used to register UE devices with the cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Imsi(pub u64);

/// Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct CellId(pub u16);

/// Component carrier index within the cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct CcId(pub u8);

/// Identifier of an antenna beam: a pair of (azimuth, elevation) sector indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BeamId(pub u16, pub u16);

impl BeamId {
    /// Beam used when no UE-specific beam is known
    pub const DEFAULT: Self = Self(0, 0);
}

/// Subcarrier spacing values in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum SubcarrierSpacing {
    /// 15 kHz
    Scs15 = 15,
    /// 30 kHz
    Scs30 = 30,
    /// 60 kHz
    Scs60 = 60,
    /// 120 kHz
    Scs120 = 120,
    /// 240 kHz
    Scs240 = 240,
}

impl SubcarrierSpacing {
    /// Parse a spacing given in kHz
    pub fn from_khz(khz: u32) -> Result<Self, TypeError> {
        Self::from_u32(khz).ok_or(TypeError::InvalidScs(khz))
    }

    /// Spacing in kHz
    pub fn khz(&self) -> u16 {
        *self as u16
    }

    /// Numerology index (mu)
    pub fn numerology(&self) -> u8 {
        match self {
            SubcarrierSpacing::Scs15 => 0,
            SubcarrierSpacing::Scs30 => 1,
            SubcarrierSpacing::Scs60 => 2,
            SubcarrierSpacing::Scs120 => 3,
            SubcarrierSpacing::Scs240 => 4,
        }
    }
}

/// Bandwidth values in MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    /// 5 MHz
    Bw5,
    /// 10 MHz
    Bw10,
    /// 20 MHz
    Bw20,
    /// 40 MHz
    Bw40,
    /// 50 MHz
    Bw50,
    /// 100 MHz
    Bw100,
    /// 200 MHz
    Bw200,
    /// 400 MHz
    Bw400,
}

impl Bandwidth {
    /// Parse a bandwidth given in MHz
    pub fn from_mhz(mhz: u32) -> Result<Self, TypeError> {
        match mhz {
            5 => Ok(Bandwidth::Bw5),
            10 => Ok(Bandwidth::Bw10),
            20 => Ok(Bandwidth::Bw20),
            40 => Ok(Bandwidth::Bw40),
            50 => Ok(Bandwidth::Bw50),
            100 => Ok(Bandwidth::Bw100),
            200 => Ok(Bandwidth::Bw200),
            400 => Ok(Bandwidth::Bw400),
            _ => Err(TypeError::InvalidBandwidth(mhz)),
        }
    }

    /// Get bandwidth in Hz
    pub fn as_hz(&self) -> u32 {
        match self {
            Bandwidth::Bw5 => 5_000_000,
            Bandwidth::Bw10 => 10_000_000,
            Bandwidth::Bw20 => 20_000_000,
            Bandwidth::Bw40 => 40_000_000,
            Bandwidth::Bw50 => 50_000_000,
            Bandwidth::Bw100 => 100_000_000,
            Bandwidth::Bw200 => 200_000_000,
            Bandwidth::Bw400 => 400_000_000,
        }
    }
}

/// Slot direction in a TDD pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TddSlotType {
    /// Downlink only
    Dl,
    /// Special slot (DL, guard, UL)
    S,
    /// Flexible
    F,
    /// Uplink only
    Ul,
}

/// Tracking Area Code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tac(pub u32);

/// PLMN Identity (MCC + MNC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlmnId {
    /// Mobile Country Code
    pub mcc: [u8; 3],
    /// Mobile Network Code (2 or 3 digits)
    pub mnc: [u8; 3],
    /// MNC length (2 or 3)
    pub mnc_len: u8,
}

impl PlmnId {
    /// Create a new PLMN ID
    pub fn new(mcc: [u8; 3], mnc: [u8; 3], mnc_len: u8) -> Option<Self> {
        if mnc_len == 2 || mnc_len == 3 {
            Some(Self { mcc, mnc, mnc_len })
        } else {
            None
        }
    }

    /// Parse a PLMN string such as "00101" or "310260"
    pub fn parse(plmn: &str) -> Result<Self, TypeError> {
        let digits: Option<Vec<u8>> = plmn
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as u8))
            .collect();
        let digits = digits.ok_or_else(|| TypeError::InvalidPlmn(plmn.to_string()))?;

        match digits.len() {
            5 => Ok(Self {
                mcc: [digits[0], digits[1], digits[2]],
                mnc: [digits[3], digits[4], 0],
                mnc_len: 2,
            }),
            6 => Ok(Self {
                mcc: [digits[0], digits[1], digits[2]],
                mnc: [digits[3], digits[4], digits[5]],
                mnc_len: 3,
            }),
            _ => Err(TypeError::InvalidPlmn(plmn.to_string())),
        }
    }

    /// Encode to 3-byte format used in 3GPP
    pub fn encode(&self) -> [u8; 3] {
        let mut encoded = [0u8; 3];
        encoded[0] = (self.mcc[1] << 4) | self.mcc[0];
        encoded[1] = if self.mnc_len == 2 {
            0xF0 | self.mcc[2]
        } else {
            (self.mnc[2] << 4) | self.mcc[2]
        };
        encoded[2] = (self.mnc[1] << 4) | self.mnc[0];
        encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scs_parsing() {
        assert_eq!(SubcarrierSpacing::from_khz(30), Ok(SubcarrierSpacing::Scs30));
        assert_eq!(SubcarrierSpacing::from_khz(45), Err(TypeError::InvalidScs(45)));
        assert_eq!(SubcarrierSpacing::Scs120.numerology(), 3);
    }

    #[test]
    fn test_bandwidth_conversion() {
        assert_eq!(Bandwidth::Bw20.as_hz(), 20_000_000);
        assert_eq!(Bandwidth::from_mhz(100).unwrap().as_hz(), 100_000_000);
        assert!(Bandwidth::from_mhz(7).is_err());
    }

    #[test]
    fn test_plmn_encoding() {
        let plmn = PlmnId::new([2, 0, 8], [9, 3, 0], 2).unwrap();
        let encoded = plmn.encode();
        assert_eq!(encoded, [0x02, 0xF8, 0x39]);
    }

    #[test]
    fn test_plmn_parsing() {
        let plmn = PlmnId::parse("00101").unwrap();
        assert_eq!(plmn.mcc, [0, 0, 1]);
        assert_eq!(plmn.mnc_len, 2);

        let plmn = PlmnId::parse("310260").unwrap();
        assert_eq!(plmn.mnc, [2, 6, 0]);
        assert_eq!(plmn.mnc_len, 3);

        assert!(PlmnId::parse("31a26").is_err());
        assert!(PlmnId::parse("3102").is_err());
    }
}
