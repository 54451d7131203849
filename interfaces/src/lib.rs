//! PHY/MAC Boundary Interfaces Library
//!
//! This crate provides the records exchanged between the PHY timeline and the
//! MAC (grants, slot plans, control messages, MAC PDUs) and the capability
//! traits of the transmit/receive boundary.

pub mod dci;
pub mod mac_pdu;
pub mod message_types;
pub mod recorder;
pub mod spectrum;

use thiserror::Error;

pub use dci::{DciFormat, DciInfoElementTdma, RbgBitmask, SlotAllocInfo, VarTtiAllocInfo, VarTtiType};
pub use mac_pdu::{MacPdu, PacketBurst};
pub use message_types::{ControlMessage, MessageType};
pub use recorder::RecordingSpectrum;
pub use spectrum::{BeamformingAntenna, ExpectedTb, SpectrumPhy, UeDevice};

/// Interface errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("RBG bitmask width mismatch: expected {expected}, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("Invalid DCI: {0}")]
    InvalidDci(String),
}
