//! Protocol Stack Layers Library
//!
//! This crate implements the gNB PHY slot timeline and the MAC-side
//! collaborators that feed it with slot plans.

pub mod mac;
pub mod phy;

use std::time::Duration;

use common::{Rnti, SfnSf};
use interfaces::{DciFormat, InterfaceError};
use thiserror::Error;

/// Errors raised by the protocol layers
///
/// Every variant except `InvalidConfiguration` is a broken scheduler or
/// wiring contract detected while the timeline runs. None of them is
/// recoverable; the run stops at the first one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error("Slot mismatch: expected {expected}, allocation is for {actual}")]
    SlotMismatch { expected: SfnSf, actual: SfnSf },

    #[error("Var-TTI at symbol {sym_start} ({format:?}) has the combined CTRL+DATA kind")]
    InvalidVarTtiKind { sym_start: u8, format: DciFormat },

    #[error("UL allocation for RNTI {rnti} uses {set} of {width} RBGs; UL must be single-segment")]
    NonContiguousUlAllocation { rnti: Rnti, set: usize, width: usize },

    #[error("{format:?} symbol start regressed from {previous} to {current}")]
    SymbolRegression { format: DciFormat, previous: u8, current: u8 },

    #[error("Allocation for RNTI {rnti} at symbols {sym_start}+{num_sym} exceeds {symbols_per_slot} symbols per slot")]
    AllocationOverflow { rnti: Rnti, sym_start: u8, num_sym: u8, symbols_per_slot: u8 },

    #[error("Var-TTI at symbol {sym_start} starts before the previous one ends at symbol {previous_end}")]
    VarTtiOverlap { sym_start: u8, previous_end: u32 },

    #[error("Data grant for RNTI {0} has an empty transport block")]
    EmptyTransportBlock(Rnti),

    #[error("Channel access already requested or granted")]
    AccessAlreadyRequested,

    #[error("RNTI {0} is not attached")]
    UeNotAttached(Rnti),

    #[error("No device registered for RNTI {0}")]
    UnknownUe(Rnti),

    #[error("No RBG allocation stored for symbol {0}")]
    MissingRbgAllocation(u8),

    #[error("RBG bitmask width {actual} does not match bandwidth of {expected} RBGs")]
    RbgWidthMismatch { expected: usize, actual: usize },

    #[error("Slot overrun: next slot starts at {next_slot_start:?} but it is already {now:?}")]
    SlotOverrun { next_slot_start: Duration, now: Duration },

    #[error("DL control var-TTI spans {actual} symbols, configured {expected}")]
    CtrlSymbolMismatch { expected: u8, actual: u8 },

    #[error("RACH preamble received but the cell id is not configured")]
    CellIdNotConfigured,

    #[error("Invalid DCI: {0}")]
    InvalidDci(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<InterfaceError> for LayerError {
    fn from(err: InterfaceError) -> Self {
        match err {
            InterfaceError::WidthMismatch { expected, actual } => LayerError::RbgWidthMismatch { expected, actual },
            InterfaceError::InvalidDci(reason) => LayerError::InvalidDci(reason),
        }
    }
}
