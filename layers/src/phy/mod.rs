//! Physical Layer (PHY) slot timeline
//!
//! This module contains the gNB PHY of one component carrier: the slot
//! allocation store, the control message pipeline, channel access and the
//! frame state machine that executes slot plans symbol by symbol.

pub mod channel_access;
pub mod config;
pub mod ctrl_queue;
pub mod enb_phy;
pub mod pdu_buffer;
pub mod rbg_table;
pub mod simulator;
pub mod slot_alloc;
pub mod trace;

// Re-export commonly used types
pub use channel_access::{
    AccessDecision, AlwaysOnAccessManager, ChannelAccess, ChannelAccessManager, ChannelStatus, DelayedAccessManager,
};
pub use config::PhyMacConfig;
pub use ctrl_queue::CtrlMsgQueue;
pub use enb_phy::{ctrl_slot_plan, EnbPhy, PhyEvent, PhyEventKind, PhyStats};
pub use pdu_buffer::PduBuffer;
pub use rbg_table::RbgAllocationTable;
pub use simulator::PhySimulator;
pub use slot_alloc::SlotAllocStore;
pub use trace::{CtrlDirection, CtrlMsgTraceEntry, PhyTrace};
