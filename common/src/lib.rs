//! Common Utilities and Types Library
//!
//! This crate provides shared types and utilities used across the gNB timeline.

pub mod event_queue;
pub mod sfn_sf;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use event_queue::EventQueue;
pub use sfn_sf::SfnSf;
pub use types::*;
pub use utils::*;
