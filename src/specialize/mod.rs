//! Generic-type specialization across cable networks

pub mod engine;
pub mod network;

pub use engine::SpecializationEngine;
pub use network::Network;
