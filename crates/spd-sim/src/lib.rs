//! Simulated SPD3303X power supply
//!
//! A protocol-accurate stand-in for the physical instrument, answering the
//! SCPI subset the bridge exercises. Wire it to the bridge over
//! `tokio::io::duplex()` to run end-to-end without hardware.

pub mod supply;
pub mod task;

pub use supply::{VirtualSupply, VirtualSupplyConfig};
pub use task::run_supply_task;
