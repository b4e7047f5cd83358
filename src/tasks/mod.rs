//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of the server.
//!
//! # Tasks
//! - Expiration sweep: removes expired entries from both cache tiers

mod sweep;

pub use sweep::{run_sweep, spawn_sweep_task, SweepHandle};
