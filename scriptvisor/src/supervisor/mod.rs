//! Worker supervision
//!
//! This module owns the single worker slot: spawning the worker, forwarding
//! its output, reporting its completion and delivering termination signals.

mod bus;
mod decode;
mod manager;
mod signal;
mod types;

pub use bus::*;
pub use manager::*;
pub use types::*;
