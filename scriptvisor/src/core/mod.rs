//! Core application modules
//!
//! This module contains the core functionality of the application:
//! - Configuration management
//! - Terminal and supervisor event handling
//! - Supervisor event and result types
//! - Output buffering

mod config;
mod events;
mod log_buffer;

pub mod ipc;

pub use config::*;
pub use events::*;
pub use ipc::*;
pub use log_buffer::*;
