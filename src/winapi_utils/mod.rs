//! Safe wrappers around Windows API calls.
//!
//! This module provides safe Rust abstractions over the unsafe WinAPI
//! functions the agent needs on Windows.

pub mod input;

pub use input::*;
