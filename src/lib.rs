//! useraction - endpoint activity-monitoring agent.
//!
//! Watches a workstation for user activity (away/back, process starts, print
//! jobs, file I/O) and streams each observation to a collector over TCP.

pub mod config;
pub mod connection;
pub mod error;
pub mod feature;
pub mod instance;
pub mod notification;
pub mod rules;
pub mod scheduler;
pub mod system;

#[cfg(windows)]
pub mod winapi_utils;
