//! Command module root.
//!
//! Admission and arbitration of requests, goal handles and the streaming
//! watchdog.

pub mod arbitration;
pub mod goal;
pub mod watchdog;
