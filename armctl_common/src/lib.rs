//! armctl Common Library
//!
//! Shared vocabulary for every armctl crate: the command model clients
//! submit, the safety state and bitmasks the driver publishes, the error
//! taxonomy, pose/Jacobian math, the `RobotModel` capability trait and the
//! TOML configuration loader.
//!
//! # Module Structure
//!
//! - [`command`] - Motion requests, goal options, source identifiers
//! - [`state`] - Safety state enum and the per-tick state snapshot
//! - [`error`] - `DriverError` taxonomy plus safety/fault bitflags
//! - [`kinematics`] - Pose error, manipulability, damped least squares
//! - [`robot`] - `RobotModel` trait and its supporting types
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Default tuning constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use armctl_common::prelude::*;
//! use armctl_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod command;
pub mod config;
pub mod consts;
pub mod error;
pub mod kinematics;
pub mod prelude;
pub mod robot;
pub mod state;
