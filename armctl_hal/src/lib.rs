//! armctl HAL
//!
//! Concrete [`RobotModel`](armctl_common::robot::RobotModel) implementations
//! and the registry the control unit uses to pick one by name.
//!
//! # Available models
//!
//! - `simulation` - kinematic DH-chain arm (UR5 parameters by default) with
//!   injectable faults, obstacles and reachability signals

pub mod config;
pub mod driver_registry;
pub mod drivers;
