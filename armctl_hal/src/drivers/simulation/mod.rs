//! Kinematic simulation of a serial arm.
//!
//! Provides:
//! - DH-chain forward kinematics and geometric Jacobian
//! - Exact velocity integration with position-limit saturation
//! - A shared [`FaultInjector`] to raise faults, obstacles and
//!   unreachable-target signals from tests or tooling

pub mod chain;
pub mod driver;
pub mod faults;

pub use chain::DhChain;
pub use driver::SimulatedArm;
pub use faults::FaultInjector;
