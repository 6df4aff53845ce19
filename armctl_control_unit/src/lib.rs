//! # armctl Control Unit Library
//!
//! Motion driver for a robot arm. Accepts streaming velocity input and
//! goal-based motion requests from any number of clients, admits at most one
//! active motion at a time, resolves it to joint velocities on every tick
//! of a fixed-rate control loop and keeps the arm inside a safety envelope.
//!
//! ## Layers
//!
//! 1. **Driver handle** ([`driver`]): client surface, message passing only
//! 2. **Arbitration** ([`command`]): admission, preemption, goal handles, watchdog
//! 3. **Motion** ([`motion`]): differential kinematics and joint trajectories
//! 4. **Safety** ([`safety`]): safety state machine and joint limit clamping
//! 5. **Control loop** ([`cycle`]): ties the above to a [`RobotModel`]
//!
//! The robot itself is a [`RobotModel`] trait object; `armctl_hal` provides
//! a simulated arm.
//!
//! [`RobotModel`]: armctl_common::robot::RobotModel

pub mod command;
pub mod config;
pub mod cycle;
pub mod driver;
pub mod motion;
pub mod poses;
pub mod safety;
