//! Prelude module for common re-exports.
//!
//! ```rust
//! use armctl_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Commands ───────────────────────────────────────────────────────
pub use crate::command::{
    Command, CommandKind, CommandRequest, GoalOptions, ServoOptions, SourceId, Twist,
};

// ─── State & Errors ─────────────────────────────────────────────────
pub use crate::error::{DriverError, FaultFlags, SafetyFlags};
pub use crate::state::{ManipulatorStateSnapshot, SafetyState};

// ─── Robot Model ────────────────────────────────────────────────────
pub use crate::robot::{
    JointCommand, JointLimits, Obstacle, RobotError, RobotFeedback, RobotModel,
};
