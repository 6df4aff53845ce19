//! Driver safety state and the per-tick state snapshot.

use nalgebra::{DVector, Isometry3, Vector6};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::command::CommandKind;
use crate::error::SafetyFlags;

// ─── Safety State ───────────────────────────────────────────────────

/// Global driver safety state.
///
/// `Collision`, `LimitViolation` and `Error` are fault states: only Stop and
/// Recover are admitted while one of them is active, and only a successful
/// Recover leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SafetyState {
    /// No motion, ready to accept requests.
    #[default]
    Ready,
    /// A motion is active.
    Moving,
    /// Stopped by request; holds position until the next motion request.
    Paused,
    /// Robot reported a collision.
    Collision,
    /// Robot reported a joint limit violation.
    LimitViolation,
    /// Robot reported a hardware fault.
    Error,
}

impl SafetyState {
    #[inline]
    pub const fn is_fault(self) -> bool {
        matches!(self, Self::Collision | Self::LimitViolation | Self::Error)
    }
}

impl fmt::Display for SafetyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "READY",
            Self::Moving => "MOVING",
            Self::Paused => "PAUSED",
            Self::Collision => "COLLISION",
            Self::LimitViolation => "LIMIT_VIOLATION",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

// ─── State Snapshot ─────────────────────────────────────────────────

/// Manipulator state published once per control tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ManipulatorStateSnapshot {
    /// Control tick counter.
    pub cycle: u64,
    /// End-effector pose in the base frame.
    pub ee_pose: Isometry3<f64>,
    /// End-effector twist `[vx, vy, vz, wx, wy, wz]` (J · q̇).
    pub ee_velocity: Vector6<f64>,
    /// Measured joint positions [rad].
    pub joint_positions: DVector<f64>,
    /// Joint velocities dispatched this tick [rad/s].
    pub joint_velocities: DVector<f64>,
    pub safety_state: SafetyState,
    pub flags: SafetyFlags,
    /// Kind of the active motion, if any.
    pub active: Option<CommandKind>,
    /// Yoshikawa manipulability index at the current configuration.
    pub manipulability: f64,
}

impl ManipulatorStateSnapshot {
    /// Snapshot of a robot at rest with no history.
    pub fn at_rest(joint_positions: DVector<f64>, ee_pose: Isometry3<f64>) -> Self {
        let n = joint_positions.len();
        Self {
            cycle: 0,
            ee_pose,
            ee_velocity: Vector6::zeros(),
            joint_positions,
            joint_velocities: DVector::zeros(n),
            safety_state: SafetyState::Ready,
            flags: SafetyFlags::empty(),
            active: None,
            manipulability: 0.0,
        }
    }

    /// True when every dispatched joint velocity is exactly zero.
    pub fn is_at_rest(&self) -> bool {
        self.joint_velocities.iter().all(|v| *v == 0.0)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
