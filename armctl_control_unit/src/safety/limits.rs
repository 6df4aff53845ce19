//! Joint limit enforcement and safety flag evaluation.
//!
//! [`clamp_command`] runs on every command right before dispatch, whatever
//! produced it.

use armctl_common::error::SafetyFlags;
use armctl_common::robot::{JointCommand, JointLimits};
use armctl_common::state::SafetyState;
use nalgebra::DVector;

/// Clamp a joint command to the velocity and position limits.
///
/// Each velocity is first clipped to `±velocity_max`. A velocity that would
/// carry the joint past a position limit within `dt` is truncated so the
/// joint lands exactly on the limit; a joint already at or beyond a limit
/// may only move back inside.
///
/// Returns true if any component was changed.
pub fn clamp_command(
    command: &mut JointCommand,
    q: &DVector<f64>,
    limits: &JointLimits,
    dt: f64,
) -> bool {
    let mut changed = false;
    for i in 0..command.velocities.len() {
        let original = command.velocities[i];
        let vmax = limits.velocity_max[i];
        let mut v = original.clamp(-vmax, vmax);

        if dt > 0.0 {
            let upper = ((limits.position_max[i] - q[i]) / dt).max(0.0);
            let lower = ((limits.position_min[i] - q[i]) / dt).min(0.0);
            v = v.clamp(lower, upper);
        }

        if v != original {
            command.velocities[i] = v;
            changed = true;
        }
    }
    changed
}

/// Inputs for [`evaluate_flags`], gathered once per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagInputs {
    pub state: SafetyState,
    pub motion_active: bool,
    pub singular: bool,
    pub watchdog_expired: bool,
    pub obstacle_near: bool,
}

/// Safety bitmask published with the snapshot.
pub fn evaluate_flags(inputs: &FlagInputs) -> SafetyFlags {
    let mut flags = SafetyFlags::for_state(inputs.state);
    flags.set(SafetyFlags::MOTION_ACTIVE, inputs.motion_active);
    flags.set(SafetyFlags::SINGULARITY, inputs.singular);
    flags.set(SafetyFlags::WATCHDOG_EXPIRED, inputs.watchdog_expired);
    flags.set(SafetyFlags::OBSTACLE_NEAR, inputs.obstacle_near);
    flags
}

// ─── Tests ──────────────────────────────────────────────────────────
