//! Differential kinematics: Cartesian twist → joint velocities.

use armctl_common::command::Twist;
use armctl_common::kinematics::{
    cap_twist, damped_least_squares, damping_factor, manipulability, twist_to_dvector,
};
use armctl_common::robot::{Obstacle, RobotModel};
use nalgebra::DVector;

use crate::config::ResolverConfig;

/// Resolve a twist at configuration `q` into joint velocities.
///
/// The twist is capped to the Cartesian speed limits, mapped through the
/// damped pseudo-inverse of the Jacobian and clipped component-wise to the
/// joint velocity limits.
pub fn resolve_twist(
    robot: &dyn RobotModel,
    q: &DVector<f64>,
    twist: &Twist,
    cfg: &ResolverConfig,
) -> DVector<f64> {
    let twist = cap_twist(twist, cfg.max_cartesian_speed, cfg.max_angular_speed);
    let jacobian = robot.jacobian(q);
    let damping = damping_factor(
        manipulability(&jacobian),
        cfg.manipulability_threshold,
        cfg.max_damping,
    );

    let mut velocities = damped_least_squares(&jacobian, &twist_to_dvector(&twist), damping);
    robot.joint_limits().clip_velocity(&mut velocities);
    velocities
}

/// Remove the part of the linear velocity that approaches an obstacle.
///
/// Inside `influence` the approach component is scaled down linearly and
/// vanishes at `stop`; tangential motion is kept so the tool slides past.
pub fn avoid_obstacle(twist: &Twist, obstacle: Option<&Obstacle>, influence: f64, stop: f64) -> Twist {
    let Some(obstacle) = obstacle else {
        return *twist;
    };
    if obstacle.distance >= influence {
        return *twist;
    }

    let approach = twist.linear.dot(&obstacle.direction);
    if approach <= 0.0 {
        return *twist;
    }

    let keep = ((obstacle.distance - stop) / (influence - stop)).clamp(0.0, 1.0);
    let linear = twist.linear - obstacle.direction * (approach * (1.0 - keep));
    Twist::new(linear, twist.angular)
}

// ─── Tests ──────────────────────────────────────────────────────────
