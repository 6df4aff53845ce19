//! Motion resolver.
//!
//! Evaluated once per tick on the active motion. Produces the next joint
//! command or reports that the motion is finished:
//!
//! | target          | command                                   | done when                  |
//! |-----------------|-------------------------------------------|----------------------------|
//! | twist           | damped pseudo-inverse of the Jacobian     | never                      |
//! | joint velocity  | the request, clipped                      | never                      |
//! | guarded twist   | as twist                                  | a guard triggers           |
//! | Cartesian pose  | P-control on pose error → twist           | within pose tolerances     |
//! | (incl. step)    |                                           |                            |
//! | servo pose      | P-control + obstacle avoidance            | never                      |
//! | joints          | trajectory feedforward + tracking term    | `t ≥ T` and joints settled |
//!
//! Every goal fails with `Timeout` once its max duration is exceeded.

use std::time::{Duration, Instant};

use armctl_common::error::DriverError;
use armctl_common::kinematics::PoseError;
use armctl_common::robot::{JointCommand, RobotFeedback, RobotModel};
use nalgebra::{DVector, Isometry3};
use tracing::debug;

use super::differential::{avoid_obstacle, resolve_twist};
use super::trajectory::JointTrajectory;
use crate::command::arbitration::{ActiveMotion, MotionTarget, ServoParams};
use crate::config::ResolverConfig;

/// Slack added to a planned trajectory when extending a default deadline.
const TRAJECTORY_DEADLINE_MARGIN: Duration = Duration::from_secs(1);

/// Outcome of resolving one tick.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Dispatch this command and keep going.
    Command(JointCommand),
    /// Target reached.
    Done,
    /// The motion cannot continue.
    Failed(DriverError),
}

#[derive(Debug, Clone)]
pub struct MotionResolver {
    cfg: ResolverConfig,
    dt: f64,
}

impl MotionResolver {
    pub fn new(cfg: ResolverConfig, dt: f64) -> Self {
        Self { cfg, dt }
    }

    #[inline]
    pub fn config(&self) -> &ResolverConfig {
        &self.cfg
    }

    /// Resolve one tick of `motion` at `now`.
    ///
    /// Updates the motion's progress and publishes it to the goal's client.
    pub fn resolve(
        &self,
        motion: &mut ActiveMotion,
        robot: &dyn RobotModel,
        feedback: &RobotFeedback,
        now: Instant,
    ) -> Resolution {
        motion.progress.elapsed = now.saturating_duration_since(motion.started_at);
        let q = robot.joint_positions();

        let resolution = match motion.target.clone() {
            MotionTarget::Twist(twist) => {
                Resolution::Command(JointCommand::new(resolve_twist(robot, &q, &twist, &self.cfg)))
            }
            MotionTarget::Guarded { twist, guards } => {
                let triggered = guards.triggered(motion.progress.elapsed, feedback.wrench.as_ref());
                if triggered.is_empty() {
                    Resolution::Command(JointCommand::new(resolve_twist(robot, &q, &twist, &self.cfg)))
                } else {
                    debug!("Guards triggered: {:?}", triggered);
                    motion.progress.triggered = triggered;
                    Resolution::Done
                }
            }
            MotionTarget::JointVelocity(mut velocities) => {
                robot.joint_limits().clip_velocity(&mut velocities);
                Resolution::Command(JointCommand::new(velocities))
            }
            MotionTarget::Pose { target, servo: None } => self.pose_goal(motion, robot, &q, &target),
            MotionTarget::Pose {
                target,
                servo: Some(params),
            } => self.servo_goal(motion, robot, feedback, &q, &target, params),
            MotionTarget::Joints { target, duration } => {
                self.joint_goal(motion, robot, &q, &target, duration)
            }
        };

        // A goal that already finished is not timed out.
        let resolution = match resolution {
            Resolution::Command(_) if motion.is_overdue(now) => Resolution::Failed(DriverError::Timeout),
            other => other,
        };

        if let Some(goal) = &motion.goal {
            goal.publish(motion.progress);
        }
        resolution
    }

    fn record_pose_error(motion: &mut ActiveMotion, error: &PoseError) {
        motion.progress.position_error = error.position_norm();
        motion.progress.orientation_error = error.orientation_norm();
    }

    fn pose_goal(
        &self,
        motion: &mut ActiveMotion,
        robot: &dyn RobotModel,
        q: &DVector<f64>,
        target: &Isometry3<f64>,
    ) -> Resolution {
        if motion.ik_solution.is_none() {
            match robot.inverse_kinematics(target, q) {
                Ok(solution) => motion.ik_solution = Some(solution),
                Err(e) => return Resolution::Failed(DriverError::Kinematic(e.to_string())),
            }
        }

        let error = PoseError::between(&robot.forward_kinematics(q), target);
        Self::record_pose_error(motion, &error);
        if let Some(solution) = &motion.ik_solution {
            motion.progress.joint_error = max_abs_diff(solution, q);
        }

        if error.position_norm() < self.cfg.position_tolerance
            && error.orientation_norm() < self.cfg.orientation_tolerance
        {
            return Resolution::Done;
        }

        let twist = error.scaled(self.cfg.position_gain, self.cfg.orientation_gain);
        Resolution::Command(JointCommand::new(resolve_twist(robot, q, &twist, &self.cfg)))
    }

    fn servo_goal(
        &self,
        motion: &mut ActiveMotion,
        robot: &dyn RobotModel,
        feedback: &RobotFeedback,
        q: &DVector<f64>,
        target: &Isometry3<f64>,
        params: ServoParams,
    ) -> Resolution {
        if feedback.target_unreachable {
            return Resolution::Failed(DriverError::Kinematic(
                "servo target unreachable".to_string(),
            ));
        }

        let error = PoseError::between(&robot.forward_kinematics(q), target);
        Self::record_pose_error(motion, &error);
        let arrived = error.norm() < params.threshold;
        if arrived != motion.progress.arrived {
            debug!("Servo goal arrived: {}", arrived);
        }
        motion.progress.arrived = arrived;

        let twist = avoid_obstacle(
            &error.scaled(params.gain, params.gain),
            feedback.obstacle.as_ref(),
            self.cfg.obstacle_influence_distance,
            self.cfg.obstacle_stop_distance,
        );
        Resolution::Command(JointCommand::new(resolve_twist(robot, q, &twist, &self.cfg)))
    }

    fn joint_goal(
        &self,
        motion: &mut ActiveMotion,
        robot: &dyn RobotModel,
        q: &DVector<f64>,
        target: &DVector<f64>,
        duration: Option<Duration>,
    ) -> Resolution {
        if motion.trajectory.is_none() {
            let trajectory = JointTrajectory::plan(
                q,
                target,
                robot.joint_limits(),
                self.cfg.profile,
                duration.map(|d| d.as_secs_f64()),
            );
            if !motion.explicit_deadline {
                let needed = Duration::try_from_secs_f64(trajectory.duration())
                    .unwrap_or(Duration::MAX)
                    .saturating_add(TRAJECTORY_DEADLINE_MARGIN);
                if motion.max_duration.is_some_and(|max| max < needed) {
                    motion.max_duration = Some(needed);
                }
            }
            debug!(
                "Planned {:?} trajectory over {:.3} s",
                self.cfg.profile,
                trajectory.duration()
            );
            motion.target_pose = Some(robot.forward_kinematics(target));
            motion.trajectory = Some(trajectory);
        }
        let Some(trajectory) = motion.trajectory.as_ref() else {
            return Resolution::Failed(DriverError::Kinematic("no trajectory".to_string()));
        };

        let t = motion.elapsed;
        let desired = trajectory.position(t);
        let tracking = max_abs_diff(&desired, q);
        let joint_error = max_abs_diff(target, q);
        let progress = trajectory.progress(t);
        let finished = t >= trajectory.duration();
        let feedforward = (trajectory.position(t + self.dt) - &desired) / self.dt;

        motion.progress.joint_error = joint_error;
        motion.progress.progress = progress;
        if let Some(target_pose) = &motion.target_pose {
            let error = PoseError::between(&robot.forward_kinematics(q), target_pose);
            Self::record_pose_error(motion, &error);
        }

        if tracking > self.cfg.max_tracking_error {
            return Resolution::Failed(DriverError::Kinematic(format!(
                "tracking error {tracking:.4} rad exceeds {:.4} rad",
                self.cfg.max_tracking_error
            )));
        }
        if finished && joint_error < self.cfg.joint_tolerance {
            return Resolution::Done;
        }

        motion.elapsed += self.dt;
        let mut velocities = feedforward + (desired - q) * self.cfg.trajectory_gain;
        robot.joint_limits().clip_velocity(&mut velocities);
        Resolution::Command(JointCommand::new(velocities))
    }
}

fn max_abs_diff(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    (a - b).amax()
}

// ─── Tests ──────────────────────────────────────────────────────────
