//! Command arbitration.
//!
//! The arbiter owns the single [`ActiveMotion`] and decides, for every
//! incoming request, whether it is admitted, rejected or preempts the
//! current motion:
//!
//! | incoming      | nothing active | streaming active | goal active      |
//! |---------------|----------------|------------------|------------------|
//! | streaming     | start          | replace          | `Busy`           |
//! | goal          | start          | preempt          | preempt          |
//! | Stop          | ok             | clear            | clear (Stopped)  |
//! | Recover       | fault state and fault cleared only                    |
//!
//! In a fault state every motion request fails with `Faulted`. Targets are
//! validated and resolved (named poses looked up, home substituted, steps
//! added to the current pose) at admission, so later store edits never
//! change a running motion. Requested durations above
//! `resolver.max_goal_duration_s` are rejected.

use std::time::{Duration, Instant};

use armctl_common::command::{
    Command, CommandKind, CommandRequest, GoalOptions, MotionGuards, SourceId, Twist,
};
use armctl_common::consts::MAX_SERVO_GAIN;
use armctl_common::error::{DriverError, FaultFlags};
use armctl_common::robot::RobotModel;
use armctl_common::state::SafetyState;
use nalgebra::{DVector, Isometry3, Vector3};
use tracing::{debug, info};

use super::goal::{CancelReason, GoalFeedback, GoalLink, GoalOutcome, GoalResult};
use crate::config::{ResolverConfig, RobotConfig};
use crate::motion::trajectory::JointTrajectory;
use crate::poses::NamedPoseStore;

/// Slack between a duration guard and the default deadline of its goal.
const GUARD_DEADLINE_MARGIN: Duration = Duration::from_secs(1);

// ─── Motion Targets ─────────────────────────────────────────────────

/// Servo parameters after defaults and caps are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoParams {
    pub gain: f64,
    pub threshold: f64,
}

/// Validated, fully resolved target of the active motion.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionTarget {
    Twist(Twist),
    JointVelocity(DVector<f64>),
    /// Twist held until a guard triggers.
    Guarded { twist: Twist, guards: MotionGuards },
    /// Cartesian pose (pose and step goals); `servo` set for servo goals.
    Pose {
        target: Isometry3<f64>,
        servo: Option<ServoParams>,
    },
    /// Joint configuration (joint, named and home goals).
    Joints {
        target: DVector<f64>,
        duration: Option<Duration>,
    },
}

// ─── Active Motion ──────────────────────────────────────────────────

/// The single accepted request currently driving the robot.
#[derive(Debug)]
pub struct ActiveMotion {
    pub request: CommandRequest,
    pub target: MotionTarget,
    /// Present for goal kinds.
    pub goal: Option<GoalLink>,
    pub started_at: Instant,
    /// `None` for streaming motions.
    pub max_duration: Option<Duration>,
    /// Client gave `max_duration` explicitly (never extended).
    pub explicit_deadline: bool,
    /// Trajectory time [s], advanced one tick at a time.
    pub elapsed: f64,
    pub trajectory: Option<JointTrajectory>,
    /// Pose reached by the target joint configuration.
    pub target_pose: Option<Isometry3<f64>>,
    /// IK solution found on the first tick of a Cartesian pose goal.
    pub ik_solution: Option<DVector<f64>>,
    /// Latest progress, also used for the final result.
    pub progress: GoalFeedback,
}

impl ActiveMotion {
    fn new(
        request: CommandRequest,
        target: MotionTarget,
        goal: Option<GoalLink>,
        started_at: Instant,
        max_duration: Option<Duration>,
        explicit_deadline: bool,
    ) -> Self {
        Self {
            request,
            target,
            goal,
            started_at,
            max_duration,
            explicit_deadline,
            elapsed: 0.0,
            trajectory: None,
            target_pose: None,
            ik_solution: None,
            progress: GoalFeedback::default(),
        }
    }

    #[inline]
    pub fn kind(&self) -> CommandKind {
        self.request.kind()
    }

    #[inline]
    pub fn source(&self) -> SourceId {
        self.request.source
    }

    /// Whether the max duration has been exceeded at `now`.
    pub fn is_overdue(&self, now: Instant) -> bool {
        self.max_duration
            .is_some_and(|max| now.saturating_duration_since(self.started_at) > max)
    }

    /// End the motion, delivering `outcome` to the goal's client if any.
    pub fn conclude(self, outcome: GoalOutcome) {
        if let Some(goal) = self.goal {
            debug!("Goal {} concluded: {:?}", goal.id(), outcome);
            goal.finish(GoalResult::new(outcome, &self.progress));
        }
    }
}

// ─── Admission ──────────────────────────────────────────────────────

/// Everything the arbiter reads to decide on a request.
pub struct AdmissionContext<'a> {
    pub now: Instant,
    pub safety: SafetyState,
    /// Current robot fault feedback.
    pub faults: FaultFlags,
    pub robot: &'a dyn RobotModel,
    pub poses: &'a NamedPoseStore,
    pub robot_config: &'a RobotConfig,
    pub resolver: &'a ResolverConfig,
}

/// Accepted request, telling the control loop which transition to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A motion was started; `preempted` names the kind it replaced.
    Motion { preempted: Option<CommandKind> },
    /// Active motion cleared by Stop.
    Stopped,
    /// Fault cleared; the driver may return to READY.
    Recovered,
}

/// Owner of the active motion.
#[derive(Debug, Default)]
pub struct CommandArbiter {
    active: Option<ActiveMotion>,
}

impl CommandArbiter {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn active(&self) -> Option<&ActiveMotion> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ActiveMotion> {
        self.active.as_mut()
    }

    pub fn active_kind(&self) -> Option<CommandKind> {
        self.active.as_ref().map(ActiveMotion::kind)
    }

    /// Source of the active motion when it is a streaming one.
    pub fn streaming_source(&self) -> Option<SourceId> {
        self.active
            .as_ref()
            .filter(|m| m.kind().is_streaming())
            .map(ActiveMotion::source)
    }

    /// Remove the active motion without concluding it.
    pub fn take(&mut self) -> Option<ActiveMotion> {
        self.active.take()
    }

    /// Conclude the active motion as cancelled.
    pub fn cancel_active(&mut self, reason: CancelReason) -> Option<CommandKind> {
        let motion = self.active.take()?;
        let kind = motion.kind();
        motion.conclude(GoalOutcome::Cancelled(reason));
        Some(kind)
    }

    /// Decide on a request.
    ///
    /// On rejection the goal link is dropped; the client learns about the
    /// rejection from the returned error.
    pub fn submit(
        &mut self,
        request: CommandRequest,
        goal: Option<GoalLink>,
        ctx: &AdmissionContext<'_>,
    ) -> Result<Admission, DriverError> {
        let kind = request.kind();
        match kind {
            CommandKind::Stop => {
                if let Some(cleared) = self.cancel_active(CancelReason::Stopped) {
                    info!("Stop from {}: cleared {:?}", request.source, cleared);
                }
                Ok(Admission::Stopped)
            }
            CommandKind::Recover => {
                if !ctx.safety.is_fault() {
                    return Err(DriverError::NothingToRecover(ctx.safety));
                }
                if !ctx.faults.is_empty() {
                    return Err(DriverError::FaultStillPresent(ctx.faults));
                }
                Ok(Admission::Recovered)
            }
            _ => {
                if ctx.safety.is_fault() {
                    return Err(DriverError::Faulted(ctx.safety));
                }
                if kind.is_streaming() && self.active_kind().is_some_and(CommandKind::is_goal) {
                    return Err(DriverError::Busy);
                }

                if let Some(options) = request.command.goal_options() {
                    check_goal_options(options, ctx.resolver)?;
                }
                let target = resolve_target(&request.command, ctx)?;
                let (max_duration, explicit) = goal_deadline(&request.command, ctx.resolver);

                let preempted = self.cancel_active(CancelReason::Preempted);

                self.active = Some(ActiveMotion::new(
                    request,
                    target,
                    goal,
                    ctx.now,
                    max_duration,
                    explicit,
                ));
                Ok(Admission::Motion { preempted })
            }
        }
    }
}

/// Max duration of a goal and whether the client set it explicitly.
fn goal_deadline(command: &Command, cfg: &ResolverConfig) -> (Option<Duration>, bool) {
    let pick = |options: &GoalOptions, default: Duration| match options.max_duration {
        Some(d) => (Some(d), true),
        None => (Some(default), false),
    };
    match command {
        Command::GuardedVelocity { guards, options, .. } => {
            let default = guards
                .duration
                .map(|d| d.saturating_add(GUARD_DEADLINE_MARGIN))
                .map_or(cfg.default_goal_duration(), |d| d.max(cfg.default_goal_duration()));
            pick(options, default)
        }
        Command::CartesianPoseGoal { options, .. }
        | Command::StepPoseGoal { options, .. }
        | Command::NamedPoseGoal { options, .. }
        | Command::JointPoseGoal { options, .. }
        | Command::Home { options } => pick(options, cfg.default_goal_duration()),
        Command::ServoPoseGoal { options, .. } => pick(options, cfg.servo_max_duration()),
        Command::CartesianVelocity(_)
        | Command::JointVelocity(_)
        | Command::Stop
        | Command::Recover => (None, false),
    }
}

// ─── Validation ─────────────────────────────────────────────────────

fn check_duration(what: &str, duration: Duration, cfg: &ResolverConfig) -> Result<(), DriverError> {
    if duration > cfg.max_goal_duration() {
        return Err(DriverError::Validation(format!(
            "{what} {:.3} s exceeds the {:.3} s limit",
            duration.as_secs_f64(),
            cfg.max_goal_duration_s
        )));
    }
    Ok(())
}

fn check_goal_options(options: &GoalOptions, cfg: &ResolverConfig) -> Result<(), DriverError> {
    if let Some(max_duration) = options.max_duration {
        check_duration("max duration", max_duration, cfg)?;
    }
    if let Some(duration) = options.duration {
        check_duration("duration", duration, cfg)?;
    }
    Ok(())
}

fn check_guards(guards: &MotionGuards, cfg: &ResolverConfig) -> Result<(), DriverError> {
    if guards.is_empty() {
        return Err(DriverError::Validation(
            "guarded velocity needs at least one guard".to_string(),
        ));
    }
    if let Some(duration) = guards.duration {
        if duration.is_zero() {
            return Err(DriverError::Validation("guard duration must be positive".to_string()));
        }
        check_duration("guard duration", duration, cfg)?;
    }
    if let Some(effort) = &guards.effort {
        if effort.iter().any(|l| !(l.is_finite() && *l >= 0.0)) {
            return Err(DriverError::Validation(
                "effort thresholds must be finite and non-negative".to_string(),
            ));
        }
    }
    Ok(())
}

fn resolve_target(command: &Command, ctx: &AdmissionContext<'_>) -> Result<MotionTarget, DriverError> {
    match command {
        Command::CartesianVelocity(twist) => {
            if !twist.is_finite() {
                return Err(DriverError::Validation("twist must be finite".to_string()));
            }
            Ok(MotionTarget::Twist(*twist))
        }
        Command::JointVelocity(velocities) => {
            check_joint_vector("joint velocity", velocities, ctx.robot.dof())?;
            Ok(MotionTarget::JointVelocity(DVector::from_column_slice(velocities)))
        }
        Command::GuardedVelocity { twist, guards, .. } => {
            if !twist.is_finite() {
                return Err(DriverError::Validation("twist must be finite".to_string()));
            }
            check_guards(guards, ctx.resolver)?;
            Ok(MotionTarget::Guarded {
                twist: *twist,
                guards: *guards,
            })
        }
        Command::StepPoseGoal { offset, .. } => {
            let target = step_target(offset, ctx)?;
            check_pose(&target, ctx)?;
            Ok(MotionTarget::Pose { target, servo: None })
        }
        Command::CartesianPoseGoal { target, .. } => {
            check_pose(target, ctx)?;
            Ok(MotionTarget::Pose {
                target: *target,
                servo: None,
            })
        }
        Command::ServoPoseGoal { target, servo, .. } => {
            check_pose(target, ctx)?;
            let gain = servo.gain.unwrap_or(ctx.resolver.servo_gain).min(MAX_SERVO_GAIN);
            let threshold = servo.threshold.unwrap_or(ctx.resolver.servo_threshold);
            if !(gain > 0.0 && threshold > 0.0) {
                return Err(DriverError::Validation(
                    "servo gain and threshold must be positive".to_string(),
                ));
            }
            Ok(MotionTarget::Pose {
                target: *target,
                servo: Some(ServoParams { gain, threshold }),
            })
        }
        Command::NamedPoseGoal { name, options } => {
            let pose = ctx
                .poses
                .get(name)
                .ok_or_else(|| DriverError::NotFound(name.clone()))?;
            joint_target(&pose.joints, options, ctx)
        }
        Command::JointPoseGoal { joints, options } => joint_target(joints, options, ctx),
        Command::Home { options } => joint_target(&ctx.robot_config.home, options, ctx),
        Command::Stop | Command::Recover => Err(DriverError::Validation(
            "Stop and Recover carry no motion target".to_string(),
        )),
    }
}

fn check_joint_vector(what: &str, values: &[f64], dof: usize) -> Result<(), DriverError> {
    if values.len() != dof {
        return Err(DriverError::Validation(format!(
            "{what} has {} entries, robot has {dof} joints",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DriverError::Validation(format!("{what} must be finite")));
    }
    Ok(())
}

fn joint_target(
    joints: &[f64],
    options: &GoalOptions,
    ctx: &AdmissionContext<'_>,
) -> Result<MotionTarget, DriverError> {
    check_joint_vector("joint target", joints, ctx.robot.dof())?;
    if let Some(joint) = ctx.robot.joint_limits().first_violation(joints) {
        return Err(DriverError::Validation(format!(
            "joint target outside limits at joint {joint}"
        )));
    }
    Ok(MotionTarget::Joints {
        target: DVector::from_column_slice(joints),
        duration: options.duration.filter(|d| !d.is_zero()),
    })
}

/// Current end-effector pose moved by `offset`, orientation kept.
fn step_target(offset: &Vector3<f64>, ctx: &AdmissionContext<'_>) -> Result<Isometry3<f64>, DriverError> {
    if offset.iter().any(|v| !v.is_finite()) {
        return Err(DriverError::Validation("step offset must be finite".to_string()));
    }
    let mut target = ctx.robot.forward_kinematics(&ctx.robot.joint_positions());
    target.translation.vector += offset;
    Ok(target)
}

fn check_pose(target: &Isometry3<f64>, ctx: &AdmissionContext<'_>) -> Result<(), DriverError> {
    let finite = target
        .translation
        .vector
        .iter()
        .chain(target.rotation.coords.iter())
        .all(|v| v.is_finite());
    if !finite {
        return Err(DriverError::Validation("pose must be finite".to_string()));
    }
    if let Some(ws) = &ctx.robot_config.workspace {
        if !ws.contains(&target.translation.vector) {
            return Err(DriverError::Validation(
                "pose target outside workspace".to_string(),
            ));
        }
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────
