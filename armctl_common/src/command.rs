//! Motion requests submitted by clients.
//!
//! A [`CommandRequest`] is immutable once created: the command payload, the
//! instant it was issued and the [`SourceId`] of the client that issued it.
//! Streaming kinds ([`CommandKind::is_streaming`]) are refreshed continuously
//! by their source; goal kinds ([`CommandKind::is_goal`]) run to completion
//! behind a goal handle.

use bitflags::bitflags;
use nalgebra::{Isometry3, Vector3, Vector6};
use std::fmt;
use std::time::{Duration, Instant};

/// Identifier of a command source (one per client handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src#{}", self.0)
    }
}

/// End-effector spatial velocity expressed in the base frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Twist {
    /// Linear velocity [m/s].
    pub linear: Vector3<f64>,
    /// Angular velocity [rad/s].
    pub angular: Vector3<f64>,
}

impl Twist {
    pub fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Pure translation.
    pub fn linear(x: f64, y: f64, z: f64) -> Self {
        Self::new(Vector3::new(x, y, z), Vector3::zeros())
    }

    pub fn zero() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }

    pub fn is_finite(&self) -> bool {
        self.linear.iter().chain(self.angular.iter()).all(|v| v.is_finite())
    }
}

/// Timing options common to every goal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GoalOptions {
    /// Hard limit on goal runtime. `None` uses the configured default.
    pub max_duration: Option<Duration>,
    /// Requested move duration for joint-space goals. The trajectory never
    /// runs faster than the joint limits allow.
    pub duration: Option<Duration>,
}

impl GoalOptions {
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

bitflags! {
    /// Guards of a guarded velocity move that ended it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GuardFlags: u8 {
        /// The guard duration elapsed.
        const DURATION = 0x01;
        /// An end-effector wrench component exceeded its threshold.
        const EFFORT   = 0x02;
    }
}

/// Stop conditions of a guarded velocity move. At least one must be set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionGuards {
    /// Move for this long, then finish.
    pub duration: Option<Duration>,
    /// Per-component wrench magnitude thresholds [N, N·m], force first.
    pub effort: Option<Vector6<f64>>,
}

impl MotionGuards {
    pub fn duration(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            effort: None,
        }
    }

    pub fn with_effort(mut self, thresholds: Vector6<f64>) -> Self {
        self.effort = Some(thresholds);
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.duration.is_none() && self.effort.is_none()
    }

    /// Guards that hold after `elapsed` with the measured `wrench`.
    pub fn triggered(&self, elapsed: Duration, wrench: Option<&Vector6<f64>>) -> GuardFlags {
        let mut triggered = GuardFlags::empty();
        if self.duration.is_some_and(|d| elapsed >= d) {
            triggered |= GuardFlags::DURATION;
        }
        if let (Some(limit), Some(wrench)) = (&self.effort, wrench) {
            if wrench.iter().zip(limit.iter()).any(|(w, l)| w.abs() > *l) {
                triggered |= GuardFlags::EFFORT;
            }
        }
        triggered
    }
}

/// Servo goal tuning. `None` fields use the configured defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ServoOptions {
    /// Proportional gain on pose error (capped at `MAX_SERVO_GAIN`).
    pub gain: Option<f64>,
    /// Pose-error norm below which the target counts as reached.
    pub threshold: Option<f64>,
}

/// A motion or control request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Streaming end-effector velocity.
    CartesianVelocity(Twist),
    /// Streaming joint velocity vector [rad/s].
    JointVelocity(Vec<f64>),
    /// End-effector velocity held until one of its guards triggers.
    GuardedVelocity {
        twist: Twist,
        guards: MotionGuards,
        options: GoalOptions,
    },
    /// Move the end effector to a pose and finish within tolerance.
    CartesianPoseGoal {
        target: Isometry3<f64>,
        options: GoalOptions,
    },
    /// Translate the end effector by `offset` [m] in the base frame from
    /// where it is at admission, keeping its orientation.
    StepPoseGoal {
        offset: Vector3<f64>,
        options: GoalOptions,
    },
    /// Continuously servo toward a pose until cancelled or superseded.
    ServoPoseGoal {
        target: Isometry3<f64>,
        servo: ServoOptions,
        options: GoalOptions,
    },
    /// Move to a joint configuration registered in the named pose store.
    NamedPoseGoal { name: String, options: GoalOptions },
    /// Move to an explicit joint configuration [rad].
    JointPoseGoal { joints: Vec<f64>, options: GoalOptions },
    /// Clear the active motion and hold position.
    Stop,
    /// Leave a fault state once the fault has cleared.
    Recover,
    /// Move to the configured home configuration.
    Home { options: GoalOptions },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::CartesianVelocity(_) => CommandKind::CartesianVelocity,
            Self::JointVelocity(_) => CommandKind::JointVelocity,
            Self::GuardedVelocity { .. } => CommandKind::GuardedVelocity,
            Self::CartesianPoseGoal { .. } => CommandKind::CartesianPoseGoal,
            Self::StepPoseGoal { .. } => CommandKind::StepPoseGoal,
            Self::ServoPoseGoal { .. } => CommandKind::ServoPoseGoal,
            Self::NamedPoseGoal { .. } => CommandKind::NamedPoseGoal,
            Self::JointPoseGoal { .. } => CommandKind::JointPoseGoal,
            Self::Stop => CommandKind::Stop,
            Self::Recover => CommandKind::Recover,
            Self::Home { .. } => CommandKind::Home,
        }
    }

    /// Timing options of a goal command.
    pub fn goal_options(&self) -> Option<&GoalOptions> {
        match self {
            Self::GuardedVelocity { options, .. }
            | Self::CartesianPoseGoal { options, .. }
            | Self::StepPoseGoal { options, .. }
            | Self::ServoPoseGoal { options, .. }
            | Self::NamedPoseGoal { options, .. }
            | Self::JointPoseGoal { options, .. }
            | Self::Home { options } => Some(options),
            Self::CartesianVelocity(_) | Self::JointVelocity(_) | Self::Stop | Self::Recover => None,
        }
    }
}

/// Payload-free discriminant of [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CartesianVelocity,
    JointVelocity,
    GuardedVelocity,
    CartesianPoseGoal,
    StepPoseGoal,
    ServoPoseGoal,
    NamedPoseGoal,
    JointPoseGoal,
    Stop,
    Recover,
    Home,
}

impl CommandKind {
    /// Streaming kinds are watched by the watchdog and never carry a goal.
    #[inline]
    pub const fn is_streaming(self) -> bool {
        matches!(self, Self::CartesianVelocity | Self::JointVelocity)
    }

    /// Goal kinds are mutually exclusive and preempt each other.
    #[inline]
    pub const fn is_goal(self) -> bool {
        matches!(
            self,
            Self::GuardedVelocity
                | Self::CartesianPoseGoal
                | Self::StepPoseGoal
                | Self::ServoPoseGoal
                | Self::NamedPoseGoal
                | Self::JointPoseGoal
                | Self::Home
        )
    }

    /// Stop and Recover bypass motion arbitration.
    #[inline]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Stop | Self::Recover)
    }
}

/// An immutable request as received by the command arbiter.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: Command,
    pub issued_at: Instant,
    pub source: SourceId,
}

impl CommandRequest {
    pub fn new(command: Command, source: SourceId) -> Self {
        Self {
            command,
            issued_at: Instant::now(),
            source,
        }
    }

    #[inline]
    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
