//! Robot model capability trait and supporting types.
//!
//! The driver never talks to hardware directly. Everything it needs from a
//! manipulator (joint state, kinematics, limits, command dispatch and
//! fault feedback) goes through [`RobotModel`], so a simulated arm and a
//! real one are interchangeable.
//!
//! # Lifecycle
//!
//! 1. Constructed by a registry factory from configuration
//! 2. `dispatch()` called once per control tick with the clamped command
//! 3. `feedback()` read after every dispatch

use nalgebra::{DMatrix, DVector, Isometry3, Vector3, Vector6};
use thiserror::Error;
use tracing::warn;

use crate::error::FaultFlags;
use crate::kinematics::{PoseError, damped_least_squares};

/// Error types for robot model operations.
#[derive(Debug, Clone, Error)]
pub enum RobotError {
    /// No joint configuration reaches the requested pose.
    #[error("target unreachable: {0}")]
    Unreachable(String),

    /// A vector had the wrong number of joints.
    #[error("expected {expected} joints, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Command dispatch to the hardware failed.
    #[error("communication error: {0}")]
    Communication(String),

    /// Model construction failed.
    #[error("configuration error: {0}")]
    Config(String),

    /// No model registered under this name.
    #[error("robot model not found: {0}")]
    ModelNotFound(String),
}

// ─── Joint Limits ───────────────────────────────────────────────────

/// Per-joint position, velocity and acceleration limits.
#[derive(Debug, Clone, PartialEq)]
pub struct JointLimits {
    pub position_min: DVector<f64>,
    pub position_max: DVector<f64>,
    /// Absolute velocity limit [rad/s].
    pub velocity_max: DVector<f64>,
    /// Absolute acceleration limit [rad/s²].
    pub acceleration_max: DVector<f64>,
}

impl JointLimits {
    /// Build limits from slices.
    ///
    /// # Errors
    /// `RobotError::Config` if lengths differ or any bound is inverted or non-positive.
    pub fn new(
        position_min: &[f64],
        position_max: &[f64],
        velocity_max: &[f64],
        acceleration_max: &[f64],
    ) -> Result<Self, RobotError> {
        let n = position_min.len();
        if [position_max.len(), velocity_max.len(), acceleration_max.len()]
            .iter()
            .any(|len| *len != n)
        {
            return Err(RobotError::Config(
                "joint limit vectors must have equal length".to_string(),
            ));
        }
        for i in 0..n {
            if position_min[i] >= position_max[i] {
                return Err(RobotError::Config(format!(
                    "joint {i}: position_min must be below position_max"
                )));
            }
            if velocity_max[i] <= 0.0 || acceleration_max[i] <= 0.0 {
                return Err(RobotError::Config(format!(
                    "joint {i}: velocity and acceleration limits must be positive"
                )));
            }
        }
        Ok(Self {
            position_min: DVector::from_column_slice(position_min),
            position_max: DVector::from_column_slice(position_max),
            velocity_max: DVector::from_column_slice(velocity_max),
            acceleration_max: DVector::from_column_slice(acceleration_max),
        })
    }

    #[inline]
    pub fn dof(&self) -> usize {
        self.position_min.len()
    }

    /// Index of the first joint outside its position limits.
    pub fn first_violation(&self, q: &[f64]) -> Option<usize> {
        q.iter()
            .enumerate()
            .find(|(i, v)| **v < self.position_min[*i] || **v > self.position_max[*i])
            .map(|(i, _)| i)
    }

    /// Clip each component to its velocity limit.
    pub fn clip_velocity(&self, qd: &mut DVector<f64>) {
        for (v, max) in qd.iter_mut().zip(self.velocity_max.iter()) {
            *v = v.clamp(-max, *max);
        }
    }
}

// ─── Commands & Feedback ────────────────────────────────────────────

/// Joint-level command dispatched once per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct JointCommand {
    /// Joint velocities [rad/s].
    pub velocities: DVector<f64>,
}

impl JointCommand {
    pub fn new(velocities: DVector<f64>) -> Self {
        Self { velocities }
    }

    pub fn zeros(dof: usize) -> Self {
        Self::new(DVector::zeros(dof))
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.velocities.iter().all(|v| *v == 0.0)
    }
}

/// Nearest obstacle relative to the end effector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    /// Distance from the end effector [m].
    pub distance: f64,
    /// Unit vector from the end effector toward the obstacle (base frame).
    pub direction: Vector3<f64>,
}

/// Fault and environment feedback read after each dispatch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RobotFeedback {
    pub faults: FaultFlags,
    pub obstacle: Option<Obstacle>,
    /// The robot cannot reach the current servo target.
    pub target_unreachable: bool,
    /// Measured end-effector wrench, force then torque [N, N·m].
    /// `None` when the robot has no force sensing.
    pub wrench: Option<Vector6<f64>>,
}

// ─── Robot Model ────────────────────────────────────────────────────

/// Capability interface of a manipulator.
pub trait RobotModel: Send {
    /// Returns the model's identifier (e.g., "simulation").
    fn name(&self) -> &str;

    /// Degrees of freedom.
    fn dof(&self) -> usize;

    /// Measured joint positions [rad].
    fn joint_positions(&self) -> DVector<f64>;

    /// Measured joint velocities [rad/s].
    fn joint_velocities(&self) -> DVector<f64>;

    fn joint_limits(&self) -> &JointLimits;

    /// End-effector pose for joint configuration `q`.
    fn forward_kinematics(&self, q: &DVector<f64>) -> Isometry3<f64>;

    /// 6×n geometric Jacobian at `q`, rows `[linear; angular]`.
    fn jacobian(&self, q: &DVector<f64>) -> DMatrix<f64>;

    /// Joint configuration reaching `target`, searched from `seed`.
    ///
    /// The default implementation iterates damped least squares on the
    /// pose error and rejects solutions outside the position limits.
    fn inverse_kinematics(
        &self,
        target: &Isometry3<f64>,
        seed: &DVector<f64>,
    ) -> Result<DVector<f64>, RobotError> {
        solve_ik(self, target, seed)
    }

    /// Apply a joint command for one tick of length `dt` seconds.
    fn dispatch(&mut self, command: &JointCommand, dt: f64) -> Result<(), RobotError>;

    /// Fault, obstacle and reachability feedback.
    fn feedback(&self) -> RobotFeedback;

    /// Set Cartesian impedance `[x, y, z, rx, ry, rz]`.
    ///
    /// Models without impedance control accept and ignore the request.
    fn set_cartesian_impedance(&mut self, stiffness: &[f64; 6]) -> Result<(), RobotError> {
        warn!(
            "{}: Cartesian impedance not supported, ignoring {:?}",
            self.name(),
            stiffness
        );
        Ok(())
    }
}

const IK_MAX_ITERATIONS: usize = 500;
const IK_POSITION_TOLERANCE: f64 = 1e-6;
const IK_ORIENTATION_TOLERANCE: f64 = 1e-5;
const IK_DAMPING_SQ: f64 = 1e-4;
const IK_MAX_STEP: f64 = 0.2;

fn solve_ik<R: RobotModel + ?Sized>(
    model: &R,
    target: &Isometry3<f64>,
    seed: &DVector<f64>,
) -> Result<DVector<f64>, RobotError> {
    if seed.len() != model.dof() {
        return Err(RobotError::DimensionMismatch {
            expected: model.dof(),
            actual: seed.len(),
        });
    }

    let mut q = seed.clone();
    for _ in 0..IK_MAX_ITERATIONS {
        let error = PoseError::between(&model.forward_kinematics(&q), target);
        if error.position_norm() < IK_POSITION_TOLERANCE
            && error.orientation_norm() < IK_ORIENTATION_TOLERANCE
        {
            return match model.joint_limits().first_violation(q.as_slice()) {
                None => Ok(q),
                Some(joint) => Err(RobotError::Unreachable(format!(
                    "solution violates joint {joint} limits"
                ))),
            };
        }

        let e = DVector::from_column_slice(error.as_vector().as_slice());
        let mut step = damped_least_squares(&model.jacobian(&q), &e, IK_DAMPING_SQ);
        let norm = step.norm();
        if norm > IK_MAX_STEP {
            step *= IK_MAX_STEP / norm;
        }
        q += step;
    }

    Err(RobotError::Unreachable(format!(
        "no convergence after {IK_MAX_ITERATIONS} iterations"
    )))
}

// ─── Tests ──────────────────────────────────────────────────────────
