//! Simulated arm implementing the `RobotModel` trait.
//!
//! Joint velocities are integrated exactly (`q += q̇·dt`) and saturated at
//! the position limits. Faults, obstacles and reachability come from the
//! arm's [`FaultInjector`].

use super::chain::DhChain;
use super::faults::FaultInjector;
use crate::config::SimulationConfig;
use armctl_common::robot::{JointCommand, JointLimits, RobotError, RobotFeedback, RobotModel};
use nalgebra::{DMatrix, DVector, Isometry3};
use tracing::{debug, info, warn};

/// Kinematic simulation of a serial arm.
pub struct SimulatedArm {
    name: &'static str,
    chain: DhChain,
    limits: JointLimits,
    q: DVector<f64>,
    qd: DVector<f64>,
    injector: FaultInjector,
    /// Cumulative simulated time [s].
    sim_time: f64,
}

impl SimulatedArm {
    /// Create a simulated arm from configuration.
    ///
    /// # Errors
    /// `RobotError::Config` if the configuration fails validation.
    pub fn new(config: &SimulationConfig) -> Result<Self, RobotError> {
        config
            .validate()
            .map_err(|e| RobotError::Config(e.to_string()))?;
        let limits = config.joint_limits()?;
        let dof = config.dof();
        info!("Initializing simulated arm with {} joints", dof);

        Ok(Self {
            name: "simulation",
            chain: DhChain::new(config.dh.clone()),
            limits,
            q: DVector::from_column_slice(&config.initial_joints),
            qd: DVector::zeros(dof),
            injector: FaultInjector::new(),
            sim_time: 0.0,
        })
    }

    /// Handle for injecting faults into this arm.
    pub fn injector(&self) -> FaultInjector {
        self.injector.clone()
    }

    /// Teleport the arm to `q` (test and tooling helper).
    pub fn set_joint_positions(&mut self, q: &[f64]) -> Result<(), RobotError> {
        if q.len() != self.q.len() {
            return Err(RobotError::DimensionMismatch {
                expected: self.q.len(),
                actual: q.len(),
            });
        }
        self.q = DVector::from_column_slice(q);
        self.qd.fill(0.0);
        Ok(())
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }
}

impl RobotModel for SimulatedArm {
    fn name(&self) -> &str {
        self.name
    }

    fn dof(&self) -> usize {
        self.chain.dof()
    }

    fn joint_positions(&self) -> DVector<f64> {
        self.q.clone()
    }

    fn joint_velocities(&self) -> DVector<f64> {
        self.qd.clone()
    }

    fn joint_limits(&self) -> &JointLimits {
        &self.limits
    }

    fn forward_kinematics(&self, q: &DVector<f64>) -> Isometry3<f64> {
        self.chain.forward_kinematics(q)
    }

    fn jacobian(&self, q: &DVector<f64>) -> DMatrix<f64> {
        self.chain.jacobian(q)
    }

    fn dispatch(&mut self, command: &JointCommand, dt: f64) -> Result<(), RobotError> {
        if command.velocities.len() != self.q.len() {
            return Err(RobotError::DimensionMismatch {
                expected: self.q.len(),
                actual: command.velocities.len(),
            });
        }

        // A faulted arm refuses motion.
        if !self.injector.faults().is_empty() {
            if !command.is_zero() {
                warn!("Simulation: motion command ignored while faulted");
            }
            self.qd.fill(0.0);
            self.sim_time += dt;
            return Ok(());
        }

        self.qd.copy_from(&command.velocities);
        for i in 0..self.q.len() {
            let next = self.q[i] + self.qd[i] * dt;
            let clamped = next.clamp(self.limits.position_min[i], self.limits.position_max[i]);
            if clamped != next {
                debug!("Simulation: joint {} saturated at {:.4}", i, clamped);
                self.qd[i] = 0.0;
            }
            self.q[i] = clamped;
        }
        self.sim_time += dt;
        Ok(())
    }

    fn feedback(&self) -> RobotFeedback {
        RobotFeedback {
            faults: self.injector.faults(),
            obstacle: self.injector.obstacle(),
            target_unreachable: self.injector.unreachable(),
            wrench: self.injector.wrench(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
