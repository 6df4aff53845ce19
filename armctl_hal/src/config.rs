//! Simulated arm configuration (`[simulation]` section).
//!
//! Defaults describe a UR5: standard DH parameters, ±2π joint range,
//! 180°/s joint speed.

use armctl_common::config::ConfigError;
use armctl_common::robot::{JointLimits, RobotError};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// Standard Denavit–Hartenberg parameters of one revolute joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DhParameter {
    /// Link length [m].
    pub a: f64,
    /// Link offset [m].
    pub d: f64,
    /// Link twist [rad].
    pub alpha: f64,
    /// Joint angle offset added to q [rad].
    #[serde(default)]
    pub offset: f64,
}

impl DhParameter {
    pub const fn new(a: f64, d: f64, alpha: f64) -> Self {
        Self {
            a,
            d,
            alpha,
            offset: 0.0,
        }
    }
}

/// UR5 standard DH table.
pub fn ur5_dh() -> Vec<DhParameter> {
    vec![
        DhParameter::new(0.0, 0.089159, FRAC_PI_2),
        DhParameter::new(-0.425, 0.0, 0.0),
        DhParameter::new(-0.39225, 0.0, 0.0),
        DhParameter::new(0.0, 0.10915, FRAC_PI_2),
        DhParameter::new(0.0, 0.09465, -FRAC_PI_2),
        DhParameter::new(0.0, 0.0823, 0.0),
    ]
}

/// UR5 "ready" configuration: elbow up, tool pointing down.
pub fn ur5_ready() -> Vec<f64> {
    vec![0.0, -FRAC_PI_2, FRAC_PI_2, -FRAC_PI_2, -FRAC_PI_2, 0.0]
}

fn default_position_min() -> Vec<f64> {
    vec![-2.0 * PI; 6]
}

fn default_position_max() -> Vec<f64> {
    vec![2.0 * PI; 6]
}

fn default_velocity_max() -> Vec<f64> {
    vec![PI; 6]
}

fn default_acceleration_max() -> Vec<f64> {
    vec![5.0; 6]
}

/// Configuration of the simulated arm.
///
/// # TOML Example
///
/// ```toml
/// [simulation]
/// velocity_max = [1.0, 1.0, 1.0, 2.0, 2.0, 2.0]
/// initial_joints = [0.0, -1.57, 1.57, -1.57, -1.57, 0.0]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default = "ur5_dh")]
    pub dh: Vec<DhParameter>,
    #[serde(default = "default_position_min")]
    pub position_min: Vec<f64>,
    #[serde(default = "default_position_max")]
    pub position_max: Vec<f64>,
    #[serde(default = "default_velocity_max")]
    pub velocity_max: Vec<f64>,
    #[serde(default = "default_acceleration_max")]
    pub acceleration_max: Vec<f64>,
    /// Joint configuration at startup.
    #[serde(default = "ur5_ready")]
    pub initial_joints: Vec<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dh: ur5_dh(),
            position_min: default_position_min(),
            position_max: default_position_max(),
            velocity_max: default_velocity_max(),
            acceleration_max: default_acceleration_max(),
            initial_joints: ur5_ready(),
        }
    }
}

impl SimulationConfig {
    #[inline]
    pub fn dof(&self) -> usize {
        self.dh.len()
    }

    /// Joint limits described by this configuration.
    pub fn joint_limits(&self) -> Result<JointLimits, RobotError> {
        JointLimits::new(
            &self.position_min,
            &self.position_max,
            &self.velocity_max,
            &self.acceleration_max,
        )
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - the DH table is empty
    /// - any limit vector or `initial_joints` does not match the DH table length
    /// - limits are inverted or non-positive
    /// - `initial_joints` lies outside the position limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dh.is_empty() {
            return Err(ConfigError::ValidationError(
                "simulation.dh must describe at least one joint".to_string(),
            ));
        }
        if self.position_min.len() != self.dof() || self.initial_joints.len() != self.dof() {
            return Err(ConfigError::ValidationError(format!(
                "simulation vectors must have {} entries",
                self.dof()
            )));
        }
        let limits = self
            .joint_limits()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        if let Some(joint) = limits.first_violation(&self.initial_joints) {
            return Err(ConfigError::ValidationError(format!(
                "simulation.initial_joints[{joint}] outside position limits"
            )));
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
