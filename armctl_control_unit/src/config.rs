//! TOML configuration loader with validation.
//!
//! One file drives the whole control unit:
//!
//! ```toml
//! [shared]
//! service_name = "armctl"
//!
//! [control]
//! rate_hz = 100.0
//! watchdog_timeout_s = 0.2
//!
//! [resolver]
//! profile = "minimum_jerk"
//!
//! [robot]
//! model = "simulation"
//! home = [0.0, -1.5708, 1.5708, -1.5708, -1.5708, 0.0]
//! named_pose_configs = ["config/poses.toml"]
//!
//! [robot.workspace]
//! min = [-1.0, -1.0, 0.0]
//! max = [1.0, 1.0, 1.2]
//!
//! [simulation]
//! ```
//!
//! Every key except `[shared] service_name` has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use armctl_common::config::{ConfigError, ConfigLoader, SharedConfig};
use armctl_common::consts::*;
use armctl_hal::config::{SimulationConfig, ur5_ready};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// ─── [control] ──────────────────────────────────────────────────────

/// Control loop timing and client plumbing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
    /// Fixed control rate [Hz].
    pub rate_hz: f64,
    /// Streaming command watchdog timeout [s].
    pub watchdog_timeout_s: f64,
    /// How long clients wait for an admission reply [s].
    pub request_timeout_s: f64,
    /// Bounded queue depth of each state subscriber.
    pub state_queue_depth: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            rate_hz: DEFAULT_CONTROL_RATE_HZ,
            watchdog_timeout_s: DEFAULT_WATCHDOG_TIMEOUT_S,
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
            state_queue_depth: DEFAULT_STATE_QUEUE_DEPTH,
        }
    }
}

impl ControlConfig {
    /// Tick length [s].
    #[inline]
    pub fn dt(&self) -> f64 {
        1.0 / self.rate_hz
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.dt())
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.watchdog_timeout_s)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_s)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rate_hz > 0.0 && self.rate_hz <= 10_000.0) {
            return Err(invalid("control.rate_hz must be in (0, 10000]"));
        }
        if self.watchdog_timeout_s < self.dt() {
            return Err(invalid(
                "control.watchdog_timeout_s must be at least one control period",
            ));
        }
        if self.request_timeout_s <= 0.0 {
            return Err(invalid("control.request_timeout_s must be positive"));
        }
        if self.state_queue_depth == 0 {
            return Err(invalid("control.state_queue_depth must be at least 1"));
        }
        Ok(())
    }
}

// ─── [resolver] ─────────────────────────────────────────────────────

/// Joint-space trajectory profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryProfile {
    /// Constant acceleration, cruise, constant deceleration.
    #[default]
    Trapezoidal,
    /// Fifth-order polynomial with zero boundary velocity and acceleration.
    MinimumJerk,
}

/// Motion resolution gains, tolerances and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Manipulability below which the pseudo-inverse is damped.
    pub manipulability_threshold: f64,
    /// Damping factor at zero manipulability.
    pub max_damping: f64,
    /// Proportional gain on position error for pose goals [1/s].
    pub position_gain: f64,
    /// Proportional gain on orientation error for pose goals [1/s].
    pub orientation_gain: f64,
    /// Pose goal position tolerance [m].
    pub position_tolerance: f64,
    /// Pose goal orientation tolerance [rad].
    pub orientation_tolerance: f64,
    /// Joint goal tolerance (max abs joint error) [rad].
    pub joint_tolerance: f64,
    /// Feedback gain on trajectory tracking error [1/s].
    pub trajectory_gain: f64,
    /// Tracking error that aborts a joint trajectory [rad].
    pub max_tracking_error: f64,
    pub profile: TrajectoryProfile,
    /// Max duration of pose and joint goals when the client gives none [s].
    pub default_goal_duration_s: f64,
    /// Max duration of servo goals when the client gives none [s].
    pub servo_max_duration_s: f64,
    /// Upper bound on any duration a client requests [s].
    pub max_goal_duration_s: f64,
    pub servo_gain: f64,
    pub servo_threshold: f64,
    /// Obstacle distance where approach velocity starts being removed [m].
    pub obstacle_influence_distance: f64,
    /// Obstacle distance where all approach velocity is removed [m].
    pub obstacle_stop_distance: f64,
    pub max_cartesian_speed: f64,
    pub max_angular_speed: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            manipulability_threshold: DEFAULT_MANIPULABILITY_THRESHOLD,
            max_damping: DEFAULT_MAX_DAMPING,
            position_gain: 2.0,
            orientation_gain: 2.0,
            position_tolerance: 0.001,
            orientation_tolerance: 0.01,
            joint_tolerance: 0.001,
            trajectory_gain: 5.0,
            max_tracking_error: DEFAULT_MAX_TRACKING_ERROR,
            profile: TrajectoryProfile::Trapezoidal,
            default_goal_duration_s: DEFAULT_GOAL_DURATION_S,
            servo_max_duration_s: DEFAULT_SERVO_DURATION_S,
            max_goal_duration_s: DEFAULT_MAX_GOAL_DURATION_S,
            servo_gain: DEFAULT_SERVO_GAIN,
            servo_threshold: DEFAULT_SERVO_THRESHOLD,
            obstacle_influence_distance: DEFAULT_OBSTACLE_INFLUENCE_DISTANCE,
            obstacle_stop_distance: DEFAULT_OBSTACLE_STOP_DISTANCE,
            max_cartesian_speed: DEFAULT_MAX_CARTESIAN_SPEED,
            max_angular_speed: DEFAULT_MAX_ANGULAR_SPEED,
        }
    }
}

impl ResolverConfig {
    pub fn default_goal_duration(&self) -> Duration {
        Duration::from_secs_f64(self.default_goal_duration_s)
    }

    pub fn servo_max_duration(&self) -> Duration {
        Duration::from_secs_f64(self.servo_max_duration_s)
    }

    pub fn max_goal_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_goal_duration_s)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("position_gain", self.position_gain),
            ("orientation_gain", self.orientation_gain),
            ("position_tolerance", self.position_tolerance),
            ("orientation_tolerance", self.orientation_tolerance),
            ("joint_tolerance", self.joint_tolerance),
            ("max_tracking_error", self.max_tracking_error),
            ("default_goal_duration_s", self.default_goal_duration_s),
            ("servo_max_duration_s", self.servo_max_duration_s),
            ("max_goal_duration_s", self.max_goal_duration_s),
            ("servo_gain", self.servo_gain),
            ("servo_threshold", self.servo_threshold),
            ("max_cartesian_speed", self.max_cartesian_speed),
            ("max_angular_speed", self.max_angular_speed),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(invalid(format!("resolver.{name} must be positive")));
            }
        }
        if self.manipulability_threshold < 0.0 || self.max_damping < 0.0 || self.trajectory_gain < 0.0 {
            return Err(invalid(
                "resolver damping, threshold and trajectory gain must be non-negative",
            ));
        }
        if self.default_goal_duration_s > self.max_goal_duration_s
            || self.servo_max_duration_s > self.max_goal_duration_s
        {
            return Err(invalid(
                "resolver default goal durations must not exceed max_goal_duration_s",
            ));
        }
        if self.servo_gain > MAX_SERVO_GAIN {
            return Err(invalid(format!(
                "resolver.servo_gain must not exceed {MAX_SERVO_GAIN}"
            )));
        }
        if self.obstacle_stop_distance < 0.0
            || self.obstacle_stop_distance >= self.obstacle_influence_distance
        {
            return Err(invalid(
                "resolver.obstacle_stop_distance must be in [0, obstacle_influence_distance)",
            ));
        }
        Ok(())
    }
}

// ─── [robot] ────────────────────────────────────────────────────────

/// Axis-aligned box the end effector may be commanded into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceBounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl WorkspaceBounds {
    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }
}

/// Robot selection and robot-specific poses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RobotConfig {
    /// Registry name of the robot model.
    pub model: String,
    /// Home joint configuration [rad].
    pub home: Vec<f64>,
    /// Named pose files loaded at startup.
    pub named_pose_configs: Vec<PathBuf>,
    /// Optional Cartesian workspace for pose targets.
    pub workspace: Option<WorkspaceBounds>,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            model: "simulation".to_string(),
            home: ur5_ready(),
            named_pose_configs: Vec::new(),
            workspace: None,
        }
    }
}

// ─── Top level ──────────────────────────────────────────────────────

/// Complete control unit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlUnitConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for ControlUnitConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig::default(),
            control: ControlConfig::default(),
            resolver: ResolverConfig::default(),
            robot: RobotConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl ControlUnitConfig {
    /// Validate every section.
    ///
    /// Joint vectors (`robot.home`) are checked against the robot's
    /// degrees of freedom when the control loop starts, since the model
    /// decides the DOF.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.control.validate()?;
        self.resolver.validate()?;
        self.simulation.validate()?;
        if self.robot.model.is_empty() {
            return Err(invalid("robot.model cannot be empty"));
        }
        if self.robot.home.iter().any(|v| !v.is_finite()) {
            return Err(invalid("robot.home must be finite"));
        }
        if let Some(ws) = &self.robot.workspace {
            if (0..3).any(|i| ws.min[i] >= ws.max[i]) {
                return Err(invalid("robot.workspace min must be below max"));
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Load and validate the control unit configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ControlUnitConfig, ConfigError> {
    let config = ControlUnitConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

/// Load and validate from an in-memory TOML document.
pub fn load_config_from_str(content: &str) -> Result<ControlUnitConfig, ConfigError> {
    let config = ControlUnitConfig::from_toml_str(content)?;
    config.validate()?;
    Ok(config)
}

// ─── Tests ──────────────────────────────────────────────────────────
