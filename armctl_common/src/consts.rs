//! Default tuning constants for the armctl workspace.
//!
//! Single source of truth for every default the configuration layer falls
//! back to when a key is omitted.

/// Default control loop rate [Hz].
pub const DEFAULT_CONTROL_RATE_HZ: f64 = 100.0;

/// Default streaming-command watchdog timeout [s].
pub const DEFAULT_WATCHDOG_TIMEOUT_S: f64 = 0.2;

/// Default time a client waits for an admission reply [s].
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 1.0;

/// Default per-subscriber state snapshot queue depth.
pub const DEFAULT_STATE_QUEUE_DEPTH: usize = 8;

/// Manipulability below which damping is applied to the pseudo-inverse.
pub const DEFAULT_MANIPULABILITY_THRESHOLD: f64 = 0.02;

/// Damping factor reached at zero manipulability.
pub const DEFAULT_MAX_DAMPING: f64 = 0.05;

/// Default max duration of pose and joint goals [s].
pub const DEFAULT_GOAL_DURATION_S: f64 = 5.0;

/// Default max duration of servo goals [s].
pub const DEFAULT_SERVO_DURATION_S: f64 = 30.0;

/// Longest goal duration a client may request [s].
pub const DEFAULT_MAX_GOAL_DURATION_S: f64 = 600.0;

/// Default servo proportional gain.
pub const DEFAULT_SERVO_GAIN: f64 = 0.2;

/// Upper bound applied to any requested servo gain.
pub const MAX_SERVO_GAIN: f64 = 20.0;

/// Default servo arrival threshold (norm of the pose error).
pub const DEFAULT_SERVO_THRESHOLD: f64 = 0.005;

/// Cap on commanded end-effector linear speed [m/s].
pub const DEFAULT_MAX_CARTESIAN_SPEED: f64 = 2.0;

/// Cap on commanded end-effector angular speed [rad/s].
pub const DEFAULT_MAX_ANGULAR_SPEED: f64 = 2.0;

/// Joint-space tracking error that aborts a trajectory [rad].
pub const DEFAULT_MAX_TRACKING_ERROR: f64 = 0.5;

/// Distance at which obstacle avoidance starts removing approach velocity [m].
pub const DEFAULT_OBSTACLE_INFLUENCE_DISTANCE: f64 = 0.15;

/// Distance at which all approach velocity is removed [m].
pub const DEFAULT_OBSTACLE_STOP_DISTANCE: f64 = 0.05;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/armctl.toml";
