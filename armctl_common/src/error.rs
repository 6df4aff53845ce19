//! Error taxonomy and safety bitflags.
//!
//! [`DriverError`] is the single error type returned to clients: admission
//! rejections come back synchronously, in-flight failures arrive as the
//! failure outcome of a goal. Robot fault feedback is a [`FaultFlags`]
//! bitmask; the published state carries a [`SafetyFlags`] bitmask.

use bitflags::bitflags;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::robot::RobotError;
use crate::state::SafetyState;

bitflags! {
    /// Fault conditions reported by a robot model.
    ///
    /// Any set bit moves the driver into a fault state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FaultFlags: u8 {
        /// Contact or collision detected.
        const COLLISION  = 0x01;
        /// A joint is outside its position limits.
        const JOINT_LIMIT = 0x02;
        /// Drive, controller or communication fault.
        const HARDWARE   = 0x04;
    }
}

impl FaultFlags {
    /// Fault state the driver enters for this fault set.
    ///
    /// Collision takes precedence over limit violation, which takes
    /// precedence over a generic hardware fault.
    pub const fn fault_state(self) -> Option<SafetyState> {
        if self.contains(Self::COLLISION) {
            Some(SafetyState::Collision)
        } else if self.contains(Self::JOINT_LIMIT) {
            Some(SafetyState::LimitViolation)
        } else if self.contains(Self::HARDWARE) {
            Some(SafetyState::Error)
        } else {
            None
        }
    }
}

impl Default for FaultFlags {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Safety bitmask published with every state snapshot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SafetyFlags: u16 {
        /// Driver is in COLLISION. **CRITICAL**
        const COLLISION        = 0x0001;
        /// Driver is in LIMIT_VIOLATION. **CRITICAL**
        const JOINT_LIMIT      = 0x0002;
        /// Driver is in ERROR. **CRITICAL**
        const HARDWARE_FAULT   = 0x0004;
        /// Manipulability below threshold, damping active.
        const SINGULARITY      = 0x0008;
        /// Last streaming motion was stopped by the watchdog.
        const WATCHDOG_EXPIRED = 0x0010;
        /// Driver is PAUSED.
        const PAUSED           = 0x0020;
        /// A motion is active.
        const MOTION_ACTIVE    = 0x0040;
        /// Obstacle inside the avoidance influence distance.
        const OBSTACLE_NEAR    = 0x0080;
    }
}

impl SafetyFlags {
    /// Flags that correspond to a fault state.
    pub const CRITICAL_MASK: Self = Self::from_bits_truncate(
        Self::COLLISION.bits() | Self::JOINT_LIMIT.bits() | Self::HARDWARE_FAULT.bits(),
    );

    /// Returns true if any CRITICAL flag is set.
    #[inline]
    pub const fn has_critical(&self) -> bool {
        self.intersects(Self::CRITICAL_MASK)
    }

    /// Flags implied by a safety state.
    pub const fn for_state(state: SafetyState) -> Self {
        match state {
            SafetyState::Collision => Self::COLLISION,
            SafetyState::LimitViolation => Self::JOINT_LIMIT,
            SafetyState::Error => Self::HARDWARE_FAULT,
            SafetyState::Paused => Self::PAUSED,
            SafetyState::Ready | SafetyState::Moving => Self::empty(),
        }
    }
}

impl Default for SafetyFlags {
    fn default() -> Self {
        Self::empty()
    }
}

// ─── Driver Error ───────────────────────────────────────────────────

/// Every failure a client of the driver can observe.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// Malformed request: wrong vector length, non-finite values,
    /// target outside limits or workspace.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Streaming command rejected while a goal-based motion is active.
    #[error("busy: a goal-based motion is active")]
    Busy,

    /// Motion request rejected because the driver is in a fault state.
    #[error("motion not allowed in {0} state")]
    Faulted(SafetyState),

    /// Recover rejected because the robot still reports a fault.
    #[error("fault still present: {0:?}")]
    FaultStillPresent(FaultFlags),

    /// Recover rejected because the driver is not in a fault state.
    #[error("nothing to recover from in {0} state")]
    NothingToRecover(SafetyState),

    /// Target unreachable, IK failure or excessive tracking error.
    #[error("kinematic failure: {0}")]
    Kinematic(String),

    /// Robot reported a fault during motion.
    #[error("hardware fault: {0:?}")]
    Hardware(FaultFlags),

    /// Goal exceeded its max duration, or a reply did not arrive in time.
    #[error("timed out")]
    Timeout,

    /// A pose name in a config file already exists in the store.
    #[error("duplicate pose name: {0}")]
    DuplicateName(String),

    /// A pose with this name exists and overwrite was not requested.
    #[error("named pose already exists: {0}")]
    NameExists(String),

    /// Named pose or config not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The named pose config is already loaded.
    #[error("config already loaded: {}", .0.display())]
    ConfigAlreadyLoaded(PathBuf),

    /// The control loop is gone.
    #[error("driver disconnected")]
    Disconnected,

    /// The control thread could not be started.
    #[error("failed to start control thread: {0}")]
    Spawn(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Robot(#[from] RobotError),
}

// ─── Tests ──────────────────────────────────────────────────────────
