//! Client surface of the driver.
//!
//! [`DriverHandle`] is the only way into the control loop. Streaming input
//! is fire-and-forget; every other request waits for the loop's admission
//! reply on a private channel. Named pose operations go straight to the
//! shared store and never involve the loop.
//!
//! ```no_run
//! use armctl_common::command::{GoalOptions, Twist};
//! use armctl_control_unit::config::ControlUnitConfig;
//! use armctl_control_unit::driver::Driver;
//! use armctl_hal::driver_registry::ModelRegistry;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ControlUnitConfig::default();
//! let robot = ModelRegistry::with_builtin_models().create("simulation", &config.simulation)?;
//! let driver = Driver::spawn(config, robot)?;
//! let arm = driver.handle();
//!
//! let goal = arm.home(GoalOptions::default())?;
//! let result = goal.wait(Duration::from_secs(10))?;
//! assert!(result.success());
//!
//! arm.publish_twist(Twist::linear(0.05, 0.0, 0.0))?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use armctl_common::command::{
    Command, CommandRequest, GoalOptions, MotionGuards, ServoOptions, SourceId, Twist,
};
use armctl_common::error::DriverError;
use armctl_common::robot::RobotModel;
use armctl_common::state::ManipulatorStateSnapshot;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use nalgebra::{Isometry3, Vector3};
use tracing::{info, warn};

use crate::command::goal::{GoalHandle, GoalLink, goal_channel};
use crate::config::ControlUnitConfig;
use crate::cycle::{ControlLoop, CycleStats, SharedSnapshot};
use crate::poses::{NamedPose, SharedPoseStore};

type Reply = Sender<Result<(), DriverError>>;

/// Message from a client handle to the control loop.
#[derive(Debug)]
pub(crate) enum Inbound {
    Command {
        request: CommandRequest,
        goal: Option<GoalLink>,
        /// `None` for fire-and-forget streaming input.
        reply: Option<Reply>,
    },
    Impedance {
        stiffness: [f64; 6],
        reply: Reply,
    },
    Subscribe(Sender<ManipulatorStateSnapshot>),
}

/// Admission reply not yet received.
#[derive(Debug)]
pub struct PendingAdmission {
    rx: Receiver<Result<(), DriverError>>,
}

impl PendingAdmission {
    /// Block until the control loop has decided on the request.
    pub fn wait(self, timeout: Duration) -> Result<(), DriverError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(DriverError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(DriverError::Disconnected),
        }
    }

    /// Decision if already made.
    pub fn try_recv(&self) -> Option<Result<(), DriverError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(DriverError::Disconnected)),
        }
    }
}

#[derive(Debug, Default)]
struct IdAllocator {
    sources: AtomicU64,
    goals: AtomicU64,
}

impl IdAllocator {
    fn next_source(&self) -> SourceId {
        SourceId(self.sources.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn next_goal(&self) -> u64 {
        self.goals.fetch_add(1, Ordering::Relaxed) + 1
    }
}

// ─── Driver Handle ──────────────────────────────────────────────────

/// Client endpoint of the driver.
///
/// Clones share the same [`SourceId`]; use [`DriverHandle::new_client`] for
/// an independent source (one per streaming producer).
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: Sender<Inbound>,
    source: SourceId,
    ids: Arc<IdAllocator>,
    poses: SharedPoseStore,
    latest: SharedSnapshot,
    request_timeout: Duration,
    state_queue_depth: usize,
}

impl DriverHandle {
    pub(crate) fn new(
        tx: Sender<Inbound>,
        poses: SharedPoseStore,
        latest: SharedSnapshot,
        request_timeout: Duration,
        state_queue_depth: usize,
    ) -> Self {
        let ids = Arc::new(IdAllocator::default());
        Self {
            tx,
            source: ids.next_source(),
            ids,
            poses,
            latest,
            request_timeout,
            state_queue_depth,
        }
    }

    /// Handle with a fresh source id.
    pub fn new_client(&self) -> Self {
        Self {
            source: self.ids.next_source(),
            ..self.clone()
        }
    }

    #[inline]
    pub fn source(&self) -> SourceId {
        self.source
    }

    fn send(&self, message: Inbound) -> Result<(), DriverError> {
        self.tx.send(message).map_err(|_| DriverError::Disconnected)
    }

    // ─── Streaming ──────────────────────────────────────────────────

    /// Publish a Cartesian twist. Must be repeated faster than the watchdog
    /// timeout to keep the motion alive.
    pub fn publish_twist(&self, twist: Twist) -> Result<(), DriverError> {
        self.publish(Command::CartesianVelocity(twist))
    }

    /// Publish joint velocities [rad/s].
    pub fn publish_joint_velocity(&self, velocities: Vec<f64>) -> Result<(), DriverError> {
        self.publish(Command::JointVelocity(velocities))
    }

    fn publish(&self, command: Command) -> Result<(), DriverError> {
        self.send(Inbound::Command {
            request: CommandRequest::new(command, self.source),
            goal: None,
            reply: None,
        })
    }

    // ─── Requests ───────────────────────────────────────────────────

    /// Submit any request and return without waiting for the decision.
    pub fn submit_async(&self, command: Command) -> Result<PendingAdmission, DriverError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Inbound::Command {
            request: CommandRequest::new(command, self.source),
            goal: None,
            reply: Some(reply),
        })?;
        Ok(PendingAdmission { rx })
    }

    /// Submit a request and wait for admission.
    pub fn submit(&self, command: Command) -> Result<(), DriverError> {
        self.submit_async(command)?.wait(self.request_timeout)
    }

    /// Submit a goal without waiting for admission.
    pub fn send_goal_async(
        &self,
        command: Command,
    ) -> Result<(PendingAdmission, GoalHandle), DriverError> {
        if !command.kind().is_goal() {
            return Err(DriverError::Validation(format!(
                "{:?} is not a goal",
                command.kind()
            )));
        }
        let (handle, link) = goal_channel(self.ids.next_goal());
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Inbound::Command {
            request: CommandRequest::new(command, self.source),
            goal: Some(link),
            reply: Some(reply),
        })?;
        Ok((PendingAdmission { rx }, handle))
    }

    /// Submit a goal; returns its handle once admitted.
    pub fn send_goal(&self, command: Command) -> Result<GoalHandle, DriverError> {
        let (pending, handle) = self.send_goal_async(command)?;
        pending.wait(self.request_timeout)?;
        Ok(handle)
    }

    pub fn move_to_pose(
        &self,
        target: Isometry3<f64>,
        options: GoalOptions,
    ) -> Result<GoalHandle, DriverError> {
        self.send_goal(Command::CartesianPoseGoal { target, options })
    }

    /// Translate the end effector by `offset` [m] from where it is now.
    pub fn step(&self, offset: Vector3<f64>, options: GoalOptions) -> Result<GoalHandle, DriverError> {
        self.send_goal(Command::StepPoseGoal { offset, options })
    }

    /// Move at `twist` until one of `guards` triggers; the result reports
    /// which.
    pub fn guarded_velocity(
        &self,
        twist: Twist,
        guards: MotionGuards,
        options: GoalOptions,
    ) -> Result<GoalHandle, DriverError> {
        self.send_goal(Command::GuardedVelocity {
            twist,
            guards,
            options,
        })
    }

    pub fn servo_to_pose(
        &self,
        target: Isometry3<f64>,
        servo: ServoOptions,
        options: GoalOptions,
    ) -> Result<GoalHandle, DriverError> {
        self.send_goal(Command::ServoPoseGoal {
            target,
            servo,
            options,
        })
    }

    pub fn move_to_named_pose(
        &self,
        name: &str,
        options: GoalOptions,
    ) -> Result<GoalHandle, DriverError> {
        self.send_goal(Command::NamedPoseGoal {
            name: name.to_string(),
            options,
        })
    }

    pub fn move_to_joint_pose(
        &self,
        joints: Vec<f64>,
        options: GoalOptions,
    ) -> Result<GoalHandle, DriverError> {
        self.send_goal(Command::JointPoseGoal { joints, options })
    }

    /// Move to the configured home pose.
    pub fn home(&self, options: GoalOptions) -> Result<GoalHandle, DriverError> {
        self.send_goal(Command::Home { options })
    }

    /// Clear the active motion and hold position.
    pub fn stop(&self) -> Result<(), DriverError> {
        self.submit(Command::Stop)
    }

    /// Leave a fault state once the robot no longer reports the fault.
    pub fn recover(&self) -> Result<(), DriverError> {
        self.submit(Command::Recover)
    }

    /// Forward Cartesian stiffness `[x, y, z, rx, ry, rz]` to the robot.
    pub fn set_cartesian_impedance(&self, stiffness: [f64; 6]) -> Result<(), DriverError> {
        if stiffness.iter().any(|k| !k.is_finite() || *k < 0.0) {
            return Err(DriverError::Validation(
                "stiffness must be finite and non-negative".to_string(),
            ));
        }
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Inbound::Impedance { stiffness, reply })?;
        PendingAdmission { rx }.wait(self.request_timeout)
    }

    // ─── Named poses ────────────────────────────────────────────────

    pub fn named_poses(&self) -> BTreeMap<String, NamedPose> {
        self.poses.read().list()
    }

    pub fn named_pose(&self, name: &str) -> Option<NamedPose> {
        self.poses.read().get(name).cloned()
    }

    /// Add a named pose; `None` stores the current joint positions.
    pub fn add_named_pose(
        &self,
        name: &str,
        joints: Option<Vec<f64>>,
        overwrite: bool,
    ) -> Result<(), DriverError> {
        let joints = joints.unwrap_or_else(|| {
            self.latest.read().joint_positions.iter().copied().collect()
        });
        self.poses.write().add(name, joints, overwrite)
    }

    pub fn remove_named_pose(&self, name: &str) -> Result<NamedPose, DriverError> {
        self.poses.write().remove(name)
    }

    /// Load a named pose config file; returns the number of poses added.
    pub fn add_named_pose_config(&self, path: &Path) -> Result<usize, DriverError> {
        self.poses.write().add_config(path)
    }

    /// Unload a config; returns the number of poses removed.
    pub fn remove_named_pose_config(&self, path: &Path) -> Result<usize, DriverError> {
        self.poses.write().remove_config(path)
    }

    pub fn named_pose_configs(&self) -> Vec<PathBuf> {
        self.poses.read().configs().to_vec()
    }

    // ─── State ──────────────────────────────────────────────────────

    /// Receive a snapshot every tick. Snapshots are skipped while the
    /// receiver is full.
    pub fn subscribe(&self) -> Result<Receiver<ManipulatorStateSnapshot>, DriverError> {
        let (tx, rx) = crossbeam_channel::bounded(self.state_queue_depth);
        self.send(Inbound::Subscribe(tx))?;
        Ok(rx)
    }

    pub fn latest_state(&self) -> ManipulatorStateSnapshot {
        self.latest.read().clone()
    }
}

// ─── Driver ─────────────────────────────────────────────────────────

/// Control loop running on its own thread.
///
/// Dropping the driver stops the loop and joins the thread.
pub struct Driver {
    handle: DriverHandle,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<CycleStats>>,
}

impl Driver {
    pub fn spawn(
        config: ControlUnitConfig,
        robot: Box<dyn RobotModel>,
    ) -> Result<Self, DriverError> {
        let (control, handle) = ControlLoop::new(config, robot)?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("armctl-control".to_string())
            .spawn(move || control.run(flag))
            .map_err(|e| DriverError::Spawn(e.to_string()))?;
        Ok(Self {
            handle,
            running,
            thread: Some(thread),
        })
    }

    /// A new handle with its own source id.
    pub fn handle(&self) -> DriverHandle {
        self.handle.new_client()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and return its statistics.
    pub fn shutdown(mut self) -> Option<CycleStats> {
        self.stop_thread()
    }

    fn stop_thread(&mut self) -> Option<CycleStats> {
        self.running.store(false, Ordering::Release);
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(stats) => {
                info!("Driver stopped");
                Some(stats)
            }
            Err(_) => {
                warn!("Control thread panicked");
                None
            }
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
