//! Control loop.
//!
//! A single thread owns the robot model, the active motion and the safety
//! state. Clients talk to it only through the request inbox; every tick:
//!
//! 1. Drain the inbox: admit or reject requests, reply to each
//! 2. Watchdog: stop a streaming motion whose source went quiet
//! 3. Cancellation: end a goal whose client cancelled it
//! 4. Gate: on a reported fault or in a fault state skip resolution,
//!    command zero
//! 5. Resolve the active motion; conclude it on Done / Failed
//! 6. Clamp to joint limits
//! 7. Dispatch
//! 8. Read fault feedback, enter a fault state, abort the motion
//! 9. Publish the state snapshot
//!
//! [`ControlLoop::tick`] takes the tick time explicitly so the whole loop can
//! be driven deterministically in tests; [`ControlLoop::run`] paces it at the
//! configured rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use armctl_common::command::{CommandKind, CommandRequest};
use armctl_common::error::{DriverError, FaultFlags};
use armctl_common::kinematics::manipulability;
use armctl_common::robot::{JointCommand, RobotFeedback, RobotModel};
use armctl_common::state::{ManipulatorStateSnapshot, SafetyState};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use nalgebra::Vector6;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::command::arbitration::{Admission, AdmissionContext, CommandArbiter};
use crate::command::goal::{CancelReason, GoalLink, GoalOutcome};
use crate::command::watchdog::StreamWatchdog;
use crate::config::{ControlUnitConfig, ResolverConfig, RobotConfig};
use crate::driver::{DriverHandle, Inbound};
use crate::motion::resolver::{MotionResolver, Resolution};
use crate::poses::{NamedPoseStore, SharedPoseStore};
use crate::safety::limits::{FlagInputs, clamp_command, evaluate_flags};
use crate::safety::state::{SafetyEvent, SafetyStateMachine, SafetyTransition};

/// Latest snapshot shared with client handles.
pub type SharedSnapshot = Arc<RwLock<ManipulatorStateSnapshot>>;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// Per-tick timing statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleStats {
    /// Total ticks executed.
    pub cycle_count: u64,
    /// Last tick duration [ns].
    pub last_cycle_ns: u64,
    pub min_cycle_ns: u64,
    pub max_cycle_ns: u64,
    /// Running sum for the average.
    pub sum_cycle_ns: u64,
    /// Ticks that took longer than the period.
    pub overruns: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: u64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
        }
    }

    /// Record a tick duration against the period budget.
    ///
    /// Returns true if the tick overran.
    #[inline]
    pub fn record(&mut self, duration: Duration, budget: Duration) -> bool {
        let ns = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.cycle_count += 1;
        self.last_cycle_ns = ns;
        self.min_cycle_ns = self.min_cycle_ns.min(ns);
        self.max_cycle_ns = self.max_cycle_ns.max(ns);
        self.sum_cycle_ns = self.sum_cycle_ns.saturating_add(ns);
        let overrun = duration > budget;
        if overrun {
            self.overruns += 1;
        }
        overrun
    }

    /// Average tick time [ns] (0 if no ticks).
    #[inline]
    pub fn avg_cycle_ns(&self) -> u64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Control Loop ───────────────────────────────────────────────────

pub struct ControlLoop {
    robot: Box<dyn RobotModel>,
    robot_config: RobotConfig,
    resolver: MotionResolver,
    arbiter: CommandArbiter,
    watchdog: StreamWatchdog,
    safety: SafetyStateMachine,
    poses: SharedPoseStore,
    inbox: Receiver<Inbound>,
    subscribers: Vec<Sender<ManipulatorStateSnapshot>>,
    latest: SharedSnapshot,
    last_command: JointCommand,
    /// Last streaming motion was ended by the watchdog; cleared on the next admission.
    watchdog_expired: bool,
    dt: f64,
    period: Duration,
    cycle: u64,
    stats: CycleStats,
}

impl ControlLoop {
    /// Build the loop around `robot` and the handle clients use to reach it.
    ///
    /// Named pose configs listed in the robot section are loaded here.
    ///
    /// # Errors
    /// - `Config` if the configuration is invalid
    /// - `Validation` if the home pose does not fit the robot
    /// - any error of [`NamedPoseStore::add_config`]
    pub fn new(
        config: ControlUnitConfig,
        robot: Box<dyn RobotModel>,
    ) -> Result<(Self, DriverHandle), DriverError> {
        config.validate()?;

        let dof = robot.dof();
        if config.robot.home.len() != dof {
            return Err(DriverError::Validation(format!(
                "home pose has {} joints, robot '{}' has {dof}",
                config.robot.home.len(),
                robot.name()
            )));
        }
        if let Some(joint) = robot.joint_limits().first_violation(&config.robot.home) {
            return Err(DriverError::Validation(format!(
                "home pose outside limits at joint {joint}"
            )));
        }

        let mut store = NamedPoseStore::new(dof);
        for path in &config.robot.named_pose_configs {
            store.add_config(path)?;
        }
        let poses = store.into_shared();

        let q = robot.joint_positions();
        let initial = ManipulatorStateSnapshot::at_rest(q.clone(), robot.forward_kinematics(&q));
        let latest = Arc::new(RwLock::new(initial));

        let (tx, inbox) = crossbeam_channel::unbounded();
        let handle = DriverHandle::new(
            tx,
            Arc::clone(&poses),
            Arc::clone(&latest),
            config.control.request_timeout(),
            config.control.state_queue_depth,
        );

        info!(
            "Control loop ready: model '{}', {} joints, {} Hz, watchdog {:?}",
            robot.name(),
            dof,
            config.control.rate_hz,
            config.control.watchdog_timeout()
        );

        let dt = config.control.dt();
        let control = Self {
            robot,
            robot_config: config.robot,
            resolver: MotionResolver::new(config.resolver, dt),
            arbiter: CommandArbiter::new(),
            watchdog: StreamWatchdog::new(config.control.watchdog_timeout()),
            safety: SafetyStateMachine::new(),
            poses,
            inbox,
            subscribers: Vec::new(),
            latest,
            last_command: JointCommand::zeros(dof),
            watchdog_expired: false,
            dt,
            period: config.control.period(),
            cycle: 0,
            stats: CycleStats::new(),
        };
        Ok((control, handle))
    }

    #[inline]
    pub fn safety_state(&self) -> SafetyState {
        self.safety.state()
    }

    /// Command dispatched on the last tick.
    #[inline]
    pub fn last_command(&self) -> &JointCommand {
        &self.last_command
    }

    #[inline]
    pub fn active_kind(&self) -> Option<CommandKind> {
        self.arbiter.active_kind()
    }

    #[inline]
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn robot(&self) -> &dyn RobotModel {
        self.robot.as_ref()
    }

    /// Tick period.
    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one control tick at time `now` and return the published snapshot.
    pub fn tick(&mut self, now: Instant) -> ManipulatorStateSnapshot {
        self.cycle += 1;
        self.drain_inbox(now);
        self.check_watchdog(now);
        self.check_cancellation();

        // A fault raised since the last dispatch aborts the motion before it
        // is resolved again.
        let feedback = self.robot.feedback();
        if !feedback.faults.is_empty() {
            self.enter_fault(feedback.faults);
        }
        let mut command = self.resolve(&feedback, now);

        let q = self.robot.joint_positions();
        if clamp_command(&mut command, &q, self.robot.joint_limits(), self.dt) {
            debug!("Joint command clamped to limits");
        }

        let mut faults = FaultFlags::empty();
        if let Err(e) = self.robot.dispatch(&command, self.dt) {
            error!("Dispatch failed: {e}");
            faults |= FaultFlags::HARDWARE;
        }
        self.last_command = command;

        let feedback = self.robot.feedback();
        faults |= feedback.faults;
        if !faults.is_empty() {
            self.enter_fault(faults);
        }

        self.publish(&feedback)
    }

    /// Run at the configured rate until `running` is cleared.
    ///
    /// The active motion is stopped before returning.
    pub fn run(mut self, running: Arc<AtomicBool>) -> CycleStats {
        info!("Control loop started ({:?} period)", self.period);
        while running.load(Ordering::Acquire) {
            let start = Instant::now();
            self.tick(start);

            let elapsed = start.elapsed();
            if self.stats.record(elapsed, self.period) {
                warn!(
                    "Cycle overrun: {} µs > {} µs (total {})",
                    elapsed.as_micros(),
                    self.period.as_micros(),
                    self.stats.overruns
                );
            }
            if let Some(remaining) = self.period.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }

        if let Some(kind) = self.arbiter.cancel_active(CancelReason::Stopped) {
            info!("Shutdown: stopped active {:?}", kind);
        }
        let zero = JointCommand::zeros(self.robot.dof());
        if let Err(e) = self.robot.dispatch(&zero, 0.0) {
            warn!("Final zero command failed: {e}");
        }
        info!(
            "Control loop stopped after {} cycles (avg {} ns, max {} ns, {} overruns)",
            self.stats.cycle_count,
            self.stats.avg_cycle_ns(),
            self.stats.max_cycle_ns,
            self.stats.overruns
        );
        self.stats
    }

    // ─── Inbox ──────────────────────────────────────────────────────

    fn drain_inbox(&mut self, now: Instant) {
        while let Ok(message) = self.inbox.try_recv() {
            match message {
                Inbound::Command {
                    request,
                    goal,
                    reply,
                } => {
                    let result = self.admit(request, goal, now);
                    if let Some(reply) = reply {
                        // The client may have given up waiting.
                        let _ = reply.try_send(result);
                    }
                }
                Inbound::Impedance { stiffness, reply } => {
                    let result = self
                        .robot
                        .set_cartesian_impedance(&stiffness)
                        .map_err(DriverError::from);
                    let _ = reply.try_send(result);
                }
                Inbound::Subscribe(sender) => self.subscribers.push(sender),
            }
        }
    }

    fn admit(
        &mut self,
        request: CommandRequest,
        goal: Option<GoalLink>,
        now: Instant,
    ) -> Result<(), DriverError> {
        let kind = request.kind();
        let source = request.source;

        let admission = {
            let poses = self.poses.read();
            let ctx = AdmissionContext {
                now,
                safety: self.safety.state(),
                faults: self.robot.feedback().faults,
                robot: self.robot.as_ref(),
                poses: &poses,
                robot_config: &self.robot_config,
                resolver: self.resolver.config(),
            };
            self.arbiter.submit(request, goal, &ctx)
        };

        match admission {
            Ok(Admission::Motion { preempted }) => {
                match preempted {
                    // A stream refreshing itself is not worth a log line.
                    Some(prev) if prev.is_goal() || kind.is_goal() => {
                        info!("{:?} from {} preempted {:?}", kind, source, prev)
                    }
                    _ if kind.is_goal() => debug!("{:?} admitted from {}", kind, source),
                    _ => {}
                }
                if kind.is_streaming() {
                    self.watchdog.refresh(source, now);
                }
                self.watchdog_expired = false;
                self.transition(SafetyEvent::MotionAdmitted);
                Ok(())
            }
            Ok(Admission::Stopped) => {
                self.transition(SafetyEvent::Stop);
                Ok(())
            }
            Ok(Admission::Recovered) => {
                info!("Recovered from {} on request of {}", self.safety.state(), source);
                self.transition(SafetyEvent::Recovered);
                Ok(())
            }
            Err(e) => {
                warn!("{:?} from {} rejected: {e}", kind, source);
                Err(e)
            }
        }
    }

    // ─── Per-tick checks ────────────────────────────────────────────

    fn check_watchdog(&mut self, now: Instant) {
        let streaming = self.arbiter.streaming_source();
        if let Some(source) = streaming {
            if self.watchdog.is_expired(source, now) {
                warn!(
                    "Watchdog expired for {} after {:?}, stopping stream",
                    source,
                    self.watchdog.timeout()
                );
                if let Some(motion) = self.arbiter.take() {
                    motion.conclude(GoalOutcome::Cancelled(CancelReason::Stopped));
                }
                self.watchdog_expired = true;
                self.transition(SafetyEvent::MotionEnded);
            }
        }
        self.watchdog.retain_only(self.arbiter.streaming_source());
    }

    fn check_cancellation(&mut self) {
        let cancelled = self
            .arbiter
            .active()
            .and_then(|m| m.goal.as_ref())
            .is_some_and(GoalLink::is_cancel_requested);
        if cancelled {
            if let Some(kind) = self.arbiter.cancel_active(CancelReason::Requested) {
                info!("{:?} cancelled by client", kind);
            }
            self.transition(SafetyEvent::MotionEnded);
        }
    }

    fn resolve(&mut self, feedback: &RobotFeedback, now: Instant) -> JointCommand {
        let zero = JointCommand::zeros(self.robot.dof());
        if !self.safety.allows_motion() {
            return zero;
        }
        let Some(motion) = self.arbiter.active_mut() else {
            return zero;
        };

        let outcome = match self
            .resolver
            .resolve(motion, self.robot.as_ref(), feedback, now)
        {
            Resolution::Command(command) => return command,
            Resolution::Done => GoalOutcome::Succeeded,
            Resolution::Failed(e) => GoalOutcome::Failed(e),
        };

        if let Some(motion) = self.arbiter.take() {
            match &outcome {
                GoalOutcome::Failed(e) => warn!("{:?} failed: {e}", motion.kind()),
                _ => info!("{:?} succeeded", motion.kind()),
            }
            motion.conclude(outcome);
        }
        self.transition(SafetyEvent::MotionEnded);
        zero
    }

    fn enter_fault(&mut self, faults: FaultFlags) {
        if self.safety.state().is_fault() {
            return;
        }
        if let SafetyTransition::Ok(state) = self.safety.handle_event(SafetyEvent::Fault(faults)) {
            error!("Robot fault {:?}: entering {}", faults, state);
        }

        if let Some(motion) = self.arbiter.take() {
            warn!("{:?} aborted by fault", motion.kind());
            motion.conclude(GoalOutcome::Failed(DriverError::Hardware(faults)));
        }

        let zero = JointCommand::zeros(self.robot.dof());
        if let Err(e) = self.robot.dispatch(&zero, 0.0) {
            error!("Zero command after fault failed: {e}");
        }
        self.last_command = zero;
    }

    fn transition(&mut self, event: SafetyEvent) {
        let before = self.safety.state();
        match self.safety.handle_event(event) {
            SafetyTransition::Ok(after) if after != before => {
                info!("Safety state {} -> {} ({:?})", before, after, event);
            }
            SafetyTransition::Ok(_) => {}
            SafetyTransition::Rejected(reason) => {
                debug!("Safety event {:?} ignored in {}: {}", event, before, reason);
            }
        }
    }

    // ─── Publication ────────────────────────────────────────────────

    fn publish(&mut self, feedback: &RobotFeedback) -> ManipulatorStateSnapshot {
        let q = self.robot.joint_positions();
        let jacobian = self.robot.jacobian(&q);
        let w = manipulability(&jacobian);
        let twist = &jacobian * &self.last_command.velocities;
        let cfg: &ResolverConfig = self.resolver.config();

        let flags = evaluate_flags(&FlagInputs {
            state: self.safety.state(),
            motion_active: self.arbiter.active().is_some(),
            singular: w < cfg.manipulability_threshold,
            watchdog_expired: self.watchdog_expired,
            obstacle_near: feedback
                .obstacle
                .is_some_and(|o| o.distance < cfg.obstacle_influence_distance),
        });

        let snapshot = ManipulatorStateSnapshot {
            cycle: self.cycle,
            ee_pose: self.robot.forward_kinematics(&q),
            ee_velocity: Vector6::from_iterator(twist.iter().copied()),
            joint_positions: q,
            joint_velocities: self.last_command.velocities.clone(),
            safety_state: self.safety.state(),
            flags,
            active: self.arbiter.active_kind(),
            manipulability: w,
        };

        self.subscribers
            .retain(|tx| match tx.try_send(snapshot.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
        *self.latest.write() = snapshot.clone();
        snapshot
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
