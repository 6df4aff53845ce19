//! Shared test rig: a control loop ticked by hand at its configured period.

use std::time::{Duration, Instant};

use armctl_common::command::Command;
use armctl_common::error::DriverError;
use armctl_common::state::ManipulatorStateSnapshot;
use armctl_control_unit::command::goal::GoalHandle;
use armctl_control_unit::config::ControlUnitConfig;
use armctl_control_unit::cycle::ControlLoop;
use armctl_control_unit::driver::DriverHandle;
use armctl_hal::drivers::simulation::{FaultInjector, SimulatedArm};

mod cartesian_goal;
mod goal_preemption;
mod guarded_motion;
mod named_pose_goal;
mod safety_recovery;
mod watchdog_stream;

pub struct Rig {
    pub control: ControlLoop,
    pub handle: DriverHandle,
    pub injector: FaultInjector,
    pub t0: Instant,
    pub elapsed: Duration,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(ControlUnitConfig::default())
    }

    pub fn with_config(config: ControlUnitConfig) -> Self {
        let arm = SimulatedArm::new(&config.simulation).unwrap();
        let injector = arm.injector();
        let (control, handle) = ControlLoop::new(config, Box::new(arm)).unwrap();
        Self {
            control,
            handle,
            injector,
            t0: Instant::now(),
            elapsed: Duration::ZERO,
        }
    }

    /// Current tick time.
    pub fn now(&self) -> Instant {
        self.t0 + self.elapsed
    }

    /// Run one tick at the current time, then advance by one period.
    pub fn tick(&mut self) -> ManipulatorStateSnapshot {
        let snapshot = self.control.tick(self.now());
        self.elapsed += self.control.period();
        snapshot
    }

    /// Tick until `pred` holds; `None` if it never does within `max_ticks`.
    pub fn tick_until(
        &mut self,
        max_ticks: usize,
        mut pred: impl FnMut(&ManipulatorStateSnapshot) -> bool,
    ) -> Option<ManipulatorStateSnapshot> {
        (0..max_ticks).map(|_| self.tick()).find(|s| pred(s))
    }

    /// Submit a request and tick once for the admission decision.
    pub fn submit(&mut self, command: Command) -> Result<(), DriverError> {
        let pending = self.handle.submit_async(command).unwrap();
        self.tick();
        pending.try_recv().unwrap()
    }

    /// Submit a goal and tick once for the admission decision.
    pub fn goal(&mut self, command: Command) -> Result<GoalHandle, DriverError> {
        let (pending, goal) = self.handle.send_goal_async(command).unwrap();
        self.tick();
        pending.try_recv().unwrap()?;
        Ok(goal)
    }

    /// Tick until the goal has a result.
    pub fn finish(
        &mut self,
        goal: &GoalHandle,
        max_ticks: usize,
    ) -> armctl_control_unit::command::goal::GoalResult {
        for _ in 0..max_ticks {
            if let Some(result) = goal.try_result() {
                return result;
            }
            self.tick();
        }
        panic!("goal {} did not finish within {max_ticks} ticks", goal.id());
    }
}

pub fn joints_of(snapshot: &ManipulatorStateSnapshot) -> Vec<f64> {
    snapshot.joint_positions.iter().copied().collect()
}
