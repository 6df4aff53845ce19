//! Shared handle for injecting faults into a running simulation.

use armctl_common::error::FaultFlags;
use armctl_common::robot::Obstacle;
use nalgebra::{Vector3, Vector6};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
struct Injected {
    faults: FaultFlags,
    obstacle: Option<Obstacle>,
    unreachable: bool,
    wrench: Option<Vector6<f64>>,
}

/// Cloneable handle onto the simulated arm's environment.
///
/// The arm reads it on every `feedback()` call, so changes take effect on
/// the next control tick.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    inner: Arc<Mutex<Injected>>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise fault bits (accumulates with existing ones).
    pub fn raise(&self, faults: FaultFlags) {
        info!("Simulation: fault raised {:?}", faults);
        self.inner.lock().faults |= faults;
    }

    /// Clear every fault bit.
    pub fn clear_faults(&self) {
        info!("Simulation: faults cleared");
        self.inner.lock().faults = FaultFlags::empty();
    }

    pub fn faults(&self) -> FaultFlags {
        self.inner.lock().faults
    }

    /// Place an obstacle at `distance` metres in `direction` from the tool.
    ///
    /// `direction` is normalized; a zero vector removes the obstacle.
    pub fn set_obstacle(&self, distance: f64, direction: Vector3<f64>) {
        let obstacle = direction.try_normalize(1e-12).map(|direction| Obstacle {
            distance,
            direction,
        });
        self.inner.lock().obstacle = obstacle;
    }

    pub fn clear_obstacle(&self) {
        self.inner.lock().obstacle = None;
    }

    pub fn obstacle(&self) -> Option<Obstacle> {
        self.inner.lock().obstacle
    }

    /// Signal that the current servo target cannot be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unreachable = unreachable;
    }

    pub fn unreachable(&self) -> bool {
        self.inner.lock().unreachable
    }

    /// Report a contact wrench at the tool (force then torque).
    pub fn set_wrench(&self, wrench: Vector6<f64>) {
        self.inner.lock().wrench = Some(wrench);
    }

    pub fn clear_wrench(&self) {
        self.inner.lock().wrench = None;
    }

    pub fn wrench(&self) -> Option<Vector6<f64>> {
        self.inner.lock().wrench
    }
}
