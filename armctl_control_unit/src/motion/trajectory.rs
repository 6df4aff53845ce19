//! Synchronized joint-space trajectories.
//!
//! All joints follow one normalized path `q(t) = q₀ + Δ·s(t)`, `s ∈ [0, 1]`,
//! so they start and finish together. The scalar profile `s(t)` is scaled
//! so that no joint exceeds its velocity or acceleration limit:
//!
//! - `ṡ ≤ min_i v_max,i / |Δ_i|`
//! - `s̈ ≤ min_i a_max,i / |Δ_i|`

use armctl_common::robot::JointLimits;
use nalgebra::DVector;

use crate::config::TrajectoryProfile;

/// Peak of `ds/dτ` for the minimum-jerk polynomial.
const MJ_PEAK_VELOCITY: f64 = 1.875;
/// Peak of `d²s/dτ²` for the minimum-jerk polynomial (10/√3).
const MJ_PEAK_ACCELERATION: f64 = 5.773_502_691_896_258;

/// Joint deltas below this are treated as already reached.
const MIN_DELTA: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    /// Nothing to move.
    Hold,
    Trapezoidal {
        /// Normalized acceleration [1/s²].
        accel: f64,
        /// Normalized cruise velocity [1/s].
        cruise: f64,
        /// Acceleration phase length [s].
        t_accel: f64,
    },
    MinimumJerk,
}

/// Time-parameterized straight line in joint space.
#[derive(Debug, Clone, PartialEq)]
pub struct JointTrajectory {
    start: DVector<f64>,
    delta: DVector<f64>,
    duration: f64,
    shape: Shape,
}

impl JointTrajectory {
    /// Plan the fastest feasible trajectory, stretched to `min_duration`
    /// seconds when that is longer.
    pub fn plan(
        start: &DVector<f64>,
        goal: &DVector<f64>,
        limits: &JointLimits,
        profile: TrajectoryProfile,
        min_duration: Option<f64>,
    ) -> Self {
        let delta = goal - start;

        let mut sdot_max = f64::INFINITY;
        let mut sddot_max = f64::INFINITY;
        for i in 0..delta.len() {
            let d = delta[i].abs();
            if d > MIN_DELTA {
                sdot_max = sdot_max.min(limits.velocity_max[i] / d);
                sddot_max = sddot_max.min(limits.acceleration_max[i] / d);
            }
        }

        if !sdot_max.is_finite() {
            return Self {
                start: start.clone(),
                delta,
                duration: 0.0,
                shape: Shape::Hold,
            };
        }

        let requested = min_duration.unwrap_or(0.0).max(0.0);
        let (duration, shape) = match profile {
            TrajectoryProfile::Trapezoidal => trapezoid(sdot_max, sddot_max, requested),
            TrajectoryProfile::MinimumJerk => {
                let t_min = (MJ_PEAK_VELOCITY / sdot_max)
                    .max((MJ_PEAK_ACCELERATION / sddot_max).sqrt());
                (t_min.max(requested), Shape::MinimumJerk)
            }
        };

        Self {
            start: start.clone(),
            delta,
            duration,
            shape,
        }
    }

    /// Total duration [s].
    #[inline]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn target(&self) -> DVector<f64> {
        &self.start + &self.delta
    }

    /// Fraction of the duration elapsed at `t`, in `[0, 1]`.
    pub fn progress(&self, t: f64) -> f64 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (t / self.duration).clamp(0.0, 1.0)
        }
    }

    pub fn position(&self, t: f64) -> DVector<f64> {
        &self.start + &self.delta * self.s(t)
    }

    pub fn velocity(&self, t: f64) -> DVector<f64> {
        &self.delta * self.sdot(t)
    }

    pub fn acceleration(&self, t: f64) -> DVector<f64> {
        &self.delta * self.sddot(t)
    }

    fn s(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        if t >= self.duration {
            return 1.0;
        }
        match self.shape {
            Shape::Hold => 1.0,
            Shape::Trapezoidal {
                accel,
                cruise,
                t_accel,
            } => {
                if t < t_accel {
                    0.5 * accel * t * t
                } else if t < self.duration - t_accel {
                    0.5 * accel * t_accel * t_accel + cruise * (t - t_accel)
                } else {
                    let r = self.duration - t;
                    1.0 - 0.5 * accel * r * r
                }
            }
            Shape::MinimumJerk => {
                let tau = t / self.duration;
                let tau3 = tau * tau * tau;
                tau3 * (10.0 - 15.0 * tau + 6.0 * tau * tau)
            }
        }
    }

    fn sdot(&self, t: f64) -> f64 {
        if t <= 0.0 || t >= self.duration {
            return 0.0;
        }
        match self.shape {
            Shape::Hold => 0.0,
            Shape::Trapezoidal {
                accel,
                cruise,
                t_accel,
            } => {
                if t < t_accel {
                    accel * t
                } else if t < self.duration - t_accel {
                    cruise
                } else {
                    accel * (self.duration - t)
                }
            }
            Shape::MinimumJerk => {
                let tau = t / self.duration;
                30.0 * tau * tau * (1.0 - tau) * (1.0 - tau) / self.duration
            }
        }
    }

    fn sddot(&self, t: f64) -> f64 {
        if t <= 0.0 || t >= self.duration {
            return 0.0;
        }
        match self.shape {
            Shape::Hold => 0.0,
            Shape::Trapezoidal { accel, t_accel, .. } => {
                if t < t_accel {
                    accel
                } else if t < self.duration - t_accel {
                    0.0
                } else {
                    -accel
                }
            }
            Shape::MinimumJerk => {
                let tau = t / self.duration;
                (60.0 * tau - 180.0 * tau * tau + 120.0 * tau * tau * tau)
                    / (self.duration * self.duration)
            }
        }
    }
}

/// Trapezoidal profile over a unit distance.
///
/// Returns `(duration, shape)`. Falls back to a triangular profile when the
/// cruise velocity cannot be reached; slows the cruise down when a longer
/// duration is requested.
fn trapezoid(v_max: f64, a_max: f64, requested: f64) -> (f64, Shape) {
    // Peak velocity of the triangular profile covering distance 1.
    let v_peak = a_max.sqrt();
    let v = v_max.min(v_peak);
    let t_min = 1.0 / v + v / a_max;

    let (duration, cruise) = if requested > t_min {
        // Solve v²/a − v·T + 1 = 0 for the smaller root.
        let a = a_max;
        let disc = (a * a * requested * requested - 4.0 * a).max(0.0);
        (requested, (a * requested - disc.sqrt()) / 2.0)
    } else {
        (t_min, v)
    };

    (
        duration,
        Shape::Trapezoidal {
            accel: a_max,
            cruise,
            t_accel: cruise / a_max,
        },
    )
}

// ─── Tests ──────────────────────────────────────────────────────────
