//! Pose error, manipulability and damped least-squares differential kinematics.
//!
//! All quantities are expressed in the robot base frame. Twists and pose
//! errors use the `[linear; angular]` ordering of the geometric Jacobian.

use nalgebra::{DMatrix, DVector, Isometry3, Vector3, Vector6};

use crate::command::Twist;

// ─── Pose Error ─────────────────────────────────────────────────────

/// Difference between a target and a current pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseError {
    /// `p_target − p_current` [m].
    pub translation: Vector3<f64>,
    /// Axis-angle of `R_target · R_currentᵀ` [rad].
    pub rotation: Vector3<f64>,
}

impl PoseError {
    pub fn between(current: &Isometry3<f64>, target: &Isometry3<f64>) -> Self {
        let translation = target.translation.vector - current.translation.vector;
        let rotation = (target.rotation * current.rotation.inverse()).scaled_axis();
        Self {
            translation,
            rotation,
        }
    }

    #[inline]
    pub fn position_norm(&self) -> f64 {
        self.translation.norm()
    }

    #[inline]
    pub fn orientation_norm(&self) -> f64 {
        self.rotation.norm()
    }

    /// Norm of the stacked 6-vector.
    #[inline]
    pub fn norm(&self) -> f64 {
        self.as_vector().norm()
    }

    pub fn as_vector(&self) -> Vector6<f64> {
        Vector6::new(
            self.translation.x,
            self.translation.y,
            self.translation.z,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        )
    }

    /// Proportional twist toward the target.
    pub fn scaled(&self, position_gain: f64, orientation_gain: f64) -> Twist {
        Twist::new(
            self.translation * position_gain,
            self.rotation * orientation_gain,
        )
    }
}

// ─── Twist helpers ──────────────────────────────────────────────────

/// Stack a twist into the 6-vector the Jacobian maps to.
pub fn twist_to_dvector(twist: &Twist) -> DVector<f64> {
    DVector::from_column_slice(&[
        twist.linear.x,
        twist.linear.y,
        twist.linear.z,
        twist.angular.x,
        twist.angular.y,
        twist.angular.z,
    ])
}

/// Scale the linear and angular parts down to their speed caps.
///
/// Direction is preserved.
pub fn cap_twist(twist: &Twist, max_linear: f64, max_angular: f64) -> Twist {
    fn cap(v: Vector3<f64>, max: f64) -> Vector3<f64> {
        let n = v.norm();
        if n > max && n > 0.0 { v * (max / n) } else { v }
    }
    Twist::new(cap(twist.linear, max_linear), cap(twist.angular, max_angular))
}

// ─── Manipulability & DLS ───────────────────────────────────────────

/// Yoshikawa manipulability `sqrt(det(J Jᵀ))`.
///
/// Uses `Jᵀ J` for tall Jacobians so under-actuated arms still report a
/// meaningful value.
pub fn manipulability(jacobian: &DMatrix<f64>) -> f64 {
    let gram = if jacobian.nrows() <= jacobian.ncols() {
        jacobian * jacobian.transpose()
    } else {
        jacobian.transpose() * jacobian
    };
    gram.determinant().max(0.0).sqrt()
}

/// Squared damping factor for the given manipulability.
///
/// Zero above `threshold`; grows quadratically to `max_damping²` as the
/// manipulability drops to zero.
pub fn damping_factor(manipulability: f64, threshold: f64, max_damping: f64) -> f64 {
    if threshold <= 0.0 || manipulability >= threshold {
        return 0.0;
    }
    let ratio = manipulability / threshold;
    max_damping * max_damping * (1.0 - ratio * ratio)
}

/// Damped least-squares solution `q̇ = Jᵀ (J Jᵀ + λ² I)⁻¹ v`.
///
/// Falls back to the SVD pseudo-inverse when the damped system is still
/// singular (λ = 0 at an exact singularity).
pub fn damped_least_squares(
    jacobian: &DMatrix<f64>,
    twist: &DVector<f64>,
    lambda_sq: f64,
) -> DVector<f64> {
    let m = jacobian.nrows();
    let n = jacobian.ncols();
    let jt = jacobian.transpose();
    let system = jacobian * &jt + DMatrix::identity(m, m) * lambda_sq;
    match system.try_inverse() {
        Some(inv) => jt * inv * twist,
        None => match jacobian.clone().pseudo_inverse(1e-9) {
            Ok(pinv) => pinv * twist,
            Err(_) => DVector::zeros(n),
        },
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
