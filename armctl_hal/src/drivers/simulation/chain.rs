//! Standard-DH serial chain kinematics.

use nalgebra::{DMatrix, DVector, Isometry3, Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};

use crate::config::DhParameter;

/// Serial chain of revolute joints described by standard DH parameters.
#[derive(Debug, Clone)]
pub struct DhChain {
    links: Vec<DhParameter>,
}

impl DhChain {
    pub fn new(links: Vec<DhParameter>) -> Self {
        Self { links }
    }

    #[inline]
    pub fn dof(&self) -> usize {
        self.links.len()
    }

    fn link_transform(dh: &DhParameter, q: f64) -> Matrix4<f64> {
        let theta = q + dh.offset;
        let (st, ct) = theta.sin_cos();
        let (sa, ca) = dh.alpha.sin_cos();

        #[rustfmt::skip]
        let m = Matrix4::new(
            ct,  -st * ca,  st * sa, dh.a * ct,
            st,   ct * ca, -ct * sa, dh.a * st,
            0.0,  sa,       ca,      dh.d,
            0.0,  0.0,      0.0,     1.0,
        );
        m
    }

    /// Base-to-frame transforms: element `i` is the pose of frame `i`
    /// (element 0 is the base, the last element is the flange).
    fn frames(&self, q: &DVector<f64>) -> Vec<Matrix4<f64>> {
        let mut frames = Vec::with_capacity(self.links.len() + 1);
        let mut t = Matrix4::identity();
        frames.push(t);
        for (dh, qi) in self.links.iter().zip(q.iter()) {
            t *= Self::link_transform(dh, *qi);
            frames.push(t);
        }
        frames
    }

    /// Flange pose for `q`.
    pub fn forward_kinematics(&self, q: &DVector<f64>) -> Isometry3<f64> {
        let frames = self.frames(q);
        let t = frames[frames.len() - 1];
        to_isometry(&t)
    }

    /// 6×n geometric Jacobian for `q`.
    pub fn jacobian(&self, q: &DVector<f64>) -> DMatrix<f64> {
        let frames = self.frames(q);
        let n = self.links.len();
        let end = frames[n].fixed_view::<3, 1>(0, 3).into_owned();
        let mut j = DMatrix::zeros(6, n);

        for i in 0..n {
            let frame = &frames[i];
            let z: Vector3<f64> = frame.fixed_view::<3, 1>(0, 2).into_owned();
            let origin: Vector3<f64> = frame.fixed_view::<3, 1>(0, 3).into_owned();
            let linear = z.cross(&(end - origin));
            j.fixed_view_mut::<3, 1>(0, i).copy_from(&linear);
            j.fixed_view_mut::<3, 1>(3, i).copy_from(&z);
        }
        j
    }
}

fn to_isometry(t: &Matrix4<f64>) -> Isometry3<f64> {
    let r: Matrix3<f64> = t.fixed_view::<3, 3>(0, 0).into_owned();
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    Isometry3::from_parts(Translation3::new(t[(0, 3)], t[(1, 3)], t[(2, 3)]), rotation)
}

// ─── Tests ──────────────────────────────────────────────────────────
