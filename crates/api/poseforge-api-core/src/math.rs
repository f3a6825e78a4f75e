//! Pose algebra shared by the curve model and the solvers:
//! - Euler-degree conversions (rotation channels store degrees)
//! - shortest-arc angle filtering
//! - quaternion sign alignment for component-wise differencing
//! - the 7-component pose residual both solvers minimize

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

/// Rigid pose (position + rotation). Scale never participates in chain
/// composition; see [`crate::Transform::pose`].
pub type Pose = Isometry3<f32>;

/// Length of the pose residual: 3 position components + 4 quaternion
/// components.
pub const POSE_DIM: usize = 7;

/// Build a pose from a position and a rotation.
#[inline]
pub fn pose_from(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Pose {
    Isometry3::from_parts(Translation3::from(position), rotation)
}

/// Convert Euler angles in degrees (roll/pitch/yaw about x/y/z) to a
/// quaternion.
#[inline]
pub fn euler_deg_to_quat(deg: Vector3<f32>) -> UnitQuaternion<f32> {
    UnitQuaternion::from_euler_angles(
        deg.x.to_radians(),
        deg.y.to_radians(),
        deg.z.to_radians(),
    )
}

/// Extract Euler angles in degrees from a quaternion.
#[inline]
pub fn quat_to_euler_deg(q: &UnitQuaternion<f32>) -> Vector3<f32> {
    let (roll, pitch, yaw) = q.euler_angles();
    Vector3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
}

/// Signed shortest angular delta from `from` to `to`, in `(-180, 180]`
/// degrees.
#[inline]
pub fn shortest_delta_deg(from: f32, to: f32) -> f32 {
    let mut delta = (to - from) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta <= -180.0 {
        delta += 360.0;
    }
    delta
}

/// Return `q` negated when it sits on the far hemisphere relative to
/// `reference`, so that component-wise differences approximate the shorter
/// rotational path.
#[inline]
pub fn align_quat(reference: &UnitQuaternion<f32>, q: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
    if reference.coords.dot(&q.coords) < 0.0 {
        UnitQuaternion::new_unchecked(-q.into_inner())
    } else {
        *q
    }
}

/// 7-component residual from `current` to `desired`: position delta followed
/// by the sign-aligned quaternion component delta (x, y, z, w).
pub fn pose_diff(current: &Pose, desired: &Pose) -> [f32; POSE_DIM] {
    let dp = desired.translation.vector - current.translation.vector;
    let aligned = align_quat(&current.rotation, &desired.rotation);
    let qc = current.rotation.coords;
    let qd = aligned.coords;
    [
        dp.x,
        dp.y,
        dp.z,
        qd.x - qc.x,
        qd.y - qc.y,
        qd.z - qc.z,
        qd.w - qc.w,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn shortest_delta_wraps_across_180() {
        assert_relative_eq!(shortest_delta_deg(170.0, -170.0), 20.0, epsilon = 1e-5);
        assert_relative_eq!(shortest_delta_deg(-170.0, 170.0), -20.0, epsilon = 1e-5);
        assert_relative_eq!(shortest_delta_deg(10.0, 30.0), 20.0, epsilon = 1e-5);
        assert_relative_eq!(shortest_delta_deg(0.0, 180.0), 180.0, epsilon = 1e-5);
    }

    #[test]
    fn euler_round_trip() {
        let deg = Vector3::new(10.0, -35.0, 78.0);
        let back = quat_to_euler_deg(&euler_deg_to_quat(deg));
        assert_relative_eq!(back.x, deg.x, epsilon = 1e-3);
        assert_relative_eq!(back.y, deg.y, epsilon = 1e-3);
        assert_relative_eq!(back.z, deg.z, epsilon = 1e-3);
    }

    #[test]
    fn align_flips_far_hemisphere() {
        let reference = UnitQuaternion::identity();
        let q = UnitQuaternion::new_unchecked(-UnitQuaternion::identity().into_inner());
        let aligned = align_quat(&reference, &q);
        assert!(reference.coords.dot(&aligned.coords) > 0.0);
    }

    #[test]
    fn pose_diff_is_zero_for_identical_poses() {
        let pose = pose_from(
            Vector3::new(1.0, 2.0, 3.0),
            euler_deg_to_quat(Vector3::new(15.0, 30.0, 45.0)),
        );
        for component in pose_diff(&pose, &pose) {
            assert_relative_eq!(component, 0.0, epsilon = 1e-6);
        }
    }
}
