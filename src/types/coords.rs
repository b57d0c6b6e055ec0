//! Conversion from the host's Z-up axes to X-Plane's Y-up axes.
//!
//! The host uses +X right, +Y forward, +Z up. X-Plane uses +X right, +Y up
//! and -Z forward. Swapping Y and Z and negating the new Z is a proper
//! rotation of -90 degrees about X, so it can be applied to points,
//! directions and whole transforms alike.

use glam::Quat;

/// The host-to-X-Plane basis change as a rotation.
pub const HOST_TO_XPLANE: Quat = Quat::from_xyzw(
    -std::f32::consts::FRAC_1_SQRT_2,
    0.0,
    0.0,
    std::f32::consts::FRAC_1_SQRT_2,
);

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_quat_swaps_y_and_z() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert!(close(HOST_TO_XPLANE * v, Vec3::new(1.0, 3.0, -2.0)));
    }

    #[test]
    fn test_up_becomes_y() {
        assert!(close(HOST_TO_XPLANE * Vec3::Z, Vec3::Y));
        assert!(close(HOST_TO_XPLANE * Vec3::Y, Vec3::NEG_Z));
    }

    #[test]
    fn test_world_translation_maps_forward() {
        let m = Mat4::from_quat(HOST_TO_XPLANE) * Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0));
        let p = m.transform_point3(Vec3::ZERO);
        assert!(close(p, Vec3::new(0.0, 0.0, -5.0)));
    }
}
