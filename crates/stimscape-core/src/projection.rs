//! Pinhole projection between world space and a camera's normalized image plane.
//!
//! The camera looks down its local -Z axis and never rolls. Focal lengths are
//! interpreted against a fixed reference sensor width of [`SENSOR_WIDTH`], so
//! `lens = 16` gives a 90 degree field of view.
//!
//! Image coordinates are normalized to `[0, 1] x [0, 1]` with the origin in the
//! top-left corner and `(0.5, 0.5)` at the center of the frame.

use glam::{DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::{PopulationError, Result};

/// Reference sensor width the focal length is measured against.
pub const SENSOR_WIDTH: f64 = 32.0;

/// Below this, a camera-space depth counts as lying in the image plane.
const DEGENERATE_EPS: f64 = 1e-12;

/// Field of view in degrees for a focal length in millimetres.
#[must_use]
pub fn field_of_view(lens: f64) -> f64 {
    2.0 * (SENSOR_WIDTH / 2.0 / lens).atan().to_degrees()
}

/// Euler angles `(rx, ry, rz)` in radians that point the camera's -Z axis at the fixation point.
///
/// Roll (`ry`) is always zero. Pitch is `atan2(hypot(dx, dy), -dz)`, which agrees
/// with `atan(-hypot(dx, dy) / dz)` for any downward view and stays continuous
/// when the camera looks above the horizon.
pub fn camera_rotation(camera_pos: DVec3, fixation_pos: DVec3) -> Result<DVec3> {
    let view = fixation_pos - camera_pos;
    if view.length() < DEGENERATE_EPS {
        return Err(PopulationError::DegenerateProjection(format!(
            "camera at {camera_pos} coincides with its fixation point"
        )));
    }
    let view = view.normalize();
    let rz = -view.x.atan2(view.y);
    let rx = view.x.hypot(view.y).atan2(-view.z);
    Ok(DVec3::new(rx, 0.0, rz))
}

/// A camera pose with the world-to-camera transform precomputed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveProjector {
    location: DVec3,
    fixation: DVec3,
    lens: f64,
    rotation: DVec3,
    world_to_camera: DMat3,
    /// `0.5 / tan(fov / 2)`
    scale: f64,
}

impl PerspectiveProjector {
    /// Creates a projector for a camera at `location` looking at `fixation`.
    pub fn new(location: DVec3, fixation: DVec3, lens: f64) -> Result<Self> {
        if !(lens > 0.0 && lens.is_finite()) {
            return Err(PopulationError::InvalidCamera(format!(
                "lens must be positive, got {lens}"
            )));
        }
        let rotation = camera_rotation(location, fixation)?;
        // inverse of the camera's XYZ Euler rotation Rz * Ry * Rx
        let world_to_camera = DMat3::from_rotation_x(-rotation.x)
            * DMat3::from_rotation_y(-rotation.y)
            * DMat3::from_rotation_z(-rotation.z);
        let half_fov = (field_of_view(lens) / 2.0).to_radians();
        Ok(Self {
            location,
            fixation,
            lens,
            rotation,
            world_to_camera,
            scale: 0.5 / half_fov.tan(),
        })
    }

    /// Camera location.
    pub fn location(&self) -> DVec3 {
        self.location
    }

    /// Fixation point.
    pub fn fixation(&self) -> DVec3 {
        self.fixation
    }

    /// Focal length.
    pub fn lens(&self) -> f64 {
        self.lens
    }

    /// Camera Euler angles in radians.
    pub fn rotation(&self) -> DVec3 {
        self.rotation
    }

    /// Point expressed in camera space (the camera looks down -Z).
    #[must_use]
    pub fn to_camera_space(&self, point: DVec3) -> DVec3 {
        self.world_to_camera * (point - self.location)
    }

    /// Distance of `point` along the viewing axis; positive in front of the camera.
    #[must_use]
    pub fn depth(&self, point: DVec3) -> f64 {
        -self.to_camera_space(point).z
    }

    /// Projects a world point to normalized image coordinates.
    pub fn project(&self, point: DVec3) -> Result<DVec2> {
        let d = self.to_camera_space(point);
        if d.z.abs() < DEGENERATE_EPS {
            return Err(PopulationError::DegenerateProjection(format!(
                "{point} lies in the image plane of the camera at {}",
                self.location
            )));
        }
        Ok(DVec2::new(
            0.5 - (d.x / d.z) * self.scale,
            (d.y / d.z) * self.scale + 0.5,
        ))
    }

    /// Projects the base, top and lateral extremes of an object of the given size.
    pub fn project_extent(&self, position: DVec3, size: f64) -> Result<ProjectedExtent> {
        let half = DVec3::X * (size / 2.0);
        Ok(ProjectedExtent {
            top: self.project(position + DVec3::Z * size)?,
            bottom: self.project(position)?,
            left: self.project(position - half)?,
            right: self.project(position + half)?,
        })
    }

    /// Inverse of [`project`](Self::project) at a given depth along the viewing axis.
    #[must_use]
    pub fn unproject(&self, u: f64, v: f64, depth: f64) -> DVec3 {
        let d = DVec3::new(
            (u - 0.5) * depth / self.scale,
            (0.5 - v) * depth / self.scale,
            -depth,
        );
        self.location + self.world_to_camera.transpose() * d
    }

    /// Direction of the ray through `(u, v)`, scaled to unit depth.
    #[must_use]
    pub fn ray_direction(&self, u: f64, v: f64) -> DVec3 {
        self.unproject(u, v, 1.0) - self.location
    }

    /// World point on the horizontal plane at height `z` seen at `(u, v)`.
    ///
    /// Returns `None` when the ray is parallel to the plane or meets it behind the camera.
    #[must_use]
    pub fn intersect_ground(&self, u: f64, v: f64, z: f64) -> Option<DVec3> {
        let dir = self.ray_direction(u, v);
        if dir.z.abs() < DEGENERATE_EPS {
            return None;
        }
        let depth = (z - self.location.z) / dir.z;
        (depth > 0.0).then(|| self.location + dir * depth)
    }
}

/// Projects `point` for a camera at `camera_pos` looking at `fixation_pos`.
pub fn project(point: DVec3, camera_pos: DVec3, fixation_pos: DVec3, lens: f64) -> Result<DVec2> {
    PerspectiveProjector::new(camera_pos, fixation_pos, lens)?.project(point)
}

/// Projects the on-screen cross of an object; see [`PerspectiveProjector::project_extent`].
pub fn project_extent(
    position: DVec3,
    size: f64,
    camera_pos: DVec3,
    fixation_pos: DVec3,
    lens: f64,
) -> Result<ProjectedExtent> {
    PerspectiveProjector::new(camera_pos, fixation_pos, lens)?.project_extent(position, size)
}

/// Maps `(u, v)` at `depth` back to world space; see [`PerspectiveProjector::unproject`].
pub fn unproject(
    u: f64,
    v: f64,
    depth: f64,
    camera_pos: DVec3,
    fixation_pos: DVec3,
    lens: f64,
) -> Result<DVec3> {
    Ok(PerspectiveProjector::new(camera_pos, fixation_pos, lens)?.unproject(u, v, depth))
}

/// Approximate on-screen bounding cross of an object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedExtent {
    /// Projection of the point one object size above the base.
    pub top: DVec2,
    /// Projection of the base point.
    pub bottom: DVec2,
    /// Projection of the base shifted by -size/2 along world X.
    pub left: DVec2,
    /// Projection of the base shifted by +size/2 along world X.
    pub right: DVec2,
}

impl ProjectedExtent {
    /// The four projected points.
    #[must_use]
    pub fn points(&self) -> [DVec2; 4] {
        [self.top, self.bottom, self.left, self.right]
    }

    /// Larger of the projected horizontal and vertical spans.
    #[must_use]
    pub fn apparent_size(&self) -> f64 {
        (self.right - self.left)
            .length()
            .max((self.top - self.bottom).length())
    }

    /// Projected circle used for overlap tests.
    #[must_use]
    pub fn footprint(&self) -> Footprint {
        Footprint {
            center: (self.top + self.bottom) * 0.5,
            radius: self.apparent_size() * 0.5,
        }
    }

    /// Smallest distance from any projected point to an image border (negative if off-screen).
    #[must_use]
    pub fn min_edge_distance(&self) -> f64 {
        self.points()
            .iter()
            .map(|p| p.x.min(1.0 - p.x).min(p.y).min(1.0 - p.y))
            .fold(f64::INFINITY, f64::min)
    }
}

/// A circle in normalized image space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    /// Center in image coordinates.
    pub center: DVec2,
    /// Radius in image units.
    pub radius: f64,
}

impl Footprint {
    /// Intersection area divided by the area of the smaller circle.
    #[must_use]
    pub fn overlap_fraction(&self, other: &Footprint) -> f64 {
        circle_overlap_fraction(self, other)
    }
}

/// Intersection area of two circles divided by the area of the smaller one.
///
/// Ranges from 0 (disjoint) to 1 (the smaller circle is fully covered).
#[must_use]
pub fn circle_overlap_fraction(a: &Footprint, b: &Footprint) -> f64 {
    let d = a.center.distance(b.center);
    let (r1, r2) = (a.radius, b.radius);
    if d >= r1 + r2 {
        return 0.0;
    }
    if d <= (r1 - r2).abs() {
        return 1.0;
    }

    let alpha = ((d * d + r1 * r1 - r2 * r2) / (2.0 * d * r1)).clamp(-1.0, 1.0).acos();
    let beta = ((d * d + r2 * r2 - r1 * r1) / (2.0 * d * r2)).clamp(-1.0, 1.0).acos();
    let kite = ((-d + r1 + r2) * (d + r1 - r2) * (d - r1 + r2) * (d + r1 + r2))
        .max(0.0)
        .sqrt();
    let area = r1 * r1 * alpha + r2 * r2 * beta - 0.5 * kite;

    let smaller = r1.min(r2);
    (area / (std::f64::consts::PI * smaller * smaller)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scenario_camera() -> PerspectiveProjector {
        PerspectiveProjector::new(DVec3::new(17.5, -17.5, 8.0), DVec3::new(0.0, 0.0, 3.5), 50.0)
            .unwrap()
    }

    #[test]
    fn test_field_of_view() {
        assert!((field_of_view(16.0) - 90.0).abs() < 1e-9);
        assert!((field_of_view(50.0) - 2.0 * (0.32f64).atan().to_degrees()).abs() < 1e-9);
    }

    #[test]
    fn test_camera_rotation_straight_down() {
        let rot = camera_rotation(DVec3::new(0.0, 0.0, 10.0), DVec3::ZERO).unwrap();
        assert!(rot.length() < 1e-12);
    }

    #[test]
    fn test_camera_rotation_horizontal() {
        // looking along +Y from the origin: pitch 90 degrees, no yaw
        let rot = camera_rotation(DVec3::ZERO, DVec3::Y).unwrap();
        assert!((rot.x - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert_eq!(rot.y, 0.0);
        assert!(rot.z.abs() < 1e-12);

        // looking along +X: yaw of -90 degrees
        let rot = camera_rotation(DVec3::ZERO, DVec3::X).unwrap();
        assert!((rot.z + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_coincident_camera_is_degenerate() {
        let err = PerspectiveProjector::new(DVec3::ONE, DVec3::ONE, 50.0).unwrap_err();
        assert!(matches!(err, PopulationError::DegenerateProjection(_)));
    }

    #[test]
    fn test_fixation_projects_to_center() {
        let cam = scenario_camera();
        let uv = cam.project(DVec3::new(0.0, 0.0, 3.5)).unwrap();
        assert!((uv - DVec2::splat(0.5)).length() < 1e-12);
    }

    #[test]
    fn test_image_orientation() {
        let cam = PerspectiveProjector::new(DVec3::new(0.0, -10.0, 0.0), DVec3::ZERO, 50.0).unwrap();
        // camera looks along +Y, so +X is screen right and +Z is screen up
        let right = cam.project(DVec3::new(1.0, 0.0, 0.0)).unwrap();
        let up = cam.project(DVec3::new(0.0, 0.0, 1.0)).unwrap();
        assert!(right.x > 0.5);
        assert!((right.y - 0.5).abs() < 1e-12);
        assert!(up.y < 0.5);
        assert!((up.x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_point_in_image_plane_is_degenerate() {
        let cam = PerspectiveProjector::new(DVec3::new(0.0, -10.0, 0.0), DVec3::ZERO, 50.0).unwrap();
        let err = cam.project(DVec3::new(3.0, -10.0, 1.0)).unwrap_err();
        assert!(matches!(err, PopulationError::DegenerateProjection(_)));
    }

    #[test]
    fn test_object_at_origin_from_elevated_camera() {
        // the origin lies in the vertical plane through camera and fixation, so it
        // is horizontally centered; it sits below the fixation point, so lower in frame
        let uv = project(
            DVec3::ZERO,
            DVec3::new(17.5, -17.5, 8.0),
            DVec3::new(0.0, 0.0, 3.5),
            50.0,
        )
        .unwrap();
        assert!((uv.x - 0.5).abs() < 0.02);
        assert!(uv.y > 0.68 && uv.y < 0.74, "v = {}", uv.y);
    }

    #[test]
    fn test_extent() {
        let cam = scenario_camera();
        let extent = cam.project_extent(DVec3::ZERO, 3.0).unwrap();
        assert!(extent.top.y < extent.bottom.y);
        assert!(extent.apparent_size() > 0.0);
        let fp = extent.footprint();
        assert!((fp.radius - extent.apparent_size() / 2.0).abs() < 1e-12);
        assert!(extent.min_edge_distance() > 0.0);
    }

    #[test]
    fn test_intersect_ground() {
        let cam = scenario_camera();
        let hit = cam.intersect_ground(0.5, 0.5, 3.5).unwrap();
        assert!((hit - DVec3::new(0.0, 0.0, 3.5)).length() < 1e-9);

        let uv = cam.project(DVec3::new(2.0, 1.0, 0.0)).unwrap();
        let hit = cam.intersect_ground(uv.x, uv.y, 0.0).unwrap();
        assert!((hit - DVec3::new(2.0, 1.0, 0.0)).length() < 1e-9);

        // a plane above the camera is behind a downward-looking ray
        assert!(cam.intersect_ground(0.5, 0.5, 100.0).is_none());
    }

    #[test]
    fn test_overlap_fraction() {
        let a = Footprint { center: DVec2::ZERO, radius: 1.0 };
        let far = Footprint { center: DVec2::new(3.0, 0.0), radius: 1.0 };
        let inside = Footprint { center: DVec2::new(0.2, 0.0), radius: 0.3 };
        let same = a;
        assert_eq!(circle_overlap_fraction(&a, &far), 0.0);
        assert_eq!(circle_overlap_fraction(&a, &inside), 1.0);
        assert!((circle_overlap_fraction(&a, &same) - 1.0).abs() < 1e-12);

        // two unit circles one radius apart overlap by (2pi/3 - sqrt(3)/2) / pi
        let half = Footprint { center: DVec2::new(1.0, 0.0), radius: 1.0 };
        let expected = (2.0 * std::f64::consts::PI / 3.0 - 3f64.sqrt() / 2.0) / std::f64::consts::PI;
        assert!((a.overlap_fraction(&half) - expected).abs() < 1e-9);
        assert!((half.overlap_fraction(&a) - expected).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_project_unproject_round_trip(
            cam in proptest::array::uniform3(-30.0f64..30.0),
            fix in proptest::array::uniform3(-10.0f64..10.0),
            point in proptest::array::uniform3(-20.0f64..20.0),
            lens in 10.0f64..200.0,
        ) {
            let (cam, fix, point) = (DVec3::from_array(cam), DVec3::from_array(fix), DVec3::from_array(point));
            prop_assume!(cam.distance(fix) > 0.1);
            let projector = PerspectiveProjector::new(cam, fix, lens).unwrap();
            let depth = projector.depth(point);
            prop_assume!(depth.abs() > 0.1);

            let uv = projector.project(point).unwrap();
            let back = projector.unproject(uv.x, uv.y, depth);
            prop_assert!((back - point).abs().max_element() < 1e-4, "{back} vs {point}");
        }
    }
}
