//! Placement constraints declared by a scene background.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::constraint::{AxisSpec, Constraint};
use crate::error::{PopulationError, Result};

/// A static scene feature that new objects must not cover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    /// World position of the obstacle's base.
    pub position: DVec3,
    /// Radius of the obstacle.
    pub radius: f64,
}

impl Obstacle {
    /// Creates an obstacle.
    #[must_use]
    pub fn new(position: DVec3, radius: f64) -> Self {
        Self { position, radius }
    }

    /// Size of an object with the same projected footprint.
    #[must_use]
    pub fn size(&self) -> f64 {
        2.0 * self.radius
    }
}

/// Where cameras and objects may go in one background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Background {
    /// Identifier used in logs.
    pub name: String,
    /// Legal camera locations.
    pub camera_location: Constraint,
    /// Legal camera fixation points.
    pub camera_fixation: Constraint,
    /// Disjoint legal regions for object positions, each with its own size range.
    pub object_regions: Vec<Constraint>,
    /// Static features to avoid.
    pub obstacles: Vec<Obstacle>,
    /// Scene units per unit of region size range.
    pub real_world_scale: f64,
}

impl Default for Background {
    /// An empty floor: camera on a ring around the origin, objects on a 10x10 patch.
    fn default() -> Self {
        Self {
            name: "floor".into(),
            camera_location: Constraint::polar()
                .with_radius(AxisSpec::bounded(20.0, 30.0))
                .with_azimuth(AxisSpec::bounded(-180.0, 180.0))
                .with_elevation(AxisSpec::bounded(10.0, 30.0)),
            camera_fixation: Constraint::cartesian_box(
                DVec3::new(-1.0, -1.0, 1.0),
                DVec3::new(1.0, 1.0, 3.0),
            ),
            object_regions: vec![Constraint::cartesian_box(
                DVec3::new(-5.0, -5.0, 0.0),
                DVec3::new(5.0, 5.0, 0.0),
            )
            .with_size_range(1.0, 3.0)],
            obstacles: Vec::new(),
            real_world_scale: 1.0,
        }
    }
}

impl Background {
    /// Creates a background with the given camera constraints and one object region.
    pub fn new(
        name: impl Into<String>,
        camera_location: Constraint,
        camera_fixation: Constraint,
        object_region: Constraint,
    ) -> Self {
        Self {
            name: name.into(),
            camera_location,
            camera_fixation,
            object_regions: vec![object_region],
            obstacles: Vec::new(),
            real_world_scale: 1.0,
        }
    }

    /// Adds another legal object region.
    #[must_use]
    pub fn with_object_region(mut self, region: Constraint) -> Self {
        self.object_regions.push(region);
        self
    }

    /// Adds an obstacle.
    #[must_use]
    pub fn with_obstacle(mut self, obstacle: Obstacle) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    /// Sets the real-world scale.
    #[must_use]
    pub fn with_real_world_scale(mut self, scale: f64) -> Self {
        self.real_world_scale = scale;
        self
    }

    /// Checks every constraint and the scale.
    pub fn validate(&self) -> Result<()> {
        if self.object_regions.is_empty() {
            return Err(PopulationError::InvalidConstraint(format!(
                "background '{}' declares no object regions",
                self.name
            )));
        }
        if !(self.real_world_scale > 0.0) {
            return Err(PopulationError::InvalidConstraint(format!(
                "background '{}' has non-positive scale {}",
                self.name, self.real_world_scale
            )));
        }
        self.camera_location.validate()?;
        self.camera_fixation.validate()?;
        for region in &self.object_regions {
            region.validate()?;
        }
        Ok(())
    }

    /// Loads a background from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
