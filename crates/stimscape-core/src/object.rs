//! Scene objects and how much of their placement is known.

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;

/// Fields of a placement supplied by the caller; `None` fields are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PartialPlacement {
    /// Largest dimension.
    pub size: Option<f64>,
    /// Rotation about the vertical axis in degrees.
    pub rotation: Option<f64>,
    /// World position of the base center.
    pub position: Option<DVec3>,
}

impl PartialPlacement {
    /// Fixes the size.
    #[must_use]
    pub fn with_size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    /// Fixes the rotation.
    #[must_use]
    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// Fixes the position.
    #[must_use]
    pub fn with_position(mut self, position: DVec3) -> Self {
        self.position = Some(position);
        self
    }
}

/// A fully specified placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Largest dimension.
    pub size: f64,
    /// Rotation about the vertical axis in degrees; 0 faces -Y.
    pub rotation: f64,
    /// World position of the base center.
    pub position: DVec3,
    /// Base position in normalized image coordinates (derived, first keyframe in range).
    pub projected_position: DVec2,
}

/// How much of an object's placement is known.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PlacementState {
    /// Nothing specified.
    #[default]
    Unplaced,
    /// Some fields fixed by the caller.
    PartiallySpecified(PartialPlacement),
    /// Everything known.
    Placed(Placement),
}

impl PlacementState {
    /// The caller-fixed fields. A placed object has all of them fixed.
    #[must_use]
    pub fn fixed(&self) -> PartialPlacement {
        match *self {
            PlacementState::Unplaced => PartialPlacement::default(),
            PlacementState::PartiallySpecified(partial) => partial,
            PlacementState::Placed(p) => PartialPlacement {
                size: Some(p.size),
                rotation: Some(p.rotation),
                position: Some(p.position),
            },
        }
    }

    /// The full placement, if known.
    #[must_use]
    pub fn placement(&self) -> Option<&Placement> {
        match self {
            PlacementState::Placed(p) => Some(p),
            _ => None,
        }
    }

    /// Returns true if the object is fully placed.
    #[must_use]
    pub fn is_placed(&self) -> bool {
        matches!(self, PlacementState::Placed(_))
    }
}

/// Box swept by an object's action, relative to its position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionEnvelope {
    /// Most negative offset reached on each axis.
    pub min: DVec3,
    /// Most positive offset reached on each axis.
    pub max: DVec3,
}

impl MotionEnvelope {
    /// Creates an envelope from its corner offsets.
    #[must_use]
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Returns true if the envelope contains the rest position on every axis.
    #[must_use]
    pub fn straddles_origin(&self) -> bool {
        self.min.cmple(DVec3::ZERO).all() && self.max.cmpge(DVec3::ZERO).all()
    }

    /// Returns true if the envelope can fit inside `region` on every bounded axis.
    #[must_use]
    pub fn fits(&self, region: &Constraint) -> bool {
        let span = self.max - self.min;
        self.straddles_origin()
            && (0..3).all(|axis| region.cartesian_span(axis).map_or(true, |limit| span[axis] <= limit))
    }

    /// Returns true if the whole envelope stays inside `region` from `position`.
    #[must_use]
    pub fn contained_at(&self, position: DVec3, region: &Constraint) -> bool {
        region.contains(position + self.min) && region.contains(position + self.max)
    }
}

/// An object to be placed in a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    /// Identifier used in logs and errors.
    pub name: String,
    /// Motion envelope of the object's action, if it has one.
    pub action: Option<MotionEnvelope>,
    /// What is known about its placement.
    pub state: PlacementState,
}

impl SceneObject {
    /// Creates an unplaced object.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: None,
            state: PlacementState::Unplaced,
        }
    }

    /// Fixes some fields of the placement.
    #[must_use]
    pub fn with_partial(mut self, partial: PartialPlacement) -> Self {
        self.state = PlacementState::PartiallySpecified(partial);
        self
    }

    /// Attaches an action with the given motion envelope.
    #[must_use]
    pub fn with_action(mut self, envelope: MotionEnvelope) -> Self {
        self.action = Some(envelope);
        self
    }

    /// The full placement, if known.
    #[must_use]
    pub fn placement(&self) -> Option<&Placement> {
        self.state.placement()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_fields() {
        assert_eq!(PlacementState::Unplaced.fixed(), PartialPlacement::default());

        let partial = PartialPlacement::default().with_size(2.0);
        let state = PlacementState::PartiallySpecified(partial);
        assert_eq!(state.fixed().size, Some(2.0));
        assert!(state.fixed().position.is_none());
        assert!(!state.is_placed());

        let placed = PlacementState::Placed(Placement {
            size: 1.0,
            rotation: 15.0,
            position: DVec3::X,
            projected_position: DVec2::splat(0.5),
        });
        let fixed = placed.fixed();
        assert_eq!(fixed.rotation, Some(15.0));
        assert_eq!(fixed.position, Some(DVec3::X));
        assert!(placed.is_placed());
    }

    #[test]
    fn test_envelope_fit() {
        let region = Constraint::cartesian_box(DVec3::new(-2.0, -2.0, 0.0), DVec3::new(2.0, 2.0, 0.0));
        let walk = MotionEnvelope::new(DVec3::new(-1.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0));
        assert!(walk.straddles_origin());
        assert!(walk.fits(&region));
        assert!(walk.contained_at(DVec3::ZERO, &region));
        assert!(!walk.contained_at(DVec3::new(1.5, 0.0, 0.0), &region));

        let long_walk = MotionEnvelope::new(DVec3::new(-3.0, 0.0, 0.0), DVec3::new(3.0, 0.0, 0.0));
        assert!(!long_walk.fits(&region));

        let one_sided = MotionEnvelope::new(DVec3::new(0.5, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0));
        assert!(!one_sided.straddles_origin());
        assert!(!one_sided.fits(&region));
    }

    #[test]
    fn test_scene_object_builders() {
        let obj = SceneObject::new("cup")
            .with_partial(PartialPlacement::default().with_rotation(90.0))
            .with_action(MotionEnvelope::new(DVec3::ZERO, DVec3::ZERO));
        assert_eq!(obj.name, "cup");
        assert!(obj.action.is_some());
        assert!(obj.placement().is_none());
    }
}
