//! Core types for stimscape.
//!
//! This crate holds the data model and the pure geometry that scene population is built on:
//! - [`Constraint`] for declarative regions and distributions
//! - [`CameraState`] and [`PerspectiveProjector`] for mapping the world onto the image plane
//! - [`OccupancyHistogram`] for balancing where objects land across many scenes
//! - [`SceneObject`] and [`Background`] for what gets placed and where it may go

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Geometry code compares against exact sentinel values on purpose
#![allow(clippy::float_cmp)]

pub mod background;
pub mod camera;
pub mod constraint;
pub mod error;
pub mod histogram;
pub mod object;
pub mod options;
pub mod projection;

pub use background::{Background, Obstacle};
pub use camera::CameraState;
pub use constraint::{AxisSpec, Constraint, ConstraintKind};
pub use error::{PopulationError, Result};
pub use histogram::{OccupancyHistogram, SharedHistogram};
pub use object::{MotionEnvelope, PartialPlacement, Placement, PlacementState, SceneObject};
pub use options::PopulateOptions;
pub use projection::{
    camera_rotation, circle_overlap_fraction, field_of_view, Footprint, PerspectiveProjector,
    ProjectedExtent,
};

// Re-export glam types for convenience
pub use glam::{DVec2, DVec3};
