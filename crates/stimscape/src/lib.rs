//! stimscape: constraint-driven object placement for synthetic 3D stimulus scenes.
//!
//! Given a background that declares where a camera may stand, where it may look and
//! where objects may go, stimscape samples a camera and a mutually consistent,
//! non-overlapping, on-screen arrangement of objects, retrying whole scenes until
//! one satisfies every constraint.
//!
//! # Quick Start
//!
//! ```no_run
//! use stimscape::*;
//!
//! fn main() -> Result<()> {
//!     init_logging();
//!
//!     let background = Background::default();
//!     let populator = ScenePopulator::new(&background, PopulateOptions::default());
//!
//!     // One histogram threaded through every scene keeps the dataset balanced
//!     let mut histogram = OccupancyHistogram::default();
//!     let mut rng = seeded_rng(42);
//!
//!     for _ in 0..10 {
//!         let objects = vec![SceneObject::new("chair"), SceneObject::new("table")];
//!         let scene = populator.populate(
//!             &objects,
//!             &CameraState::default(),
//!             Some(&mut histogram),
//!             &mut rng,
//!         )?;
//!         println!("{}", serde_json::to_string(&scene)?);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`ScenePopulator`] runs the bounded retry loop over whole-scene attempts
//! - [`ConstraintSampler`] draws cameras, sizes, rotations and positions
//! - [`PerspectiveProjector`] maps world points to normalized image coordinates
//! - [`OccupancyHistogram`] biases new positions away from crowded image regions

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Geometry code compares against exact sentinel values on purpose
#![allow(clippy::float_cmp)]

pub mod cancel;
pub mod populator;
pub mod sampler;

pub use cancel::CancelToken;
pub use populator::{AttemptFailure, Population, PopulationOutcome, ScenePopulator};
pub use sampler::{
    Candidate, ConstraintSampler, ObjectRequest, PlacementContext, PlacementFailure, Rejection,
    SampleError, SceneViews, ScreenOccupancy,
};

// Re-export core types
pub use stimscape_core::{
    background::{Background, Obstacle},
    camera::CameraState,
    constraint::{AxisSpec, Constraint, ConstraintKind},
    error::{PopulationError, Result},
    histogram::{OccupancyHistogram, SharedHistogram},
    object::{MotionEnvelope, PartialPlacement, Placement, PlacementState, SceneObject},
    options::PopulateOptions,
    projection::{Footprint, PerspectiveProjector, ProjectedExtent},
    DVec2, DVec3,
};

use rand::SeedableRng;

/// The random number generator used by the demos and tests.
pub type SceneRng = rand_pcg::Pcg64;

/// Creates a deterministic generator; equal seeds give identical scenes.
pub fn seeded_rng(seed: u64) -> SceneRng {
    SceneRng::seed_from_u64(seed)
}

/// Installs the `env_logger` backend for the `log` macros.
///
/// Reads the filter from `RUST_LOG`. Calling it more than once is harmless.
pub fn init_logging() {
    if env_logger::try_init().is_ok() {
        log::debug!("stimscape logging initialized");
    }
}

/// Populates one scene with default options and no histogram.
pub fn populate_scene<R: rand::Rng + ?Sized>(
    background: &Background,
    objects: &[SceneObject],
    camera: &CameraState,
    rng: &mut R,
) -> Result<Population> {
    ScenePopulator::new(background, PopulateOptions::default()).populate(objects, camera, None, rng)
}
