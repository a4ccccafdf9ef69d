//! Keyframed camera state.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{PopulationError, Result};
use crate::projection::PerspectiveProjector;

/// Default focal length in millimetres.
pub const DEFAULT_LENS: f64 = 50.0;

/// Camera location, fixation and lens at one or more keyframes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    /// Camera location per keyframe.
    pub locations: Vec<DVec3>,
    /// Point the camera looks at, per keyframe.
    pub fixations: Vec<DVec3>,
    /// Keyframe indices, monotonic.
    pub frames: Vec<u32>,
    /// Focal length in millimetres.
    pub lens: f64,
    /// Near and far clipping distances.
    pub clip: (f64, f64),
}

impl Default for CameraState {
    fn default() -> Self {
        Self::still(DVec3::new(17.5, -17.5, 8.0), DVec3::new(0.0, 0.0, 3.5))
    }
}

impl CameraState {
    /// A camera with a single keyframe at frame 1.
    #[must_use]
    pub fn still(location: DVec3, fixation: DVec3) -> Self {
        Self {
            locations: vec![location],
            fixations: vec![fixation],
            frames: vec![1],
            lens: DEFAULT_LENS,
            clip: (0.1, 100.0),
        }
    }

    /// Keyframes at the given frame indices, all initialised to one pose.
    ///
    /// Used as a template when the populator resamples every keyframe.
    #[must_use]
    pub fn with_frames(mut self, frames: Vec<u32>) -> Self {
        let location = self.locations.first().copied().unwrap_or(DVec3::ONE);
        let fixation = self.fixations.first().copied().unwrap_or(DVec3::ZERO);
        self.locations = vec![location; frames.len()];
        self.fixations = vec![fixation; frames.len()];
        self.frames = frames;
        self
    }

    /// Sets the focal length.
    #[must_use]
    pub fn with_lens(mut self, lens: f64) -> Self {
        self.lens = lens;
        self
    }

    /// Sets the clipping range.
    #[must_use]
    pub fn with_clip(mut self, near: f64, far: f64) -> Self {
        self.clip = (near, far);
        self
    }

    /// Number of keyframes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if there are no keyframes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Checks the keyframe, lens and clipping invariants.
    pub fn validate(&self) -> Result<()> {
        let n = self.frames.len();
        if n == 0 {
            return Err(PopulationError::InvalidCamera("camera has no keyframes".into()));
        }
        if self.locations.len() != n || self.fixations.len() != n {
            return Err(PopulationError::InvalidCamera(format!(
                "{} locations, {} fixations and {} frames",
                self.locations.len(),
                self.fixations.len(),
                n
            )));
        }
        if self.frames.windows(2).any(|w| w[0] > w[1]) {
            return Err(PopulationError::InvalidCamera(format!(
                "frames {:?} are not monotonic",
                self.frames
            )));
        }
        if !(self.lens > 0.0) {
            return Err(PopulationError::InvalidCamera(format!(
                "lens must be positive, got {}",
                self.lens
            )));
        }
        let (near, far) = self.clip;
        if !(near > 0.0 && near < far) {
            return Err(PopulationError::InvalidCamera(format!(
                "clip range ({near}, {far}) must satisfy 0 < near < far"
            )));
        }
        Ok(())
    }

    /// Projector for keyframe `index`.
    pub fn projector(&self, index: usize) -> Result<PerspectiveProjector> {
        PerspectiveProjector::new(self.locations[index], self.fixations[index], self.lens)
    }

    /// Indices of the keyframes inside `[start, end]`, or the first keyframe if none are.
    #[must_use]
    pub fn keyframes_in(&self, start: u32, end: u32) -> Vec<usize> {
        let inside: Vec<usize> = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, &f)| f >= start && f <= end)
            .map(|(i, _)| i)
            .collect();
        if inside.is_empty() && !self.frames.is_empty() {
            vec![0]
        } else {
            inside
        }
    }

    /// Projectors for the keyframes inside `[start, end]`.
    pub fn projectors_in(&self, start: u32, end: u32) -> Result<Vec<PerspectiveProjector>> {
        self.keyframes_in(start, end)
            .into_iter()
            .map(|i| self.projector(i))
            .collect()
    }
}
