//! Configuration options for scene population.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PopulationError, Result};

/// Knobs controlling one population call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulateOptions {
    /// Minimum distance of every projected object point from the image borders.
    pub edge_dist: f64,

    /// Maximum projected-circle overlap fraction between any two objects.
    pub ob_overlap: f64,

    /// Minimum apparent (projected) object size.
    pub min_size_2d: f64,

    /// Number of whole-scene attempts before giving up.
    pub max_attempts: usize,

    /// Candidate positions tried per object within one attempt.
    pub position_tries: usize,

    /// Camera samples tried per keyframe within one attempt.
    pub camera_tries: usize,

    /// Return an error instead of a partial result when every attempt fails.
    pub raise_on_failure: bool,

    /// Return an error instead of skipping objects whose action cannot fit the background.
    pub raise_on_incompatible_action: bool,

    /// Resample the camera from the background at the start of every attempt.
    pub reset_camera: bool,

    /// Inclusive range of frames whose camera keyframes constrain placement.
    pub frame_range: (u32, u32),

    /// Half-width in degrees of the window around the camera bearing that rotations are drawn from.
    pub rotation_tolerance: f64,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            edge_dist: 0.1,
            ob_overlap: 0.3,
            min_size_2d: 0.0,
            max_attempts: 100,
            position_tries: 200,
            camera_tries: 100,
            raise_on_failure: true,
            raise_on_incompatible_action: false,
            reset_camera: true,
            frame_range: (1, 1),
            rotation_tolerance: 60.0,
        }
    }
}

impl PopulateOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from JSON; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads options from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks that every threshold is in range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.edge_dist) {
            return Err(PopulationError::InvalidOptions(format!(
                "edge_dist must lie in [0, 0.5), got {}",
                self.edge_dist
            )));
        }
        if !(0.0..=1.0).contains(&self.ob_overlap) {
            return Err(PopulationError::InvalidOptions(format!(
                "ob_overlap must lie in [0, 1], got {}",
                self.ob_overlap
            )));
        }
        if !(self.min_size_2d >= 0.0) {
            return Err(PopulationError::InvalidOptions(format!(
                "min_size_2d must be non-negative, got {}",
                self.min_size_2d
            )));
        }
        if self.frame_range.0 > self.frame_range.1 {
            return Err(PopulationError::InvalidOptions(format!(
                "frame range {:?} is inverted",
                self.frame_range
            )));
        }
        if !self.rotation_tolerance.is_finite() {
            return Err(PopulationError::InvalidOptions(
                "rotation_tolerance must be finite".into(),
            ));
        }
        Ok(())
    }

    /// Sets the minimum edge distance.
    #[must_use]
    pub fn with_edge_dist(mut self, edge_dist: f64) -> Self {
        self.edge_dist = edge_dist;
        self
    }

    /// Sets the maximum overlap fraction.
    #[must_use]
    pub fn with_ob_overlap(mut self, ob_overlap: f64) -> Self {
        self.ob_overlap = ob_overlap;
        self
    }

    /// Sets the minimum projected size.
    #[must_use]
    pub fn with_min_size_2d(mut self, min_size_2d: f64) -> Self {
        self.min_size_2d = min_size_2d;
        self
    }

    /// Sets the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the per-object position search budget.
    #[must_use]
    pub fn with_position_tries(mut self, tries: usize) -> Self {
        self.position_tries = tries;
        self
    }

    /// Sets whether exhaustion is an error.
    #[must_use]
    pub fn with_raise_on_failure(mut self, raise: bool) -> Self {
        self.raise_on_failure = raise;
        self
    }

    /// Sets whether an incompatible action is an error.
    #[must_use]
    pub fn with_raise_on_incompatible_action(mut self, raise: bool) -> Self {
        self.raise_on_incompatible_action = raise;
        self
    }

    /// Sets whether the camera is resampled each attempt.
    #[must_use]
    pub fn with_reset_camera(mut self, reset: bool) -> Self {
        self.reset_camera = reset;
        self
    }

    /// Sets the frame range.
    #[must_use]
    pub fn with_frame_range(mut self, start: u32, end: u32) -> Self {
        self.frame_range = (start, end);
        self
    }

    /// Sets the rotation tolerance in degrees.
    #[must_use]
    pub fn with_rotation_tolerance(mut self, degrees: f64) -> Self {
        self.rotation_tolerance = degrees;
        self
    }
}
