//! Error types for stimscape.

use thiserror::Error;

/// The main error type for scene population.
///
/// Randomness-driven failures (a candidate position that overlaps, a camera
/// sample that lands on its own fixation point) are handled inside the
/// populator and never show up here; only exhaustion of the retry budget does.
/// Everything else signals a configuration problem and is surfaced as soon as
/// it is detected.
#[derive(Error, Debug)]
pub enum PopulationError {
    /// A constraint axis has neither bounds nor a mean, and no default was supplied.
    #[error("unconstrained axis: {0} has neither bounds nor mean/std")]
    UnconstrainedAxis(String),

    /// A constraint is malformed (inverted bounds, negative std, ...).
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    /// Population options are out of range.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// A camera state violates its invariants.
    #[error("invalid camera: {0}")]
    InvalidCamera(String),

    /// The camera-to-point vector lies in the image plane, or the camera sits on its fixation point.
    #[error("degenerate projection: {0}")]
    DegenerateProjection(String),

    /// An object's motion envelope cannot fit the background's bounds.
    #[error("object '{0}' declares an action incompatible with the background bounds")]
    IncompatibleAction(String),

    /// Two histograms with different bin counts were combined.
    #[error("histogram shape mismatch: expected {expected} bins per axis, got {actual}")]
    HistogramMismatch { expected: usize, actual: usize },

    /// Every attempt failed.
    #[error("scene population exhausted after {attempts} attempts")]
    PopulationExhausted { attempts: usize },

    /// The caller cancelled population.
    #[error("scene population cancelled")]
    Cancelled,

    /// The caller-supplied deadline passed before population finished.
    #[error("scene population deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A specialized Result type for stimscape operations.
pub type Result<T> = std::result::Result<T, PopulationError>;
