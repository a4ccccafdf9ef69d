//! Declarative bounds on where a quantity may fall.
//!
//! A [`Constraint`] bounds a 3-vector either per Cartesian axis (X/Y/Z) or per
//! polar axis (radius, azimuth, elevation), always relative to an explicit
//! origin. Each axis is described by an [`AxisSpec`], which can be a bounding
//! interval, a Gaussian, or a Gaussian clipped to an interval.
//!
//! Angles are in degrees. Azimuth is measured in the horizontal plane from +X
//! toward +Y, elevation from the horizontal plane toward +Z.

use glam::DVec3;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{PopulationError, Result};

/// Axis names for Cartesian constraints.
const CARTESIAN_AXES: [&str; 3] = ["x", "y", "z"];
/// Axis names for polar constraints.
const POLAR_AXES: [&str; 3] = ["r", "phi", "theta"];

/// Coordinate flavor of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Independent X, Y and Z axes.
    #[default]
    Cartesian,
    /// Radius, azimuth and elevation around the origin.
    Polar,
}

impl ConstraintKind {
    /// Returns the display names of the three axes.
    #[must_use]
    pub fn axis_names(self) -> [&'static str; 3] {
        match self {
            ConstraintKind::Cartesian => CARTESIAN_AXES,
            ConstraintKind::Polar => POLAR_AXES,
        }
    }
}

/// Distribution of a single scalar axis.
///
/// At least one of `mean` or the `min`/`max` pair must be present for the axis
/// to be sampleable.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisSpec {
    /// Mean of the Gaussian.
    pub mean: Option<f64>,
    /// Standard deviation of the Gaussian (0 when absent).
    pub std: Option<f64>,
    /// Lower bound.
    pub min: Option<f64>,
    /// Upper bound.
    pub max: Option<f64>,
}

impl AxisSpec {
    /// Uniform distribution over `[min, max]`.
    #[must_use]
    pub fn bounded(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Self::default()
        }
    }

    /// Normal distribution with the given mean and standard deviation.
    #[must_use]
    pub fn gaussian(mean: f64, std: f64) -> Self {
        Self {
            mean: Some(mean),
            std: Some(std),
            ..Self::default()
        }
    }

    /// A single fixed value.
    #[must_use]
    pub fn fixed(value: f64) -> Self {
        Self::bounded(value, value)
    }

    /// Clips the distribution to `[min, max]`.
    #[must_use]
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Returns true if the bounds collapse to a single value.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!((self.min, self.max), (Some(min), Some(max)) if min == max)
    }

    /// Checks the axis for non-finite values, inverted bounds, negative spread or missing parameters.
    pub fn validate(&self, label: &str) -> Result<()> {
        for (field, value) in [("mean", self.mean), ("min", self.min), ("max", self.max)] {
            if let Some(value) = value.filter(|v| !v.is_finite()) {
                return Err(PopulationError::InvalidConstraint(format!(
                    "{label}: {field} must be finite, got {value}"
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(PopulationError::InvalidConstraint(format!(
                    "{label}: min {min} exceeds max {max}"
                )));
            }
        }
        if let Some(std) = self.std {
            if std < 0.0 || !std.is_finite() {
                return Err(PopulationError::InvalidConstraint(format!(
                    "{label}: std must be finite and non-negative, got {std}"
                )));
            }
        }
        if self.mean.is_none() && (self.min.is_none() || self.max.is_none()) {
            return Err(PopulationError::UnconstrainedAxis(label.to_string()));
        }
        Ok(())
    }

    /// Draws one value.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        self.sample_named("axis", rng)
    }

    pub(crate) fn sample_named<R: Rng + ?Sized>(&self, label: &str, rng: &mut R) -> Result<f64> {
        self.validate(label)?;

        let Some(mean) = self.mean else {
            // validate() guarantees both bounds here
            let (min, max) = (self.min.unwrap_or_default(), self.max.unwrap_or_default());
            return Ok(uniform_between(min, max, rng));
        };

        let std = self.std.unwrap_or(0.0);
        let value = if std == 0.0 {
            mean
        } else {
            let normal = Normal::new(mean, std)
                .map_err(|e| PopulationError::InvalidConstraint(format!("{label}: {e}")))?;
            normal.sample(rng)
        };
        Ok(self.clip(value))
    }

    /// Returns true if `value` satisfies whichever bounds are present.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    fn clip(&self, mut value: f64) -> f64 {
        if let Some(min) = self.min {
            value = value.max(min);
        }
        if let Some(max) = self.max {
            value = value.min(max);
        }
        value
    }
}

/// Uniform draw in `[min, max]` that stays finite for any finite bounds.
fn uniform_between<R: Rng + ?Sized>(min: f64, max: f64, rng: &mut R) -> f64 {
    if min == max {
        return min;
    }
    let t: f64 = rng.gen();
    // interpolate instead of taking `max - min`, which overflows for wide bounds
    (min * (1.0 - t) + max * t).clamp(min, max)
}

/// Converts polar coordinates (degrees) to a Cartesian offset.
#[must_use]
pub fn polar_to_cartesian(r: f64, phi: f64, theta: f64) -> DVec3 {
    let (phi, theta) = (phi.to_radians(), theta.to_radians());
    DVec3::new(
        r * theta.cos() * phi.cos(),
        r * theta.cos() * phi.sin(),
        r * theta.sin(),
    )
}

/// Converts a Cartesian offset to `(r, phi, theta)` in degrees.
///
/// Azimuth is in `(-180, 180]`; both angles are 0 for the zero vector.
#[must_use]
pub fn cartesian_to_polar(v: DVec3) -> DVec3 {
    let r = v.length();
    if r < f64::EPSILON {
        return DVec3::ZERO;
    }
    let phi = v.y.atan2(v.x).to_degrees();
    let theta = (v.z / r).clamp(-1.0, 1.0).asin().to_degrees();
    DVec3::new(r, phi, theta)
}

/// Declarative region or distribution for a 3-vector (and optionally a size).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Cartesian or polar axes.
    pub kind: ConstraintKind,
    /// Per-axis specs; `None` leaves the axis unconstrained.
    pub axes: [Option<AxisSpec>; 3],
    /// Reference point the axes are measured from.
    pub origin: DVec3,
    /// Range of object sizes, for object-position constraints only.
    pub size_range: Option<(f64, f64)>,
}

impl Default for Constraint {
    fn default() -> Self {
        Self::cartesian()
    }
}

impl Constraint {
    /// Creates an unconstrained Cartesian constraint at the world origin.
    #[must_use]
    pub fn cartesian() -> Self {
        Self {
            kind: ConstraintKind::Cartesian,
            axes: [None; 3],
            origin: DVec3::ZERO,
            size_range: None,
        }
    }

    /// Creates an unconstrained polar constraint at the world origin.
    #[must_use]
    pub fn polar() -> Self {
        Self {
            kind: ConstraintKind::Polar,
            ..Self::cartesian()
        }
    }

    /// Convenience for an axis-aligned box `[min, max]` relative to the world origin.
    #[must_use]
    pub fn cartesian_box(min: DVec3, max: DVec3) -> Self {
        Self::cartesian()
            .with_axis(0, AxisSpec::bounded(min.x, max.x))
            .with_axis(1, AxisSpec::bounded(min.y, max.y))
            .with_axis(2, AxisSpec::bounded(min.z, max.z))
    }

    /// Sets the distribution of axis `index` (0, 1 or 2).
    ///
    /// # Panics
    ///
    /// Panics if `index` is 3 or more. Prefer the named builders such as
    /// [`with_x`](Self::with_x) or [`with_radius`](Self::with_radius).
    #[must_use]
    pub fn with_axis(mut self, index: usize, spec: AxisSpec) -> Self {
        self.axes[index] = Some(spec);
        self
    }

    /// Sets the X (or radius) axis.
    #[must_use]
    pub fn with_x(self, spec: AxisSpec) -> Self {
        self.with_axis(0, spec)
    }

    /// Sets the Y (or azimuth) axis.
    #[must_use]
    pub fn with_y(self, spec: AxisSpec) -> Self {
        self.with_axis(1, spec)
    }

    /// Sets the Z (or elevation) axis.
    #[must_use]
    pub fn with_z(self, spec: AxisSpec) -> Self {
        self.with_axis(2, spec)
    }

    /// Sets the radius axis of a polar constraint.
    #[must_use]
    pub fn with_radius(self, spec: AxisSpec) -> Self {
        self.with_axis(0, spec)
    }

    /// Sets the azimuth axis of a polar constraint (degrees).
    #[must_use]
    pub fn with_azimuth(self, spec: AxisSpec) -> Self {
        self.with_axis(1, spec)
    }

    /// Sets the elevation axis of a polar constraint (degrees).
    #[must_use]
    pub fn with_elevation(self, spec: AxisSpec) -> Self {
        self.with_axis(2, spec)
    }

    /// Sets the origin.
    #[must_use]
    pub fn with_origin(mut self, origin: DVec3) -> Self {
        self.origin = origin;
        self
    }

    /// Sets the object size range.
    #[must_use]
    pub fn with_size_range(mut self, min: f64, max: f64) -> Self {
        self.size_range = Some((min, max));
        self
    }

    /// Validates every populated axis and the size range.
    pub fn validate(&self) -> Result<()> {
        let names = self.kind.axis_names();
        for (spec, name) in self.axes.iter().zip(names) {
            if let Some(spec) = spec {
                spec.validate(name)?;
            }
        }
        if let Some((min, max)) = self.size_range {
            if !(min.is_finite() && max.is_finite()) || min <= 0.0 || min > max {
                return Err(PopulationError::InvalidConstraint(format!(
                    "size range ({min}, {max}) must be positive and ordered"
                )));
            }
        }
        Ok(())
    }

    /// Samples axis `index`; `Ok(None)` if the axis is unconstrained.
    pub fn sample_axis<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Option<f64>> {
        let names = self.kind.axis_names();
        let (Some(&name), Some(spec)) = (names.get(index), self.axes.get(index)) else {
            return Err(PopulationError::InvalidConstraint(format!(
                "axis index {index} out of range"
            )));
        };
        spec.as_ref()
            .map(|spec| spec.sample_named(name, rng))
            .transpose()
    }

    /// Samples a point, failing if any axis is unconstrained.
    pub fn sample_vector<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<DVec3> {
        let names = self.kind.axis_names();
        let mut raw = [0.0; 3];
        for (i, value) in raw.iter_mut().enumerate() {
            *value = self
                .sample_axis(i, rng)?
                .ok_or_else(|| PopulationError::UnconstrainedAxis(names[i].to_string()))?;
        }
        Ok(self.to_world(DVec3::from_array(raw)))
    }

    /// Samples a point, using `defaults` (in the constraint's own axes) for unconstrained axes.
    pub fn sample_vector_or<R: Rng + ?Sized>(&self, defaults: DVec3, rng: &mut R) -> Result<DVec3> {
        let mut raw = defaults.to_array();
        for (i, value) in raw.iter_mut().enumerate() {
            if let Some(sampled) = self.sample_axis(i, rng)? {
                *value = sampled;
            }
        }
        Ok(self.to_world(DVec3::from_array(raw)))
    }

    /// Returns true if `point` satisfies the bounds of every constrained axis.
    #[must_use]
    pub fn contains(&self, point: DVec3) -> bool {
        let local = point - self.origin;
        match self.kind {
            ConstraintKind::Cartesian => self
                .axes
                .iter()
                .zip(local.to_array())
                .all(|(spec, value)| spec.map_or(true, |s| s.contains(value))),
            ConstraintKind::Polar => {
                let polar = cartesian_to_polar(local);
                let [r_spec, phi_spec, theta_spec] = self.axes;
                r_spec.map_or(true, |s| s.contains(polar.x))
                    && phi_spec.map_or(true, |s| {
                        [polar.y, polar.y + 360.0, polar.y - 360.0]
                            .into_iter()
                            .any(|phi| s.contains(phi))
                    })
                    && theta_spec.map_or(true, |s| s.contains(polar.z))
            }
        }
    }

    /// Samples an object size uniformly from the size range.
    pub fn sample_size<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        let (min, max) = self
            .size_range
            .ok_or_else(|| PopulationError::UnconstrainedAxis("size".to_string()))?;
        Ok(uniform_between(min, max, rng))
    }

    /// Width of a bounded Cartesian axis, `None` for polar, half-open or out-of-range axes.
    #[must_use]
    pub fn cartesian_span(&self, index: usize) -> Option<f64> {
        if self.kind != ConstraintKind::Cartesian {
            return None;
        }
        let spec = (*self.axes.get(index)?)?;
        Some(spec.max? - spec.min?)
    }

    /// Returns true if X and Y are both pinned to a single value.
    #[must_use]
    pub fn is_fixed_xy(&self) -> bool {
        self.kind == ConstraintKind::Cartesian
            && self.axes[0].is_some_and(|s| s.is_fixed())
            && self.axes[1].is_some_and(|s| s.is_fixed())
    }

    fn to_world(&self, raw: DVec3) -> DVec3 {
        match self.kind {
            ConstraintKind::Cartesian => self.origin + raw,
            ConstraintKind::Polar => self.origin + polar_to_cartesian(raw.x, raw.y, raw.z),
        }
    }
}
