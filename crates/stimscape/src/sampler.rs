//! Drawing cameras and object placements from a background's constraints.
//!
//! The sampler never retries beyond its fixed per-call budgets. When it cannot
//! find a legal sample it reports a [`PlacementFailure`] and leaves the decision
//! to retry to the populator; configuration problems come back as
//! [`SampleError::Fatal`] and are never retried.

use glam::{DVec2, DVec3};
use log::trace;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stimscape_core::{
    Background, CameraState, Constraint, ConstraintKind, Footprint, MotionEnvelope,
    OccupancyHistogram, PartialPlacement, PerspectiveProjector, Placement, PopulateOptions,
    PopulationError, ProjectedExtent,
};

/// Camera samples closer than this to their fixation point are rejected.
const MIN_CAMERA_DISTANCE: f64 = 1e-6;

/// Why a candidate sample was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum Rejection {
    /// The position, or its motion envelope, leaves the object region.
    #[error("outside the object region")]
    OutsideRegion,
    /// Part of the object is behind the camera or outside the clipping range.
    #[error("behind the camera or outside the clipping range")]
    BehindCamera,
    /// The sampled image ray never reaches the ground plane in front of the camera.
    #[error("image ray misses the ground plane")]
    NoGroundHit,
    /// Part of the object is closer to an image border than the edge distance.
    #[error("too close to the image border")]
    OffScreen,
    /// The projected object is smaller than the minimum apparent size.
    #[error("projected size below the minimum")]
    TooSmall,
    /// The projected object covers too much of a placed object or obstacle.
    #[error("overlaps a placed object or obstacle")]
    Overlap,
    /// Every camera sample landed on its own fixation point.
    #[error("camera coincides with its fixation point")]
    CameraDegenerate,
}

/// No legal sample was found within the search budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no legal sample after {tries} tries (last rejection: {reason})")]
pub struct PlacementFailure {
    /// Reason the final candidate was rejected.
    pub reason: Rejection,
    /// Number of candidates tried.
    pub tries: usize,
}

/// Failure of a single sampling call.
#[derive(Debug, Error)]
pub enum SampleError {
    /// Randomness did not produce a legal sample; retrying the attempt may help.
    #[error(transparent)]
    Rejected(#[from] PlacementFailure),
    /// A configuration error that no amount of retrying will fix.
    #[error(transparent)]
    Fatal(#[from] PopulationError),
}

/// Result of a sampling call.
pub type SampleResult<T> = std::result::Result<T, SampleError>;

/// Outcome of checking a single candidate.
pub type Verdict<T> = std::result::Result<T, Rejection>;

/// The camera keyframes an attempt places objects against.
#[derive(Debug, Clone)]
pub struct SceneViews {
    views: Vec<PerspectiveProjector>,
    clip: (f64, f64),
}

impl SceneViews {
    /// Projectors for the keyframes of `camera` inside `frame_range`.
    pub fn new(camera: &CameraState, frame_range: (u32, u32)) -> Result<Self, PopulationError> {
        let views = camera.projectors_in(frame_range.0, frame_range.1)?;
        if views.is_empty() {
            return Err(PopulationError::InvalidCamera("camera has no keyframes".into()));
        }
        Ok(Self {
            views,
            clip: camera.clip,
        })
    }

    /// The view that projected positions are reported in.
    pub fn primary(&self) -> &PerspectiveProjector {
        &self.views[0]
    }

    /// All views.
    pub fn views(&self) -> &[PerspectiveProjector] {
        &self.views
    }

    /// Number of views.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Returns true if there are no views.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Projected extent of an object in view `index`, `None` if any part leaves the clipping range.
    pub fn extent_in(
        &self,
        index: usize,
        position: DVec3,
        size: f64,
    ) -> Result<Option<ProjectedExtent>, PopulationError> {
        let view = &self.views[index];
        let (near, far) = self.clip;
        let half = DVec3::X * (size / 2.0);
        let visible = [position, position + DVec3::Z * size, position - half, position + half]
            .into_iter()
            .map(|p| view.depth(p))
            .all(|depth| depth >= near && depth <= far);
        if !visible {
            return Ok(None);
        }
        view.project_extent(position, size).map(Some)
    }

    /// Projected extents in every view, or a rejection if the object is clipped in any.
    pub fn extents(&self, position: DVec3, size: f64) -> Result<Verdict<Vec<ProjectedExtent>>, PopulationError> {
        let mut extents = Vec::with_capacity(self.views.len());
        for index in 0..self.views.len() {
            match self.extent_in(index, position, size)? {
                Some(extent) => extents.push(extent),
                None => return Ok(Err(Rejection::BehindCamera)),
            }
        }
        Ok(Ok(extents))
    }
}

/// Projected footprints already claimed in each view.
#[derive(Debug, Clone, Default)]
pub struct ScreenOccupancy {
    per_view: Vec<Vec<Footprint>>,
}

impl ScreenOccupancy {
    /// Empty occupancy for `views` views.
    pub fn new(views: usize) -> Self {
        Self {
            per_view: vec![Vec::new(); views],
        }
    }

    /// Claims a footprint in one view.
    pub fn push_view(&mut self, view: usize, footprint: Footprint) {
        self.per_view[view].push(footprint);
    }

    /// Claims one footprint per view.
    pub fn push(&mut self, footprints: &[Footprint]) {
        for (view, footprint) in footprints.iter().enumerate() {
            self.push_view(view, *footprint);
        }
    }

    /// Largest overlap fraction of the given per-view footprints with anything claimed.
    pub fn max_overlap(&self, footprints: &[Footprint]) -> f64 {
        footprints
            .iter()
            .zip(&self.per_view)
            .flat_map(|(candidate, claimed)| claimed.iter().map(|c| candidate.overlap_fraction(c)))
            .fold(0.0, f64::max)
    }
}

/// What is being placed: the caller-fixed fields and the region it goes in.
#[derive(Debug, Clone, Copy)]
pub struct ObjectRequest<'r> {
    /// Fields the caller fixed.
    pub fixed: PartialPlacement,
    /// Region the object must lie in.
    pub region: &'r Constraint,
    /// Motion envelope of the object's action.
    pub envelope: Option<&'r MotionEnvelope>,
}

/// The state of the scene an object is placed into.
#[derive(Debug, Clone, Copy)]
pub struct PlacementContext<'s> {
    /// Camera views for this attempt.
    pub views: &'s SceneViews,
    /// Footprints claimed by obstacles and previously placed objects.
    pub screen: &'s ScreenOccupancy,
    /// Histogram biasing new positions, if any.
    pub histogram: Option<&'s OccupancyHistogram>,
}

/// A position that passed every check.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// World position.
    pub position: DVec3,
    /// Base position in the primary view.
    pub projected_position: DVec2,
    /// Footprint in each view.
    pub footprints: Vec<Footprint>,
}

/// Draws cameras and placements from a background under a set of options.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintSampler<'a> {
    background: &'a Background,
    options: &'a PopulateOptions,
}

impl<'a> ConstraintSampler<'a> {
    /// Creates a sampler.
    pub fn new(background: &'a Background, options: &'a PopulateOptions) -> Self {
        Self { background, options }
    }

    /// Resamples location and fixation of every keyframe in `template`.
    pub fn sample_camera<R: Rng + ?Sized>(
        &self,
        template: &CameraState,
        rng: &mut R,
    ) -> SampleResult<CameraState> {
        let tries = self.options.camera_tries.max(1);
        let mut camera = template.clone();
        for keyframe in 0..camera.len() {
            let mut pose = None;
            for _ in 0..tries {
                let location = self.background.camera_location.sample_vector(rng)?;
                let fixation = self.background.camera_fixation.sample_vector(rng)?;
                if location.distance(fixation) > MIN_CAMERA_DISTANCE {
                    pose = Some((location, fixation));
                    break;
                }
            }
            let (location, fixation) = pose.ok_or(PlacementFailure {
                reason: Rejection::CameraDegenerate,
                tries,
            })?;
            camera.locations[keyframe] = location;
            camera.fixations[keyframe] = fixation;
        }
        Ok(camera)
    }

    /// Footprints of the background's visible obstacles.
    pub fn obstacle_occupancy(&self, views: &SceneViews) -> Result<ScreenOccupancy, PopulationError> {
        let mut screen = ScreenOccupancy::new(views.len());
        for obstacle in &self.background.obstacles {
            for view in 0..views.len() {
                match views.extent_in(view, obstacle.position, obstacle.size())? {
                    Some(extent) => screen.push_view(view, extent.footprint()),
                    None => trace!("obstacle at {} is clipped in view {view}", obstacle.position),
                }
            }
        }
        Ok(screen)
    }

    /// Draws an object size from the region's size range, in scene units.
    pub fn sample_size<R: Rng + ?Sized>(
        &self,
        region: &Constraint,
        rng: &mut R,
    ) -> Result<f64, PopulationError> {
        Ok(region.sample_size(rng)? * self.background.real_world_scale)
    }

    /// Draws a rotation (degrees) that turns the object's front broadly toward the camera.
    pub fn sample_rotation<R: Rng + ?Sized>(
        &self,
        position: DVec3,
        camera_location: DVec3,
        rng: &mut R,
    ) -> f64 {
        let bearing = (camera_location - position).truncate();
        let facing = if bearing.length() < MIN_CAMERA_DISTANCE {
            // camera straight overhead; any heading faces it equally
            rng.gen_range(-180.0..180.0)
        } else {
            bearing.x.atan2(-bearing.y).to_degrees()
        };
        let tolerance = self.options.rotation_tolerance.abs();
        let jitter = if tolerance > 0.0 {
            rng.gen_range(-tolerance..=tolerance)
        } else {
            0.0
        };
        wrap_degrees(facing + jitter)
    }

    /// Searches for a position satisfying the region, visibility, size and overlap checks.
    ///
    /// The first half of the tries draw image positions from the histogram. Once
    /// every reachable bin holds the maximum count the biased weights leave only
    /// unreachable bins, so the remaining tries draw uniformly.
    pub fn sample_position<R: Rng + ?Sized>(
        &self,
        request: &ObjectRequest<'_>,
        size: f64,
        ctx: &PlacementContext<'_>,
        rng: &mut R,
    ) -> SampleResult<Candidate> {
        let tries = self.options.position_tries.max(1);
        let biased_tries = tries.div_ceil(2);
        let mut last = Rejection::OutsideRegion;
        for i in 0..tries {
            let histogram = ctx.histogram.filter(|_| i < biased_tries);
            let position = match self.propose_position(request.region, ctx.views, histogram, rng)? {
                Ok(position) => position,
                Err(rejection) => {
                    last = rejection;
                    continue;
                }
            };
            let inside = request.region.contains(position)
                && request
                    .envelope
                    .map_or(true, |e| e.contained_at(position, request.region));
            if !inside {
                last = Rejection::OutsideRegion;
                continue;
            }
            match self.evaluate(position, size, ctx, false)? {
                Ok(candidate) => return Ok(candidate),
                Err(rejection) => last = rejection,
            }
        }
        trace!("position search failed after {tries} tries: {last}");
        Err(PlacementFailure { reason: last, tries }.into())
    }

    /// Fills in every field the caller left unset.
    ///
    /// A caller-fixed position is kept as is; it is only checked for visibility.
    pub fn place_object<R: Rng + ?Sized>(
        &self,
        request: &ObjectRequest<'_>,
        ctx: &PlacementContext<'_>,
        rng: &mut R,
    ) -> SampleResult<(Placement, Vec<Footprint>)> {
        let size = match request.fixed.size {
            Some(size) => size,
            None => self.sample_size(request.region, rng)?,
        };
        let candidate = match request.fixed.position {
            Some(position) => self
                .evaluate(position, size, ctx, true)?
                .map_err(|reason| PlacementFailure { reason, tries: 1 })?,
            None => self.sample_position(request, size, ctx, rng)?,
        };
        let rotation = match request.fixed.rotation {
            Some(rotation) => rotation,
            None => self.sample_rotation(candidate.position, ctx.views.primary().location(), rng),
        };
        let placement = Placement {
            size,
            rotation,
            position: candidate.position,
            projected_position: candidate.projected_position,
        };
        Ok((placement, candidate.footprints))
    }

    /// Proposes a world position: through the image plane and the ground, or
    /// directly from the region when its horizontal position is pinned.
    ///
    /// Image positions come from `histogram` when given, uniformly inside the
    /// edge margins otherwise.
    fn propose_position<R: Rng + ?Sized>(
        &self,
        region: &Constraint,
        views: &SceneViews,
        histogram: Option<&OccupancyHistogram>,
        rng: &mut R,
    ) -> Result<Verdict<DVec3>, PopulationError> {
        if region.is_fixed_xy() {
            return Ok(Ok(region.sample_vector_or(DVec3::ZERO, rng)?));
        }

        let edge = self.options.edge_dist;
        let uv = match histogram {
            Some(histogram) => histogram.sample(rng),
            None => {
                let span = 1.0 - 2.0 * edge;
                DVec2::new(edge + span * rng.gen::<f64>(), edge + span * rng.gen::<f64>())
            }
        };
        if uv.min_element() < edge || uv.max_element() > 1.0 - edge {
            return Ok(Err(Rejection::OffScreen));
        }

        let height = ground_height(region, rng)?;
        Ok(views
            .primary()
            .intersect_ground(uv.x, uv.y, height)
            // pin the height exactly so fixed-Z regions accept the point
            .map(|hit| DVec3::new(hit.x, hit.y, height))
            .ok_or(Rejection::NoGroundHit))
    }

    /// Visibility, edge, size and overlap checks in every view.
    fn evaluate(
        &self,
        position: DVec3,
        size: f64,
        ctx: &PlacementContext<'_>,
        caller_fixed: bool,
    ) -> Result<Verdict<Candidate>, PopulationError> {
        let extents = match ctx.views.extents(position, size)? {
            Ok(extents) => extents,
            Err(rejection) => return Ok(Err(rejection)),
        };
        if extents
            .iter()
            .any(|e| e.min_edge_distance() < self.options.edge_dist)
        {
            return Ok(Err(Rejection::OffScreen));
        }

        let footprints: Vec<Footprint> = extents.iter().map(ProjectedExtent::footprint).collect();
        if !caller_fixed {
            if extents
                .iter()
                .any(|e| e.apparent_size() < self.options.min_size_2d)
            {
                return Ok(Err(Rejection::TooSmall));
            }
            if ctx.screen.max_overlap(&footprints) > self.options.ob_overlap {
                return Ok(Err(Rejection::Overlap));
            }
        }

        Ok(Ok(Candidate {
            position,
            projected_position: extents[0].bottom,
            footprints,
        }))
    }
}

/// Height of the ground plane a candidate is projected onto.
fn ground_height<R: Rng + ?Sized>(region: &Constraint, rng: &mut R) -> Result<f64, PopulationError> {
    match region.kind {
        ConstraintKind::Cartesian => Ok(region.origin.z + region.sample_axis(2, rng)?.unwrap_or(0.0)),
        ConstraintKind::Polar => Ok(region.sample_vector_or(DVec3::ZERO, rng)?.z),
    }
}

/// Wraps an angle in degrees into `(-180, 180]`.
fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}
