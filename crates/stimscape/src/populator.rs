//! Whole-scene population with bounded retries.
//!
//! Every attempt starts from the caller's object list, optionally resamples
//! the camera, and places objects in input order. The first object that cannot
//! be placed fails the attempt; the populator then starts over rather than
//! repairing the scene object by object, so the spatial statistics of accepted
//! scenes do not depend on how many retries they needed.

use std::time::Instant;

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use stimscape_core::{
    Background, CameraState, OccupancyHistogram, Placement, PlacementState, PopulateOptions,
    PopulationError, Result, SceneObject,
};

use crate::cancel::CancelToken;
use crate::sampler::{
    ConstraintSampler, ObjectRequest, PlacementContext, Rejection, SampleError, SceneViews,
};

/// How a population call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulationOutcome {
    /// Every object that was not skipped is placed.
    Complete,
    /// All attempts failed; the objects are those of the last attempt.
    Incomplete {
        /// Number of objects placed in the last attempt.
        placed: usize,
        /// Index of the object the last attempt failed on, `None` if the camera failed.
        failed_object: Option<usize>,
    },
}

/// Why one attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// Attempt number, starting at 1.
    pub attempt: usize,
    /// Index of the object that could not be placed, `None` if the camera failed.
    pub object: Option<usize>,
    /// Rejection of the final candidate.
    pub reason: Rejection,
}

/// Result of a population call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    /// The camera the objects were placed against.
    pub camera: CameraState,
    /// The objects, in input order.
    pub objects: Vec<SceneObject>,
    /// Number of attempts made.
    pub attempts: usize,
    /// Indices of objects skipped because their action does not fit the background.
    pub skipped: Vec<usize>,
    /// One entry per failed attempt.
    pub failures: Vec<AttemptFailure>,
    /// Whether population finished.
    pub outcome: PopulationOutcome,
}

impl Population {
    /// Returns true if every object that was not skipped is placed.
    pub fn is_complete(&self) -> bool {
        self.outcome == PopulationOutcome::Complete
    }

    /// Placements of the placed objects, in input order.
    pub fn placements(&self) -> impl Iterator<Item = &Placement> {
        self.objects.iter().filter_map(SceneObject::placement)
    }
}

enum AttemptOutcome {
    Complete {
        camera: CameraState,
        objects: Vec<SceneObject>,
    },
    Failed {
        camera: CameraState,
        objects: Vec<SceneObject>,
        placed: usize,
        object: Option<usize>,
        reason: Rejection,
    },
}

/// Draws object regions in random order without replacement.
struct RegionCycle {
    deck: Vec<usize>,
    regions: usize,
}

impl RegionCycle {
    fn new(regions: usize) -> Self {
        Self {
            deck: Vec::new(),
            regions,
        }
    }

    /// Next region among `allowed`, reshuffling the deck when none is left.
    fn next<R: Rng + ?Sized>(&mut self, allowed: &[usize], rng: &mut R) -> usize {
        if let Some(i) = self.deck.iter().position(|r| allowed.contains(r)) {
            return self.deck.remove(i);
        }
        self.deck = (0..self.regions).collect();
        self.deck.shuffle(rng);
        match self.deck.iter().position(|r| allowed.contains(r)) {
            Some(i) => self.deck.remove(i),
            None => allowed[0],
        }
    }
}

/// Places a list of objects into one background.
///
/// # Example
///
/// ```no_run
/// use stimscape::{seeded_rng, Background, CameraState, PopulateOptions, ScenePopulator, SceneObject};
///
/// let background = Background::default();
/// let populator = ScenePopulator::new(&background, PopulateOptions::default());
/// let objects = vec![SceneObject::new("chair"), SceneObject::new("lamp")];
/// let mut rng = seeded_rng(7);
/// let scene = populator.populate(&objects, &CameraState::default(), None, &mut rng).unwrap();
/// assert!(scene.is_complete());
/// ```
#[derive(Debug, Clone)]
pub struct ScenePopulator<'a> {
    background: &'a Background,
    options: PopulateOptions,
    cancel: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl<'a> ScenePopulator<'a> {
    /// Creates a populator for `background`.
    pub fn new(background: &'a Background, options: PopulateOptions) -> Self {
        Self {
            background,
            options,
            cancel: None,
            deadline: None,
        }
    }

    /// Stops population with [`PopulationError::Cancelled`] once `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Stops population with [`PopulationError::DeadlineExceeded`] after `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The options in use.
    pub fn options(&self) -> &PopulateOptions {
        &self.options
    }

    /// Places every object, filling in only the fields the caller left unset.
    ///
    /// On success the projected position of every placed object is recorded in
    /// `histogram`. The caller's objects are never modified.
    pub fn populate<R: Rng + ?Sized>(
        &self,
        objects: &[SceneObject],
        camera: &CameraState,
        mut histogram: Option<&mut OccupancyHistogram>,
        rng: &mut R,
    ) -> Result<Population> {
        self.background.validate()?;
        self.options.validate()?;
        camera.validate()?;

        let allowed = self.allowed_regions(objects)?;
        let skipped: Vec<usize> = allowed
            .iter()
            .enumerate()
            .filter(|(_, regions)| regions.is_none())
            .map(|(i, _)| i)
            .collect();

        let sampler = ConstraintSampler::new(self.background, &self.options);
        let max_attempts = self.options.max_attempts;
        let mut failures = Vec::new();
        let mut last_failed = None;

        for attempt in 1..=max_attempts {
            self.check_interrupted(attempt - 1)?;
            debug!(
                "background '{}': attempt {attempt}/{max_attempts}",
                self.background.name
            );

            let outcome = self.attempt(
                &sampler,
                objects,
                &allowed,
                camera,
                histogram.as_deref(),
                attempt,
                rng,
            )?;
            match outcome {
                AttemptOutcome::Complete { camera, objects } => {
                    if let Some(histogram) = histogram.as_deref_mut() {
                        for placement in objects.iter().filter_map(SceneObject::placement) {
                            histogram.record(
                                placement.projected_position.x,
                                placement.projected_position.y,
                            );
                        }
                    }
                    info!(
                        "background '{}': placed {} objects after {attempt} attempt(s)",
                        self.background.name,
                        objects.len() - skipped.len()
                    );
                    return Ok(Population {
                        camera,
                        objects,
                        attempts: attempt,
                        skipped,
                        failures,
                        outcome: PopulationOutcome::Complete,
                    });
                }
                AttemptOutcome::Failed {
                    camera,
                    objects,
                    placed,
                    object,
                    reason,
                } => {
                    debug!("attempt {attempt} failed on object {object:?}: {reason}");
                    failures.push(AttemptFailure {
                        attempt,
                        object,
                        reason,
                    });
                    last_failed = Some((camera, objects, placed, object));
                }
            }
        }

        warn!(
            "background '{}': population exhausted after {max_attempts} attempts",
            self.background.name
        );
        if self.options.raise_on_failure {
            return Err(PopulationError::PopulationExhausted {
                attempts: max_attempts,
            });
        }
        let (camera, objects, placed, failed_object) =
            last_failed.unwrap_or_else(|| (camera.clone(), objects.to_vec(), 0, None));
        Ok(Population {
            camera,
            objects,
            attempts: max_attempts,
            skipped,
            failures,
            outcome: PopulationOutcome::Incomplete {
                placed,
                failed_object,
            },
        })
    }

    /// One pass over every object. Rejections end the attempt; fatal errors end the call.
    #[allow(clippy::too_many_arguments)]
    fn attempt<R: Rng + ?Sized>(
        &self,
        sampler: &ConstraintSampler<'_>,
        objects: &[SceneObject],
        allowed: &[Option<Vec<usize>>],
        template: &CameraState,
        histogram: Option<&OccupancyHistogram>,
        attempt: usize,
        rng: &mut R,
    ) -> Result<AttemptOutcome> {
        let mut working = objects.to_vec();

        let camera = if self.options.reset_camera {
            match sampler.sample_camera(template, rng) {
                Ok(camera) => camera,
                Err(SampleError::Rejected(failure)) => {
                    return Ok(AttemptOutcome::Failed {
                        camera: template.clone(),
                        objects: working,
                        placed: 0,
                        object: None,
                        reason: failure.reason,
                    });
                }
                Err(SampleError::Fatal(err)) => return Err(err),
            }
        } else {
            template.clone()
        };

        let views = SceneViews::new(&camera, self.options.frame_range)?;
        let mut screen = sampler.obstacle_occupancy(&views)?;
        let mut regions = RegionCycle::new(self.background.object_regions.len());
        let mut placed = 0;

        for (index, object) in objects.iter().enumerate() {
            let Some(allowed) = &allowed[index] else {
                continue;
            };
            self.check_interrupted(attempt - 1)?;

            let region = &self.background.object_regions[regions.next(allowed, rng)];
            let request = ObjectRequest {
                fixed: object.state.fixed(),
                region,
                envelope: object.action.as_ref(),
            };
            let ctx = PlacementContext {
                views: &views,
                screen: &screen,
                histogram,
            };
            match sampler.place_object(&request, &ctx, rng) {
                Ok((placement, footprints)) => {
                    screen.push(&footprints);
                    working[index].state = PlacementState::Placed(placement);
                    placed += 1;
                }
                Err(SampleError::Rejected(failure)) => {
                    debug!("object '{}' not placed: {failure}", object.name);
                    return Ok(AttemptOutcome::Failed {
                        camera,
                        objects: working,
                        placed,
                        object: Some(index),
                        reason: failure.reason,
                    });
                }
                Err(SampleError::Fatal(err)) => return Err(err),
            }
        }

        Ok(AttemptOutcome::Complete {
            camera,
            objects: working,
        })
    }

    /// Object regions each object may use; `None` marks an object to skip.
    fn allowed_regions(&self, objects: &[SceneObject]) -> Result<Vec<Option<Vec<usize>>>> {
        let regions = &self.background.object_regions;
        objects
            .iter()
            .map(|object| {
                let Some(envelope) = &object.action else {
                    return Ok(Some((0..regions.len()).collect()));
                };
                let fitting: Vec<usize> = regions
                    .iter()
                    .enumerate()
                    .filter(|(_, region)| envelope.fits(region))
                    .map(|(i, _)| i)
                    .collect();
                if !fitting.is_empty() {
                    return Ok(Some(fitting));
                }
                if self.options.raise_on_incompatible_action {
                    return Err(PopulationError::IncompatibleAction(object.name.clone()));
                }
                warn!(
                    "skipping object '{}': its action does not fit background '{}'",
                    object.name, self.background.name
                );
                Ok(None)
            })
            .collect()
    }

    fn check_interrupted(&self, attempts: usize) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(PopulationError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(PopulationError::DeadlineExceeded { attempts });
        }
        Ok(())
    }
}
