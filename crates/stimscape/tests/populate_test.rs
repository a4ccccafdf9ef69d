//! End-to-end population tests.
//!
//! Every successful scene is re-projected here, independently of the sampler,
//! to check the edge-distance and overlap guarantees.

use std::time::{Duration, Instant};

use stimscape::*;

fn floor_background(size: f64) -> Background {
    Background::new(
        "floor",
        Constraint::cartesian_box(DVec3::new(17.5, -17.5, 8.0), DVec3::new(17.5, -17.5, 8.0)),
        Constraint::cartesian_box(DVec3::new(0.0, 0.0, 3.5), DVec3::new(0.0, 0.0, 3.5)),
        Constraint::cartesian()
            .with_x(AxisSpec::bounded(-5.0, 5.0))
            .with_y(AxisSpec::bounded(-5.0, 5.0))
            .with_z(AxisSpec::fixed(0.0))
            .with_size_range(size, size),
    )
}

fn point_background() -> Background {
    let mut background = floor_background(3.0);
    background.object_regions = vec![Constraint::cartesian_box(DVec3::ZERO, DVec3::ZERO).with_size_range(3.0, 3.0)];
    background
}

fn objects(n: usize) -> Vec<SceneObject> {
    (0..n).map(|i| SceneObject::new(format!("object_{i}"))).collect()
}

/// Extents of every placed object in every keyframe of the scene's camera.
fn extents(scene: &Population) -> Vec<Vec<ProjectedExtent>> {
    let camera = &scene.camera;
    (0..camera.len())
        .map(|k| {
            let view = camera.projector(k).unwrap();
            scene
                .placements()
                .map(|p| view.project_extent(p.position, p.size).unwrap())
                .collect()
        })
        .collect()
}

fn assert_scene_invariants(scene: &Population, options: &PopulateOptions) {
    for view in extents(scene) {
        for extent in &view {
            assert!(
                extent.min_edge_distance() >= options.edge_dist - 1e-9,
                "edge distance {} below {}",
                extent.min_edge_distance(),
                options.edge_dist
            );
        }
        for (i, a) in view.iter().enumerate() {
            for b in &view[i + 1..] {
                let overlap = a.footprint().overlap_fraction(&b.footprint());
                assert!(overlap <= options.ob_overlap + 1e-9, "overlap {overlap}");
            }
        }
    }
}

#[test]
fn test_four_objects_on_floor() {
    let background = floor_background(1.0);
    let options = PopulateOptions::default()
        .with_edge_dist(0.1)
        .with_ob_overlap(0.3)
        .with_max_attempts(100)
        .with_reset_camera(false);
    let populator = ScenePopulator::new(&background, options.clone());
    let mut rng = seeded_rng(2024);

    let scene = populator
        .populate(&objects(4), &CameraState::default(), None, &mut rng)
        .unwrap();

    assert!(scene.is_complete());
    assert_eq!(scene.placements().count(), 4);
    for placement in scene.placements() {
        assert_eq!(placement.size, 1.0);
        assert_eq!(placement.position.z, 0.0);
        assert!(placement.position.x.abs() <= 5.0 && placement.position.y.abs() <= 5.0);
        assert!(placement.rotation > -180.0 && placement.rotation <= 180.0);
    }
    assert_scene_invariants(&scene, &options);
}

#[test]
fn test_same_seed_same_scene() {
    let background = Background::default();
    let populator = ScenePopulator::new(&background, PopulateOptions::default());

    let run = |seed| {
        let mut histogram = OccupancyHistogram::default();
        let mut rng = seeded_rng(seed);
        let scene = populator
            .populate(&objects(3), &CameraState::default(), Some(&mut histogram), &mut rng)
            .unwrap();
        (scene, histogram)
    };

    let (a, hist_a) = run(77);
    let (b, hist_b) = run(77);
    assert_eq!(a, b);
    assert_eq!(hist_a, hist_b);
    assert_eq!(hist_a.total(), 3);
}

#[test]
fn test_point_region_exhausts() {
    let background = point_background();
    let options = PopulateOptions::default().with_reset_camera(false);
    let populator = ScenePopulator::new(&background, options);
    let mut rng = seeded_rng(1);

    let err = populator
        .populate(&objects(2), &CameraState::default(), None, &mut rng)
        .unwrap_err();
    assert!(matches!(err, PopulationError::PopulationExhausted { attempts: 100 }));
}

#[test]
fn test_point_region_partial_result() {
    let background = point_background();
    let options = PopulateOptions::default()
        .with_reset_camera(false)
        .with_max_attempts(5)
        .with_raise_on_failure(false);
    let populator = ScenePopulator::new(&background, options);
    let mut rng = seeded_rng(1);

    let scene = populator
        .populate(&objects(2), &CameraState::default(), None, &mut rng)
        .unwrap();
    assert!(!scene.is_complete());
    assert_eq!(scene.attempts, 5);
    assert_eq!(scene.failures.len(), 5);
    assert_eq!(scene.failures[4].attempt, 5);
    assert_eq!(scene.placements().count(), 1);
}

#[test]
fn test_deadline_stops_impossible_scene() {
    let background = point_background();
    let options = PopulateOptions::default()
        .with_reset_camera(false)
        .with_max_attempts(usize::MAX);
    let populator = ScenePopulator::new(&background, options)
        .with_deadline(Instant::now() + Duration::from_millis(50));
    let mut rng = seeded_rng(1);

    let err = populator
        .populate(&objects(2), &CameraState::default(), None, &mut rng)
        .unwrap_err();
    assert!(matches!(err, PopulationError::DeadlineExceeded { .. }));
}

#[test]
fn test_cancel_from_another_thread() {
    let background = point_background();
    let options = PopulateOptions::default()
        .with_reset_camera(false)
        .with_max_attempts(usize::MAX);
    let token = CancelToken::new();
    let populator = ScenePopulator::new(&background, options).with_cancel_token(token.clone());

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
    });
    let mut rng = seeded_rng(1);
    let err = populator
        .populate(&objects(2), &CameraState::default(), None, &mut rng)
        .unwrap_err();
    canceller.join().unwrap();
    assert!(matches!(err, PopulationError::Cancelled));
}

#[test]
fn test_regions_drawn_without_replacement() {
    let left = Constraint::cartesian_box(DVec3::new(-5.0, -2.0, 0.0), DVec3::new(-3.0, 2.0, 0.0))
        .with_size_range(1.0, 1.0);
    let right = Constraint::cartesian_box(DVec3::new(3.0, -2.0, 0.0), DVec3::new(5.0, 2.0, 0.0))
        .with_size_range(1.0, 1.0);
    let mut background = floor_background(1.0);
    background.object_regions = vec![left, right];
    let options = PopulateOptions::default().with_reset_camera(false);
    let populator = ScenePopulator::new(&background, options.clone());

    for seed in 0..5 {
        let mut rng = seeded_rng(seed);
        let scene = populator
            .populate(&objects(2), &CameraState::default(), None, &mut rng)
            .unwrap();
        let on_left = scene.placements().filter(|p| p.position.x < 0.0).count();
        assert_eq!(on_left, 1, "seed {seed}");
        assert_scene_invariants(&scene, &options);
    }
}

#[test]
fn test_caller_fixed_objects_act_as_obstacles() {
    let background = floor_background(1.0);
    let options = PopulateOptions::default().with_reset_camera(false).with_ob_overlap(0.0);
    let populator = ScenePopulator::new(&background, options.clone());

    let mut input = vec![SceneObject::new("anchor").with_partial(
        PartialPlacement::default()
            .with_position(DVec3::new(0.0, 0.0, 0.0))
            .with_size(1.0)
            .with_rotation(0.0),
    )];
    input.extend(objects(2));
    let mut rng = seeded_rng(5);

    let scene = populator
        .populate(&input, &CameraState::default(), None, &mut rng)
        .unwrap();
    assert_eq!(
        scene.objects[0].placement().map(|p| (p.position, p.size, p.rotation)),
        Some((DVec3::ZERO, 1.0, 0.0))
    );
    assert_scene_invariants(&scene, &options);
    // the caller's list is untouched
    assert!(matches!(input[0].state, PlacementState::PartiallySpecified(_)));
}

#[test]
fn test_moving_camera_keeps_objects_in_every_view() {
    let background = Background::default();
    let camera = CameraState::default().with_frames(vec![1, 30, 60]);
    let options = PopulateOptions::default().with_frame_range(1, 60);
    let populator = ScenePopulator::new(&background, options.clone());
    let mut rng = seeded_rng(8);

    let scene = populator.populate(&objects(3), &camera, None, &mut rng).unwrap();
    assert_eq!(scene.camera.len(), 3);
    assert_scene_invariants(&scene, &options);
}

#[test]
fn test_population_serializes() {
    let background = Background::default();
    let populator = ScenePopulator::new(&background, PopulateOptions::default());
    let mut rng = seeded_rng(12);
    let scene = populator
        .populate(&objects(2), &CameraState::default(), None, &mut rng)
        .unwrap();

    let json = serde_json::to_string(&scene).unwrap();
    let back: Population = serde_json::from_str(&json).unwrap();
    assert_eq!(back.outcome, PopulationOutcome::Complete);
    assert_eq!(back.objects.len(), 2);
}
