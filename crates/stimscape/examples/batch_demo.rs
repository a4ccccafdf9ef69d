//! Batch scene generation demonstration.
//!
//! This demo shows:
//! - Loading population options from JSON
//! - Several worker threads populating scenes in parallel, each with its own histogram
//! - Merging the per-worker histograms into a shared dataset-wide histogram
//! - Writing every scene as a line of JSON
//!
//! Run with: `RUST_LOG=debug cargo run --example batch_demo`

use std::thread;

use stimscape::*;

const WORKERS: u64 = 4;
const SCENES_PER_WORKER: usize = 8;

const OPTIONS: &str = r#"{
    "edge_dist": 0.08,
    "ob_overlap": 0.25,
    "max_attempts": 50,
    "raise_on_failure": false
}"#;

fn scene_objects(scene: usize) -> Vec<SceneObject> {
    let mut objects = vec![
        SceneObject::new("table"),
        SceneObject::new("chair"),
        // a walker needs room to move two units either way along X
        SceneObject::new("walker").with_action(MotionEnvelope::new(
            DVec3::new(-2.0, -0.5, 0.0),
            DVec3::new(2.0, 0.5, 0.0),
        )),
    ];
    if scene % 2 == 0 {
        objects.push(
            SceneObject::new("lamp").with_partial(PartialPlacement::default().with_size(2.5)),
        );
    }
    objects
}

fn main() -> Result<()> {
    init_logging();

    let options = PopulateOptions::from_json_str(OPTIONS)?;
    let background = Background::default()
        .with_obstacle(Obstacle::new(DVec3::new(0.0, 3.0, 0.0), 0.75))
        .with_object_region(
            Constraint::cartesian_box(DVec3::new(6.0, -2.0, 0.0), DVec3::new(8.0, 2.0, 0.0))
                .with_size_range(0.5, 1.0),
        );
    let dataset = SharedHistogram::default();

    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let options = options.clone();
            let background = background.clone();
            let dataset = dataset.clone();
            thread::spawn(move || -> Result<Vec<Population>> {
                let populator = ScenePopulator::new(&background, options);
                let mut local = OccupancyHistogram::default();
                let mut rng = seeded_rng(worker);
                let mut scenes = Vec::with_capacity(SCENES_PER_WORKER);
                for scene in 0..SCENES_PER_WORKER {
                    let objects = scene_objects(scene);
                    scenes.push(populator.populate(
                        &objects,
                        &CameraState::default(),
                        Some(&mut local),
                        &mut rng,
                    )?);
                }
                dataset.with(|total| total.merge(&local))?;
                Ok(scenes)
            })
        })
        .collect();

    for worker in workers {
        let scenes = worker.join().expect("worker panicked")?;
        for scene in scenes {
            println!("{}", serde_json::to_string(&scene)?);
        }
    }

    let histogram = dataset.snapshot();
    println!();
    println!("Occupancy over {} placements:", histogram.total());
    for row in 0..histogram.n_bins() {
        let line: Vec<String> = (0..histogram.n_bins())
            .map(|col| format!("{:3}", histogram.count(col, row)))
            .collect();
        println!("{}", line.join(" "));
    }

    Ok(())
}
