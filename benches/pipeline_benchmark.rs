use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::DMatrix;
use stagetrack_rs::{
    BeaconFrame, CameraFrame, Detection, FrameShape, FusionPipeline, IrBeacon, ReidConfig,
};

const NUM_PERFORMERS: usize = 8;
const NUM_FRAMES: usize = 150;
const FEATURE_DIMS: usize = 512;

/* ----------------------------------------------------------------------------
 * Synthetic scene
 * ---------------------------------------------------------------------------- */

/// Performers walking left to right, each with its own embedding and an IR
/// beacon following every other one.
fn synthetic_scene() -> Vec<(CameraFrame, BeaconFrame)> {
    let shape = FrameShape::new(1080, 1920);
    (0..NUM_FRAMES)
        .map(|frame| {
            let timestamp = frame as f64 / 15.0;
            let mut detections = Vec::with_capacity(NUM_PERFORMERS);
            let mut features = DMatrix::<f32>::zeros(NUM_PERFORMERS, FEATURE_DIMS);
            let mut beacons = Vec::new();

            for performer in 0..NUM_PERFORMERS {
                let x = 60.0 + performer as f64 * 55.0 + frame as f64;
                let y = 150.0 + (performer % 3) as f64 * 90.0;
                detections.push(Detection::from_bbox(
                    [x - 30.0, y - 120.0, x + 30.0, y + 120.0],
                    0.7 + 0.03 * performer as f64,
                ));
                for d in 0..FEATURE_DIMS {
                    features[(performer, d)] = ((performer * 31 + d * 7) % 17) as f32 / 17.0;
                }
                if performer % 2 == 0 {
                    beacons.push(IrBeacon::new(performer, x * 0.01 + 0.05, y * 0.01 - 0.05));
                }
            }

            (
                CameraFrame {
                    detections,
                    features,
                    shape,
                    timestamp,
                },
                BeaconFrame { beacons, timestamp },
            )
        })
        .collect()
}

fn bench_pipeline(c: &mut Criterion) {
    let config = ReidConfig::default();
    let scene = synthetic_scene();

    let mut group = c.benchmark_group("pipeline");
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("full_pass_150_frames", |b| {
        b.iter(|| {
            let mut pipeline = FusionPipeline::new(&config).unwrap();
            for (camera, beacons) in &scene {
                let _ = pipeline.process(camera, Some(beacons)).unwrap();
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
