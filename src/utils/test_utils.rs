use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::path::PathBuf;

use crate::contours::Contour;
use crate::io::{Mask, MaskStack, PullbackSequence};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fresh per-process directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pullbackrs_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Generates an ellipse contour for testing
pub fn generate_ellipse_contour(
    major: f64,
    minor: f64,
    num_points: usize,
    rotation: f64,
    translation: (f64, f64),
) -> Contour {
    let mut x = Vec::with_capacity(num_points);
    let mut y = Vec::with_capacity(num_points);
    for i in 0..num_points {
        let theta = 2.0 * PI * (i as f64) / (num_points as f64);
        let (x_rot, y_rot) = rotate_point((major * theta.cos(), minor * theta.sin()), rotation);
        x.push(x_rot + translation.0);
        y.push(y_rot + translation.1);
    }
    Contour::from_parts(x, y)
}

pub fn circle_contour(cx: f64, cy: f64, radius: f64, num_points: usize) -> Contour {
    generate_ellipse_contour(radius, radius, num_points, 0.0, (cx, cy))
}

/// Rotates a point around origin
pub fn rotate_point(point: (f64, f64), angle: f64) -> (f64, f64) {
    let (x, y) = point;
    let cos = angle.cos();
    let sin = angle.sin();
    (x * cos - y * sin, x * sin + y * cos)
}

/// Square mask centred on (size/2, size/2): lumen (1) up to `r_lumen`,
/// plaque (2) up to `r_outer`, background (0) outside.
pub fn annulus_mask(size: usize, r_lumen: f64, r_outer: f64) -> Mask {
    let center = (size / 2) as f64;
    DMatrix::from_fn(size, size, |r, c| {
        let d = ((r as f64 - center).powi(2) + (c as f64 - center).powi(2)).sqrt();
        if d <= r_lumen {
            1
        } else if d <= r_outer {
            2
        } else {
            0
        }
    })
}

/// One annulus per lumen radius, all with the same outer radius.
pub fn annulus_stack(size: usize, lumen_radii: &[f64], r_outer: f64) -> MaskStack {
    let masks = lumen_radii
        .iter()
        .map(|&r| annulus_mask(size, r, r_outer))
        .collect();
    MaskStack::new(masks).expect("annulus masks share one shape")
}

/// Shifting checkerboard frames with a row ramp, never flat.
pub fn checkerboard_sequence(n_frames: usize, size: usize) -> PullbackSequence {
    let frames = (0..n_frames)
        .map(|k| {
            DMatrix::from_fn(size, size, |r, c| {
                (((r / 2 + c / 2 + k) % 2) * 100 + k + r) as f64
            })
        })
        .collect();
    PullbackSequence::new(frames, 30.0, 0.5, 0.02).expect("valid checkerboard sequence")
}

/// Pullback whose texture contrast swells and fades at `heart_hz`, plus
/// seeded speckle. Both similarity components then oscillate once per beat.
pub fn synthetic_pullback(
    n_frames: usize,
    size: usize,
    frame_rate: f64,
    heart_hz: f64,
    seed: u64,
) -> PullbackSequence {
    let mut rng = StdRng::seed_from_u64(seed);
    let texture = DMatrix::from_fn(size, size, |r, c| {
        let (r, c) = (r as f64, c as f64);
        40.0 * (0.7 * r).sin() * (0.5 * c).cos() + 20.0 * (0.31 * (r + 2.0 * c)).sin()
    });

    let frames = (0..n_frames)
        .map(|i| {
            let contrast = 1.0 + 0.3 * (2.0 * PI * heart_hz * i as f64 / frame_rate).sin();
            texture.map(|t| 128.0 + contrast * t + rng.random_range(-4.0..4.0))
        })
        .collect();
    PullbackSequence::new(frames, frame_rate, 0.5, 0.02).expect("valid synthetic pullback")
}
