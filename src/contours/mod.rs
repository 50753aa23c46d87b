pub mod marching_squares;
pub mod selection;

use log::{debug, info};
use serde::Serialize;
use std::fmt;

use crate::config::ContourConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::io::MaskStack;

use marching_squares::find_contours;
use selection::{fill_label, relabel, select_largest_valid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContourType {
    Lumen,
    Plaque,
    Stent,
}

impl fmt::Display for ContourType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ContourType::Lumen => "Lumen",
                ContourType::Plaque => "Plaque",
                ContourType::Stent => "Stent",
            }
        )
    }
}

/// Closed polyline in pixel coordinates. The last point connects back to the
/// first. An empty contour means "no measurement" for its frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Contour {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Contour {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> PipelineResult<Self> {
        if x.len() != y.len() {
            return Err(PipelineError::data(format!(
                "contour has {} x but {} y coordinates",
                x.len(),
                y.len()
            )));
        }
        Ok(Self { x, y })
    }

    pub(crate) fn from_parts(x: Vec<f64>, y: Vec<f64>) -> Self {
        debug_assert_eq!(x.len(), y.len());
        Self { x, y }
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }

    /// Enclosed area in squared pixels, each point paired with its
    /// predecessor (the first wraps around to the last).
    pub fn area(&self) -> f64 {
        let n = self.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0_f64;
        for i in 0..n {
            let prev = if i == 0 { n - 1 } else { i - 1 };
            sum += self.x[i] * self.y[prev] - self.y[i] * self.x[prev];
        }
        0.5 * sum.abs()
    }

    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        let n = self.len() as f64;
        Some((
            self.x.iter().sum::<f64>() / n,
            self.y.iter().sum::<f64>() / n,
        ))
    }

    /// Keeps every k-th point, k = len / `num_points`, used to turn dense
    /// iso-lines into a handful of editable knots.
    pub fn downsample(&self, num_points: usize) -> Contour {
        if num_points == 0 || self.len() <= num_points {
            return self.clone();
        }
        let step = self.len() / num_points;
        let (x, y) = self.points().step_by(step).unzip();
        Contour { x, y }
    }
}

/// Contours of one frame. The stent contour is carried through for
/// consumers but never measured.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameContours {
    pub lumen: Contour,
    pub plaque: Contour,
    pub stent: Contour,
}

impl FrameContours {
    pub fn get(&self, kind: ContourType) -> &Contour {
        match kind {
            ContourType::Lumen => &self.lumen,
            ContourType::Plaque => &self.plaque,
            ContourType::Stent => &self.stent,
        }
    }
}

/// Per-frame contours of a whole pullback. Stages consume it read-only and
/// produce new values instead of editing it in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContourSet {
    pub frames: Vec<FrameContours>,
}

impl ContourSet {
    /// Builds a set from per-frame (x, y) coordinate lists, as loaded from an
    /// external editor. Empty lists mark frames without a contour.
    pub fn from_coordinates(
        lumen: Vec<(Vec<f64>, Vec<f64>)>,
        plaque: Vec<(Vec<f64>, Vec<f64>)>,
    ) -> PipelineResult<Self> {
        if lumen.len() != plaque.len() {
            return Err(PipelineError::data(format!(
                "{} lumen frames but {} plaque frames",
                lumen.len(),
                plaque.len()
            )));
        }
        let frames = lumen
            .into_iter()
            .zip(plaque)
            .map(|((lx, ly), (px, py))| {
                Ok(FrameContours {
                    lumen: Contour::new(lx, ly)?,
                    plaque: Contour::new(px, py)?,
                    stent: Contour::default(),
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn downsample(&self, num_points: usize) -> ContourSet {
        ContourSet {
            frames: self
                .frames
                .iter()
                .map(|f| FrameContours {
                    lumen: f.lumen.downsample(num_points),
                    plaque: f.plaque.downsample(num_points),
                    stent: f.stent.downsample(num_points),
                })
                .collect(),
        }
    }
}

/// Turns class masks into one lumen and one plaque contour per frame.
///
/// Frames without lumen pixels, or without a candidate that encloses the
/// image centre, get empty contours.
pub fn extract_contours(masks: &MaskStack, config: &ContourConfig) -> PipelineResult<ContourSet> {
    if config.plaque_level <= config.lumen_level {
        return Err(PipelineError::data(format!(
            "plaque level {} must exceed lumen level {}",
            config.plaque_level, config.lumen_level
        )));
    }
    let fill = fill_label(masks.max_label(), config);
    let lumen_label = config.lumen_label();

    let mut frames = Vec::with_capacity(masks.len());
    let mut absent = 0usize;
    for (idx, mask) in masks.masks().iter().enumerate() {
        let grid = relabel(mask, fill, config);
        if !grid.iter().any(|&v| v == lumen_label as f64) {
            debug!("frame {}: no lumen pixels", idx);
            absent += 1;
            frames.push(FrameContours::default());
            continue;
        }

        let (rows, cols) = grid.shape();
        let center = ((cols / 2) as f64, (rows / 2) as f64);
        let lumen = select_largest_valid(find_contours(&grid, config.lumen_level), center);
        let plaque = select_largest_valid(find_contours(&grid, config.plaque_level), center);
        if lumen.is_empty() {
            debug!("frame {}: no lumen contour encloses the image centre", idx);
        }
        frames.push(FrameContours {
            lumen,
            plaque,
            stent: Contour::default(),
        });
    }
    info!(
        "Extracted contours for {} frames ({} without lumen)",
        frames.len(),
        absent
    );

    Ok(ContourSet { frames })
}
