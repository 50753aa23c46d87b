use log::{debug, info};
use serde::Serialize;
use std::ops::Range;

use crate::config::LesionConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::gating::GatedFrameSet;
use crate::io::position_mm;

use super::metrics::MetricsSeries;

/// Diseased stretch of the pullback after merging and filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lesion {
    /// Absolute frame indices of every gated frame the lesion spans.
    pub frames: Vec<usize>,
    /// Minimum lumen area (mm²) over frames with a lumen, and its frame.
    pub mla: Option<f64>,
    pub mla_frame: Option<usize>,
    /// Maximum plaque burden (%) and its frame.
    pub mpb: f64,
    pub mpb_frame: usize,
    /// Pullback distance between first and last frame, in mm.
    pub length: f64,
}

impl Lesion {
    pub fn first_frame(&self) -> usize {
        self.frames[0]
    }

    pub fn last_frame(&self) -> usize {
        self.frames[self.frames.len() - 1]
    }
}

/// Runs of consecutive gated positions with burden above `threshold`,
/// keeping only runs of at least `min_run` positions.
pub fn diseased_runs(burden: &[f64], threshold: f64, min_run: usize) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &b) in burden.iter().enumerate() {
        match (b > threshold, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..burden.len());
    }
    runs.retain(|r| r.len() >= min_run.max(1));
    runs
}

struct Positions<'a> {
    frames: &'a [usize],
    frame_rate: f64,
    pullback_speed: f64,
}

impl Positions<'_> {
    fn at(&self, gated_pos: usize) -> f64 {
        position_mm(self.frames[gated_pos], self.frame_rate, self.pullback_speed)
    }
}

fn build_lesion(
    span: Range<usize>,
    positions: &Positions<'_>,
    metrics: &MetricsSeries,
) -> PipelineResult<Lesion> {
    let frames = positions.frames[span.clone()].to_vec();
    let mut mla: Option<(f64, usize)> = None;
    let mut mpb: Option<(f64, usize)> = None;

    for &frame in &frames {
        let m = metrics.get(frame).ok_or_else(|| {
            PipelineError::data(format!("gated frame {} has no metrics", frame))
        })?;
        // a zero lumen area means the lumen was not found, not a closed vessel
        if m.lumen_area > 0.0 && mla.map_or(true, |(a, _)| m.lumen_area < a) {
            mla = Some((m.lumen_area, frame));
        }
        if mpb.map_or(true, |(b, _)| m.plaque_burden > b) {
            mpb = Some((m.plaque_burden, frame));
        }
    }

    let (mpb, mpb_frame) = mpb.ok_or_else(|| PipelineError::data("empty lesion span"))?;
    Ok(Lesion {
        frames,
        mla: mla.map(|(a, _)| a),
        mla_frame: mla.map(|(_, f)| f),
        mpb,
        mpb_frame,
        length: positions.at(span.end - 1) - positions.at(span.start),
    })
}

/// Finds lesions along the gated frames.
///
/// Kept runs are merged into the preceding lesion when the distance from its
/// last frame to the run's first frame is at most `merge_distance`; the
/// merged lesion also covers the gated frames in between. Lesions shorter
/// than `min_lesion_length` are dropped last.
pub fn detect_lesions(
    gated: &GatedFrameSet,
    metrics: &MetricsSeries,
    frame_rate: f64,
    pullback_speed: f64,
    config: &LesionConfig,
) -> PipelineResult<Vec<Lesion>> {
    if !(frame_rate > 0.0 && pullback_speed > 0.0) {
        return Err(PipelineError::data(format!(
            "frame rate {} and pullback speed {} must be positive",
            frame_rate, pullback_speed
        )));
    }
    let burden = metrics.gated_burden(gated)?;
    let positions = Positions {
        frames: gated.frames(),
        frame_rate,
        pullback_speed,
    };

    let runs = diseased_runs(&burden, config.burden_threshold, config.min_run_length);
    debug!("{} diseased runs above {}%", runs.len(), config.burden_threshold);

    let mut spans: Vec<Range<usize>> = Vec::with_capacity(runs.len());
    for run in runs {
        if let Some(prev) = spans.last_mut() {
            let gap = positions.at(run.start) - positions.at(prev.end - 1);
            if gap <= config.merge_distance {
                debug!(
                    "merging runs at gated positions {:?} and {:?} ({:.2} mm apart)",
                    prev, run, gap
                );
                prev.end = run.end;
                continue;
            }
        }
        spans.push(run);
    }

    let mut lesions = Vec::with_capacity(spans.len());
    for span in spans {
        let lesion = build_lesion(span, &positions, metrics)?;
        if lesion.length >= config.min_lesion_length {
            lesions.push(lesion);
        } else {
            debug!(
                "dropping lesion at frames {}..={} ({:.2} mm)",
                lesion.first_frame(),
                lesion.last_frame(),
                lesion.length
            );
        }
    }
    info!("Detected {} lesions", lesions.len());
    Ok(lesions)
}
