use serde::Serialize;

use crate::contours::{Contour, ContourSet};
use crate::error::{PipelineError, PipelineResult};
use crate::gating::GatedFrameSet;
use crate::io::{position_mm, Mask, MaskStack};

/// Areas in mm² and plaque burden in percent for one frame.
///
/// Absent contours yield 0, which is a sentinel meaning "not measured",
/// not a clinical zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameMetrics {
    pub lumen_area: f64,
    pub plaque_area: f64,
    pub plaque_burden: f64,
    /// Both lumen and plaque were present, so the numbers are measurements.
    pub measured: bool,
}

impl FrameMetrics {
    fn from_areas(lumen: Option<f64>, vessel: Option<f64>) -> Self {
        let lumen_area = lumen.unwrap_or(0.0);
        match (lumen, vessel) {
            (Some(lumen), Some(vessel)) => {
                // a plaque polygon smaller than the lumen polygon gives a
                // negative plaque area; it is kept as an input artefact
                let plaque_area = vessel - lumen;
                let total = lumen + plaque_area;
                let plaque_burden = if total != 0.0 {
                    100.0 * plaque_area / total
                } else {
                    0.0
                };
                Self {
                    lumen_area,
                    plaque_area,
                    plaque_burden,
                    measured: true,
                }
            }
            _ => Self {
                lumen_area,
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSeries {
    pub frames: Vec<FrameMetrics>,
}

impl MetricsSeries {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, frame: usize) -> Option<&FrameMetrics> {
        self.frames.get(frame)
    }

    /// Burden of each gated frame, in gated order.
    pub fn gated_burden(&self, gated: &GatedFrameSet) -> PipelineResult<Vec<f64>> {
        gated
            .frames()
            .iter()
            .map(|&f| {
                self.frames.get(f).map(|m| m.plaque_burden).ok_or_else(|| {
                    PipelineError::data(format!(
                        "gated frame {} has no metrics ({} frames measured)",
                        f,
                        self.frames.len()
                    ))
                })
            })
            .collect()
    }
}

/// Polygon area of a contour scaled to mm².
pub fn contour_area_mm2(contour: &Contour, pixel_resolution: f64) -> f64 {
    contour.area() * pixel_resolution * pixel_resolution
}

/// Per-frame metrics from lumen and plaque polygons.
pub fn metrics_from_contours(contours: &ContourSet, pixel_resolution: f64) -> MetricsSeries {
    let frames = contours
        .frames
        .iter()
        .map(|f| {
            let lumen = (!f.lumen.is_empty()).then(|| contour_area_mm2(&f.lumen, pixel_resolution));
            let vessel =
                (!f.plaque.is_empty()).then(|| contour_area_mm2(&f.plaque, pixel_resolution));
            FrameMetrics::from_areas(lumen, vessel)
        })
        .collect();
    MetricsSeries { frames }
}

/// Area of one class label as pixel count times pixel area. This is a
/// raster approximation and differs slightly from the polygon area.
pub fn mask_area_mm2(mask: &Mask, label: u8, pixel_resolution: f64) -> f64 {
    let count = mask.iter().filter(|&&l| l == label).count();
    count as f64 * pixel_resolution * pixel_resolution
}

/// Per-frame metrics counted directly on the masks. A frame is measured
/// when it holds lumen pixels.
pub fn metrics_from_masks(
    masks: &MaskStack,
    lumen_label: u8,
    plaque_label: u8,
    pixel_resolution: f64,
) -> MetricsSeries {
    let frames = masks
        .masks()
        .iter()
        .map(|mask| {
            let lumen = mask_area_mm2(mask, lumen_label, pixel_resolution);
            if lumen == 0.0 {
                return FrameMetrics::default();
            }
            let plaque = mask_area_mm2(mask, plaque_label, pixel_resolution);
            FrameMetrics::from_areas(Some(lumen), Some(lumen + plaque))
        })
        .collect();
    MetricsSeries { frames }
}

/// Segment-level numbers over the gated frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentSummary {
    /// mm³, area times the distance to the next gated frame.
    pub lumen_volume: f64,
    pub plaque_volume: f64,
    pub minimum_lumen_area: Option<f64>,
    pub minimum_lumen_area_frame: Option<usize>,
    pub maximum_plaque_burden: Option<f64>,
    pub maximum_plaque_burden_frame: Option<usize>,
}

pub fn summarize_segment(
    metrics: &MetricsSeries,
    gated: &GatedFrameSet,
    frame_rate: f64,
    pullback_speed: f64,
) -> PipelineResult<SegmentSummary> {
    let frames = gated.frames();
    let mut summary = SegmentSummary {
        lumen_volume: 0.0,
        plaque_volume: 0.0,
        minimum_lumen_area: None,
        minimum_lumen_area_frame: None,
        maximum_plaque_burden: None,
        maximum_plaque_burden_frame: None,
    };

    for (i, &frame) in frames.iter().enumerate() {
        let m = metrics.get(frame).ok_or_else(|| {
            PipelineError::data(format!("gated frame {} has no metrics", frame))
        })?;

        if let Some(&next) = frames.get(i + 1) {
            let spacing = position_mm(next, frame_rate, pullback_speed)
                - position_mm(frame, frame_rate, pullback_speed);
            summary.lumen_volume += m.lumen_area * spacing;
            summary.plaque_volume += m.plaque_area * spacing;
        }

        if !m.measured {
            continue;
        }
        if summary.minimum_lumen_area.map_or(true, |a| m.lumen_area < a) {
            summary.minimum_lumen_area = Some(m.lumen_area);
            summary.minimum_lumen_area_frame = Some(frame);
        }
        if summary.maximum_plaque_burden.map_or(true, |b| m.plaque_burden > b) {
            summary.maximum_plaque_burden = Some(m.plaque_burden);
            summary.maximum_plaque_burden_frame = Some(frame);
        }
    }
    Ok(summary)
}
