use anyhow::{Context, Result};
use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::contours::{ContourSet, ContourType};
use crate::gating::lowpass::FrequencySurface;
use crate::gating::GatedFrameSet;
use crate::processing::lesions::Lesion;
use crate::processing::metrics::MetricsSeries;

use super::input::ContourRecord;

/// Writes every contour point as `frame,structure,point_index,x,y`.
pub fn write_contours_csv<P: AsRef<Path>>(path: P, contours: &ContourSet) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    for (frame, fc) in contours.frames.iter().enumerate() {
        for kind in [ContourType::Lumen, ContourType::Plaque, ContourType::Stent] {
            for (point_index, (x, y)) in fc.get(kind).points().enumerate() {
                wtr.serialize(ContourRecord {
                    frame,
                    structure: kind.to_string(),
                    point_index,
                    x,
                    y,
                })?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct MetricsRecord {
    frame: usize,
    gated: bool,
    lumen_area: f64,
    plaque_area: f64,
    plaque_burden: f64,
    measured: bool,
}

/// One row per frame; `gated` marks the end-diastolic frames.
pub fn write_metrics_csv<P: AsRef<Path>>(
    path: P,
    metrics: &MetricsSeries,
    gated: &GatedFrameSet,
) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for (frame, m) in metrics.frames.iter().enumerate() {
        wtr.serialize(MetricsRecord {
            frame,
            gated: gated.contains(frame),
            lumen_area: m.lumen_area,
            plaque_area: m.plaque_area,
            plaque_burden: m.plaque_burden,
            measured: m.measured,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct LesionRecord {
    lesion: usize,
    first_frame: usize,
    last_frame: usize,
    gated_frames: usize,
    length_mm: f64,
    mla: Option<f64>,
    mla_frame: Option<usize>,
    mpb: f64,
    mpb_frame: usize,
}

pub fn write_lesions_csv<P: AsRef<Path>>(path: P, lesions: &[Lesion]) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    if lesions.is_empty() {
        // csv only emits headers alongside the first record
        wtr.write_record([
            "lesion",
            "first_frame",
            "last_frame",
            "gated_frames",
            "length_mm",
            "mla",
            "mla_frame",
            "mpb",
            "mpb_frame",
        ])?;
    }
    for (i, lesion) in lesions.iter().enumerate() {
        wtr.serialize(LesionRecord {
            lesion: i + 1,
            first_frame: lesion.first_frame(),
            last_frame: lesion.last_frame(),
            gated_frames: lesion.frames.len(),
            length_mm: lesion.length,
            mla: lesion.mla,
            mla_frame: lesion.mla_frame,
            mpb: lesion.mpb,
            mpb_frame: lesion.mpb_frame,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// One frame index per line, readable by `read_gated_frames`.
pub fn write_gated_frames<P: AsRef<Path>>(path: P, gated: &GatedFrameSet) -> Result<()> {
    let path = path.as_ref();
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for frame in gated.frames() {
        writeln!(writer, "{}", frame)?;
    }
    writer.flush()?;
    Ok(())
}

/// Normalised filter surface, one row per signal sample and one column per
/// cutoff stage. The header holds the cutoffs in Hz.
pub fn write_surface_csv<P: AsRef<Path>>(path: P, surface: &FrequencySurface) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    wtr.write_record(surface.cutoffs().iter().map(|fc| format!("{:.4}", fc)))?;
    let matrix = surface.normalized();
    for row in matrix.row_iter() {
        wtr.write_record(row.iter().map(|v| v.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_summary_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}
