use anyhow::{anyhow, bail, Context, Result};
use crossbeam::thread;
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{AnalysisConfig, ContourConfig, LesionConfig};
use crate::contours::{extract_contours, ContourSet};
use crate::error::PipelineError;
use crate::gating::heartbeat::HeartbeatSummary;
use crate::gating::similarity::ScoreControl;
use crate::gating::{gate_pullback, GatedFrameSet, GatingResult};
use crate::io::input::{read_frames_from_dir, read_masks_from_dir};
use crate::io::output::{
    write_contours_csv, write_gated_frames, write_lesions_csv, write_metrics_csv,
    write_summary_json, write_surface_csv,
};
use crate::io::PullbackSequence;
use crate::pipeline::{PrecomputedMasks, Predictor};
use crate::processing::lesions::{detect_lesions, Lesion};
use crate::processing::metrics::{
    metrics_from_contours, summarize_segment, MetricsSeries, SegmentSummary,
};

/// Metrics, lesions and segment numbers for one set of contours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurements {
    pub metrics: MetricsSeries,
    pub lesions: Vec<Lesion>,
    pub summary: SegmentSummary,
}

/// Snapshot of a full pullback analysis. Each stage produced a new value
/// from the previous ones; nothing in here is edited afterwards.
#[derive(Debug, Clone)]
pub struct PullbackAnalysis {
    pub gating: GatingResult,
    pub heartbeats: HeartbeatSummary,
    pub contours: ContourSet,
    pub measurements: Measurements,
}

/// Compact, serialisable view of a [`PullbackAnalysis`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub n_frames: usize,
    pub heart_rate_bpm: f64,
    pub mean_beat_rate_bpm: Option<f64>,
    pub gated_frames: Vec<usize>,
    pub summary: SegmentSummary,
    pub lesions: Vec<Lesion>,
}

impl PullbackAnalysis {
    pub fn report(&self) -> AnalysisReport {
        AnalysisReport {
            n_frames: self.contours.len(),
            heart_rate_bpm: self.gating.spectrum.heart_rate_bpm(),
            mean_beat_rate_bpm: self.heartbeats.mean_heart_rate_bpm(),
            gated_frames: self.gating.gated.frames().to_vec(),
            summary: self.measurements.summary,
            lesions: self.measurements.lesions.clone(),
        }
    }
}

/// Metrics and lesions for contours that did not come out of
/// [`analyze_pullback`], e.g. after manual editing.
pub fn analyze_contours(
    contours: &ContourSet,
    gated: &GatedFrameSet,
    pixel_resolution: f64,
    frame_rate: f64,
    pullback_speed: f64,
    config: &LesionConfig,
) -> Result<Measurements> {
    if let Some(&last) = gated.frames().last() {
        if last >= contours.len() {
            bail!(
                "gated frame {} outside a contour set of {} frames",
                last,
                contours.len()
            );
        }
    }
    let metrics = metrics_from_contours(contours, pixel_resolution);
    let lesions = detect_lesions(gated, &metrics, frame_rate, pullback_speed, config)
        .context("lesion detection failed")?;
    let summary = summarize_segment(&metrics, gated, frame_rate, pullback_speed)
        .context("segment summary failed")?;
    Ok(Measurements {
        metrics,
        lesions,
        summary,
    })
}

/// Runs the whole pullback analysis.
///
/// Gating and prediction with contour extraction do not depend on each
/// other and run on two scoped threads; metrics and lesions follow once both
/// are done. Errors keep their [`PipelineError`] as root cause, so a caller
/// can tell a cancellation apart from bad input with `downcast_ref`.
pub fn analyze_pullback<P, F>(
    sequence: &PullbackSequence,
    predictor: &P,
    config: &AnalysisConfig,
    mut progress: F,
) -> Result<PullbackAnalysis>
where
    P: Predictor + ?Sized,
    F: FnMut(usize, usize) -> ScoreControl + Send,
{
    config.validate()?;
    if sequence.len() < 2 {
        return Err(PipelineError::data(format!(
            "a pullback needs at least 2 frames, got {}",
            sequence.len()
        ))
        .into());
    }

    let cancelled = AtomicBool::new(false);
    let (gating, contours) = thread::scope(|s| -> Result<_> {
        // gating thread
        let gating_handle = s.spawn(|_| -> Result<_> {
            let mut watch = |processed: usize, total: usize| {
                let control = progress(processed, total);
                if control == ScoreControl::Abort {
                    cancelled.store(true, Ordering::SeqCst);
                }
                control
            };
            gate_pullback(sequence, &config.gating, &mut watch).context("cardiac gating failed")
        });

        // prediction + contour thread
        let contour_handle =
            s.spawn(|_| predict_contours(sequence, predictor, &config.contours, &cancelled));

        let gating = gating_handle
            .join()
            .map_err(|_| anyhow!("gating thread panicked"))??;
        let contours = contour_handle
            .join()
            .map_err(|_| anyhow!("contour thread panicked"))??
            .ok_or_else(|| anyhow!("contour extraction skipped although gating finished"))?;
        Ok((gating, contours))
    })
    .map_err(|panic_payload| anyhow!("Parallel processing threads panicked: {:?}", panic_payload))??;

    let measurements = analyze_contours(
        &contours,
        &gating.gated,
        sequence.pixel_resolution,
        sequence.frame_rate,
        sequence.pullback_speed,
        &config.lesions,
    )?;
    let heartbeats = gating.heartbeats(sequence.frame_rate);
    info!(
        "Pullback analysed: {} gated frames, {} lesions",
        gating.gated.len(),
        measurements.lesions.len()
    );

    Ok(PullbackAnalysis {
        gating,
        heartbeats,
        contours,
        measurements,
    })
}

/// Prediction and contour extraction for [`analyze_pullback`].
///
/// `cancelled` is raised by the gating thread on abort. It is checked before
/// the predictor is called and again before its masks are traced; `Ok(None)`
/// means the work was skipped.
fn predict_contours<P>(
    sequence: &PullbackSequence,
    predictor: &P,
    config: &ContourConfig,
    cancelled: &AtomicBool,
) -> Result<Option<ContourSet>>
where
    P: Predictor + ?Sized,
{
    if cancelled.load(Ordering::SeqCst) {
        debug!("gating aborted, predictor not started");
        return Ok(None);
    }
    let masks = predictor
        .predict(sequence)
        .map_err(|e| PipelineError::Predictor(format!("{:#}", e)))?;
    if cancelled.load(Ordering::SeqCst) {
        debug!("gating aborted, {} predicted masks discarded", masks.len());
        return Ok(None);
    }
    if masks.len() != sequence.len() {
        return Err(PipelineError::Predictor(format!(
            "{} masks for {} frames",
            masks.len(),
            sequence.len()
        ))
        .into());
    }
    extract_contours(&masks, config)
        .map(Some)
        .context("contour extraction failed")
}

/// Analyses independent pullbacks in parallel. Results keep the input order
/// and one failing pullback does not affect the others.
pub fn analyze_batch<P>(
    sequences: &[PullbackSequence],
    predictor: &P,
    config: &AnalysisConfig,
) -> Vec<Result<PullbackAnalysis>>
where
    P: Predictor + ?Sized,
{
    sequences
        .par_iter()
        .enumerate()
        .map(|(idx, seq)| {
            analyze_pullback(seq, predictor, config, |_, _| ScoreControl::Continue)
                .with_context(|| format!("pullback {} failed", idx))
        })
        .collect()
}

/// Acquisition parameters of a pullback stored on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acquisition {
    pub frame_rate: f64,
    pub pullback_speed: f64,
    pub pixel_resolution: f64,
}

/// Reads frames and predicted masks from two PNG directories, analyses them
/// and writes all result tables to `output_dir`.
pub fn analyze_directory(
    frames_dir: &str,
    masks_dir: &str,
    output_dir: &str,
    acquisition: Acquisition,
    config: &AnalysisConfig,
) -> Result<PullbackAnalysis> {
    let sequence = read_frames_from_dir(
        frames_dir,
        acquisition.frame_rate,
        acquisition.pullback_speed,
        acquisition.pixel_resolution,
    )
    .context("reading frames failed")?;
    let masks = read_masks_from_dir(masks_dir).context("reading masks failed")?;
    let predictor = PrecomputedMasks::new(masks);

    let analysis = analyze_pullback(&sequence, &predictor, config, |_, _| ScoreControl::Continue)?;
    write_analysis(&analysis, output_dir)?;
    Ok(analysis)
}

/// Writes gated frames, contours, metrics, lesions, the filter surface and a
/// JSON report into `output_dir`.
pub fn write_analysis<P: AsRef<Path>>(analysis: &PullbackAnalysis, output_dir: P) -> Result<()> {
    let out = output_dir.as_ref();
    fs::create_dir_all(out)
        .with_context(|| format!("failed to create output dir {}", out.display()))?;

    write_gated_frames(out.join("gated_frames.txt"), &analysis.gating.gated)?;
    write_contours_csv(out.join("contours.csv"), &analysis.contours)?;
    write_metrics_csv(
        out.join("metrics.csv"),
        &analysis.measurements.metrics,
        &analysis.gating.gated,
    )?;
    write_lesions_csv(out.join("lesions.csv"), &analysis.measurements.lesions)?;
    write_surface_csv(out.join("frequency_surface.csv"), &analysis.gating.surface)?;
    write_summary_json(out.join("report.json"), &analysis.report())?;
    info!("Results written to {}", out.display());
    Ok(())
}
