pub mod heartbeat;
pub mod lowpass;
pub mod similarity;
pub mod spectral;

use log::info;
use serde::Serialize;

use crate::config::GatingConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::io::PullbackSequence;

use heartbeat::HeartbeatSummary;
use lowpass::{refine_minima, FrequencySurface};
use similarity::{score_frames, DissimilaritySignal, ScoreControl};
use spectral::{estimate_cardiac_frequency, SpectralEstimate};

/// End-diastolic frames: strictly increasing, duplicate-free indices in [0, N-1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatedFrameSet {
    frames: Vec<usize>,
}

impl GatedFrameSet {
    /// Validates an externally supplied list against a pullback of `n_frames`.
    pub fn new(frames: Vec<usize>, n_frames: usize) -> PipelineResult<Self> {
        if let Some(w) = frames.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PipelineError::data(format!(
                "gated frames must be strictly increasing, found {} before {}",
                w[0], w[1]
            )));
        }
        if let Some(&last) = frames.last() {
            if last + 1 >= n_frames {
                return Err(PipelineError::data(format!(
                    "gated frame {} outside [0, {})",
                    last,
                    n_frames.saturating_sub(1)
                )));
            }
        }
        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, frame: usize) -> bool {
        self.frames.binary_search(&frame).is_ok()
    }
}

/// Everything the gating stage computed for one pullback.
#[derive(Debug, Clone)]
pub struct GatingResult {
    pub gated: GatedFrameSet,
    pub signal: DissimilaritySignal,
    pub spectrum: SpectralEstimate,
    pub surface: FrequencySurface,
    pub hr_frames: usize,
}

impl GatingResult {
    pub fn heartbeats(&self, frame_rate: f64) -> HeartbeatSummary {
        HeartbeatSummary::from_gated(&self.gated, frame_rate)
    }
}

/// Selects one end-diastolic frame per heartbeat.
///
/// `progress` is forwarded to the frame scorer, the only long running and
/// cancellable part; an abort surfaces as [`PipelineError::Cancelled`].
pub fn gate_pullback(
    sequence: &PullbackSequence,
    config: &GatingConfig,
    progress: &mut dyn FnMut(usize, usize) -> ScoreControl,
) -> PipelineResult<GatingResult> {
    let n_frames = sequence.len();
    info!("Scoring {} frame pairs", n_frames.saturating_sub(1));
    let signal = score_frames(sequence, progress)?;

    let composite = signal.composite(config.alpha);
    let spectrum = estimate_cardiac_frequency(&composite, n_frames, sequence.frame_rate, config)?;
    info!(
        "Estimated heart rate {:.1} bpm ({:.3} Hz)",
        spectrum.heart_rate_bpm(),
        spectrum.fm
    );

    let track = refine_minima(&composite, n_frames, &spectrum)?;
    let gated = GatedFrameSet::new(track.picks, n_frames)?;
    info!("Selected {} end-diastolic frames", gated.len());

    Ok(GatingResult {
        gated,
        signal,
        spectrum,
        surface: track.surface,
        hr_frames: track.hr_frames,
    })
}
