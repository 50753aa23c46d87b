use log::{debug, warn};
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use crate::config::GatingConfig;
use crate::error::{PipelineError, PipelineResult};

/// Dominant cardiac frequency of a composite motion signal and the first
/// low-pass cutoff derived from it. All values in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralEstimate {
    /// Sampling frequency of the frame signal.
    pub fs: f64,
    /// Dominant cardiac frequency.
    pub fm: f64,
    /// Initial cutoff, (1 + sigma) * fm.
    pub fc: f64,
    /// Nyquist frequency, fs / 2.
    pub fmax: f64,
}

impl SpectralEstimate {
    /// Heart-beat length in frames.
    pub fn heart_rate_frames(&self) -> usize {
        (self.fs / self.fm).round() as usize
    }

    pub fn heart_rate_bpm(&self) -> f64 {
        self.fm * 60.0
    }
}

/// Sampling frequency used for a pullback of `n_frames` recorded at `frame_rate`:
/// N frames spread over an acquisition time of (N - 1) / frame_rate seconds.
pub fn sampling_frequency(n_frames: usize, frame_rate: f64) -> PipelineResult<f64> {
    if n_frames < 2 {
        return Err(PipelineError::data(format!(
            "sampling frequency needs at least 2 frames, got {}",
            n_frames
        )));
    }
    let duration = (n_frames - 1) as f64 / frame_rate;
    Ok(n_frames as f64 / duration)
}

/// Picks the strongest frequency of `signal` inside the configured cardiac band.
///
/// The signal is zero-padded to the next power of two >= `n_frames`. Only the
/// non-negative half of the spectrum is inspected, which drops the mirror.
pub fn estimate_cardiac_frequency(
    signal: &[f64],
    n_frames: usize,
    frame_rate: f64,
    config: &GatingConfig,
) -> PipelineResult<SpectralEstimate> {
    if signal.is_empty() {
        return Err(PipelineError::data("empty composite signal"));
    }
    let fs = sampling_frequency(n_frames, frame_rate)?;
    let nfft = n_frames.max(signal.len()).next_power_of_two();

    let mut buffer: Vec<Complex64> = signal
        .iter()
        .map(|&v| Complex64::new(v, 0.0))
        .chain(std::iter::repeat(Complex64::new(0.0, 0.0)))
        .take(nfft)
        .collect();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(nfft).process(&mut buffer);

    let mut best: Option<(usize, f64)> = None;
    for (k, value) in buffer.iter().enumerate().take(nfft / 2 + 1) {
        let freq = k as f64 * fs / nfft as f64;
        if freq < config.band_low_hz || freq > config.band_high_hz {
            continue;
        }
        let magnitude = value.norm();
        match best {
            Some((_, m)) if magnitude <= m => {}
            _ => best = Some((k, magnitude)),
        }
    }

    let (bin, magnitude) = match best {
        Some((k, m)) if m > 0.0 && m.is_finite() => (k, m),
        _ => {
            return Err(PipelineError::degenerate(format!(
                "no spectral energy in the [{}, {}] Hz cardiac band",
                config.band_low_hz, config.band_high_hz
            )))
        }
    };

    let fm = bin as f64 * fs / nfft as f64;
    let fmax = fs / 2.0;
    let mut fc = (1.0 + config.sigma) * fm;
    if fc >= fmax {
        let limit = fmax * config.nyquist_guard;
        warn!(
            "cutoff {:.3} Hz reaches Nyquist {:.3} Hz, capping at {:.3} Hz",
            fc, fmax, limit
        );
        fc = limit;
    }
    debug!(
        "cardiac frequency {:.3} Hz (bin {} of {}, |X| = {:.3e}), cutoff {:.3} Hz",
        fm, bin, nfft, magnitude, fc
    );

    Ok(SpectralEstimate { fs, fm, fc, fmax })
}
