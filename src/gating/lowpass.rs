use log::debug;
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

use crate::error::{PipelineError, PipelineResult};

use super::spectral::SpectralEstimate;

const TAU: f64 = 25.0 / 46.0;
const NU: f64 = 21.0 / 46.0;

/// Smoothed versions of the composite signal, one column per refinement
/// stage with an increasing cutoff frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencySurface {
    columns: Vec<DVector<f64>>,
    cutoffs: Vec<f64>,
}

impl FrequencySurface {
    fn new(first: Vec<f64>, cutoff: f64) -> Self {
        Self {
            columns: vec![DVector::from_vec(first)],
            cutoffs: vec![cutoff],
        }
    }

    fn push(&mut self, column: Vec<f64>, cutoff: f64) {
        self.columns.push(DVector::from_vec(column));
        self.cutoffs.push(cutoff);
    }

    pub fn stages(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, stage: usize) -> Option<&DVector<f64>> {
        self.columns.get(stage)
    }

    /// Cutoff frequency (Hz) that produced each column.
    pub fn cutoffs(&self) -> &[f64] {
        &self.cutoffs
    }

    /// [frame, stage] matrix.
    pub fn as_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_columns(&self.columns)
    }

    /// Every column divided by its own maximum.
    pub fn normalized(&self) -> DMatrix<f64> {
        let mut m = self.as_matrix();
        for mut col in m.column_iter_mut() {
            let max = col.max();
            if max != 0.0 && max.is_finite() {
                col /= max;
            }
        }
        m
    }
}

/// Raised-cosine windowed ideal low-pass kernel, taps n = 1..=n_frames.
pub fn lowpass_kernel(fc: f64, fmax: f64, n_frames: usize) -> Vec<f64> {
    let ratio = fc / fmax;
    (1..=n_frames)
        .map(|n| {
            let n = n as f64;
            ratio * sinc(ratio * n) * (TAU - NU * (2.0 * PI * n / n_frames as f64).cos())
        })
        .collect()
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Convolves `signal` with the kernel for `fc` and keeps the first
/// `signal.len()` samples.
pub fn lowpass(signal: &[f64], fc: f64, fmax: f64, n_frames: usize) -> Vec<f64> {
    let kernel = lowpass_kernel(fc, fmax, n_frames);
    (0..signal.len())
        .map(|k| {
            let lo = k.saturating_sub(kernel.len() - 1);
            (lo..=k).map(|j| signal[j] * kernel[k - j]).sum()
        })
        .collect()
}

fn argmin_in(values: &[f64], indices: impl Iterator<Item = usize>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for idx in indices {
        let v = values[idx];
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((idx, v)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// First minimum inside the first beat, then one local minimum per beat
/// searched `hr - 2 ..= hr + 2` frames after the previous pick.
pub fn track_minima(s_low: &[f64], hr_frames: usize, n_frames: usize) -> PipelineResult<Vec<usize>> {
    if hr_frames < 3 {
        return Err(PipelineError::degenerate(format!(
            "heart rate of {} frames per beat is too short to track",
            hr_frames
        )));
    }
    let len = s_low.len();
    let mut idx = argmin_in(s_low, 0..hr_frames.min(len))
        .ok_or_else(|| PipelineError::degenerate("empty low-pass signal"))?;
    let mut picks = vec![idx];

    while idx + hr_frames < n_frames {
        let window = (idx + hr_frames - 2..=idx + hr_frames + 2).filter(|&i| i < len);
        match argmin_in(s_low, window) {
            Some(next) => {
                idx = next;
                picks.push(idx);
            }
            None => break,
        }
    }
    Ok(picks)
}

/// Moves every pick to the lowest sample of `column` within one frame.
/// Returns a new, strictly increasing list.
pub fn resnap(picks: &[usize], column: &[f64]) -> Vec<usize> {
    let len = column.len();
    let mut snapped: Vec<usize> = picks
        .iter()
        .filter_map(|&p| argmin_in(column, p.saturating_sub(1)..(p + 2).min(len)))
        .collect();
    snapped.sort_unstable();
    snapped.dedup();
    snapped
}

/// Result of the iterative low-pass refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimumTrack {
    pub picks: Vec<usize>,
    pub surface: FrequencySurface,
    pub hr_frames: usize,
}

/// Builds the stage-0 low-pass signal, tracks one minimum per beat and
/// tightens the picks while raising the cutoff by `fm` per stage up to Nyquist.
pub fn refine_minima(
    signal: &[f64],
    n_frames: usize,
    estimate: &SpectralEstimate,
) -> PipelineResult<MinimumTrack> {
    let SpectralEstimate { fm, fmax, .. } = *estimate;
    if !(fm > 0.0) {
        return Err(PipelineError::degenerate("cardiac frequency is not positive"));
    }

    let mut fc = estimate.fc;
    let s_low = lowpass(signal, fc, fmax, n_frames);
    let hr_frames = estimate.heart_rate_frames();
    let mut picks = track_minima(&s_low, hr_frames, n_frames)?;
    let mut surface = FrequencySurface::new(s_low, fc);

    fc += fm;
    while fc < fmax {
        let column = lowpass(signal, fc, fmax, n_frames);
        picks = resnap(&picks, &column);
        surface.push(column, fc);
        fc += fm;
    }
    debug!(
        "{} minima after {} low-pass stages (hr = {} frames)",
        picks.len(),
        surface.stages(),
        hr_frames
    );

    if picks.len() < 2 {
        return Err(PipelineError::degenerate(format!(
            "only {} end-diastolic candidate(s) found",
            picks.len()
        )));
    }

    Ok(MinimumTrack {
        picks,
        surface,
        hr_frames,
    })
}

#[cfg(test)]
mod lowpass_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kernel_window_and_length() {
        let k = lowpass_kernel(2.0, 15.0, 100);
        assert_eq!(k.len(), 100);
        // last tap: cos(2*pi) = 1, window = tau - nu = 4/46
        let ratio: f64 = 2.0 / 15.0;
        let expected = ratio * sinc(ratio * 100.0) * (4.0 / 46.0);
        assert_relative_eq!(k[99], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_lowpass_is_causal_truncated_convolution() {
        let signal = vec![1.0, 0.0, 0.0, 0.0];
        let out = lowpass(&signal, 2.0, 15.0, 5);
        let kernel = lowpass_kernel(2.0, 15.0, 5);
        assert_eq!(out.len(), 4);
        for i in 0..4 {
            assert_relative_eq!(out[i], kernel[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_track_minima_follows_period() {
        // minima every 10 samples, starting at 3
        let s: Vec<f64> = (0..60)
            .map(|i| if (i + 7) % 10 == 0 { -1.0 } else { (i % 10) as f64 * 0.01 })
            .collect();
        let picks = track_minima(&s, 10, 61).unwrap();
        assert_eq!(picks, vec![3, 13, 23, 33, 43, 53]);
    }

    #[test]
    fn test_track_minima_rejects_tiny_beats() {
        let err = track_minima(&[0.0; 10], 2, 11).unwrap_err();
        assert!(matches!(err, PipelineError::NumericalDegeneracy(_)));
    }

    #[test]
    fn test_resnap_moves_at_most_one_frame_and_dedups() {
        let column = vec![5.0, 4.0, 3.0, 4.0, 5.0, 0.0, 5.0];
        assert_eq!(resnap(&[1, 4], &column), vec![2, 5]);
        // two picks collapsing onto the same minimum
        assert_eq!(resnap(&[1, 3], &column), vec![2]);
        // picks at the borders stay inside the signal
        assert_eq!(resnap(&[0, 6], &column), vec![1, 5]);
    }

    #[test]
    fn test_surface_normalization() {
        let mut surface = FrequencySurface::new(vec![1.0, 2.0, 4.0], 1.0);
        surface.push(vec![3.0, 6.0, 3.0], 2.0);
        let m = surface.normalized();
        assert_eq!(m.shape(), (3, 2));
        assert_relative_eq!(m[(2, 0)], 1.0);
        assert_relative_eq!(m[(0, 0)], 0.25);
        assert_relative_eq!(m[(0, 1)], 0.5);
        assert_eq!(surface.cutoffs(), &[1.0, 2.0]);
        assert_eq!(surface.stages(), 2);
        assert_eq!(surface.column(1).map(|c| c[1]), Some(6.0));
        assert!(surface.column(2).is_none());
    }
}
