use log::debug;
use nalgebra::DMatrix;

use crate::error::{PipelineError, PipelineResult};
use crate::io::PullbackSequence;

/// Answer of the progress callback after each processed frame pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreControl {
    Continue,
    Abort,
}

/// Per adjacent frame pair: photometric dissimilarity (`s0`) and negative
/// gradient energy of the first frame of the pair (`s1`). Length N-1.
#[derive(Debug, Clone, PartialEq)]
pub struct DissimilaritySignal {
    pub s0: Vec<f64>,
    pub s1: Vec<f64>,
}

impl DissimilaritySignal {
    pub fn len(&self) -> usize {
        self.s0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s0.is_empty()
    }

    /// Weighted sum of both components after each was shifted to a zero
    /// minimum and scaled to unit sum.
    ///
    /// A component without any variation carries no information and
    /// contributes zeros.
    pub fn composite(&self, alpha: f64) -> Vec<f64> {
        let s0 = min_sum_normalize(&self.s0);
        let s1 = min_sum_normalize(&self.s1);
        s0.iter()
            .zip(&s1)
            .map(|(a, b)| alpha * a + (1.0 - alpha) * b)
            .collect()
    }
}

fn min_sum_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let shifted: Vec<f64> = values.iter().map(|v| v - min).collect();
    let sum: f64 = shifted.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        shifted.iter().map(|v| v / sum).collect()
    } else {
        vec![0.0; values.len()]
    }
}

/// Scores every adjacent frame pair of the pullback.
///
/// `progress` is called once per processed pair with `(processed, total)`;
/// returning [`ScoreControl::Abort`] stops the scorer and yields
/// [`PipelineError::Cancelled`].
pub fn score_frames(
    sequence: &PullbackSequence,
    progress: &mut dyn FnMut(usize, usize) -> ScoreControl,
) -> PipelineResult<DissimilaritySignal> {
    let frames = sequence.frames();
    if frames.len() < 2 {
        return Err(PipelineError::data(format!(
            "gating needs at least 2 frames, got {}",
            frames.len()
        )));
    }

    let total = frames.len() - 1;
    let mut s0 = Vec::with_capacity(total);
    let mut s1 = Vec::with_capacity(total);

    for i in 0..total {
        let c = normalized_cross_correlation(&frames[i], &frames[i + 1]).ok_or_else(|| {
            PipelineError::degenerate(format!("zero intensity variance in frame pair ({}, {})", i, i + 1))
        })?;
        s0.push(1.0 - c);
        s1.push(-gradient_energy(&frames[i]));

        if progress(i + 1, total) == ScoreControl::Abort {
            debug!("frame scoring aborted after {} of {} pairs", i + 1, total);
            return Err(PipelineError::Cancelled {
                processed: i + 1,
                total,
            });
        }
    }

    Ok(DissimilaritySignal { s0, s1 })
}

/// Mean/std normalised dot product divided by the pixel count.
/// There is no shift search: this compares intensity patterns in place.
///
/// Returns `None` when either frame has zero variance.
pub fn normalized_cross_correlation(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Option<f64> {
    let n = a.len() as f64;
    let mean_a = a.mean();
    let mean_b = b.mean();
    let std_a = (a.iter().map(|v| (v - mean_a).powi(2)).sum::<f64>() / n).sqrt();
    let std_b = (b.iter().map(|v| (v - mean_b).powi(2)).sum::<f64>() / n).sqrt();
    if std_a <= f64::EPSILON || std_b <= f64::EPSILON {
        return None;
    }

    let cross: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum();
    Some(cross / (std_a * std_b) / n)
}

/// Sum of gradient magnitudes, central differences inside the frame and
/// one-sided differences along its border.
pub fn gradient_energy(frame: &DMatrix<f64>) -> f64 {
    let (rows, cols) = frame.shape();
    let mut energy = 0.0;
    for r in 0..rows {
        for c in 0..cols {
            let gy = axis_derivative(rows, r, |k| frame[(k, c)]);
            let gx = axis_derivative(cols, c, |k| frame[(r, k)]);
            energy += (gx * gx + gy * gy).sqrt();
        }
    }
    energy
}

fn axis_derivative(len: usize, idx: usize, at: impl Fn(usize) -> f64) -> f64 {
    if len < 2 {
        0.0
    } else if idx == 0 {
        at(1) - at(0)
    } else if idx == len - 1 {
        at(len - 1) - at(len - 2)
    } else {
        (at(idx + 1) - at(idx - 1)) / 2.0
    }
}

#[cfg(test)]
mod similarity_tests {
    use super::*;
    use crate::utils::test_utils::{checkerboard_sequence, init_logger};
    use approx::assert_relative_eq;

    #[test]
    fn test_identical_frames_have_zero_dissimilarity() {
        let frame = DMatrix::from_fn(8, 8, |r, c| (r * 8 + c) as f64);
        let c = normalized_cross_correlation(&frame, &frame).unwrap();
        assert_relative_eq!(c, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverted_frame_is_anticorrelated() {
        let frame = DMatrix::from_fn(6, 6, |r, c| ((r + c) % 3) as f64);
        let inverted = frame.map(|v| 10.0 - v);
        let c = normalized_cross_correlation(&frame, &inverted).unwrap();
        assert_relative_eq!(c, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_flat_frame_is_degenerate() {
        let flat = DMatrix::from_element(4, 4, 7.0);
        let other = DMatrix::from_fn(4, 4, |r, _| r as f64);
        assert!(normalized_cross_correlation(&flat, &other).is_none());
    }

    #[test]
    fn test_gradient_energy_of_ramp() {
        // ramp along columns with slope 2: every pixel has |grad| = 2
        let ramp = DMatrix::from_fn(3, 5, |_, c| 2.0 * c as f64);
        assert_relative_eq!(gradient_energy(&ramp), 2.0 * 15.0, epsilon = 1e-12);
        let flat = DMatrix::from_element(3, 3, 1.0);
        assert_eq!(gradient_energy(&flat), 0.0);
    }

    #[test]
    fn test_score_frames_length_and_sign() {
        init_logger();
        let seq = checkerboard_sequence(6, 8);
        let mut calls = 0;
        let signal = score_frames(&seq, &mut |_, _| {
            calls += 1;
            ScoreControl::Continue
        })
        .unwrap();
        assert_eq!(signal.len(), 5);
        assert_eq!(calls, 5);
        assert!(signal.s1.iter().all(|v| *v <= 0.0));
        assert!(signal.s0.iter().all(|v| (0.0..=2.0 + 1e-12).contains(v)));
    }

    #[test]
    fn test_abort_after_k_pairs_is_cancelled() {
        let seq = checkerboard_sequence(10, 8);
        let err = score_frames(&seq, &mut |processed, _| {
            if processed == 3 {
                ScoreControl::Abort
            } else {
                ScoreControl::Continue
            }
        })
        .unwrap_err();
        assert_eq!(
            err,
            PipelineError::Cancelled {
                processed: 3,
                total: 9
            }
        );
    }

    #[test]
    fn test_flat_frame_in_sequence_is_degenerate() {
        let mut frames = checkerboard_sequence(6, 8).frames().to_vec();
        frames[3] = DMatrix::from_element(8, 8, 50.0);
        let seq = PullbackSequence::new(frames, 30.0, 0.5, 0.02).unwrap();

        let mut seen = Vec::new();
        let err = score_frames(&seq, &mut |processed, _| {
            seen.push(processed);
            ScoreControl::Continue
        })
        .unwrap_err();
        assert!(matches!(err, PipelineError::NumericalDegeneracy(_)));
        assert!(err.is_not_computed());
        // pair (2, 3) fails before its progress report
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_single_frame_is_data_error() {
        let seq = checkerboard_sequence(1, 8);
        let err = score_frames(&seq, &mut |_, _| ScoreControl::Continue).unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }

    #[test]
    fn test_composite_is_weighted_and_normalized() {
        let signal = DissimilaritySignal {
            s0: vec![1.0, 2.0, 3.0],
            s1: vec![-5.0, -5.0, -5.0],
        };
        let s = signal.composite(0.25);
        // s0 -> [0, 1/3, 2/3]; flat s1 contributes nothing
        assert_relative_eq!(s[0], 0.0);
        assert_relative_eq!(s[1], 0.25 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(s[2], 0.5 / 3.0, epsilon = 1e-12);
    }
}
