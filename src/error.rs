use thiserror::Error;

/// Typed failures of the analytic stages.
///
/// A missing contour is not an error: it travels as an empty `Contour`
/// and the metrics/lesion stages give it explicit zero/skip semantics.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// Input rejected before any computation took place.
    #[error("invalid input data: {0}")]
    Data(String),

    /// The signal did not support a heart-rate estimate
    /// (flat spectrum, zero-variance frame pair, too short a beat).
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    /// The frame similarity scorer was aborted by the caller.
    #[error("gating cancelled after {processed} of {total} frame pairs")]
    Cancelled { processed: usize, total: usize },

    #[error("predictor failed: {0}")]
    Predictor(String),
}

impl PipelineError {
    pub fn data(msg: impl Into<String>) -> Self {
        PipelineError::Data(msg.into())
    }

    pub fn degenerate(msg: impl Into<String>) -> Self {
        PipelineError::NumericalDegeneracy(msg.into())
    }

    /// `true` for failures that mean "not computed" rather than bad input.
    pub fn is_not_computed(&self) -> bool {
        matches!(
            self,
            PipelineError::NumericalDegeneracy(_) | PipelineError::Cancelled { .. }
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
