use anyhow::{bail, Result};

use crate::io::{MaskStack, PullbackSequence};

/// Segmentation capability injected into the pipeline: one class mask per
/// input frame. Implementations must be shareable across threads because
/// prediction runs next to gating.
pub trait Predictor: Sync {
    fn predict(&self, sequence: &PullbackSequence) -> Result<MaskStack>;
}

impl<F> Predictor for F
where
    F: Fn(&PullbackSequence) -> Result<MaskStack> + Sync,
{
    fn predict(&self, sequence: &PullbackSequence) -> Result<MaskStack> {
        self(sequence)
    }
}

/// Masks produced ahead of time, e.g. read from a prediction directory.
#[derive(Debug, Clone)]
pub struct PrecomputedMasks {
    masks: MaskStack,
}

impl PrecomputedMasks {
    pub fn new(masks: MaskStack) -> Self {
        Self { masks }
    }
}

impl Predictor for PrecomputedMasks {
    fn predict(&self, sequence: &PullbackSequence) -> Result<MaskStack> {
        if self.masks.len() != sequence.len() {
            bail!(
                "{} precomputed masks for a pullback of {} frames",
                self.masks.len(),
                sequence.len()
            );
        }
        if let (Some(mask), Some(shape)) = (self.masks.masks().first(), sequence.frame_shape()) {
            if mask.shape() != shape {
                bail!(
                    "mask shape {:?} does not match frame shape {:?}",
                    mask.shape(),
                    shape
                );
            }
        }
        Ok(self.masks.clone())
    }
}
