pub mod input;
pub mod output;

use nalgebra::DMatrix;

use crate::error::{PipelineError, PipelineResult};

/// One pullback: an ordered stack of equally sized grayscale frames plus the
/// acquisition parameters needed to turn frame indices into time and distance.
///
/// Frames are stored as `DMatrix` with rows along the image y axis.
#[derive(Debug, Clone)]
pub struct PullbackSequence {
    frames: Vec<DMatrix<f64>>,
    /// Frames per second.
    pub frame_rate: f64,
    /// Catheter withdrawal speed in mm/s.
    pub pullback_speed: f64,
    /// In-plane pixel size in mm.
    pub pixel_resolution: f64,
}

impl PullbackSequence {
    pub fn new(
        frames: Vec<DMatrix<f64>>,
        frame_rate: f64,
        pullback_speed: f64,
        pixel_resolution: f64,
    ) -> PipelineResult<Self> {
        if let Some(first) = frames.first() {
            let shape = first.shape();
            if shape.0 == 0 || shape.1 == 0 {
                return Err(PipelineError::data("frames must not be empty rasters"));
            }
            if let Some((idx, f)) = frames.iter().enumerate().find(|(_, f)| f.shape() != shape) {
                return Err(PipelineError::data(format!(
                    "frame {} has shape {:?}, expected {:?}",
                    idx,
                    f.shape(),
                    shape
                )));
            }
        }
        for (name, value) in [
            ("frame_rate", frame_rate),
            ("pullback_speed", pullback_speed),
            ("pixel_resolution", pixel_resolution),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(PipelineError::data(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        Ok(Self {
            frames,
            frame_rate,
            pullback_speed,
            pixel_resolution,
        })
    }

    /// Builds a sequence from row-major 8 bit buffers of `width * height` pixels.
    pub fn from_luma_buffers(
        buffers: &[Vec<u8>],
        width: usize,
        height: usize,
        frame_rate: f64,
        pullback_speed: f64,
        pixel_resolution: f64,
    ) -> PipelineResult<Self> {
        let mut frames = Vec::with_capacity(buffers.len());
        for (idx, buf) in buffers.iter().enumerate() {
            if buf.len() != width * height {
                return Err(PipelineError::data(format!(
                    "frame {} holds {} pixels, expected {}x{}",
                    idx,
                    buf.len(),
                    width,
                    height
                )));
            }
            frames.push(DMatrix::from_fn(height, width, |r, c| {
                buf[r * width + c] as f64
            }));
        }
        Self::new(frames, frame_rate, pullback_speed, pixel_resolution)
    }

    pub fn frames(&self) -> &[DMatrix<f64>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// (rows, cols) of every frame.
    pub fn frame_shape(&self) -> Option<(usize, usize)> {
        self.frames.first().map(|f| f.shape())
    }

    /// Acquisition time of the last frame relative to the first, in seconds.
    /// The first frame is recorded instantly.
    pub fn duration_s(&self) -> f64 {
        self.frames.len().saturating_sub(1) as f64 / self.frame_rate
    }

    /// Physical length covered by the pullback in mm.
    pub fn length_mm(&self) -> f64 {
        self.pullback_speed * self.duration_s()
    }

    pub fn position_mm(&self, frame: usize) -> f64 {
        position_mm(frame, self.frame_rate, self.pullback_speed)
    }
}

/// Distance travelled by the catheter when `frame` was acquired.
pub fn position_mm(frame: usize, frame_rate: f64, pullback_speed: f64) -> f64 {
    frame as f64 * pullback_speed / frame_rate
}

/// Per-pixel class labels of a single frame, rows along the image y axis.
pub type Mask = DMatrix<u8>;

/// Class-label masks for every frame of a pullback.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskStack {
    masks: Vec<Mask>,
}

impl MaskStack {
    pub fn new(masks: Vec<Mask>) -> PipelineResult<Self> {
        if let Some(first) = masks.first() {
            let shape = first.shape();
            if let Some((idx, m)) = masks.iter().enumerate().find(|(_, m)| m.shape() != shape) {
                return Err(PipelineError::data(format!(
                    "mask {} has shape {:?}, expected {:?}",
                    idx,
                    m.shape(),
                    shape
                )));
            }
        }
        Ok(Self { masks })
    }

    pub fn masks(&self) -> &[Mask] {
        &self.masks
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    /// Highest label over the whole stack.
    pub fn max_label(&self) -> u8 {
        self.masks
            .iter()
            .flat_map(|m| m.iter().copied())
            .max()
            .unwrap_or(0)
    }
}
