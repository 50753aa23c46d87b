// File: src/python_bind.rs
use pyo3::prelude::*;

use crate::contours::Contour;
use crate::entry::PullbackAnalysis;
use crate::processing::lesions::Lesion;
use crate::processing::metrics::FrameMetrics;

#[pyclass]
#[derive(Debug, Clone)]
pub struct PyContour {
    #[pyo3(get, set)]
    pub x: Vec<f64>,
    #[pyo3(get, set)]
    pub y: Vec<f64>,
}

#[pymethods]
impl PyContour {
    #[new]
    fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        Self { x, y }
    }

    fn __repr__(&self) -> String {
        format!("Contour(n_points={})", self.x.len())
    }

    fn area(&self) -> PyResult<f64> {
        let contour = Contour::try_from(self)?;
        Ok(contour.area())
    }
}

impl From<&Contour> for PyContour {
    fn from(contour: &Contour) -> Self {
        Self {
            x: contour.x().to_vec(),
            y: contour.y().to_vec(),
        }
    }
}

impl TryFrom<&PyContour> for Contour {
    type Error = PyErr;

    fn try_from(contour: &PyContour) -> PyResult<Self> {
        Contour::new(contour.x.clone(), contour.y.clone())
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
    }
}

#[pyclass]
#[derive(Debug, Clone)]
pub struct PyFrameMetrics {
    #[pyo3(get)]
    pub lumen_area: f64,
    #[pyo3(get)]
    pub plaque_area: f64,
    #[pyo3(get)]
    pub plaque_burden: f64,
    #[pyo3(get)]
    pub measured: bool,
}

#[pymethods]
impl PyFrameMetrics {
    fn __repr__(&self) -> String {
        format!(
            "FrameMetrics(lumen={:.2}mm², plaque={:.2}mm², burden={:.1}%)",
            self.lumen_area, self.plaque_area, self.plaque_burden
        )
    }
}

impl From<&FrameMetrics> for PyFrameMetrics {
    fn from(m: &FrameMetrics) -> Self {
        Self {
            lumen_area: m.lumen_area,
            plaque_area: m.plaque_area,
            plaque_burden: m.plaque_burden,
            measured: m.measured,
        }
    }
}

#[pyclass]
#[derive(Debug, Clone)]
pub struct PyLesion {
    #[pyo3(get)]
    pub frames: Vec<usize>,
    #[pyo3(get)]
    pub mla: Option<f64>,
    #[pyo3(get)]
    pub mla_frame: Option<usize>,
    #[pyo3(get)]
    pub mpb: f64,
    #[pyo3(get)]
    pub mpb_frame: usize,
    #[pyo3(get)]
    pub length: f64,
}

#[pymethods]
impl PyLesion {
    fn __repr__(&self) -> String {
        format!(
            "Lesion(frames={}..={}, length={:.1}mm, mpb={:.1}%)",
            self.frames.first().copied().unwrap_or(0),
            self.frames.last().copied().unwrap_or(0),
            self.length,
            self.mpb
        )
    }
}

impl From<&Lesion> for PyLesion {
    fn from(l: &Lesion) -> Self {
        Self {
            frames: l.frames.clone(),
            mla: l.mla,
            mla_frame: l.mla_frame,
            mpb: l.mpb,
            mpb_frame: l.mpb_frame,
            length: l.length,
        }
    }
}

#[pyclass]
#[derive(Debug, Clone)]
pub struct PyAnalysis {
    #[pyo3(get)]
    pub gated_frames: Vec<usize>,
    #[pyo3(get)]
    pub heart_rate_bpm: f64,
    #[pyo3(get)]
    pub lumen: Vec<PyContour>,
    #[pyo3(get)]
    pub plaque: Vec<PyContour>,
    #[pyo3(get)]
    pub metrics: Vec<PyFrameMetrics>,
    #[pyo3(get)]
    pub lesions: Vec<PyLesion>,
}

#[pymethods]
impl PyAnalysis {
    fn __repr__(&self) -> String {
        format!(
            "Analysis(frames={}, gated={}, hr={:.0}bpm, lesions={})",
            self.lumen.len(),
            self.gated_frames.len(),
            self.heart_rate_bpm,
            self.lesions.len()
        )
    }
}

impl From<PullbackAnalysis> for PyAnalysis {
    fn from(a: PullbackAnalysis) -> Self {
        Self {
            gated_frames: a.gating.gated.frames().to_vec(),
            heart_rate_bpm: a.gating.spectrum.heart_rate_bpm(),
            lumen: a.contours.frames.iter().map(|f| (&f.lumen).into()).collect(),
            plaque: a.contours.frames.iter().map(|f| (&f.plaque).into()).collect(),
            metrics: a.measurements.metrics.frames.iter().map(Into::into).collect(),
            lesions: a.measurements.lesions.iter().map(Into::into).collect(),
        }
    }
}
