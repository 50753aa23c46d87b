pub mod config;
pub mod contours;
pub mod entry;
pub mod error;
pub mod gating;
pub mod io;
pub mod pipeline;
pub mod processing;
mod utils;

#[cfg(feature = "python")]
mod python_bind;

pub use config::AnalysisConfig;
pub use entry::{analyze_batch, analyze_contours, analyze_directory, analyze_pullback};
pub use error::{PipelineError, PipelineResult};

#[cfg(feature = "python")]
mod py {
    use pyo3::exceptions::PyRuntimeError;
    use pyo3::prelude::*;
    use pyo3::wrap_pyfunction;

    use crate::config::{AnalysisConfig, ContourConfig, LesionConfig};
    use crate::contours::{extract_contours, Contour, ContourSet, FrameContours};
    use crate::entry::{analyze_contours, analyze_directory, Acquisition};
    use crate::gating::gate_pullback;
    use crate::gating::similarity::ScoreControl;
    use crate::gating::GatedFrameSet;
    use crate::io::input::{read_frames_from_dir, read_masks_from_dir};
    use crate::python_bind::{PyAnalysis, PyContour, PyFrameMetrics, PyLesion};

    fn load_config(config_path: Option<&str>) -> anyhow::Result<AnalysisConfig> {
        match config_path {
            Some(path) => AnalysisConfig::from_toml_file(path),
            None => Ok(AnalysisConfig::default()),
        }
    }

    fn to_py_err(e: anyhow::Error) -> PyErr {
        PyRuntimeError::new_err(format!("{:#}", e))
    }

    /// Full analysis of a pullback stored as PNG frames plus predicted masks.
    #[pyfunction]
    #[pyo3(signature = (
        frames_dir,
        masks_dir,
        output_dir = "output",
        frame_rate = 30.0f64,
        pullback_speed = 0.5f64,
        pixel_resolution = 0.02f64,
        config_path = None
    ))]
    fn analyze_directory_py(
        frames_dir: &str,
        masks_dir: &str,
        output_dir: &str,
        frame_rate: f64,
        pullback_speed: f64,
        pixel_resolution: f64,
        config_path: Option<&str>,
    ) -> PyResult<PyAnalysis> {
        let config = load_config(config_path).map_err(to_py_err)?;
        let acquisition = Acquisition {
            frame_rate,
            pullback_speed,
            pixel_resolution,
        };
        let analysis = analyze_directory(frames_dir, masks_dir, output_dir, acquisition, &config)
            .map_err(to_py_err)?;
        Ok(analysis.into())
    }

    /// End-diastolic frame indices of the PNG frames in `frames_dir`.
    #[pyfunction]
    #[pyo3(signature = (frames_dir, frame_rate = 30.0f64, config_path = None))]
    fn gate_frames_py(
        frames_dir: &str,
        frame_rate: f64,
        config_path: Option<&str>,
    ) -> PyResult<Vec<usize>> {
        let config = load_config(config_path).map_err(to_py_err)?;
        // speed and resolution play no part in gating
        let sequence = read_frames_from_dir(frames_dir, frame_rate, 1.0, 1.0).map_err(to_py_err)?;
        let result = gate_pullback(&sequence, &config.gating, &mut |_, _| ScoreControl::Continue)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        Ok(result.gated.frames().to_vec())
    }

    /// Lumen and plaque contours for every mask PNG in `masks_dir`.
    #[pyfunction]
    #[pyo3(signature = (masks_dir, catheter = false))]
    fn extract_contours_py(
        masks_dir: &str,
        catheter: bool,
    ) -> PyResult<Vec<(PyContour, PyContour)>> {
        let masks = read_masks_from_dir(masks_dir).map_err(to_py_err)?;
        let config = if catheter {
            ContourConfig::with_catheter()
        } else {
            ContourConfig::default()
        };
        let set = extract_contours(&masks, &config)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        Ok(set
            .frames
            .iter()
            .map(|f| ((&f.lumen).into(), (&f.plaque).into()))
            .collect())
    }

    /// Metrics and lesions for edited contours.
    #[pyfunction]
    #[pyo3(signature = (
        lumen,
        plaque,
        gated_frames,
        pixel_resolution = 0.02f64,
        frame_rate = 30.0f64,
        pullback_speed = 0.5f64,
        burden_threshold = 40.0f64,
        min_run_length = 3usize,
        merge_distance = 1.5f64,
        min_lesion_length = 3.0f64
    ))]
    fn analyze_contours_py(
        lumen: Vec<PyContour>,
        plaque: Vec<PyContour>,
        gated_frames: Vec<usize>,
        pixel_resolution: f64,
        frame_rate: f64,
        pullback_speed: f64,
        burden_threshold: f64,
        min_run_length: usize,
        merge_distance: f64,
        min_lesion_length: f64,
    ) -> PyResult<(Vec<PyFrameMetrics>, Vec<PyLesion>)> {
        if lumen.len() != plaque.len() {
            return Err(PyRuntimeError::new_err(format!(
                "{} lumen contours but {} plaque contours",
                lumen.len(),
                plaque.len()
            )));
        }
        let frames = lumen
            .iter()
            .zip(&plaque)
            .map(|(l, p)| {
                Ok(FrameContours {
                    lumen: Contour::try_from(l)?,
                    plaque: Contour::try_from(p)?,
                    stent: Contour::default(),
                })
            })
            .collect::<PyResult<Vec<_>>>()?;
        let contours = ContourSet { frames };
        let gated = GatedFrameSet::new(gated_frames, contours.len())
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        let config = LesionConfig {
            burden_threshold,
            min_run_length,
            merge_distance,
            min_lesion_length,
        };
        let measurements = analyze_contours(
            &contours,
            &gated,
            pixel_resolution,
            frame_rate,
            pullback_speed,
            &config,
        )
        .map_err(to_py_err)?;

        Ok((
            measurements.metrics.frames.iter().map(Into::into).collect(),
            measurements.lesions.iter().map(Into::into).collect(),
        ))
    }

    /// This is the module importable from Python:
    ///
    /// ```python
    /// import pullbackrs as pb
    /// result = pb.analyze_directory_py("pullback/frames", "pullback/masks")
    /// print(result.lesions)
    /// ```
    #[pymodule]
    fn pullbackrs(_py: Python, m: pyo3::prelude::Bound<'_, PyModule>) -> PyResult<()> {
        // a logger configured by the host application wins
        let _ = env_logger::try_init();

        m.add("__version__", env!("CARGO_PKG_VERSION"))?;
        m.add_function(wrap_pyfunction!(analyze_directory_py, m.clone())?)?;
        m.add_function(wrap_pyfunction!(gate_frames_py, m.clone())?)?;
        m.add_function(wrap_pyfunction!(extract_contours_py, m.clone())?)?;
        m.add_function(wrap_pyfunction!(analyze_contours_py, m.clone())?)?;

        m.add_class::<PyContour>()?;
        m.add_class::<PyFrameMetrics>()?;
        m.add_class::<PyLesion>()?;
        m.add_class::<PyAnalysis>()?;
        Ok(())
    }
}
