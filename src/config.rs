use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of the end-diastolic frame selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatingConfig {
    /// Weight of the photometric dissimilarity against the gradient energy.
    pub alpha: f64,
    /// Relative widening of the first low-pass cutoff above the cardiac frequency.
    pub sigma: f64,
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    /// A first cutoff at or above Nyquist is replaced by this fraction of it.
    pub nyquist_guard: f64,
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            alpha: 0.25,
            sigma: 0.4,
            band_low_hz: 0.75,
            band_high_hz: 1.66,
            nyquist_guard: 0.95,
        }
    }
}

/// Iso-levels used to turn class masks into boundary polylines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    /// Level separating lumen from everything else.
    pub lumen_level: f64,
    /// Level separating lumen+plaque from the surrounding tissue.
    pub plaque_level: f64,
    /// Masks carry a catheter label (1) that is folded into lumen (2).
    pub catheter: bool,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            lumen_level: 1.5,
            plaque_level: 2.5,
            catheter: false,
        }
    }
}

impl ContourConfig {
    /// Label layout {background, catheter, lumen, plaque}.
    pub fn with_catheter() -> Self {
        Self {
            lumen_level: 2.5,
            plaque_level: 3.5,
            catheter: true,
        }
    }

    pub fn lumen_label(&self) -> u8 {
        if self.catheter {
            2
        } else {
            1
        }
    }

    pub fn plaque_label(&self) -> u8 {
        self.lumen_label() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LesionConfig {
    /// Plaque burden in percent above which a gated frame counts as diseased.
    pub burden_threshold: f64,
    /// Minimum number of consecutive diseased gated frames.
    pub min_run_length: usize,
    /// Runs closer than this (mm) are merged into one lesion.
    pub merge_distance: f64,
    /// Lesions shorter than this (mm) are not reported.
    pub min_lesion_length: f64,
}

impl Default for LesionConfig {
    fn default() -> Self {
        Self {
            burden_threshold: 40.0,
            min_run_length: 3,
            merge_distance: 1.5,
            min_lesion_length: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub gating: GatingConfig,
    pub contours: ContourConfig,
    pub lesions: LesionConfig,
}

impl AnalysisConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: AnalysisConfig =
            toml::from_str(text).context("failed to parse analysis config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in config {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let g = &self.gating;
        if !(0.0..=1.0).contains(&g.alpha) {
            bail!("gating.alpha must lie in [0, 1], got {}", g.alpha);
        }
        if g.sigma <= 0.0 {
            bail!("gating.sigma must be positive, got {}", g.sigma);
        }
        if g.band_low_hz <= 0.0 || g.band_high_hz <= g.band_low_hz {
            bail!(
                "gating band [{}, {}] Hz is empty",
                g.band_low_hz,
                g.band_high_hz
            );
        }
        if !(0.0 < g.nyquist_guard && g.nyquist_guard < 1.0) {
            bail!("gating.nyquist_guard must lie in (0, 1), got {}", g.nyquist_guard);
        }

        let c = &self.contours;
        if c.plaque_level <= c.lumen_level {
            bail!(
                "contours.plaque_level ({}) must exceed contours.lumen_level ({})",
                c.plaque_level,
                c.lumen_level
            );
        }

        let l = &self.lesions;
        if l.min_run_length == 0 {
            bail!("lesions.min_run_length must be at least 1");
        }
        if l.merge_distance < 0.0 || l.min_lesion_length < 0.0 {
            bail!("lesion distances must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_defaults_match_clinical_policy() {
        let config = AnalysisConfig::default();
        assert_eq!(config.gating.alpha, 0.25);
        assert_eq!(config.gating.sigma, 0.4);
        assert_eq!(config.lesions.burden_threshold, 40.0);
        assert_eq!(config.lesions.min_run_length, 3);
        assert_eq!(config.lesions.merge_distance, 1.5);
        assert_eq!(config.lesions.min_lesion_length, 3.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() -> anyhow::Result<()> {
        let config = AnalysisConfig::from_toml_str(
            r#"
            [lesions]
            merge_distance = 5.0

            [contours]
            catheter = true
            lumen_level = 2.5
            plaque_level = 3.5
            "#,
        )?;
        assert_eq!(config.lesions.merge_distance, 5.0);
        assert_eq!(config.lesions.burden_threshold, 40.0);
        assert_eq!(config.contours.lumen_label(), 2);
        assert_eq!(config.contours, ContourConfig::with_catheter());
        assert_eq!(config.gating, GatingConfig::default());
        Ok(())
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AnalysisConfig::from_toml_str("[gating]\nalpha = 1.5").is_err());
        assert!(AnalysisConfig::from_toml_str(
            "[gating]\nband_low_hz = 2.0\nband_high_hz = 1.0"
        )
        .is_err());
        assert!(AnalysisConfig::from_toml_str("[lesions]\nmin_run_length = 0").is_err());
        assert!(AnalysisConfig::from_toml_str("[contours]\nplaque_level = 1.0").is_err());
    }
}
