use std::ops::Range;

use super::GatedFrameSet;

/// Frames grouped per cardiac cycle, delimited by consecutive end-diastolic frames.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatSummary {
    /// Frames of every complete beat, [p_i, p_i+1).
    pub beats: Vec<Range<usize>>,
    /// `phases[beat][phase]`: frame index of the same cardiac phase in every
    /// beat. Width is the length of the shortest beat.
    pub phases: Vec<Vec<usize>>,
    /// Duration of each beat in seconds.
    pub periods_s: Vec<f64>,
}

impl HeartbeatSummary {
    pub fn from_gated(gated: &GatedFrameSet, frame_rate: f64) -> Self {
        let frames = gated.frames();
        let beats: Vec<Range<usize>> = frames.windows(2).map(|w| w[0]..w[1]).collect();

        let width = beats.iter().map(|b| b.len()).min().unwrap_or(0);
        let phases = beats
            .iter()
            .map(|b| b.clone().take(width).collect())
            .collect();

        let periods_s = beats
            .iter()
            .map(|b| b.len() as f64 / frame_rate)
            .collect();

        Self {
            beats,
            phases,
            periods_s,
        }
    }

    /// Number of cardiac phases common to every beat.
    pub fn phase_count(&self) -> usize {
        self.phases.first().map(|p| p.len()).unwrap_or(0)
    }

    /// Frames of one cardiac phase across all beats.
    pub fn phase_frames(&self, phase: usize) -> Vec<usize> {
        self.phases
            .iter()
            .filter_map(|beat| beat.get(phase).copied())
            .collect()
    }

    pub fn mean_heart_rate_bpm(&self) -> Option<f64> {
        if self.periods_s.is_empty() {
            return None;
        }
        let mean = self.periods_s.iter().sum::<f64>() / self.periods_s.len() as f64;
        (mean > 0.0).then(|| 60.0 / mean)
    }
}

#[cfg(test)]
mod heartbeat_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_beats_phases_and_rate() {
        let gated = GatedFrameSet::new(vec![2, 12, 21, 31], 40).unwrap();
        let summary = HeartbeatSummary::from_gated(&gated, 10.0);

        assert_eq!(summary.beats, vec![2..12, 12..21, 21..31]);
        assert_eq!(summary.phase_count(), 9);
        assert_eq!(summary.phases[1][0], 12);
        assert_eq!(summary.phase_frames(3), vec![5, 15, 24]);
        assert_eq!(summary.phase_frames(9), Vec::<usize>::new());
        assert_relative_eq!(summary.periods_s[1], 0.9);
        assert_relative_eq!(summary.mean_heart_rate_bpm().unwrap(), 60.0 / (2.9 / 3.0));
    }

    #[test]
    fn test_single_frame_has_no_beats() {
        let gated = GatedFrameSet::new(vec![4], 10).unwrap();
        let summary = HeartbeatSummary::from_gated(&gated, 30.0);
        assert!(summary.beats.is_empty());
        assert_eq!(summary.phase_count(), 0);
        assert!(summary.mean_heart_rate_bpm().is_none());
    }
}
