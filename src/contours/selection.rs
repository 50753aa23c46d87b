use nalgebra::DMatrix;

use crate::config::ContourConfig;
use crate::io::Mask;

use super::marching_squares::IsoLine;
use super::Contour;

/// Value every sub-lumen pixel (background, or catheter after folding) is
/// collapsed to, so iso-lines only appear on anatomical boundaries.
///
/// This is the highest label of the whole stack, raised to at least the
/// label above the plaque level so the outer vessel boundary always exists.
pub fn fill_label(stack_max: u8, config: &ContourConfig) -> u8 {
    let above_plaque = config.plaque_level.ceil().clamp(0.0, u8::MAX as f64) as u8;
    stack_max.max(above_plaque)
}

/// Relabelled copy of `mask` as a float grid ready for iso-contouring.
pub fn relabel(mask: &Mask, fill: u8, config: &ContourConfig) -> DMatrix<f64> {
    let lumen = config.lumen_label();
    mask.map(|label| {
        let label = if config.catheter && label == 1 { 2 } else { label };
        if label < lumen {
            fill as f64
        } else {
            label as f64
        }
    })
}

/// Even-odd ray casting against the implicitly closed polygon.
pub fn contains_point(contour: &Contour, px: f64, py: f64) -> bool {
    let (xs, ys) = (contour.x(), contour.y());
    let n = xs.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (xs[i], ys[i]);
        let (xj, yj) = (xs[j], ys[j]);
        if (yi > py) != (yj > py) {
            let x_cross = xj + (py - yj) * (xi - xj) / (yi - yj);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Among the candidates enclosing `center`, the one with the most points.
/// Ties keep the earliest extracted candidate; no valid candidate gives an
/// empty contour.
pub fn select_largest_valid(candidates: Vec<IsoLine>, center: (f64, f64)) -> Contour {
    let mut best: Option<Contour> = None;
    for line in candidates {
        if !contains_point(&line.contour, center.0, center.1) {
            continue;
        }
        let longer = best
            .as_ref()
            .map_or(true, |b| line.contour.len() > b.len());
        if longer {
            best = Some(line.contour);
        }
    }
    best.unwrap_or_default()
}

#[cfg(test)]
mod selection_tests {
    use super::*;

    fn square(x0: f64, y0: f64, side: f64, extra_points: usize) -> IsoLine {
        let mut x = vec![x0, x0 + side, x0 + side, x0];
        let mut y = vec![y0, y0, y0 + side, y0 + side];
        // pad the closing edge with collinear points
        for k in 0..extra_points {
            x.push(x0);
            y.push(y0 + side - side * (k + 1) as f64 / (extra_points + 1) as f64);
        }
        IsoLine {
            contour: Contour::from_parts(x, y),
            closed: true,
        }
    }

    #[test]
    fn test_fill_label_reaches_above_plaque_level() {
        let config = ContourConfig::default();
        assert_eq!(fill_label(2, &config), 3);
        assert_eq!(fill_label(5, &config), 5);
        assert_eq!(fill_label(2, &ContourConfig::with_catheter()), 4);
    }

    #[test]
    fn test_relabel_background_and_catheter() {
        let mask = DMatrix::from_row_slice(1, 4, &[0u8, 1, 2, 3]);
        let plain = relabel(&mask, 3, &ContourConfig::default());
        assert_eq!(plain.as_slice(), &[3.0, 1.0, 2.0, 3.0]);

        let folded = relabel(&mask, 4, &ContourConfig::with_catheter());
        assert_eq!(folded.as_slice(), &[4.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn test_contains_point() {
        let sq = square(0.0, 0.0, 4.0, 0).contour;
        assert!(contains_point(&sq, 2.0, 2.0));
        assert!(!contains_point(&sq, 5.0, 2.0));
        assert!(!contains_point(&sq, 2.0, -1.0));
        assert!(!contains_point(&Contour::default(), 0.0, 0.0));
    }

    #[test]
    fn test_selects_longest_enclosing_candidate() {
        let candidates = vec![
            square(20.0, 20.0, 5.0, 10), // long but off-centre
            square(0.0, 0.0, 10.0, 1),
            square(1.0, 1.0, 8.0, 3),
        ];
        let chosen = select_largest_valid(candidates, (5.0, 5.0));
        assert_eq!(chosen.len(), 7);
        assert_eq!(chosen.x()[0], 1.0);
    }

    #[test]
    fn test_tie_keeps_first_candidate() {
        let candidates = vec![square(0.0, 0.0, 10.0, 2), square(1.0, 1.0, 8.0, 2)];
        let chosen = select_largest_valid(candidates, (5.0, 5.0));
        assert_eq!(chosen.x()[0], 0.0);
    }

    #[test]
    fn test_no_valid_candidate_is_empty() {
        let chosen = select_largest_valid(vec![square(20.0, 20.0, 5.0, 0)], (5.0, 5.0));
        assert!(chosen.is_empty());
    }
}
