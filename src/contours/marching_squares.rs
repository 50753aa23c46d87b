use nalgebra::DMatrix;
use std::collections::HashMap;

use super::Contour;

/// Grid edge carrying an iso-crossing. `Horizontal(r, c)` joins pixel (r, c)
/// with (r, c + 1), `Vertical(r, c)` joins (r, c) with (r + 1, c).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EdgeKey {
    Horizontal(usize, usize),
    Vertical(usize, usize),
}

/// One polyline at a constant level. `closed` is false for lines that run
/// into the image border.
#[derive(Debug, Clone, PartialEq)]
pub struct IsoLine {
    pub contour: Contour,
    pub closed: bool,
}

/// Marching squares over `grid` at `level`, with x along columns and y along rows.
///
/// Lines come out in raster order of their first cell, so identical input
/// always yields identical output. Saddle cells are disambiguated by the mean
/// of their four corners.
pub fn find_contours(grid: &DMatrix<f64>, level: f64) -> Vec<IsoLine> {
    let (rows, cols) = grid.shape();
    if rows < 2 || cols < 2 {
        return Vec::new();
    }

    let mut segments: Vec<(EdgeKey, EdgeKey)> = Vec::new();
    for r in 0..rows - 1 {
        for c in 0..cols - 1 {
            cell_segments(grid, r, c, level, &mut segments);
        }
    }

    let mut at_edge: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
    for (idx, (a, b)) in segments.iter().enumerate() {
        at_edge.entry(*a).or_default().push(idx);
        at_edge.entry(*b).or_default().push(idx);
    }

    let mut visited = vec![false; segments.len()];
    let mut lines = Vec::new();
    for start in 0..segments.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let (a, b) = segments[start];

        let mut forward = vec![a, b];
        walk(&segments, &at_edge, &mut visited, &mut forward);
        let closed = forward.len() > 2 && forward.first() == forward.last();

        let keys = if closed {
            forward.pop();
            forward
        } else {
            let mut backward = vec![a];
            walk(&segments, &at_edge, &mut visited, &mut backward);
            backward.reverse();
            backward.pop();
            backward.extend(forward);
            backward
        };

        let (x, y) = keys.iter().map(|k| crossing(grid, *k, level)).unzip();
        lines.push(IsoLine {
            contour: Contour::from_parts(x, y),
            closed,
        });
    }
    lines
}

/// Extends `chain` from its last key through unvisited segments.
fn walk(
    segments: &[(EdgeKey, EdgeKey)],
    at_edge: &HashMap<EdgeKey, Vec<usize>>,
    visited: &mut [bool],
    chain: &mut Vec<EdgeKey>,
) {
    while let Some(&tail) = chain.last() {
        let next = at_edge
            .get(&tail)
            .and_then(|segs| segs.iter().copied().find(|&s| !visited[s]));
        let Some(seg) = next else { break };
        visited[seg] = true;
        let (a, b) = segments[seg];
        chain.push(if a == tail { b } else { a });
    }
}

fn cell_segments(
    grid: &DMatrix<f64>,
    r: usize,
    c: usize,
    level: f64,
    out: &mut Vec<(EdgeKey, EdgeKey)>,
) {
    let tl = grid[(r, c)];
    let tr = grid[(r, c + 1)];
    let br = grid[(r + 1, c + 1)];
    let bl = grid[(r + 1, c)];

    let case = (tl > level) as u8
        | ((tr > level) as u8) << 1
        | ((br > level) as u8) << 2
        | ((bl > level) as u8) << 3;

    let top = EdgeKey::Horizontal(r, c);
    let bottom = EdgeKey::Horizontal(r + 1, c);
    let left = EdgeKey::Vertical(r, c);
    let right = EdgeKey::Vertical(r, c + 1);

    let highs_connected = (tl + tr + br + bl) / 4.0 > level;
    match case {
        0 | 15 => {}
        1 | 14 => out.push((top, left)),
        2 | 13 => out.push((top, right)),
        3 | 12 => out.push((left, right)),
        4 | 11 => out.push((right, bottom)),
        6 | 9 => out.push((top, bottom)),
        7 | 8 => out.push((left, bottom)),
        5 => {
            if highs_connected {
                out.push((top, right));
                out.push((left, bottom));
            } else {
                out.push((top, left));
                out.push((right, bottom));
            }
        }
        10 => {
            if highs_connected {
                out.push((top, left));
                out.push((right, bottom));
            } else {
                out.push((top, right));
                out.push((left, bottom));
            }
        }
        _ => unreachable!("marching squares case out of range"),
    }
}

/// Linearly interpolated crossing on an edge, as (x, y).
fn crossing(grid: &DMatrix<f64>, key: EdgeKey, level: f64) -> (f64, f64) {
    let fraction = |a: f64, b: f64| {
        if a == b {
            0.5
        } else {
            (level - a) / (b - a)
        }
    };
    match key {
        EdgeKey::Horizontal(r, c) => {
            let t = fraction(grid[(r, c)], grid[(r, c + 1)]);
            (c as f64 + t, r as f64)
        }
        EdgeKey::Vertical(r, c) => {
            let t = fraction(grid[(r, c)], grid[(r + 1, c)]);
            (c as f64, r as f64 + t)
        }
    }
}

#[cfg(test)]
mod marching_squares_tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square_grid() -> DMatrix<f64> {
        // 5x5 with a 3x3 block of ones in the middle
        DMatrix::from_fn(5, 5, |r, c| {
            if (1..=3).contains(&r) && (1..=3).contains(&c) {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_single_block_gives_one_closed_line() {
        let lines = find_contours(&square_grid(), 0.5);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.closed);
        // 3 crossings per side of the block
        assert_eq!(line.contour.len(), 12);
        // crossings sit half way between 0 and 1 pixels
        assert!(line.contour.x().iter().all(|x| (0.5..=3.5).contains(x)));
        assert!(line.contour.y().iter().all(|y| (0.5..=3.5).contains(y)));
        // octagon-like polygon: 3x3 square minus four corner triangles of area 1/8
        assert_relative_eq!(line.contour.area(), 9.0 - 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_flat_grid_has_no_lines() {
        let grid = DMatrix::from_element(4, 4, 2.0);
        assert!(find_contours(&grid, 0.5).is_empty());
        assert!(find_contours(&DMatrix::from_element(1, 4, 0.0), 0.5).is_empty());
    }

    #[test]
    fn test_region_touching_border_is_open() {
        // left half high
        let grid = DMatrix::from_fn(4, 4, |_, c| if c < 2 { 1.0 } else { 0.0 });
        let lines = find_contours(&grid, 0.5);
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].closed);
        assert_eq!(lines[0].contour.len(), 4);
        assert!(lines[0].contour.x().iter().all(|x| (*x - 1.5).abs() < 1e-12));
    }

    #[test]
    fn test_two_blobs_in_raster_order() {
        let grid = DMatrix::from_fn(6, 9, |r, c| {
            let left = (1..=2).contains(&r) && (1..=2).contains(&c);
            let right = (2..=4).contains(&r) && (5..=7).contains(&c);
            if left || right {
                1.0
            } else {
                0.0
            }
        });
        let lines = find_contours(&grid, 0.5);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.closed));
        assert_eq!(lines[0].contour.len(), 8);
        assert_eq!(lines[1].contour.len(), 12);
    }

    #[test]
    fn test_interpolation_fraction() {
        let grid = DMatrix::from_row_slice(2, 2, &[0.0, 4.0, 0.0, 4.0]);
        let lines = find_contours(&grid, 1.0);
        assert_eq!(lines.len(), 1);
        assert_relative_eq!(lines[0].contour.x()[0], 0.25);
    }
}
