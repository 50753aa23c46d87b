use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use image::GrayImage;
use log::info;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::contours::{Contour, ContourSet, FrameContours};
use crate::gating::GatedFrameSet;

use super::{Mask, MaskStack, PullbackSequence};

/// One contour point per row, shared by the CSV reader and writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourRecord {
    pub frame: usize,
    pub structure: String,
    pub point_index: usize,
    pub x: f64,
    pub y: f64,
}

/// Trailing number of a file stem, e.g. 12 for `pred_image12.png`.
fn frame_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

/// PNG files of `dir` in frame order: `img2.png` before `img10.png`.
pub fn list_png_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?
    {
        let path = entry
            .with_context(|| format!("failed to list {}", dir.display()))?
            .path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("png"));
        if path.is_file() && is_png {
            files.push(path);
        }
    }
    files.sort_by(|a, b| {
        frame_number(a)
            .cmp(&frame_number(b))
            .then_with(|| a.file_name().cmp(&b.file_name()))
    });
    Ok(files)
}

fn load_gray(path: &Path) -> Result<GrayImage> {
    Ok(image::open(path)
        .with_context(|| format!("failed to decode image {}", path.display()))?
        .to_luma8())
}

fn to_matrix<T: nalgebra::Scalar>(img: &GrayImage, f: impl Fn(u8) -> T) -> DMatrix<T> {
    let (w, h) = img.dimensions();
    DMatrix::from_fn(h as usize, w as usize, |r, c| {
        f(img.get_pixel(c as u32, r as u32)[0])
    })
}

/// Loads every PNG of `dir` as a grayscale frame.
pub fn read_frames_from_dir<P: AsRef<Path>>(
    dir: P,
    frame_rate: f64,
    pullback_speed: f64,
    pixel_resolution: f64,
) -> Result<PullbackSequence> {
    let dir = dir.as_ref();
    let files = list_png_files(dir)?;
    if files.is_empty() {
        bail!("no PNG frames found in {}", dir.display());
    }
    let frames = files
        .iter()
        .map(|path| Ok(to_matrix(&load_gray(path)?, f64::from)))
        .collect::<Result<Vec<_>>>()?;

    let sequence = PullbackSequence::new(frames, frame_rate, pullback_speed, pixel_resolution)
        .with_context(|| format!("invalid pullback in {}", dir.display()))?;
    info!("Loaded {} frames from {}", sequence.len(), dir.display());
    Ok(sequence)
}

/// Loads label masks (one PNG per frame, pixel value = class label).
pub fn read_masks_from_dir<P: AsRef<Path>>(dir: P) -> Result<MaskStack> {
    let dir = dir.as_ref();
    let files = list_png_files(dir)?;
    let masks = files
        .iter()
        .map(|path| Ok(to_matrix(&load_gray(path)?, |v| v)))
        .collect::<Result<Vec<Mask>>>()?;
    MaskStack::new(masks).with_context(|| format!("invalid masks in {}", dir.display()))
}

/// Reads gated frame indices, one per line. Blank lines and lines starting
/// with `#` are skipped.
pub fn read_gated_frames<P: AsRef<Path>>(path: P, n_frames: usize) -> Result<GatedFrameSet> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read gated frames {}", path.display()))?;
    let mut frames = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let frame = line.parse::<usize>().with_context(|| {
            format!("{}:{}: not a frame index: {:?}", path.display(), line_no + 1, line)
        })?;
        frames.push(frame);
    }
    Ok(GatedFrameSet::new(frames, n_frames)?)
}

/// Reads contours in the layout written by `write_contours_csv`. Frames
/// without rows get empty contours.
pub fn read_contours_csv<P: AsRef<Path>>(path: P, n_frames: usize) -> Result<ContourSet> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open contours {}", path.display()))?;

    let mut points: Vec<[Vec<(usize, f64, f64)>; 3]> = vec![Default::default(); n_frames];
    for result in reader.deserialize() {
        let record: ContourRecord =
            result.with_context(|| format!("invalid contour row in {}", path.display()))?;
        if record.frame >= n_frames {
            bail!(
                "contour frame {} outside a pullback of {} frames",
                record.frame,
                n_frames
            );
        }
        let slot = match record.structure.to_ascii_lowercase().as_str() {
            "lumen" => 0,
            "plaque" => 1,
            "stent" => 2,
            other => bail!("unknown contour structure {:?}", other),
        };
        points[record.frame][slot].push((record.point_index, record.x, record.y));
    }

    let frames = points
        .into_iter()
        .map(|structures| {
            let [lumen, plaque, stent] = structures.map(|mut pts| {
                pts.sort_by_key(|p| p.0);
                let (x, y) = pts.into_iter().map(|(_, x, y)| (x, y)).unzip();
                Contour::from_parts(x, y)
            });
            FrameContours {
                lumen,
                plaque,
                stent,
            }
        })
        .collect();
    Ok(ContourSet { frames })
}

#[cfg(test)]
mod input_tests {
    use super::*;
    use crate::utils::test_utils::scratch_dir;
    use image::Luma;

    #[test]
    fn test_frame_number() {
        assert_eq!(frame_number(Path::new("pred_image12.png")), Some(12));
        assert_eq!(frame_number(Path::new("/a/b/frame_007.png")), Some(7));
        assert_eq!(frame_number(Path::new("cover.png")), None);
    }

    #[test]
    fn test_reads_frames_and_masks_in_numeric_order() {
        let dir = scratch_dir("read_pngs");
        for k in [1u8, 2, 10] {
            let img = GrayImage::from_fn(6, 4, |x, y| Luma([k + x as u8 + y as u8]));
            img.save(dir.join(format!("pred_image{}.png", k))).unwrap();
        }
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let seq = read_frames_from_dir(&dir, 30.0, 0.5, 0.02).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.frame_shape(), Some((4, 6)));
        // first pixel carries the file number
        let firsts: Vec<f64> = seq.frames().iter().map(|f| f[(0, 0)]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 10.0]);
        assert_eq!(seq.frames()[0][(3, 5)], 9.0);

        let masks = read_masks_from_dir(&dir).unwrap();
        assert_eq!(masks.len(), 3);
        assert_eq!(masks.max_label(), 10 + 5 + 3);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_empty_frame_directory_is_an_error() {
        let dir = scratch_dir("no_pngs");
        assert!(read_frames_from_dir(&dir, 30.0, 0.5, 0.02).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_read_gated_frames() {
        let dir = scratch_dir("gated_txt");
        let path = dir.join("gated.txt");
        fs::write(&path, "# end-diastolic\n3\n\n28\n 54 \n").unwrap();
        let gated = read_gated_frames(&path, 100).unwrap();
        assert_eq!(gated.frames(), &[3, 28, 54]);
        assert!(read_gated_frames(&path, 40).is_err());

        fs::write(&path, "3\nseven\n").unwrap();
        let err = read_gated_frames(&path, 100).unwrap_err();
        assert!(format!("{:#}", err).contains(":2:"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_read_contours_orders_points_and_fills_gaps() {
        let dir = scratch_dir("contours_csv");
        let path = dir.join("contours.csv");
        fs::write(
            &path,
            "frame,structure,point_index,x,y\n\
             2,Lumen,1,1.0,0.0\n\
             2,Lumen,0,0.0,0.0\n\
             2,Lumen,2,1.0,1.0\n\
             0,Plaque,0,5.0,5.0\n",
        )
        .unwrap();
        let set = read_contours_csv(&path, 3).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.frames[2].lumen.x(), &[0.0, 1.0, 1.0]);
        assert_eq!(set.frames[0].plaque.len(), 1);
        assert!(set.frames[1].lumen.is_empty());
        assert!(read_contours_csv(&path, 2).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
