//! Image preprocessing ahead of OCR.
//!
//! The stage converts to grayscale, normalizes contrast with CLAHE, removes
//! speckle with a median filter, deskews via projection-profile search, and
//! optionally produces upscaled variants. Backends see the processed image;
//! [`unmap_words`] returns their boxes to original page coordinates.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

use super::backend::OcrError;
use crate::models::WordBox;

/// CLAHE tile grid dimension.
const CLAHE_TILES: u32 = 8;

/// CLAHE histogram clip limit relative to the uniform bin height.
const CLAHE_CLIP_LIMIT: f32 = 2.0;

/// Deskew search half-range in degrees.
const DESKEW_RANGE_DEG: f32 = 15.0;

/// Deskew search step in degrees.
const DESKEW_STEP_DEG: f32 = 0.5;

/// Minimum detected angle worth correcting.
const DESKEW_MIN_DEG: f32 = 0.5;

/// Grayscale threshold below which a pixel counts as ink.
const INK_THRESHOLD: u8 = 128;

/// IOU above which two scale variants describe the same word.
const SCALE_MERGE_IOU: f32 = 0.6;

/// One encoded variant handed to the backend.
#[derive(Debug)]
pub struct ScaledVariant {
    pub png: Vec<u8>,
    pub scale: f32,
}

/// The preprocessed page plus the transform needed to undo it.
#[derive(Debug)]
pub struct PreparedImage {
    pub variants: Vec<ScaledVariant>,
    /// Rotation applied to the image, in degrees.
    pub rotation_deg: f32,
    /// Original page dimensions.
    pub width: u32,
    pub height: u32,
}

/// Contrast-limited adaptive histogram equalization over a tile grid with
/// bilinear blending between neighboring tile mappings.
fn clahe(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width < CLAHE_TILES || height < CLAHE_TILES {
        return gray.clone();
    }
    let tile_w = width.div_ceil(CLAHE_TILES);
    let tile_h = height.div_ceil(CLAHE_TILES);

    // Per-tile lookup tables.
    let mut luts = vec![[0u8; 256]; (CLAHE_TILES * CLAHE_TILES) as usize];
    for ty in 0..CLAHE_TILES {
        for tx in 0..CLAHE_TILES {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let pixels = ((x1 - x0) * (y1 - y0)).max(1);

            // Clip and redistribute the excess uniformly.
            let clip = ((CLAHE_CLIP_LIMIT * pixels as f32 / 256.0).ceil() as u32).max(1);
            let mut excess = 0u32;
            for count in hist.iter_mut() {
                if *count > clip {
                    excess += *count - clip;
                    *count = clip;
                }
            }
            let bonus = excess / 256;
            for count in hist.iter_mut() {
                *count += bonus;
            }

            let lut = &mut luts[(ty * CLAHE_TILES + tx) as usize];
            let mut cdf = 0u32;
            for (value, count) in hist.iter().enumerate() {
                cdf += count;
                lut[value] = ((cdf as f32 / pixels as f32) * 255.0).round().min(255.0) as u8;
            }
        }
    }

    // Blend between the four nearest tile mappings.
    let mut out = GrayImage::new(width, height);
    let last_tile = CLAHE_TILES - 1;
    for y in 0..height {
        let fy = (y as f32 / tile_h as f32 - 0.5).max(0.0);
        let ty0 = (fy.floor() as u32).min(last_tile);
        let ty1 = (ty0 + 1).min(last_tile);
        let wy = fy - fy.floor();
        for x in 0..width {
            let fx = (x as f32 / tile_w as f32 - 0.5).max(0.0);
            let tx0 = (fx.floor() as u32).min(last_tile);
            let tx1 = (tx0 + 1).min(last_tile);
            let wx = fx - fx.floor();

            let v = gray.get_pixel(x, y)[0] as usize;
            let v00 = luts[(ty0 * CLAHE_TILES + tx0) as usize][v] as f32;
            let v01 = luts[(ty0 * CLAHE_TILES + tx1) as usize][v] as f32;
            let v10 = luts[(ty1 * CLAHE_TILES + tx0) as usize][v] as f32;
            let v11 = luts[(ty1 * CLAHE_TILES + tx1) as usize][v] as f32;
            let top = v00 * (1.0 - wx) + v01 * wx;
            let bottom = v10 * (1.0 - wx) + v11 * wx;
            let blended = top * (1.0 - wy) + bottom * wy;
            out.put_pixel(x, y, Luma([blended.round().min(255.0) as u8]));
        }
    }
    out
}

/// Detect page skew by maximizing the variance of the line projection
/// profile over candidate angles in ±15° at 0.5° steps. Returns degrees.
pub fn detect_skew_angle(gray: &GrayImage) -> f32 {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }

    // Subsample ink pixels so large pages stay cheap.
    let target_samples = 100_000u32;
    let step = (((width as u64 * height as u64) / target_samples as u64) as f32)
        .sqrt()
        .floor()
        .max(1.0) as u32;

    let mut points: Vec<(f32, f32)> = Vec::new();
    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            if gray.get_pixel(x, y)[0] < INK_THRESHOLD {
                points.push((x as f32, y as f32));
            }
            x += step;
        }
        y += step;
    }
    if points.len() < 32 {
        return 0.0;
    }

    let diag = ((width * width + height * height) as f32).sqrt().ceil() as usize;
    let mut best_angle = 0.0f32;
    let mut best_variance = f32::MIN;

    let steps = (2.0 * DESKEW_RANGE_DEG / DESKEW_STEP_DEG).round() as i32;
    for i in 0..=steps {
        let angle = -DESKEW_RANGE_DEG + i as f32 * DESKEW_STEP_DEG;
        let theta = angle.to_radians();
        let (sin, cos) = theta.sin_cos();

        let mut bins = vec![0u32; 2 * diag + 1];
        for (x, y) in &points {
            let projected = (-x * sin + y * cos).round() as isize + diag as isize;
            if (0..bins.len() as isize).contains(&projected) {
                bins[projected as usize] += 1;
            }
        }

        let occupied: Vec<u32> = {
            let first = bins.iter().position(|c| *c > 0);
            let last = bins.iter().rposition(|c| *c > 0);
            match (first, last) {
                (Some(a), Some(b)) => bins[a..=b].to_vec(),
                _ => continue,
            }
        };
        let n = occupied.len() as f32;
        let mean = occupied.iter().sum::<u32>() as f32 / n;
        let variance = occupied
            .iter()
            .map(|c| {
                let d = *c as f32 - mean;
                d * d
            })
            .sum::<f32>()
            / n;

        if variance > best_variance {
            best_variance = variance;
            best_angle = angle;
        }
    }
    best_angle
}

fn encode_png(gray: &GrayImage) -> Result<Vec<u8>, OcrError> {
    let mut buf = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(gray.clone())
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| OcrError::InvalidImage(format!("encode page: {}", e)))?;
    Ok(buf.into_inner())
}

/// Run the preprocessing stage on an encoded page image.
pub fn preprocess_image(
    bytes: &[u8],
    enable: bool,
    deskew: bool,
    scales: &[f32],
) -> Result<PreparedImage, OcrError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| OcrError::InvalidImage(format!("decode page: {}", e)))?;
    let (width, height) = (decoded.width(), decoded.height());
    let mut gray = decoded.to_luma8();
    let mut rotation_deg = 0.0f32;

    if enable {
        gray = clahe(&gray);
        gray = median_filter(&gray, 1, 1);

        if deskew {
            let skew = detect_skew_angle(&gray);
            if skew.abs() >= DESKEW_MIN_DEG {
                rotation_deg = -skew;
                gray = rotate_about_center(
                    &gray,
                    rotation_deg.to_radians(),
                    Interpolation::Bilinear,
                    Luma([255u8]),
                );
            }
        }
    }

    let scales = if scales.is_empty() { &[1.0][..] } else { scales };
    let mut variants = Vec::with_capacity(scales.len());
    for &scale in scales {
        let scaled = if (scale - 1.0).abs() < f32::EPSILON {
            gray.clone()
        } else {
            let w = ((width as f32 * scale).round() as u32).max(1);
            let h = ((height as f32 * scale).round() as u32).max(1);
            image::imageops::resize(&gray, w, h, image::imageops::FilterType::CatmullRom)
        };
        variants.push(ScaledVariant {
            png: encode_png(&scaled)?,
            scale,
        });
    }

    Ok(PreparedImage {
        variants,
        rotation_deg,
        width,
        height,
    })
}

/// Map backend boxes from a processed variant back onto the original page:
/// undo the upscale, then the rotation, then clamp to page bounds.
pub fn unmap_words(
    words: Vec<WordBox>,
    scale: f32,
    rotation_deg: f32,
    page_width: u32,
    page_height: u32,
) -> Vec<WordBox> {
    let cx = page_width as f32 / 2.0;
    let cy = page_height as f32 / 2.0;
    let theta = (-rotation_deg).to_radians();
    let (sin, cos) = theta.sin_cos();

    words
        .into_iter()
        .map(|w| {
            let (x, y, width, height) = (w.x / scale, w.y / scale, w.width / scale, w.height / scale);

            let mut word = if rotation_deg.abs() > f32::EPSILON {
                // Rotate the corners back and take their axis-aligned bounds.
                let corners = [
                    (x, y),
                    (x + width, y),
                    (x, y + height),
                    (x + width, y + height),
                ];
                let mapped: Vec<(f32, f32)> = corners
                    .iter()
                    .map(|(px, py)| {
                        let dx = px - cx;
                        let dy = py - cy;
                        (cx + dx * cos - dy * sin, cy + dx * sin + dy * cos)
                    })
                    .collect();
                let x0 = mapped.iter().map(|p| p.0).fold(f32::MAX, f32::min);
                let y0 = mapped.iter().map(|p| p.1).fold(f32::MAX, f32::min);
                let x1 = mapped.iter().map(|p| p.0).fold(f32::MIN, f32::max);
                let y1 = mapped.iter().map(|p| p.1).fold(f32::MIN, f32::max);
                WordBox::new(w.text, x0, y0, x1 - x0, y1 - y0, w.confidence)
            } else {
                WordBox::new(w.text, x, y, width, height, w.confidence)
            };
            word.clamp_to(page_width, page_height);
            word
        })
        .collect()
}

/// Merge results from multiple scales: overlapping boxes (IOU ≥ 0.6) keep
/// the higher-confidence detection; the rest pass through.
pub fn merge_scale_results(mut base: Vec<WordBox>, other: Vec<WordBox>) -> Vec<WordBox> {
    for word in other {
        match base.iter().position(|existing| existing.iou(&word) >= SCALE_MERGE_IOU) {
            Some(idx) => {
                if word.confidence > base[idx].confidence {
                    base[idx] = word;
                }
            }
            None => base.push(word),
        }
    }
    base
}
