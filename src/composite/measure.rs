//! Calibration helpers: measure disk diameters on sample rasters along the centre row.

use image::DynamicImage;

/// RGB sum above which a pixel no longer counts as occulter black.
pub const OCCULTER_THRESHOLD: u32 = 10;
/// Luma above which a pixel counts as part of the bright solar disk.
pub const SUN_THRESHOLD: u8 = 20;

/// Diameter in pixels of the dark occulting disk centred in a coronagraph image.
///
/// Scans the centre row outwards from the centre until the RGB sum exceeds
/// [`OCCULTER_THRESHOLD`]. Assumes the background around the occulter is not pure black.
pub fn measure_occulting_disk(img: &DynamicImage) -> u32 {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return 0;
    }
    let (cx, cy) = (width / 2, height / 2);
    let bright = |x: u32| {
        let p = rgb.get_pixel(x, cy).0;
        p.iter().map(|&c| u32::from(c)).sum::<u32>() > OCCULTER_THRESHOLD
    };

    let right = (cx..width).find(|&x| bright(x)).unwrap_or(cx);
    let left = (1..=cx).rev().find(|&x| bright(x)).unwrap_or(cx);
    right.saturating_sub(left)
}

/// Diameter in pixels of the bright solar disk centred on a black background.
///
/// Scans the centre row inwards from both edges until luma exceeds [`SUN_THRESHOLD`].
pub fn measure_sun_disk(img: &DynamicImage) -> u32 {
    let luma = img.to_luma8();
    let (width, height) = luma.dimensions();
    if width == 0 || height == 0 {
        return 0;
    }
    let cy = height / 2;
    let bright = |x: u32| luma.get_pixel(x, cy).0[0] > SUN_THRESHOLD;

    let left = (0..width).find(|&x| bright(x)).unwrap_or(0);
    let right = (1..width).rev().find(|&x| bright(x)).unwrap_or(width - 1);
    right.saturating_sub(left)
}

/// Composite radius (in resized-disk pixels) that covers a sun of `sun_diameter` pixels measured
/// on a `source_width`-wide disk raster.
pub fn radius_for_disk_size(sun_diameter: u32, source_width: u32, disk_size: u32) -> f32 {
    if source_width == 0 {
        return 0.0;
    }
    sun_diameter as f32 / 2.0 * disk_size as f32 / source_width as f32
}

#[cfg(test)]
#[path = "../../tests/unit/composite/measure.rs"]
mod tests;
