use image::imageops::{self, FilterType};
use image::{ImageEncoder as _, RgbImage};

use crate::composite::blend::{place, screen_masked_in_place};
use crate::composite::feather::FeatherMask;
use crate::composite::grade::grade_in_place;
use crate::config::{CompositeConfig, CropRect};
use crate::foundation::error::CompositeError;

/// Merges a disk raster and a corona raster into one output frame.
///
/// Pure: no IO and no shared mutable state. Identical inputs and configuration give
/// byte-identical output, which is what makes single-frame regeneration drift-free.
#[derive(Clone, Debug)]
pub struct Compositor {
    cfg: CompositeConfig,
    mask: FeatherMask,
}

impl Compositor {
    /// Build a compositor; the feather mask is computed once here.
    pub fn new(cfg: &CompositeConfig) -> Self {
        let mask = FeatherMask::circular(cfg.disk_size, cfg.composite_radius, cfg.feather_radius);
        Self {
            cfg: cfg.clone(),
            mask,
        }
    }

    /// Precomputed disk alpha mask.
    pub fn mask(&self) -> &FeatherMask {
        &self.mask
    }

    /// Output frame size `(width, height)`.
    pub fn output_size(&self) -> (u32, u32) {
        (self.cfg.crop.width, self.cfg.crop.height)
    }

    /// Decode, grade, feather, blend and crop.
    pub fn composite(&self, disk: &[u8], corona: &[u8]) -> Result<RgbImage, CompositeError> {
        let mut disk = decode(disk, "disk")?;
        let mut corona = decode(corona, "corona")?;

        grade_in_place(&mut corona, &self.cfg.corona_grade);
        grade_in_place(&mut disk, &self.cfg.disk_grade);

        let size = self.cfg.disk_size;
        let disk = if disk.dimensions() == (size, size) {
            disk
        } else {
            imageops::resize(&disk, size, size, FilterType::Lanczos3)
        };

        let cw = corona.width().max(size);
        let ch = corona.height().max(size);
        let mut canvas = RgbImage::new(cw, ch);
        place(
            &mut canvas,
            &corona,
            (cw - corona.width()) / 2,
            (ch - corona.height()) / 2,
        )?;
        screen_masked_in_place(
            &mut canvas,
            &disk,
            self.mask.alpha(),
            (cw - size) / 2,
            (ch - size) / 2,
        )?;

        crop(&canvas, self.cfg.crop)
    }

    /// [`Compositor::composite`] followed by JPEG encoding at `quality`.
    pub fn composite_jpeg(
        &self,
        disk: &[u8],
        corona: &[u8],
        quality: u8,
    ) -> Result<Vec<u8>, CompositeError> {
        let frame = self.composite(disk, corona)?;
        encode_jpeg(&frame, quality)
    }
}

fn decode(bytes: &[u8], layer: &'static str) -> Result<RgbImage, CompositeError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| CompositeError::Decode {
            layer,
            msg: e.to_string(),
        })
}

fn crop(canvas: &RgbImage, rect: CropRect) -> Result<RgbImage, CompositeError> {
    if rect.width == 0
        || rect.height == 0
        || u64::from(rect.x) + u64::from(rect.width) > u64::from(canvas.width())
        || u64::from(rect.y) + u64::from(rect.height) > u64::from(canvas.height())
    {
        return Err(CompositeError::Geometry(format!(
            "crop {}x{}+{}+{} outside {}x{} canvas",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            canvas.width(),
            canvas.height()
        )));
    }
    Ok(imageops::crop_imm(canvas, rect.x, rect.y, rect.width, rect.height).to_image())
}

/// Encode an RGB frame as baseline JPEG.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, CompositeError> {
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .write_image(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| CompositeError::Encode(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/composite/compositor.rs"]
mod tests;
