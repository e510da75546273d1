use image::RgbImage;

use crate::foundation::error::CompositeError;
use crate::foundation::math::mul_div255_u8;

/// One RGB8 pixel.
pub type Rgb8 = [u8; 3];

/// Screen blend of one channel: `1 - (1 - a)(1 - b)`. Never darker than either input.
pub fn screen(a: u8, b: u8) -> u8 {
    255 - mul_div255_u8(u16::from(255 - a), u16::from(255 - b))
}

/// Screen `src` weighted by `alpha` onto `dst`.
pub fn screen_masked(dst: Rgb8, src: Rgb8, alpha: u8) -> Rgb8 {
    if alpha == 0 {
        return dst;
    }
    let mut out = [0u8; 3];
    for i in 0..3 {
        let s = mul_div255_u8(u16::from(src[i]), u16::from(alpha));
        out[i] = screen(dst[i], s);
    }
    out
}

/// Copy `src` onto `dst` with its top-left corner at `(x, y)`.
pub fn place(dst: &mut RgbImage, src: &RgbImage, x: u32, y: u32) -> Result<(), CompositeError> {
    check_fits(dst, src.width(), src.height(), x, y)?;
    for (sx, sy, px) in src.enumerate_pixels() {
        dst.put_pixel(x + sx, y + sy, *px);
    }
    Ok(())
}

/// Screen-blend `src`, weighted per pixel by the row-major `alpha`, onto `dst` at `(x, y)`.
pub fn screen_masked_in_place(
    dst: &mut RgbImage,
    src: &RgbImage,
    alpha: &[u8],
    x: u32,
    y: u32,
) -> Result<(), CompositeError> {
    let expected_len = (src.width() as usize)
        .checked_mul(src.height() as usize)
        .ok_or_else(|| CompositeError::Geometry("mask size overflow".to_string()))?;
    if alpha.len() != expected_len {
        return Err(CompositeError::Geometry(format!(
            "mask has {} values, expected {}x{}",
            alpha.len(),
            src.width(),
            src.height()
        )));
    }
    check_fits(dst, src.width(), src.height(), x, y)?;

    for ((sx, sy, px), &a) in src.enumerate_pixels().zip(alpha) {
        let d = dst.get_pixel_mut(x + sx, y + sy);
        d.0 = screen_masked(d.0, px.0, a);
    }
    Ok(())
}

fn check_fits(dst: &RgbImage, w: u32, h: u32, x: u32, y: u32) -> Result<(), CompositeError> {
    if u64::from(x) + u64::from(w) > u64::from(dst.width())
        || u64::from(y) + u64::from(h) > u64::from(dst.height())
    {
        return Err(CompositeError::Geometry(format!(
            "{w}x{h} at ({x},{y}) exceeds {}x{} canvas",
            dst.width(),
            dst.height()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/composite/blend.rs"]
mod tests;
