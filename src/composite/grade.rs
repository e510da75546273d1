use image::RgbImage;

use crate::config::GradeSpec;
use crate::foundation::math::unit_to_u8;

const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Contrast-then-gamma curve as a lookup table over channel values.
pub fn tone_curve(spec: &GradeSpec) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, out) in lut.iter_mut().enumerate() {
        let v = i as f32 / 255.0;
        let v = ((v - 0.5) * spec.contrast + 0.5).clamp(0.0, 1.0);
        *out = unit_to_u8(v.powf(spec.gamma));
    }
    lut
}

/// Grade one pixel: desaturate towards Rec.709 luma, tint, then tone curve.
pub fn grade_pixel(px: [u8; 3], spec: &GradeSpec, curve: &[u8; 256]) -> [u8; 3] {
    let c = px.map(|v| f32::from(v) / 255.0);
    let luma = c[0] * LUMA[0] + c[1] * LUMA[1] + c[2] * LUMA[2];
    let mut out = [0u8; 3];
    for i in 0..3 {
        let v = (luma + (c[i] - luma) * spec.saturation) * spec.tint[i];
        out[i] = curve[usize::from(unit_to_u8(v))];
    }
    out
}

/// Apply `spec` to every pixel of `img`.
pub fn grade_in_place(img: &mut RgbImage, spec: &GradeSpec) {
    if *spec == GradeSpec::IDENTITY {
        return;
    }
    let curve = tone_curve(spec);
    for px in img.pixels_mut() {
        px.0 = grade_pixel(px.0, spec, &curve);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/composite/grade.rs"]
mod tests;
