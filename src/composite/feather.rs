use crate::foundation::math::{smoothstep, unit_to_u8};

/// Square alpha mask with a circular, radially feathered edge.
///
/// Alpha is 255 up to `radius`, 0 beyond `radius + feather`, with a smoothstep falloff in
/// between. `feather == 0` is the hard-edged binary disk, not a degenerate blur: every pixel is
/// exactly 0 or 255.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatherMask {
    size: u32,
    alpha: Vec<u8>,
}

impl FeatherMask {
    /// Build a `size x size` mask centred on the square.
    pub fn circular(size: u32, radius: f32, feather: f32) -> Self {
        let radius = radius.max(0.0);
        let feather = feather.max(0.0);
        let center = size as f32 / 2.0;
        let mut alpha = Vec::with_capacity((size as usize) * (size as usize));
        for y in 0..size {
            for x in 0..size {
                let dx = x as f32 + 0.5 - center;
                let dy = y as f32 + 0.5 - center;
                alpha.push(edge_alpha(dx.hypot(dy), radius, feather));
            }
        }
        Self { size, alpha }
    }

    /// Side length in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Row-major alpha values.
    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    /// Alpha at pixel `(x, y)`.
    pub fn at(&self, x: u32, y: u32) -> u8 {
        self.alpha[(y as usize) * (self.size as usize) + (x as usize)]
    }
}

/// Alpha for a pixel centre at distance `d` from the disk centre.
pub fn edge_alpha(d: f32, radius: f32, feather: f32) -> u8 {
    if feather <= 0.0 {
        return if d <= radius { 255 } else { 0 };
    }
    unit_to_u8(1.0 - smoothstep(radius, radius + feather, d))
}

#[cfg(test)]
#[path = "../../tests/unit/composite/feather.rs"]
mod tests;
