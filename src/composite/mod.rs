/// Screen blending and placement on the canvas.
pub(crate) mod blend;
/// The disk-over-corona frame compositor.
pub(crate) mod compositor;
/// Radially feathered disk masks.
pub(crate) mod feather;
/// Per-layer color grading.
pub(crate) mod grade;
pub mod measure;
