/// Dual-layer fetch: the remote image source and the time-offset fallback around it.
pub(crate) mod fallback;
pub(crate) mod source;
