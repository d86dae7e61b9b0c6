//! Diagnostics raised while managing layers and surfaces.
//!
//! None of these abort a refresh: the renderer logs them through the `log`
//! facade and carries on with whatever layers it has.

use thiserror::Error;

use crate::layer::LayerKey;

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("invalid surface size {width}x{height} @ {pixel_ratio}x")]
    InvalidSize {
        width: u32,
        height: u32,
        pixel_ratio: f32,
    },
    #[error("surface backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum LayerError {
    #[error("layer {0} already exists")]
    DuplicateKey(LayerKey),
    #[error("surface for layer {key} is not usable ({width}x{height} @ {pixel_ratio}x)")]
    InvalidSurface {
        key: LayerKey,
        width: u32,
        height: u32,
        pixel_ratio: f32,
    },
    #[error("failed to create surface for layer {key}: {source}")]
    Creation {
        key: LayerKey,
        #[source]
        source: SurfaceError,
    },
}
