//! Layers: backing surfaces keyed by priority band.
//!
//! Every layer owns one surface and a contiguous half-open range of the
//! current display list. Layers are created on first use and live until they
//! are removed explicitly; a layer that loses all of its nodes is cleared once
//! and kept around for reuse.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use crate::color::Color;
use crate::error::LayerError;
use crate::surface::Surface;

/// Position of a layer relative to the other layers of the same band.
///
/// Progressive nodes get their own layer just above the band's base layer,
/// and normal nodes that follow them go one step higher so z-order survives
/// the split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerTier {
    Base,
    Incremental,
    AfterIncremental,
}

impl LayerTier {
    /// Fractional offset added to the band when the key is shown as a number.
    pub fn offset(self) -> f64 {
        match self {
            LayerTier::Base => 0.0,
            LayerTier::Incremental => 0.001,
            LayerTier::AfterIncremental => 0.01,
        }
    }
}

/// Sort key of a layer. Orders by band, then tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerKey {
    pub band: i32,
    pub tier: LayerTier,
}

impl LayerKey {
    pub const fn new(band: i32, tier: LayerTier) -> Self {
        Self { band, tier }
    }

    pub const fn base(band: i32) -> Self {
        Self::new(band, LayerTier::Base)
    }

    pub const fn incremental(band: i32) -> Self {
        Self::new(band, LayerTier::Incremental)
    }

    pub const fn after_incremental(band: i32) -> Self {
        Self::new(band, LayerTier::AfterIncremental)
    }

    pub fn is_incremental(&self) -> bool {
        self.tier == LayerTier::Incremental
    }

    /// The band perturbed by the tier offset.
    pub fn value(&self) -> f64 {
        self.band as f64 + self.tier.offset()
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Per-band presentation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerConfig {
    /// Color the layer is cleared to (transparent when `None`)
    pub clear_color: Option<Color>,
    /// Fade the previous frame instead of clearing it
    pub motion_blur: bool,
    /// Alpha kept from the previous frame when `motion_blur` is set
    pub last_frame_alpha: f32,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            clear_color: None,
            motion_blur: false,
            last_frame_alpha: 0.7,
        }
    }
}

/// One backing surface and the slice of the display list it owns.
pub struct Layer<S> {
    key: LayerKey,
    surface: S,
    config: LayerConfig,
    pub(crate) start_index: usize,
    pub(crate) end_index: usize,
    /// Next node to paint; `None` while unresolved (progressive layers only)
    pub(crate) draw_index: Option<usize>,
    pub(crate) stale: bool,
    /// The range moved since the last pass: clear and repaint all of it
    pub(crate) restart: bool,
    pub(crate) used_this_refresh: bool,
}

impl<S: Surface> Layer<S> {
    fn new(key: LayerKey, surface: S, config: LayerConfig) -> Self {
        Self {
            key,
            surface,
            config,
            start_index: 0,
            end_index: 0,
            draw_index: Some(0),
            stale: false,
            restart: false,
            used_this_refresh: false,
        }
    }

    pub fn key(&self) -> LayerKey {
        self.key
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn is_incremental(&self) -> bool {
        self.key.is_incremental()
    }

    /// Indices of the display list owned by this layer.
    pub fn range(&self) -> Range<usize> {
        self.start_index..self.end_index
    }

    pub fn element_count(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn draw_index(&self) -> Option<usize> {
        self.draw_index
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Every node of the range has been painted.
    pub fn is_finished(&self) -> bool {
        self.draw_index == Some(self.end_index)
    }

    /// Prepare the surface for a fresh pass.
    pub(crate) fn clear(&mut self, background: Option<Color>) {
        if self.config.motion_blur {
            self.surface.fade(self.config.last_frame_alpha);
        } else {
            self.surface.clear(self.config.clear_color.or(background));
        }
        crate::render_stats::record_layer_cleared();
    }
}

/// Layers in ascending key order.
pub struct LayerTable<S> {
    layers: Vec<Layer<S>>,
    band_configs: HashMap<i32, LayerConfig>,
}

impl<S: Surface> LayerTable<S> {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            band_configs: HashMap::new(),
        }
    }

    fn position(&self, key: LayerKey) -> Result<usize, usize> {
        self.layers.binary_search_by(|layer| layer.key.cmp(&key))
    }

    /// Insert a layer, keeping key order.
    ///
    /// Rejects duplicate keys and surfaces that cannot hold any pixel.
    pub fn insert(&mut self, key: LayerKey, surface: S) -> Result<&mut Layer<S>, LayerError> {
        let size = surface.size();
        if !size.is_valid() {
            return Err(LayerError::InvalidSurface {
                key,
                width: size.width,
                height: size.height,
                pixel_ratio: size.pixel_ratio,
            });
        }
        let index = match self.position(key) {
            Ok(_) => return Err(LayerError::DuplicateKey(key)),
            Err(index) => index,
        };
        let config = self.band_configs.get(&key.band).copied().unwrap_or_default();
        self.layers.insert(index, Layer::new(key, surface, config));
        Ok(&mut self.layers[index])
    }

    pub fn remove(&mut self, key: LayerKey) -> Option<Layer<S>> {
        let index = self.position(key).ok()?;
        Some(self.layers.remove(index))
    }

    pub fn get(&self, key: LayerKey) -> Option<&Layer<S>> {
        let index = self.position(key).ok()?;
        Some(&self.layers[index])
    }

    pub fn get_mut(&mut self, key: LayerKey) -> Option<&mut Layer<S>> {
        let index = self.position(key).ok()?;
        Some(&mut self.layers[index])
    }

    pub fn contains(&self, key: LayerKey) -> bool {
        self.position(key).is_ok()
    }

    /// Apply `config` to every existing layer of `band` and to layers created
    /// for it later.
    pub fn configure_band(&mut self, band: i32, config: LayerConfig) {
        self.band_configs.insert(band, config);
        for layer in self.layers.iter_mut().filter(|l| l.key.band == band) {
            layer.config = config;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer<S>> {
        self.layers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Layer<S>> {
        self.layers.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = LayerKey> + '_ {
        self.layers.iter().map(|layer| layer.key)
    }

    /// Key of the bottom-most layer.
    pub fn lowest_key(&self) -> Option<LayerKey> {
        self.layers.first().map(|layer| layer.key)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl<S: Surface> Default for LayerTable<S> {
    fn default() -> Self {
        Self::new()
    }
}
