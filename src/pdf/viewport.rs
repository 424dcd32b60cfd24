//! Render requests and the zoom/pan/rotate state of a view

use serde::{Deserialize, Serialize};

use super::coords::ViewTransform;
use crate::settings::ZoomSettings;

/// Pixel density of a render.
///
/// `Normal` renders one device pixel per layout unit; `HighResolution`
/// renders `device_pixel_ratio` pixels per unit for sharp output on dense
/// displays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    Normal,
    #[default]
    HighResolution,
}

impl RenderMode {
    /// Device pixels per layout unit
    #[must_use]
    pub fn pixel_density(self, device_pixel_ratio: f64) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::HighResolution => device_pixel_ratio,
        }
    }
}

/// A single render request. `width` and `height` are device pixels and are
/// floored before the native bitmap is created.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scale: f64,
    pub render_mode: RenderMode,
}

impl Viewport {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scale: 1.0,
            render_mode: RenderMode::default(),
        }
    }

    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub fn with_render_mode(mut self, render_mode: RenderMode) -> Self {
        self.render_mode = render_mode;
        self
    }
}

/// Zoom, pan and rotation of a document view
#[derive(Clone, Debug)]
pub struct ZoomState {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    rotation: f64,
    limits: ZoomSettings,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self::new(ZoomSettings::default())
    }
}

impl ZoomState {
    #[must_use]
    pub fn new(limits: ZoomSettings) -> Self {
        Self {
            scale: limits.default_scale,
            offset_x: 0.0,
            offset_y: 0.0,
            rotation: 0.0,
            limits,
        }
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[must_use]
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    #[must_use]
    pub fn offset(&self) -> (f64, f64) {
        (self.offset_x, self.offset_y)
    }

    /// Sets the scale, clamped to the configured range
    pub fn zoom_to(&mut self, scale: f64) -> f64 {
        self.scale = self.clamp_scale(scale);
        self.scale
    }

    /// Exponential wheel zoom: `scale * factor^(-delta_y)`
    pub fn apply_wheel(&mut self, delta_y: f64) -> f64 {
        self.zoom_to(self.scale * self.limits.wheel_factor.powf(-delta_y))
    }

    pub fn step_in(&mut self) -> f64 {
        self.zoom_to(self.scale * self.limits.step_factor)
    }

    pub fn step_out(&mut self) -> f64 {
        self.zoom_to(self.scale / self.limits.step_factor)
    }

    pub fn reset(&mut self) -> f64 {
        self.zoom_to(self.limits.default_scale)
    }

    pub fn pan(&mut self, offset_x: f64, offset_y: f64) {
        self.offset_x = offset_x;
        self.offset_y = offset_y;
    }

    /// Rotates by `degrees`, keeping the result in [0, 360)
    pub fn rotate(&mut self, degrees: f64) -> f64 {
        self.rotation = (self.rotation + degrees).rem_euclid(360.0);
        self.rotation
    }

    #[must_use]
    pub fn transform(&self) -> ViewTransform {
        ViewTransform {
            scale: self.scale,
            rotation: self.rotation,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
        }
    }

    /// Clamp scale to the configured range, handling NaN/Inf
    #[must_use]
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        if !scale.is_finite() {
            1.0_f64.clamp(self.limits.min_scale, self.limits.max_scale)
        } else {
            scale.clamp(self.limits.min_scale, self.limits.max_scale)
        }
    }
}
