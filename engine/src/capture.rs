//! Analog color capture.
//!
//! A continuous input surface is sampled through [`ColorSurface`]; the only
//! thing the capture logic knows about the renderer is `sample(point)`.
//!
//! # Interaction modes
//! ```text
//!            click (inside surface)
//!   ┌──────┐ ───────────────────────> ┌────────┐
//!   │ Live │                          │ Frozen │
//!   └──────┘ <─────────────────────── └────────┘
//!            click: unfreeze and re-emit the color at the click position
//! ```
//! In `Live`, pointer-down and drag report a new color on every movement.
//! In `Frozen`, movement is ignored. Only discrete clicks change the mode.
//! Points outside the surface are ignored without any state change.

use std::fmt;

use syntest_types::{Hsl, Rgb};

use crate::EngineError;

/// A position on the input surface in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub x: f64,
    pub y: f64,
}

impl SurfacePoint {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Anything that can turn a position into a color.
pub trait ColorSurface: Send + fmt::Debug {
    /// `None` when the point lies outside the surface.
    fn sample(&self, point: SurfacePoint) -> Option<Rgb>;
}

/// Unit square mapped to hue (x, 0..360 degrees) and lightness (y, top = white)
/// at a fixed saturation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HueLightnessPlane {
    saturation: f64,
}

impl HueLightnessPlane {
    pub fn new(saturation: f64) -> Result<Self, EngineError> {
        if !saturation.is_finite() || !(0.0..=1.0).contains(&saturation) {
            return Err(EngineError::invalid(format!(
                "capture saturation must be within [0, 1], got {saturation}"
            )));
        }
        Ok(Self { saturation })
    }

    #[must_use]
    pub fn saturation(&self) -> f64 {
        self.saturation
    }
}

impl ColorSurface for HueLightnessPlane {
    fn sample(&self, point: SurfacePoint) -> Option<Rgb> {
        let inside = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !inside(point.x) || !inside(point.y) {
            return None;
        }
        Some(Hsl::new(point.x * 360.0, self.saturation, 1.0 - point.y).to_rgb())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    #[default]
    Live,
    Frozen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(SurfacePoint),
    Move(SurfacePoint),
    Up,
    Click(SurfacePoint),
}

/// A color reported by the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureUpdate {
    /// Provisional color while the pointer is live.
    Live(Rgb),
    /// Color locked by a freeze.
    Locked(Rgb),
}

impl CaptureUpdate {
    #[must_use]
    pub fn color(self) -> Rgb {
        match self {
            CaptureUpdate::Live(c) | CaptureUpdate::Locked(c) => c,
        }
    }
}

#[derive(Debug)]
pub struct AnalogCapture {
    surface: Box<dyn ColorSurface>,
    mode: CaptureMode,
    dragging: bool,
    last_point: Option<SurfacePoint>,
    color: Option<Rgb>,
}

impl AnalogCapture {
    #[must_use]
    pub fn new(surface: Box<dyn ColorSurface>) -> Self {
        Self {
            surface,
            mode: CaptureMode::Live,
            dragging: false,
            last_point: None,
            color: None,
        }
    }

    #[must_use]
    pub fn sample(&self, point: SurfacePoint) -> Option<Rgb> {
        self.surface.sample(point)
    }

    #[must_use]
    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    #[must_use]
    pub fn color(&self) -> Option<Rgb> {
        self.color
    }

    /// Lock the current color. No-op (returns `None`) when there is nothing to lock.
    pub fn freeze(&mut self) -> Option<CaptureUpdate> {
        if self.mode == CaptureMode::Frozen {
            return self.color.map(CaptureUpdate::Locked);
        }
        let color = self.color?;
        self.mode = CaptureMode::Frozen;
        self.dragging = false;
        Some(CaptureUpdate::Locked(color))
    }

    /// Unlock and re-emit the color under the last known pointer position.
    pub fn unfreeze(&mut self) -> Option<CaptureUpdate> {
        if self.mode == CaptureMode::Live {
            return None;
        }
        self.mode = CaptureMode::Live;
        let color = self.last_point.and_then(|p| self.surface.sample(p))?;
        self.color = Some(color);
        Some(CaptureUpdate::Live(color))
    }

    /// Forget everything about the previous trial.
    pub fn reset(&mut self) {
        self.mode = CaptureMode::Live;
        self.dragging = false;
        self.last_point = None;
        self.color = None;
    }

    pub fn handle(&mut self, event: PointerEvent) -> Option<CaptureUpdate> {
        match event {
            PointerEvent::Down(point) => {
                let color = self.surface.sample(point)?;
                self.last_point = Some(point);
                if self.mode == CaptureMode::Frozen {
                    return None;
                }
                self.dragging = true;
                self.color = Some(color);
                Some(CaptureUpdate::Live(color))
            }
            PointerEvent::Move(point) => {
                let color = self.surface.sample(point)?;
                self.last_point = Some(point);
                if self.mode == CaptureMode::Frozen || !self.dragging {
                    return None;
                }
                self.color = Some(color);
                Some(CaptureUpdate::Live(color))
            }
            PointerEvent::Up => {
                self.dragging = false;
                None
            }
            PointerEvent::Click(point) => {
                let color = self.surface.sample(point)?;
                self.last_point = Some(point);
                self.dragging = false;
                self.color = Some(color);
                match self.mode {
                    CaptureMode::Live => {
                        self.mode = CaptureMode::Frozen;
                        Some(CaptureUpdate::Locked(color))
                    }
                    CaptureMode::Frozen => {
                        self.mode = CaptureMode::Live;
                        Some(CaptureUpdate::Live(color))
                    }
                }
            }
        }
    }
}
