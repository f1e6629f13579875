use std::fmt;

use crate::error::{PatchError, Result};

/// The viewport the game is hardcoded for. Every pattern and every document
/// rule in the catalogue is expressed relative to this geometry.
pub const DEFAULT_VIEWPORT: Viewport = Viewport {
    width: 1920,
    height: 1080,
};

/// A logical screen resolution with derived center coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn center_x(&self) -> u32 {
        self.width / 2
    }

    pub fn center_y(&self) -> u32 {
        self.height / 2
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaling {
    /// Hold the default height, widen the viewport to the requested aspect.
    FillWidth,
    /// Hold the default width, deepen the viewport to the requested aspect.
    FillHeight,
    /// Use the requested resolution verbatim.
    Pixel,
}

impl Scaling {
    /// Pick the mode that keeps the picture closest to the default geometry:
    /// aspect ratios at least as wide as the default expand sideways,
    /// taller ones expand downwards.
    pub fn autodetect(width: u32, height: u32) -> Scaling {
        if (width as u64) * (DEFAULT_VIEWPORT.height as u64)
            >= (height as u64) * (DEFAULT_VIEWPORT.width as u64)
        {
            Scaling::FillWidth
        } else {
            Scaling::FillHeight
        }
    }
}

impl fmt::Display for Scaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scaling::FillWidth => "fill-width",
            Scaling::FillHeight => "fill-height",
            Scaling::Pixel => "pixel",
        };
        f.write_str(name)
    }
}

/// Compute the viewport to patch in from the requested display resolution
/// and scaling mode. Intermediate math is floating point; final pixel
/// dimensions truncate toward zero.
pub fn compute_viewport(width: u32, height: u32, scaling: Scaling) -> Result<Viewport> {
    if width == 0 || height == 0 {
        return Err(PatchError::InvalidGeometry(format!(
            "{width}x{height}: both dimensions must be non-zero"
        )));
    }
    let viewport = match scaling {
        Scaling::FillWidth => Viewport::new(
            (width as f64 / height as f64 * DEFAULT_VIEWPORT.height as f64) as u32,
            DEFAULT_VIEWPORT.height,
        ),
        Scaling::FillHeight => Viewport::new(
            DEFAULT_VIEWPORT.width,
            (height as f64 / width as f64 * DEFAULT_VIEWPORT.width as f64) as u32,
        ),
        Scaling::Pixel => Viewport::new(width, height),
    };
    Ok(viewport)
}

/// Per-axis scale factors between the target viewport and the default one,
/// plus the dominant factor used for uniform rescaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    pub x: f64,
    pub y: f64,
    pub dominant: f64,
}

pub fn scale_factors(viewport: Viewport, default: Viewport) -> ScaleFactor {
    let x = viewport.width as f64 / default.width as f64;
    let y = viewport.height as f64 / default.height as f64;
    ScaleFactor {
        x,
        y,
        dominant: x.max(y),
    }
}

/// Preserve the offset of `value` from a reference point that moved:
/// a coordinate 60 short of the old center stays 60 short of the new one.
pub fn recompute_fixed(value: f64, default_ref: f64, new_ref: f64) -> f64 {
    new_ref - (default_ref - value)
}

/// Uniform multiplicative scale, for animation scale parameters rather
/// than positions.
pub fn rescale(value: f64, factor: f64) -> f64 {
    value * factor
}

/// Everything the patchers need to know about one run, computed once and
/// threaded through every call. Immutable by construction.
#[derive(Debug, Clone, Copy)]
pub struct PatchContext {
    pub default: Viewport,
    pub viewport: Viewport,
    pub scale: ScaleFactor,
    pub force: bool,
}

impl PatchContext {
    pub fn new(viewport: Viewport, force: bool) -> Self {
        Self::with_default(DEFAULT_VIEWPORT, viewport, force)
    }

    pub fn with_default(default: Viewport, viewport: Viewport, force: bool) -> Self {
        Self {
            default,
            viewport,
            scale: scale_factors(viewport, default),
            force,
        }
    }
}
