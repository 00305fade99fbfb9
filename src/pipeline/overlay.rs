//! Overlay comparison: two pages letterboxed into one viewport, with a
//! shared pan/zoom transform and an adjustable opacity on the upper layer.
//!
//! The compositor is toolkit-independent. Pointer and wheel input arrive as
//! [`OverlayEvent`] values and drive explicit transitions on a single
//! [`ViewportTransform`]; a frontend (terminal, egui, web canvas) only has to
//! forward its events and draw the [`OverlayFrame`] it gets back.
//!
//! ## Transform order
//!
//! A layer point `p` maps to the container as
//!
//! ```text
//! container_centre + offset + scale · (p − layer_centre)
//! ```
//!
//! Centering is the outermost step, so zooming scales around the visual
//! centre of the container instead of the layer's top-left corner.

use crate::error::LabelScanError;
use crate::pipeline::render::RasterPage;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Smallest allowed zoom factor.
pub const MIN_SCALE: f32 = 0.1;
/// Largest allowed zoom factor.
pub const MAX_SCALE: f32 = 5.0;
/// Wheel ticks per unit of scale.
const STEPS_PER_UNIT: f32 = 10.0;
/// Zoom change per wheel tick.
pub const ZOOM_STEP: f32 = 1.0 / STEPS_PER_UNIT;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Shared pan/zoom state applied identically to both layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ViewportTransform {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };

    /// Map a point in layer space to container space.
    pub fn apply(&self, point: (f32, f32), layer: FitRect, container: (f32, f32)) -> (f32, f32) {
        let (cx, cy) = (container.0 / 2.0, container.1 / 2.0);
        let (lx, ly) = (layer.width / 2.0, layer.height / 2.0);
        (
            cx + self.offset_x + self.scale * (point.0 - lx),
            cy + self.offset_y + self.scale * (point.1 - ly),
        )
    }

    /// CSS transform string for a layer absolutely positioned at 50%/50%.
    pub fn to_css(&self) -> String {
        format!(
            "translate(-50%, -50%) translate({}px, {}px) scale({})",
            self.offset_x, self.offset_y, self.scale
        )
    }

    /// Step the scale by one tick. The level is counted in whole ticks so
    /// repeated steps land on exact tenths.
    fn zoom(&mut self, direction: ZoomDirection) {
        let ticks = (self.scale * STEPS_PER_UNIT).round() as i32;
        let next = match direction {
            ZoomDirection::In => ticks + 1,
            ZoomDirection::Out => ticks - 1,
        };
        let min = (MIN_SCALE * STEPS_PER_UNIT).round() as i32;
        let max = (MAX_SCALE * STEPS_PER_UNIT).round() as i32;
        self.scale = next.clamp(min, max) as f32 / STEPS_PER_UNIT;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

impl ZoomDirection {
    /// Scrolling down (positive delta) zooms out. A zero delta is ignored.
    pub fn from_wheel_delta(delta_y: f32) -> Option<Self> {
        if delta_y > 0.0 {
            Some(ZoomDirection::Out)
        } else if delta_y < 0.0 {
            Some(ZoomDirection::In)
        } else {
            None
        }
    }
}

/// Size of a page after fitting it into the container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitRect {
    pub width: f32,
    pub height: f32,
}

/// Letterbox/pillarbox a `page_w × page_h` page into a container.
///
/// A container wider than the page's aspect ratio fits to height; otherwise
/// it fits to width.
pub fn fit_to_container(page_w: u32, page_h: u32, container_w: f32, container_h: f32) -> FitRect {
    let aspect = page_w as f32 / page_h.max(1) as f32;
    if container_w / container_h > aspect {
        FitRect {
            width: container_h * aspect,
            height: container_h,
        }
    } else {
        FitRect {
            width: container_w,
            height: container_w / aspect,
        }
    }
}

/// Input events understood by the compositor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayEvent {
    Wheel { delta_y: f32 },
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    PointerLeave,
    SetFocused(bool),
    SetOpacity(f32),
    Resize { width: f32, height: f32 },
}

/// Two layers ready to draw.
#[derive(Debug, Clone)]
pub struct OverlayFrame {
    /// First page, resized to `fit`.
    pub base: RgbaImage,
    /// Second page, resized to the same `fit`.
    pub overlay: RgbaImage,
    pub overlay_opacity: f32,
    pub transform: ViewportTransform,
    pub fit: FitRect,
    /// Container size in whole pixels.
    pub canvas: (u32, u32),
}

impl OverlayFrame {
    /// Draw the pair into a `canvas`-sized image as the viewport shows it.
    ///
    /// Each canvas pixel is mapped back through the inverse of
    /// [`ViewportTransform::apply`] and sampled nearest-neighbour from both
    /// layers, which are then blended with [`overlay_pixel`]. Canvas pixels
    /// that fall outside the layer stay transparent.
    pub fn flatten(&self) -> RgbaImage {
        let (cw, ch) = self.canvas;
        let (cx, cy) = (cw as f32 / 2.0, ch as f32 / 2.0);
        let (lw, lh) = self.base.dimensions();
        let (lx, ly) = (lw as f32 / 2.0, lh as f32 / 2.0);
        let t = self.transform;
        let scale = t.scale.max(MIN_SCALE);

        RgbaImage::from_fn(cw, ch, |x, y| {
            let px = (x as f32 + 0.5 - cx - t.offset_x) / scale + lx;
            let py = (y as f32 + 0.5 - cy - t.offset_y) / scale + ly;
            if px < 0.0 || py < 0.0 || px >= lw as f32 || py >= lh as f32 {
                return TRANSPARENT;
            }
            let (sx, sy) = (px as u32, py as u32);
            overlay_pixel(
                *self.base.get_pixel(sx, sy),
                *self.overlay.get_pixel(sx, sy),
                self.overlay_opacity,
            )
        })
    }
}

/// Render two pages into a shared, letterboxed viewport.
///
/// Both layers are fitted using the first page's aspect ratio so they stay
/// pixel-aligned even if the second page has a different shape.
pub fn composite(
    a: &RasterPage,
    b: &RasterPage,
    opacity: f32,
    transform: ViewportTransform,
    container: (f32, f32),
) -> Result<OverlayFrame, LabelScanError> {
    if container.0 <= 0.0 || container.1 <= 0.0 {
        return Err(LabelScanError::InvalidConfig(format!(
            "container must have a positive size, got {}x{}",
            container.0, container.1
        )));
    }
    if a.width() == 0 || a.height() == 0 {
        return Err(LabelScanError::MissingInput {
            what: format!("page '{}' has no pixels", a.source().name),
        });
    }

    let fit = fit_to_container(a.width(), a.height(), container.0, container.1);
    let (w, h) = (fit.width.round().max(1.0) as u32, fit.height.round().max(1.0) as u32);

    let base = imageops::resize(a.image(), w, h, FilterType::Triangle);
    let overlay = imageops::resize(b.image(), w, h, FilterType::Triangle);
    debug!("Composited overlay at {}x{} in {:?}", w, h, container);

    Ok(OverlayFrame {
        base,
        overlay,
        overlay_opacity: opacity.clamp(0.0, 1.0),
        transform,
        fit,
        canvas: (
            container.0.round().max(1.0) as u32,
            container.1.round().max(1.0) as u32,
        ),
    })
}

/// Interactive overlay state.
#[derive(Debug, Clone)]
pub struct OverlayCompositor {
    transform: ViewportTransform,
    focused: bool,
    pan_anchor: Option<(f32, f32)>,
    opacity: f32,
    container: (f32, f32),
}

impl Default for OverlayCompositor {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

impl OverlayCompositor {
    pub fn new(container_width: f32, container_height: f32) -> Self {
        Self {
            transform: ViewportTransform::IDENTITY,
            focused: false,
            pan_anchor: None,
            opacity: 0.5,
            container: (container_width, container_height),
        }
    }

    pub fn transform(&self) -> ViewportTransform {
        self.transform
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_panning(&self) -> bool {
        self.pan_anchor.is_some()
    }

    pub fn container(&self) -> (f32, f32) {
        self.container
    }

    /// Back to identity and no pan in progress.
    pub fn reset(&mut self) {
        self.transform = ViewportTransform::IDENTITY;
        self.pan_anchor = None;
    }

    /// Reset the transform and render a new pair.
    pub fn render(&mut self, a: &RasterPage, b: &RasterPage) -> Result<OverlayFrame, LabelScanError> {
        self.reset();
        composite(a, b, self.opacity, self.transform, self.container)
    }

    /// Apply one input event. Returns true when the view needs redrawing.
    pub fn handle(&mut self, event: OverlayEvent) -> bool {
        match event {
            OverlayEvent::Wheel { delta_y } => match ZoomDirection::from_wheel_delta(delta_y) {
                Some(dir) => {
                    let before = self.transform.scale;
                    self.transform.zoom(dir);
                    before != self.transform.scale
                }
                None => false,
            },
            OverlayEvent::PointerDown { x, y } => {
                if self.focused {
                    self.pan_anchor =
                        Some((x - self.transform.offset_x, y - self.transform.offset_y));
                }
                false
            }
            OverlayEvent::PointerMove { x, y } => match (self.focused, self.pan_anchor) {
                (true, Some((ax, ay))) => {
                    self.transform.offset_x = x - ax;
                    self.transform.offset_y = y - ay;
                    true
                }
                _ => false,
            },
            OverlayEvent::PointerUp | OverlayEvent::PointerLeave => {
                if self.focused {
                    self.pan_anchor = None;
                }
                false
            }
            OverlayEvent::SetFocused(focused) => {
                self.focused = focused;
                if !focused {
                    self.pan_anchor = None;
                }
                false
            }
            OverlayEvent::SetOpacity(value) => {
                let value = if value.is_finite() {
                    value.clamp(0.0, 1.0)
                } else {
                    self.opacity
                };
                let changed = value != self.opacity;
                self.opacity = value;
                changed
            }
            OverlayEvent::Resize { width, height } => {
                self.container = (width, height);
                self.reset();
                true
            }
        }
    }
}

/// Alpha-blend `top` over `base` at `opacity`, scaled by `top`'s own alpha.
pub fn overlay_pixel(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let a = opacity.clamp(0.0, 1.0) * top[3] as f32 / 255.0;
    let mix = |d: u8, s: u8| (d as f32 * (1.0 - a) + s as f32 * a).round().clamp(0.0, 255.0) as u8;
    Rgba([
        mix(base[0], top[0]),
        mix(base[1], top[1]),
        mix(base[2], top[2]),
        base[3].max((a * 255.0).round() as u8),
    ])
}
