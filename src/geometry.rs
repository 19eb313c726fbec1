//! Window placement and the header drag state machine.
//!
//! Positions are in screen coordinates. The controller never talks to the
//! windowing system itself; callers feed it pointer and window events and
//! apply the positions and sizes it hands back.

use iced::{Point, Size, Vector};
use tracing::debug;

use crate::config::WindowConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowGeometry {
    pub position: Point,
    pub size: Size,
}

/// What the pointer went down on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Header,
    /// A button or other control inside the header. Never starts a drag.
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DragState {
    Idle,
    Dragging { offset: Vector },
}

/// Centered placement for a fresh window.
pub fn initial_geometry(viewport: Size, layout: &WindowConfig) -> WindowGeometry {
    let width = layout.default_width;
    let height = layout
        .min_initial_height
        .max(viewport.height * layout.height_ratio);

    WindowGeometry {
        position: Point::new(
            (viewport.width - width) / 2.0,
            (viewport.height - height) / 2.0,
        ),
        size: Size::new(width, height),
    }
}

#[derive(Debug, Clone)]
pub struct GeometryController {
    geometry: WindowGeometry,
    viewport: Size,
    layout: WindowConfig,
    drag: DragState,
}

impl GeometryController {
    pub fn new(viewport: Size, layout: WindowConfig) -> Self {
        GeometryController {
            geometry: initial_geometry(viewport, &layout),
            viewport,
            layout,
            drag: DragState::Idle,
        }
    }

    pub fn geometry(&self) -> WindowGeometry {
        self.geometry
    }

    pub fn position(&self) -> Point {
        self.geometry.position
    }

    pub fn size(&self) -> Size {
        self.geometry.size
    }

    pub fn min_size(&self) -> Size {
        Size::new(self.layout.min_width, self.layout.min_height)
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    pub fn begin_drag(&mut self, pointer: Point, window_origin: Point, target: HitTarget) {
        if target == HitTarget::Control {
            return;
        }
        let offset = Vector::new(pointer.x - window_origin.x, pointer.y - window_origin.y);
        debug!(?offset, "drag started");
        self.drag = DragState::Dragging { offset };
    }

    /// Returns the new window position while a drag is active.
    pub fn on_pointer_move(&mut self, pointer: Point) -> Option<Point> {
        let DragState::Dragging { offset } = self.drag else {
            return None;
        };
        let position = Point::new(pointer.x - offset.x, pointer.y - offset.y);
        self.geometry.position = position;
        Some(position)
    }

    pub fn end_drag(&mut self) {
        if self.is_dragging() {
            debug!(position = ?self.geometry.position, "drag ended");
        }
        self.drag = DragState::Idle;
    }

    /// Adopts a size reported by the window system. Returns `true` when the
    /// stored size changed.
    ///
    /// Comparison is done on rounded values, otherwise applying a size and
    /// observing it back can oscillate on fractional scale factors.
    pub fn on_external_resize(&mut self, width: f32, height: f32) -> bool {
        let width = width.max(self.layout.min_width);
        let height = height.max(self.layout.min_height);
        let current = self.geometry.size;

        if width.round() == current.width.round() && height.round() == current.height.round() {
            return false;
        }

        self.geometry.size = Size::new(width, height);
        true
    }

    /// Adopts a position reported by the window system. Ignored mid-drag,
    /// where the controller is the source of truth.
    pub fn on_external_move(&mut self, position: Point) -> bool {
        if self.is_dragging() || position == self.geometry.position {
            return false;
        }
        self.geometry.position = position;
        true
    }

    /// Recenters on the display size the controller was built with.
    pub fn reset(&mut self) -> WindowGeometry {
        self.drag = DragState::Idle;
        self.geometry = initial_geometry(self.viewport, &self.layout);
        self.geometry
    }
}
