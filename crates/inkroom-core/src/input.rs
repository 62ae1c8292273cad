//! Pointer events and client-to-canvas coordinate mapping.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Pointer event type for unified mouse/touch handling. Touch input reports
/// its first contact point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointerEvent {
    Down { position: Point },
    Move { position: Point },
    Up { position: Point },
    /// Pointer left the canvas; ends any gesture like `Up`.
    Leave { position: Point },
}

impl PointerEvent {
    pub fn position(&self) -> Point {
        match *self {
            PointerEvent::Down { position }
            | PointerEvent::Move { position }
            | PointerEvent::Up { position }
            | PointerEvent::Leave { position } => position,
        }
    }

    pub fn with_position(self, position: Point) -> Self {
        match self {
            PointerEvent::Down { .. } => PointerEvent::Down { position },
            PointerEvent::Move { .. } => PointerEvent::Move { position },
            PointerEvent::Up { .. } => PointerEvent::Up { position },
            PointerEvent::Leave { .. } => PointerEvent::Leave { position },
        }
    }
}

/// Maps client coordinates to canvas pixels when the canvas is displayed at a
/// different size than its backing store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportMapping {
    /// Client-space offset of the displayed canvas.
    pub left: f64,
    pub top: f64,
    /// Displayed size.
    pub display_width: f64,
    pub display_height: f64,
    /// Backing store size in pixels.
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl ViewportMapping {
    /// Canvas shown at its natural size at the origin.
    pub fn identity(width: f64, height: f64) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            display_width: width,
            display_height: height,
            canvas_width: width,
            canvas_height: height,
        }
    }

    /// `(client - offset) * canvas_size / display_size`, per axis. A zero-sized
    /// display maps with scale 1.
    pub fn to_canvas(&self, client: Point) -> Point {
        let scale = |canvas: f64, display: f64| if display > 0.0 { canvas / display } else { 1.0 };
        Point::new(
            (client.x - self.left) * scale(self.canvas_width, self.display_width),
            (client.y - self.top) * scale(self.canvas_height, self.display_height),
        )
    }

    pub fn map_event(&self, event: PointerEvent) -> PointerEvent {
        event.with_position(self.to_canvas(event.position()))
    }
}
