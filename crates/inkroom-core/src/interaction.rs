//! Interaction state machine: turns pointer and keyboard input into model
//! edits and store writes.

use crate::config::CanvasConfig;
use crate::error::ValidationError;
use crate::hit_test;
use crate::model::{RecordId, RgbHex, Stroke, TextAnnotation};
use crate::sync::SyncController;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
    Text,
}

/// State of an interaction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InteractionState {
    /// Waiting for input.
    #[default]
    Idle,
    /// Pen is down; `last_point` is the last recorded point.
    Drawing { last_point: Point },
    /// Eraser is down.
    Erasing { last_point: Point },
    /// A text entry is open at `position`.
    TextPending { position: Point },
}

/// Current tool, style and gesture for one local user.
#[derive(Debug, Clone)]
pub struct InteractionMachine {
    tool: Tool,
    color: RgbHex,
    width: f64,
    state: InteractionState,
    config: CanvasConfig,
}

impl Default for InteractionMachine {
    fn default() -> Self {
        Self::new(CanvasConfig::default())
    }
}

impl InteractionMachine {
    pub fn new(config: CanvasConfig) -> Self {
        Self {
            tool: Tool::default(),
            color: config.default_color,
            width: config.default_width,
            state: InteractionState::Idle,
            config,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switch tools. A stroke in progress is ended as on pointer up, then
    /// any other gesture or pending text is dropped.
    pub fn set_tool(&mut self, sync: &mut SyncController, tool: Tool) {
        self.pointer_up(sync);
        self.tool = tool;
        self.state = InteractionState::Idle;
    }

    pub fn color(&self) -> RgbHex {
        self.color
    }

    pub fn set_color(&mut self, color: RgbHex) {
        self.color = color;
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Set the width, clamped into the configured range.
    pub fn set_width(&mut self, width: f64) -> Result<(), ValidationError> {
        self.width = self.config.clamp_width(width)?;
        Ok(())
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    /// Position of the open text entry, if any.
    pub fn pending_text_position(&self) -> Option<Point> {
        match self.state {
            InteractionState::TextPending { position } => Some(position),
            _ => None,
        }
    }

    pub fn pointer_down(&mut self, sync: &mut SyncController, point: Point) {
        match self.tool {
            Tool::Pen => {
                let stroke = Stroke::begin(self.color, self.width, point, sync.user().uid.clone());
                let id = sync.begin_stroke(stroke);
                log::debug!("Started stroke {}", id);
                self.state = InteractionState::Drawing { last_point: point };
            }
            Tool::Eraser => {
                self.state = InteractionState::Erasing { last_point: point };
                self.erase_at(sync, point);
            }
            Tool::Text => {
                self.state = InteractionState::TextPending { position: point };
            }
        }
    }

    /// Moves closer than the minimum distance to the last recorded point are
    /// dropped.
    pub fn pointer_move(&mut self, sync: &mut SyncController, point: Point) {
        let min_distance = self.config.min_move_distance;
        match &mut self.state {
            InteractionState::Drawing { last_point } => {
                if last_point.distance(point) < min_distance {
                    return;
                }
                *last_point = point;
                sync.extend_current_stroke(point);
            }
            InteractionState::Erasing { last_point } => {
                if last_point.distance(point) < min_distance {
                    return;
                }
                *last_point = point;
                self.erase_at(sync, point);
            }
            InteractionState::Idle | InteractionState::TextPending { .. } => {}
        }
    }

    /// Ends a pen or eraser gesture. A pending text entry stays open.
    pub fn pointer_up(&mut self, sync: &mut SyncController) {
        match self.state {
            InteractionState::Drawing { .. } => {
                sync.end_stroke();
                self.state = InteractionState::Idle;
            }
            InteractionState::Erasing { .. } => self.state = InteractionState::Idle,
            InteractionState::Idle | InteractionState::TextPending { .. } => {}
        }
    }

    fn erase_at(&self, sync: &mut SyncController, point: Point) {
        let targets = hit_test::erase_targets(sync.model(), point, self.width, &self.config);
        if !targets.is_empty() {
            let removed = sync.erase(&targets);
            log::debug!("Eraser at ({:.1}, {:.1}) removed {} records", point.x, point.y, removed);
        }
    }

    /// Commit the open text entry. Blank text closes the entry without
    /// writing and reports [`ValidationError::EmptyText`]. Returns `Ok(None)`
    /// if no entry was open.
    pub fn commit_text(&mut self, sync: &mut SyncController, text: &str) -> Result<Option<RecordId>, ValidationError> {
        let InteractionState::TextPending { position } = self.state else {
            return Ok(None);
        };
        self.state = InteractionState::Idle;

        if text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let annotation = TextAnnotation::new(
            text,
            position,
            self.color,
            self.config.text_size(self.width),
            sync.user().uid.clone(),
        );
        Ok(Some(sync.add_text(annotation)))
    }

    /// Close the open text entry without writing.
    pub fn cancel_text(&mut self) {
        if let InteractionState::TextPending { .. } = self.state {
            self.state = InteractionState::Idle;
        }
    }
}
