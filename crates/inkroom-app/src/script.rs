//! Replay scripts: a JSON list of input steps fed to a session.

use inkroom_core::{CanvasSession, PointerEvent, Tool, ValidationError};
use serde::{Deserialize, Serialize};

/// One scripted input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    Tool { tool: Tool },
    /// `#rrggbb`
    Color { color: String },
    Width { width: f64 },
    Pointer { event: PointerEvent },
    /// Commit text at the open text entry.
    Text { text: String },
    /// Clear the canvas (host only).
    Clear,
}

pub fn parse_script(json: &str) -> Result<Vec<ScriptStep>, serde_json::Error> {
    serde_json::from_str(json)
}

impl ScriptStep {
    pub fn apply(&self, session: &mut CanvasSession) -> Result<(), ValidationError> {
        match self {
            ScriptStep::Tool { tool } => session.set_tool(*tool),
            ScriptStep::Color { color } => session.set_color_hex(color)?,
            ScriptStep::Width { width } => session.set_width(*width)?,
            ScriptStep::Pointer { event } => session.handle_pointer(*event),
            ScriptStep::Text { text } => {
                session.commit_text(text)?;
            }
            ScriptStep::Clear => session.clear_canvas()?,
        }
        Ok(())
    }
}
