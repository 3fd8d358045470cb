//! Text annotations placed on the composition canvas

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A free-floating text annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    id: Uuid,
    text: String,
    position: (f64, f64),
}

impl Comment {
    pub fn new(text: impl Into<String>, position: (f64, f64)) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            position,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    pub fn set_position(&mut self, position: (f64, f64)) {
        self.position = position;
    }
}
