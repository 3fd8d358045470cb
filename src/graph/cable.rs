//! Cables linking node outputs to inputs
//!
//! A cable is a directed connection from an output port of one node to an
//! input port of another. Whether it carries data depends on both endpoint
//! types and the always-event-only downgrade flag; the composition decides
//! that, since only it can see both endpoints.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A directed connection between two ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cable {
    /// Unique cable identifier
    id: Uuid,
    from_node: Uuid,
    from_port: String,
    to_node: Uuid,
    to_port: String,
    /// Downgrades a data-carrying cable to event-only.
    always_event_only: bool,
    /// Rendering hint; not semantic.
    hidden: bool,
}

impl Cable {
    pub(crate) fn new(
        from_node: Uuid,
        from_port: impl Into<String>,
        to_node: Uuid,
        to_port: impl Into<String>,
        always_event_only: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_node,
            from_port: from_port.into(),
            to_node,
            to_port: to_port.into(),
            always_event_only,
            hidden: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn from_node(&self) -> Uuid {
        self.from_node
    }

    pub fn from_port(&self) -> &str {
        &self.from_port
    }

    pub fn to_node(&self) -> Uuid {
        self.to_node
    }

    pub fn to_port(&self) -> &str {
        &self.to_port
    }

    pub fn is_always_event_only(&self) -> bool {
        self.always_event_only
    }

    pub(crate) fn set_always_event_only(&mut self, always_event_only: bool) {
        self.always_event_only = always_event_only;
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub(crate) fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    /// Check if this cable touches a specific node
    pub fn involves_node(&self, node_id: Uuid) -> bool {
        self.from_node == node_id || self.to_node == node_id
    }

    /// Check if this cable touches a specific port
    pub fn involves_port(&self, node_id: Uuid, port_name: &str) -> bool {
        (self.from_node == node_id && self.from_port == port_name)
            || (self.to_node == node_id && self.to_port == port_name)
    }

    /// The source (from) endpoint
    pub fn source(&self) -> (Uuid, &str) {
        (self.from_node, &self.from_port)
    }

    /// The target (to) endpoint
    pub fn target(&self) -> (Uuid, &str) {
        (self.to_node, &self.to_port)
    }
}
