//! Published ports at the composition boundary
//!
//! A published input is a virtual event/data source; a published output is a
//! virtual sink. Internally each published port is addressed as a port on
//! one of two reserved boundary node identities the composition owns, so
//! cables to and from published ports are ordinary cables.

use crate::graph::port_class::{PortDetails, PortDirection};
use serde::{Deserialize, Serialize};

/// A port exposed at the composition boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedPort {
    /// Unique within its direction.
    name: String,
    direction: PortDirection,
    /// Value type name, or none for event-only.
    data_type: Option<String>,
    details: PortDetails,
    /// True when the active protocol mandates this port. Protocol ports
    /// precede non-protocol ports in the ordered list.
    protocol_port: bool,
}

impl PublishedPort {
    pub fn new(
        name: impl Into<String>,
        direction: PortDirection,
        data_type: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            data_type,
            details: PortDetails::new(),
            protocol_port: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn data_type(&self) -> Option<&str> {
        self.data_type.as_deref()
    }

    pub fn is_event_only(&self) -> bool {
        self.data_type.is_none()
    }

    pub fn details(&self) -> &PortDetails {
        &self.details
    }

    pub(crate) fn set_details(&mut self, details: PortDetails) {
        self.details = details;
    }

    pub fn is_protocol_port(&self) -> bool {
        self.protocol_port
    }

    pub(crate) fn set_protocol_port(&mut self, protocol_port: bool) {
        self.protocol_port = protocol_port;
    }

    /// Whether an internal port of the given type can merge into this
    /// published port: the types and event-only-ness must agree.
    pub fn accepts_merge(&self, data_type: Option<&str>) -> bool {
        self.data_type.as_deref() == data_type
    }
}
