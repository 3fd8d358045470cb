//! The composition model
//!
//! This module contains the core graph types: node classes and their port
//! declarations, node/port/cable instances, published ports, protocols, the
//! composition itself, its text format, and validation.

pub mod cable;
pub mod comment;
pub mod composition;
pub mod node;
pub mod node_class;
pub mod port_class;
pub mod protocol;
pub mod published;
pub mod serialization;
pub mod validation;

pub use cable::Cable;
pub use comment::Comment;
pub use composition::{Composition, CompositionMetadata};
pub use node::{Node, Port};
pub use node_class::{NodeClass, REFRESH_PORT_NAME};
pub use port_class::{EventBlocking, EventThrottling, PortCategory, PortClass, PortDirection};
pub use protocol::{Protocol, ProtocolPort};
pub use published::PublishedPort;
