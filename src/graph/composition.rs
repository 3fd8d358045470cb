//! The composition: a directed graph of nodes, cables, and published ports
//!
//! All mutations go through the methods here so the structural invariants
//! hold after every public operation returns. Failed mutations roll back and
//! return a `ModelError`; nothing here panics or aborts.

use crate::graph::cable::Cable;
use crate::graph::comment::Comment;
use crate::graph::node::Node;
use crate::graph::node_class::NodeClass;
use crate::graph::port_class::{EventThrottling, PortCategory, PortDirection};
use crate::graph::protocol::Protocol;
use crate::graph::published::PublishedPort;
use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Composition metadata, round-tripped through the text format header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionMetadata {
    pub name: String,
    pub author: String,
    pub copyright: String,
    pub description: String,
    pub version: String,
    /// RFC 3339 timestamp of the last save, if any.
    pub last_saved: Option<chrono::DateTime<chrono::Utc>>,
    pub icon_path: Option<String>,
    /// Header keys the core does not model, preserved verbatim in order.
    pub extra: Vec<(String, String)>,
}

/// Container for one complete composition
#[derive(Debug)]
pub struct Composition {
    /// All nodes, keyed by identifier. BTreeMap keeps iteration and
    /// serialization deterministic.
    nodes: BTreeMap<Uuid, Node>,
    /// All cables, in insertion order.
    cables: Vec<Cable>,
    /// Published inputs, protocol-mandated ports first.
    published_inputs: Vec<PublishedPort>,
    /// Published outputs, protocol-mandated ports first.
    published_outputs: Vec<PublishedPort>,
    comments: Vec<Comment>,
    metadata: CompositionMetadata,
    active_protocol: Option<Protocol>,
    /// Reserved node identity the published inputs hang off as output ports.
    published_input_node: Uuid,
    /// Reserved node identity the published outputs hang off as input ports.
    published_output_node: Uuid,
    /// Bumped once per completed mutation (or per outermost transaction).
    revision: u64,
    /// Open `begin_mutation` bookends.
    mutation_depth: u32,
}

impl Default for Composition {
    fn default() -> Self {
        Self::new()
    }
}

impl Composition {
    /// Create a new empty composition
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            cables: Vec::new(),
            published_inputs: Vec::new(),
            published_outputs: Vec::new(),
            comments: Vec::new(),
            metadata: CompositionMetadata::default(),
            active_protocol: None,
            published_input_node: Uuid::new_v4(),
            published_output_node: Uuid::new_v4(),
            revision: 0,
            mutation_depth: 0,
        }
    }

    pub fn metadata(&self) -> &CompositionMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut CompositionMetadata {
        &mut self.metadata
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The reserved node identity published inputs are addressed through
    pub fn published_input_node(&self) -> Uuid {
        self.published_input_node
    }

    /// The reserved node identity published outputs are addressed through
    pub fn published_output_node(&self) -> Uuid {
        self.published_output_node
    }

    fn is_boundary_node(&self, id: Uuid) -> bool {
        id == self.published_input_node || id == self.published_output_node
    }

    // --- Transactions ---------------------------------------------------

    /// Open a logical transaction: intermediate invariant audits are
    /// suppressed and revision notifications coalesce until the matching
    /// `end_mutation`.
    pub fn begin_mutation(&mut self) {
        self.mutation_depth += 1;
    }

    pub fn end_mutation(&mut self) {
        debug_assert!(self.mutation_depth > 0, "unbalanced end_mutation");
        self.mutation_depth = self.mutation_depth.saturating_sub(1);
        if self.mutation_depth == 0 {
            self.touch();
        }
    }

    fn touch(&mut self) {
        if self.mutation_depth == 0 {
            self.revision += 1;
            self.debug_audit();
        }
    }

    /// Cheap structural audit, compiled out of release builds
    fn debug_audit(&self) {
        #[cfg(debug_assertions)]
        {
            for cable in &self.cables {
                debug_assert!(
                    self.is_boundary_node(cable.from_node())
                        || self.nodes.contains_key(&cable.from_node()),
                    "cable source node missing"
                );
                debug_assert!(
                    self.is_boundary_node(cable.to_node())
                        || self.nodes.contains_key(&cable.to_node()),
                    "cable target node missing"
                );
            }
            for (i, a) in self.cables.iter().enumerate() {
                for b in &self.cables[i + 1..] {
                    debug_assert!(
                        !(a.source() == b.source() && a.target() == b.target()),
                        "duplicate cable between one port pair"
                    );
                }
            }
        }
    }

    // --- Nodes ----------------------------------------------------------

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, id: Uuid) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: Uuid) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Instantiate `class` and add the node
    pub fn add_node(&mut self, class: Arc<NodeClass>, title: &str, position: (f64, f64)) -> Uuid {
        self.insert_node(Node::new(class, title, position))
    }

    /// Add an already-built node (used by the composition parser, which
    /// assigns identities itself)
    pub fn insert_node(&mut self, node: Node) -> Uuid {
        let id = node.id();
        log::debug!("Adding node {} ({})", id, node.class_name());
        self.nodes.insert(id, node);
        self.touch();
        id
    }

    /// Remove a node. Fails while cables still reference it; use
    /// `remove_node_and_cables` for the convenience form.
    pub fn remove_node(&mut self, node_id: Uuid) -> Result<Node, ModelError> {
        if self.cables.iter().any(|c| c.involves_node(node_id)) {
            return Err(ModelError::NodeHasCables(node_id));
        }
        let node = self
            .nodes
            .remove(&node_id)
            .ok_or(ModelError::NodeNotFound(node_id))?;
        // Orphan any attachment hosted by the removed node.
        for other in self.nodes.values_mut() {
            if other.attachment_host().map(|(n, _)| n) == Some(node_id) {
                other.set_attachment_host(None);
            }
        }
        self.touch();
        Ok(node)
    }

    /// Remove a node and every cable incident on it
    pub fn remove_node_and_cables(&mut self, node_id: Uuid) -> Result<Node, ModelError> {
        if !self.nodes.contains_key(&node_id) {
            return Err(ModelError::NodeNotFound(node_id));
        }
        self.begin_mutation();
        self.cables.retain(|c| !c.involves_node(node_id));
        let node = self.remove_node(node_id);
        self.end_mutation();
        node
    }

    pub fn set_node_title(&mut self, node_id: Uuid, title: &str) -> Result<(), ModelError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(ModelError::NodeNotFound(node_id))?;
        node.set_title(title);
        self.touch();
        Ok(())
    }

    pub fn set_node_position(&mut self, node_id: Uuid, position: (f64, f64)) -> Result<(), ModelError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(ModelError::NodeNotFound(node_id))?;
        node.set_position(position);
        self.touch();
        Ok(())
    }

    pub fn set_node_tint(&mut self, node_id: Uuid, tint: Option<String>) -> Result<(), ModelError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(ModelError::NodeNotFound(node_id))?;
        node.set_tint(tint);
        self.touch();
        Ok(())
    }

    // --- Attachments ----------------------------------------------------

    /// Collapse `node` onto `host_node`'s input port. The attachment remains
    /// an ordinary node; only editing operations consult the relation.
    pub fn attach(&mut self, node_id: Uuid, host_node: Uuid, host_port: &str) -> Result<(), ModelError> {
        if !self.nodes.contains_key(&node_id) {
            return Err(ModelError::NodeNotFound(node_id));
        }
        let host = self
            .nodes
            .get(&host_node)
            .ok_or(ModelError::NodeNotFound(host_node))?;
        if host.class().input_port(host_port).is_none() {
            return Err(ModelError::PortNotFound {
                node: host_node,
                port: host_port.to_string(),
            });
        }
        self.nodes
            .get_mut(&node_id)
            .expect("checked above")
            .set_attachment_host(Some((host_node, host_port.to_string())));
        self.touch();
        Ok(())
    }

    pub fn detach(&mut self, node_id: Uuid) -> Result<(), ModelError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(ModelError::NodeNotFound(node_id))?;
        node.set_attachment_host(None);
        self.touch();
        Ok(())
    }

    // --- Port type resolution -------------------------------------------

    /// Data type of an output-side endpoint (node output, trigger, or
    /// published input)
    pub fn source_port_type(&self, node_id: Uuid, port_name: &str) -> Option<String> {
        if node_id == self.published_input_node {
            return self
                .published_input(port_name)
                .and_then(|p| p.data_type().map(String::from));
        }
        self.nodes
            .get(&node_id)?
            .class()
            .output_port(port_name)
            .and_then(|pc| pc.data_type().map(String::from))
    }

    /// Data type of an input-side endpoint (node input or published output)
    pub fn target_port_type(&self, node_id: Uuid, port_name: &str) -> Option<String> {
        if node_id == self.published_output_node {
            return self
                .published_output(port_name)
                .and_then(|p| p.data_type().map(String::from));
        }
        self.nodes
            .get(&node_id)?
            .class()
            .input_port(port_name)
            .and_then(|pc| pc.data_type().map(String::from))
    }

    /// A cable carries data iff both endpoints have data types and the
    /// always-event-only flag is off
    pub fn cable_carries_data(&self, cable: &Cable) -> bool {
        !cable.is_always_event_only()
            && self
                .source_port_type(cable.from_node(), cable.from_port())
                .is_some()
            && self
                .target_port_type(cable.to_node(), cable.to_port())
                .is_some()
    }

    // --- Cables ---------------------------------------------------------

    pub fn cables(&self) -> &[Cable] {
        &self.cables
    }

    pub fn cable(&self, cable_id: Uuid) -> Option<&Cable> {
        self.cables.iter().find(|c| c.id() == cable_id)
    }

    /// Every cable incident on the given port
    pub fn cables_on_port(&self, node_id: Uuid, port_name: &str) -> Vec<&Cable> {
        self.cables
            .iter()
            .filter(|c| c.involves_port(node_id, port_name))
            .collect()
    }

    /// The data-carrying cable into an input port, if any
    pub fn data_cable_into(&self, node_id: Uuid, port_name: &str) -> Option<&Cable> {
        self.cables
            .iter()
            .find(|c| c.to_node() == node_id && c.to_port() == port_name && self.cable_carries_data(c))
    }

    /// Connect an output port to an input port.
    ///
    /// A second connect on the same ordered port pair with a different
    /// `always_event_only` value replaces the existing cable's flag in one
    /// call and returns the existing identity; with the same value it is
    /// rejected as a duplicate.
    pub fn connect(
        &mut self,
        from_node: Uuid,
        from_port: &str,
        to_node: Uuid,
        to_port: &str,
        always_event_only: bool,
    ) -> Result<Uuid, ModelError> {
        self.check_endpoints(from_node, from_port, to_node, to_port)?;

        // One-call replace for a duplicate pair with a different flag.
        if let Some(pos) = self
            .cables
            .iter()
            .position(|c| c.source() == (from_node, from_port) && c.target() == (to_node, to_port))
        {
            if self.cables[pos].is_always_event_only() == always_event_only {
                return Err(ModelError::InvalidCable(format!(
                    "duplicate cable {}:{} -> {}:{}",
                    from_node, from_port, to_node, to_port
                )));
            }
            return self.replace_cable_flag(pos, always_event_only);
        }

        let from_type = self.source_port_type(from_node, from_port);
        let to_type = self.target_port_type(to_node, to_port);
        let carries_data = !always_event_only && from_type.is_some() && to_type.is_some();

        if carries_data {
            let from_type = from_type.as_deref().unwrap_or_default();
            let to_type = to_type.as_deref().unwrap_or_default();
            if !types_unify(from_type, to_type) {
                return Err(ModelError::TypeMismatch {
                    from: from_type.to_string(),
                    to: to_type.to_string(),
                });
            }
            if self.data_cable_into(to_node, to_port).is_some() {
                return Err(ModelError::InvalidCable(format!(
                    "input port '{}' already has a data cable",
                    to_port
                )));
            }
        }

        let cable = Cable::new(from_node, from_port, to_node, to_port, always_event_only);
        let cable_id = cable.id();
        self.cables.push(cable);
        self.touch();
        Ok(cable_id)
    }

    fn replace_cable_flag(&mut self, pos: usize, always_event_only: bool) -> Result<Uuid, ModelError> {
        // Turning the flag off makes the cable data-carrying again, which
        // must not give the input a second data cable.
        if !always_event_only {
            let (to_node, to_port) = {
                let c = &self.cables[pos];
                (c.to_node(), c.to_port().to_string())
            };
            let this_id = self.cables[pos].id();
            let would_carry = self
                .source_port_type(self.cables[pos].from_node(), self.cables[pos].from_port())
                .is_some()
                && self.target_port_type(to_node, &to_port).is_some();
            if would_carry {
                if let Some(existing) = self.data_cable_into(to_node, &to_port) {
                    if existing.id() != this_id {
                        return Err(ModelError::InvalidCable(format!(
                            "input port '{}' already has a data cable",
                            to_port
                        )));
                    }
                }
            }
        }
        self.cables[pos].set_always_event_only(always_event_only);
        let id = self.cables[pos].id();
        self.touch();
        Ok(id)
    }

    fn check_endpoints(
        &self,
        from_node: Uuid,
        from_port: &str,
        to_node: Uuid,
        to_port: &str,
    ) -> Result<(), ModelError> {
        // Source: a node output or a published input.
        if from_node == self.published_input_node {
            self.published_input(from_port)
                .ok_or_else(|| ModelError::PublishedPortNotFound(from_port.to_string()))?;
        } else if from_node == self.published_output_node {
            return Err(ModelError::InvalidCable(
                "published outputs cannot be cable sources".to_string(),
            ));
        } else {
            let node = self
                .nodes
                .get(&from_node)
                .ok_or(ModelError::NodeNotFound(from_node))?;
            node.class()
                .output_port(from_port)
                .ok_or_else(|| ModelError::PortNotFound {
                    node: from_node,
                    port: from_port.to_string(),
                })?;
        }

        // Target: a node input or a published output. Triggers live only in
        // the output list, so they can never be targets.
        if to_node == self.published_output_node {
            self.published_output(to_port)
                .ok_or_else(|| ModelError::PublishedPortNotFound(to_port.to_string()))?;
        } else if to_node == self.published_input_node {
            return Err(ModelError::InvalidCable(
                "published inputs cannot be cable targets".to_string(),
            ));
        } else {
            let node = self
                .nodes
                .get(&to_node)
                .ok_or(ModelError::NodeNotFound(to_node))?;
            node.class()
                .input_port(to_port)
                .ok_or_else(|| ModelError::PortNotFound {
                    node: to_node,
                    port: to_port.to_string(),
                })?;
        }

        if from_node == to_node && from_port == to_port {
            return Err(ModelError::InvalidCable(
                "a cable cannot connect a port to itself".to_string(),
            ));
        }
        Ok(())
    }

    pub fn disconnect(&mut self, cable_id: Uuid) -> Result<Cable, ModelError> {
        let pos = self
            .cables
            .iter()
            .position(|c| c.id() == cable_id)
            .ok_or(ModelError::CableNotFound(cable_id))?;
        let cable = self.cables.remove(pos);
        self.touch();
        Ok(cable)
    }

    /// Toggle the always-event-only downgrade on an existing cable
    pub fn set_always_event_only(&mut self, cable_id: Uuid, always_event_only: bool) -> Result<(), ModelError> {
        let pos = self
            .cables
            .iter()
            .position(|c| c.id() == cable_id)
            .ok_or(ModelError::CableNotFound(cable_id))?;
        if self.cables[pos].is_always_event_only() != always_event_only {
            self.replace_cable_flag(pos, always_event_only)?;
        }
        Ok(())
    }

    pub fn set_cable_hidden(&mut self, cable_id: Uuid, hidden: bool) -> Result<(), ModelError> {
        let cable = self
            .cables
            .iter_mut()
            .find(|c| c.id() == cable_id)
            .ok_or(ModelError::CableNotFound(cable_id))?;
        cable.set_hidden(hidden);
        self.touch();
        Ok(())
    }

    // --- Constants and throttling ---------------------------------------

    /// Set the constant on an unconnected data-and-event input.
    /// The value is an opaque string the runtime will interpret.
    pub fn set_port_constant(&mut self, node_id: Uuid, port_name: &str, value: &str) -> Result<(), ModelError> {
        let node = self
            .nodes
            .get(&node_id)
            .ok_or(ModelError::NodeNotFound(node_id))?;
        let port_class = node
            .class()
            .input_port(port_name)
            .ok_or_else(|| ModelError::PortNotFound {
                node: node_id,
                port: port_name.to_string(),
            })?;
        if port_class.category() != PortCategory::DataAndEvent {
            return Err(ModelError::NotADataPort(port_name.to_string()));
        }
        if self.data_cable_into(node_id, port_name).is_some() {
            return Err(ModelError::PortHasDataCable {
                port: port_name.to_string(),
            });
        }
        self.nodes
            .get_mut(&node_id)
            .expect("checked above")
            .input_port_mut(port_name)
            .expect("checked above")
            .set_constant(Some(value.to_string()));
        self.touch();
        Ok(())
    }

    /// The constant the runtime would see: none while a data cable is connected
    pub fn effective_constant(&self, node_id: Uuid, port_name: &str) -> Option<&str> {
        if self.data_cable_into(node_id, port_name).is_some() {
            return None;
        }
        self.nodes.get(&node_id)?.input_port(port_name)?.constant()
    }

    /// Override event throttling on a trigger port instance
    pub fn set_trigger_throttling(
        &mut self,
        node_id: Uuid,
        port_name: &str,
        throttling: EventThrottling,
    ) -> Result<(), ModelError> {
        let node = self
            .nodes
            .get(&node_id)
            .ok_or(ModelError::NodeNotFound(node_id))?;
        let port_class = node
            .class()
            .output_port(port_name)
            .ok_or_else(|| ModelError::PortNotFound {
                node: node_id,
                port: port_name.to_string(),
            })?;
        if port_class.category() != PortCategory::Trigger {
            return Err(ModelError::NotATriggerPort(port_name.to_string()));
        }
        self.nodes
            .get_mut(&node_id)
            .expect("checked above")
            .output_port_mut(port_name)
            .expect("checked above")
            .set_event_throttling(Some(throttling));
        self.touch();
        Ok(())
    }

    // --- Published ports ------------------------------------------------

    pub fn published_inputs(&self) -> &[PublishedPort] {
        &self.published_inputs
    }

    pub fn published_outputs(&self) -> &[PublishedPort] {
        &self.published_outputs
    }

    pub fn published_input(&self, name: &str) -> Option<&PublishedPort> {
        self.published_inputs.iter().find(|p| p.name() == name)
    }

    pub fn published_output(&self, name: &str) -> Option<&PublishedPort> {
        self.published_outputs.iter().find(|p| p.name() == name)
    }

    fn published_list(&self, direction: PortDirection) -> &Vec<PublishedPort> {
        match direction {
            PortDirection::Input => &self.published_inputs,
            PortDirection::Output => &self.published_outputs,
        }
    }

    fn published_list_mut(&mut self, direction: PortDirection) -> &mut Vec<PublishedPort> {
        match direction {
            PortDirection::Input => &mut self.published_inputs,
            PortDirection::Output => &mut self.published_outputs,
        }
    }

    /// First free name in the direction: `name`, `name2`, `name3`, ...
    fn free_published_name(&self, direction: PortDirection, base: &str) -> String {
        let list = self.published_list(direction);
        if !list.iter().any(|p| p.name() == base) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}{}", base, n);
            if !list.iter().any(|p| p.name() == candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Directly add a published port (used by the parser and protocol
    /// activation). The name must be free within the direction.
    pub(crate) fn insert_published(&mut self, port: PublishedPort) -> Result<(), ModelError> {
        if self
            .published_list(port.direction())
            .iter()
            .any(|p| p.name() == port.name())
        {
            return Err(ModelError::PublishedNameInUse(port.name().to_string()));
        }
        self.published_list_mut(port.direction()).push(port);
        self.touch();
        Ok(())
    }

    /// Expose an internal port at the composition boundary.
    ///
    /// Publishing an input port creates (or merges into) a published input
    /// wired to it; publishing an output port does the same for a published
    /// output. Merging requires agreement on type and event-only-ness; a
    /// mismatch renames the incoming port with the first free numeric
    /// suffix. Returns the published port's final name.
    pub fn publish_internal(
        &mut self,
        node_id: Uuid,
        port_name: &str,
        published_name: &str,
        force_event_only: bool,
    ) -> Result<String, ModelError> {
        let node = self
            .nodes
            .get(&node_id)
            .ok_or(ModelError::NodeNotFound(node_id))?;

        let (direction, port_type) = if let Some(pc) = node.class().input_port(port_name) {
            (PortDirection::Input, pc.data_type().map(String::from))
        } else if let Some(pc) = node.class().output_port(port_name) {
            (PortDirection::Output, pc.data_type().map(String::from))
        } else {
            return Err(ModelError::PortNotFound {
                node: node_id,
                port: port_name.to_string(),
            });
        };
        let published_type = if force_event_only { None } else { port_type };

        let mut created = false;
        let final_name = match self
            .published_list(direction)
            .iter()
            .find(|p| p.name() == published_name)
        {
            Some(existing) if existing.accepts_merge(published_type.as_deref()) => {
                published_name.to_string()
            }
            Some(_) => {
                // Incompatible with the existing port: take a renamed slot.
                let renamed = self.free_published_name(direction, published_name);
                log::info!(
                    "Published {} port '{}' exists with a different type; publishing as '{}'",
                    match direction {
                        PortDirection::Input => "input",
                        PortDirection::Output => "output",
                    },
                    published_name,
                    renamed
                );
                let port = PublishedPort::new(&renamed, direction, published_type.clone());
                self.published_list_mut(direction).push(port);
                created = true;
                renamed
            }
            None => {
                let port = PublishedPort::new(published_name, direction, published_type.clone());
                self.published_list_mut(direction).push(port);
                created = true;
                published_name.to_string()
            }
        };

        // Wire the boundary to the internal port, skipping an already
        // existing identical cable (publish is idempotent per pair).
        let connect_result = match direction {
            PortDirection::Input => {
                let from = self.published_input_node;
                self.connect(from, &final_name, node_id, port_name, force_event_only)
            }
            PortDirection::Output => {
                let to = self.published_output_node;
                self.connect(node_id, port_name, to, &final_name, force_event_only)
            }
        };
        match connect_result {
            Ok(_) => {}
            Err(ModelError::InvalidCable(msg)) if msg.starts_with("duplicate cable") => {}
            Err(e) => {
                // Roll back a published port this call created.
                if created {
                    let list = self.published_list_mut(direction);
                    if let Some(pos) = list.iter().position(|p| p.name() == final_name) {
                        list.remove(pos);
                    }
                }
                return Err(e);
            }
        }
        self.touch();
        Ok(final_name)
    }

    /// Remove a published port and every cable incident on it.
    /// Constants on the internal ports it fed remain intact.
    pub fn unpublish(&mut self, direction: PortDirection, name: &str) -> Result<PublishedPort, ModelError> {
        let boundary = match direction {
            PortDirection::Input => self.published_input_node,
            PortDirection::Output => self.published_output_node,
        };
        let list = self.published_list_mut(direction);
        let pos = list
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| ModelError::PublishedPortNotFound(name.to_string()))?;
        let port = list.remove(pos);
        self.cables.retain(|c| !c.involves_port(boundary, name));
        self.touch();
        Ok(port)
    }

    /// Detach one internal port from a published port, removing the
    /// published port itself once nothing remains connected to it
    pub fn unpublish_internal(
        &mut self,
        node_id: Uuid,
        port_name: &str,
        published_name: &str,
    ) -> Result<(), ModelError> {
        let direction = if self.published_input(published_name).is_some() {
            PortDirection::Input
        } else if self.published_output(published_name).is_some() {
            PortDirection::Output
        } else {
            return Err(ModelError::PublishedPortNotFound(published_name.to_string()));
        };
        let boundary = match direction {
            PortDirection::Input => self.published_input_node,
            PortDirection::Output => self.published_output_node,
        };

        self.cables.retain(|c| {
            !(c.involves_port(boundary, published_name) && c.involves_port(node_id, port_name))
        });
        let orphaned = !self
            .cables
            .iter()
            .any(|c| c.involves_port(boundary, published_name));
        if orphaned {
            let list = self.published_list_mut(direction);
            if let Some(pos) = list.iter().position(|p| p.name() == published_name) {
                list.remove(pos);
            }
        }
        self.touch();
        Ok(())
    }

    // --- Protocols ------------------------------------------------------

    pub fn active_protocol(&self) -> Option<&Protocol> {
        self.active_protocol.as_ref()
    }

    /// Record the active protocol without touching the published-port list.
    /// Used by the composition parser, which restores the ports itself.
    pub(crate) fn set_raw_protocol(&mut self, protocol: Protocol) {
        self.active_protocol = Some(protocol);
    }

    /// Flag an existing published port as protocol-mandated
    pub(crate) fn mark_protocol_port(&mut self, direction: PortDirection, name: &str) {
        if let Some(port) = self
            .published_list_mut(direction)
            .iter_mut()
            .find(|p| p.name() == name)
        {
            port.set_protocol_port(true);
        }
    }

    /// Attach detail key/values to a published port
    pub(crate) fn set_published_details(
        &mut self,
        direction: PortDirection,
        name: &str,
        details: crate::graph::port_class::PortDetails,
    ) {
        if let Some(port) = self
            .published_list_mut(direction)
            .iter_mut()
            .find(|p| p.name() == name)
        {
            port.set_details(details);
        }
    }

    /// Activate or deactivate a protocol.
    ///
    /// Activation installs the protocol's mandated published ports, adopting
    /// same-name same-type ports that already exist and suffix-renaming
    /// conflicting ones; mandated ports are reordered to precede non-protocol
    /// ports. Deactivation unmarks the mandated ports and drops those with no
    /// remaining cables.
    pub fn set_active_protocol(&mut self, protocol: Option<Protocol>) -> Result<(), ModelError> {
        self.begin_mutation();

        // Unmark (and possibly drop) ports mandated by the outgoing protocol.
        if let Some(old) = self.active_protocol.take() {
            for (direction, mandated) in [
                (PortDirection::Input, old.inputs()),
                (PortDirection::Output, old.outputs()),
            ] {
                let boundary = match direction {
                    PortDirection::Input => self.published_input_node,
                    PortDirection::Output => self.published_output_node,
                };
                for port in mandated {
                    let connected = self
                        .cables
                        .iter()
                        .any(|c| c.involves_port(boundary, &port.name));
                    if connected {
                        if let Some(p) = self
                            .published_list_mut(direction)
                            .iter_mut()
                            .find(|p| p.name() == port.name)
                        {
                            p.set_protocol_port(false);
                        }
                    } else {
                        let _ = self.unpublish(direction, &port.name);
                    }
                }
            }
        }

        if let Some(protocol) = protocol {
            for (direction, mandated) in [
                (PortDirection::Input, protocol.inputs().to_vec()),
                (PortDirection::Output, protocol.outputs().to_vec()),
            ] {
                for port in &mandated {
                    let existing = self
                        .published_list(direction)
                        .iter()
                        .find(|p| p.name() == port.name)
                        .cloned();
                    match existing {
                        Some(p) if p.data_type() == Some(port.data_type.as_str()) => {}
                        Some(_) => {
                            // Conflicting type: move the existing port aside.
                            let renamed = self.free_published_name(direction, &port.name);
                            if let Some(p) = self
                                .published_list_mut(direction)
                                .iter_mut()
                                .find(|p| p.name() == port.name)
                            {
                                p.set_name(&renamed);
                            }
                            // Rename its cable endpoints to follow.
                            let boundary = match direction {
                                PortDirection::Input => self.published_input_node,
                                PortDirection::Output => self.published_output_node,
                            };
                            self.rename_cable_endpoints(boundary, &port.name, &renamed);
                            // The mandated name was freed just above.
                            let mandated_port = PublishedPort::new(
                                &port.name,
                                direction,
                                Some(port.data_type.clone()),
                            );
                            self.published_list_mut(direction).push(mandated_port);
                        }
                        None => {
                            let mandated_port = PublishedPort::new(
                                &port.name,
                                direction,
                                Some(port.data_type.clone()),
                            );
                            self.published_list_mut(direction).push(mandated_port);
                        }
                    }
                    if let Some(p) = self
                        .published_list_mut(direction)
                        .iter_mut()
                        .find(|p| p.name() == port.name)
                    {
                        p.set_protocol_port(true);
                    }
                }

                // Protocol-mandated ports precede non-protocol ports, in
                // protocol declaration order.
                let list = self.published_list_mut(direction);
                let mut ordered = Vec::with_capacity(list.len());
                for m in &mandated {
                    if let Some(pos) = list.iter().position(|p| p.name() == m.name) {
                        ordered.push(list.remove(pos));
                    }
                }
                ordered.append(list);
                *list = ordered;
            }
            self.active_protocol = Some(protocol);
        }

        self.end_mutation();
        Ok(())
    }

    fn rename_cable_endpoints(&mut self, node_id: Uuid, old_port: &str, new_port: &str) {
        let renamed: Vec<Cable> = self
            .cables
            .iter()
            .filter(|c| c.involves_port(node_id, old_port))
            .map(|c| {
                let from_port = if c.from_node() == node_id && c.from_port() == old_port {
                    new_port
                } else {
                    c.from_port()
                };
                let to_port = if c.to_node() == node_id && c.to_port() == old_port {
                    new_port
                } else {
                    c.to_port()
                };
                let mut cable =
                    Cable::new(c.from_node(), from_port, c.to_node(), to_port, c.is_always_event_only());
                cable.set_hidden(c.is_hidden());
                cable
            })
            .collect();
        self.cables.retain(|c| !c.involves_port(node_id, old_port));
        self.cables.extend(renamed);
    }

    // --- Comments -------------------------------------------------------

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn add_comment(&mut self, comment: Comment) -> Uuid {
        let id = comment.id();
        self.comments.push(comment);
        self.touch();
        id
    }

    pub fn remove_comment(&mut self, comment_id: Uuid) -> Result<Comment, ModelError> {
        let pos = self
            .comments
            .iter()
            .position(|c| c.id() == comment_id)
            .ok_or(ModelError::CommentNotFound(comment_id))?;
        let comment = self.comments.remove(pos);
        self.touch();
        Ok(comment)
    }
}

/// Data types unify when equal, or when either side is generic and its
/// compatible set (empty set = open) admits the other side's innermost name.
/// Two generics unify unconditionally; a later specialization choice narrows
/// them together.
pub fn types_unify(from: &str, to: &str) -> bool {
    use crate::types::is_generic_name;

    if from == to {
        return true;
    }
    match (is_generic_name(from), is_generic_name(to)) {
        (true, true) => true,
        (false, false) => false,
        // List-ness must still agree between a generic list and a concrete
        // type; the compatible-set check belongs to the specialization
        // engine, which sees the declaring class.
        _ => crate::types::is_list_name(from) == crate::types::is_list_name(to),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::port_class::PortClass;

    fn add_class() -> Arc<NodeClass> {
        let mut class = NodeClass::new("vuo.math.add");
        class.set_default_title("Add");
        class.push_input_port(PortClass::data_and_event(
            "values",
            PortDirection::Input,
            "list.real",
        ));
        class.push_output_port(PortClass::data_and_event(
            "sum",
            PortDirection::Output,
            "real",
        ));
        Arc::new(class)
    }

    fn count_class() -> Arc<NodeClass> {
        let mut class = NodeClass::new("vuo.math.count");
        class.push_input_port(PortClass::data_and_event(
            "increment",
            PortDirection::Input,
            "real",
        ));
        class.push_output_port(PortClass::data_and_event(
            "count",
            PortDirection::Output,
            "real",
        ));
        Arc::new(class)
    }

    #[test]
    fn test_add_and_remove_node() {
        let mut comp = Composition::new();
        let id = comp.add_node(add_class(), "", (0.0, 0.0));
        assert_eq!(comp.node_count(), 1);

        let removed = comp.remove_node(id).unwrap();
        assert_eq!(removed.id(), id);
        assert_eq!(comp.node_count(), 0);
    }

    #[test]
    fn test_remove_node_blocked_by_cables() {
        let mut comp = Composition::new();
        let a = comp.add_node(count_class(), "", (0.0, 0.0));
        let b = comp.add_node(count_class(), "", (100.0, 0.0));
        comp.connect(a, "count", b, "increment", false).unwrap();

        assert!(matches!(
            comp.remove_node(a),
            Err(ModelError::NodeHasCables(_))
        ));

        comp.remove_node_and_cables(a).unwrap();
        assert_eq!(comp.cables().len(), 0);
        assert_eq!(comp.node_count(), 1);
    }

    #[test]
    fn test_connect_rejects_wrong_direction() {
        let mut comp = Composition::new();
        let a = comp.add_node(count_class(), "", (0.0, 0.0));
        let b = comp.add_node(count_class(), "", (100.0, 0.0));

        // "increment" is an input, unusable as a source.
        let result = comp.connect(a, "increment", b, "increment", false);
        assert!(matches!(result, Err(ModelError::PortNotFound { .. })));
    }

    #[test]
    fn test_connect_rejects_type_mismatch() {
        let mut comp = Composition::new();
        let a = comp.add_node(add_class(), "", (0.0, 0.0));
        let b = comp.add_node(add_class(), "", (100.0, 0.0));

        // sum: real -> values: list.real does not unify.
        let result = comp.connect(a, "sum", b, "values", false);
        assert!(matches!(result, Err(ModelError::TypeMismatch { .. })));

        // As an event-only cable it is fine.
        comp.connect(a, "sum", b, "values", true).unwrap();
    }

    #[test]
    fn test_duplicate_connect_replaces_flag() {
        let mut comp = Composition::new();
        let a = comp.add_node(count_class(), "", (0.0, 0.0));
        let b = comp.add_node(count_class(), "", (100.0, 0.0));

        let first = comp.connect(a, "count", b, "increment", false).unwrap();
        // Same pair, same flag: duplicate.
        assert!(comp.connect(a, "count", b, "increment", false).is_err());
        // Same pair, different flag: one-call replace, same identity.
        let replaced = comp.connect(a, "count", b, "increment", true).unwrap();
        assert_eq!(first, replaced);
        assert_eq!(comp.cables().len(), 1);
        assert!(comp.cables()[0].is_always_event_only());
    }

    #[test]
    fn test_single_data_cable_per_input() {
        let mut comp = Composition::new();
        let a = comp.add_node(count_class(), "", (0.0, 0.0));
        let b = comp.add_node(count_class(), "", (100.0, 0.0));
        let c = comp.add_node(count_class(), "", (200.0, 0.0));

        comp.connect(a, "count", c, "increment", false).unwrap();
        let second = comp.connect(b, "count", c, "increment", false);
        assert!(second.is_err());

        // An event-only second cable is fine.
        comp.connect(b, "count", c, "increment", true).unwrap();
    }

    #[test]
    fn test_constant_rules() {
        let mut comp = Composition::new();
        let a = comp.add_node(count_class(), "", (0.0, 0.0));
        let b = comp.add_node(count_class(), "", (100.0, 0.0));

        comp.set_port_constant(b, "increment", "1.0").unwrap();
        comp.set_port_constant(b, "increment", "1.0").unwrap(); // idempotent
        assert_eq!(comp.effective_constant(b, "increment"), Some("1.0"));

        // Connecting a data cable hides the constant but keeps it stored.
        comp.connect(a, "count", b, "increment", false).unwrap();
        assert_eq!(comp.effective_constant(b, "increment"), None);
        assert!(comp.set_port_constant(b, "increment", "2.0").is_err());

        // Events-only ports take no constant.
        assert!(matches!(
            comp.set_port_constant(b, "refresh", "x"),
            Err(ModelError::NotADataPort(_))
        ));
    }

    #[test]
    fn test_event_only_promotion_scenario() {
        let mut comp = Composition::new();
        let a = comp.add_node(count_class(), "", (0.0, 0.0));
        let b = comp.add_node(count_class(), "", (100.0, 0.0));
        let cable_id = comp.connect(a, "count", b, "increment", false).unwrap();

        assert!(comp.cable_carries_data(comp.cable(cable_id).unwrap()));

        comp.set_always_event_only(cable_id, true).unwrap();
        let cable = comp.cable(cable_id).unwrap();
        assert!(cable.is_always_event_only());
        assert!(!comp.cable_carries_data(cable));
    }

    #[test]
    fn test_publish_and_unpublish() {
        let mut comp = Composition::new();
        let n = comp.add_node(count_class(), "", (0.0, 0.0));
        comp.set_port_constant(n, "increment", "5").unwrap();

        let name = comp.publish_internal(n, "increment", "X", true).unwrap();
        assert_eq!(name, "X");
        assert_eq!(comp.published_inputs().len(), 1);
        assert_eq!(comp.cables().len(), 1);

        let removed = comp.unpublish(PortDirection::Input, "X").unwrap();
        assert_eq!(removed.name(), "X");
        assert!(comp.published_inputs().is_empty());
        assert!(comp.cables().is_empty());
        // The internal constant survives unpublishing.
        assert_eq!(comp.effective_constant(n, "increment"), Some("5"));
    }

    #[test]
    fn test_publish_conflict_renames_with_numeric_suffix() {
        let mut comp = Composition::new();
        let a = comp.add_node(count_class(), "", (0.0, 0.0));
        let b = comp.add_node(add_class(), "", (100.0, 0.0));

        // First publish: real input under "value".
        comp.publish_internal(a, "increment", "value", false).unwrap();
        // Incompatible type under the same name: renamed value2.
        let renamed = comp.publish_internal(b, "values", "value", false).unwrap();
        assert_eq!(renamed, "value2");
        let names: Vec<&str> = comp.published_inputs().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["value", "value2"]);

        // A compatible publish merges instead of renaming.
        let c = comp.add_node(count_class(), "", (200.0, 0.0));
        let merged = comp.publish_internal(c, "increment", "value", false).unwrap();
        assert_eq!(merged, "value");
        assert_eq!(comp.published_inputs().len(), 2);
    }

    #[test]
    fn test_transaction_coalesces_revisions() {
        let mut comp = Composition::new();
        let before = comp.revision();
        comp.begin_mutation();
        comp.add_node(count_class(), "", (0.0, 0.0));
        comp.add_node(count_class(), "", (100.0, 0.0));
        assert_eq!(comp.revision(), before);
        comp.end_mutation();
        assert_eq!(comp.revision(), before + 1);
    }

    #[test]
    fn test_types_unify() {
        assert!(types_unify("real", "real"));
        assert!(!types_unify("real", "integer"));
        assert!(types_unify("generic1", "real"));
        assert!(types_unify("list.generic1", "list.real"));
        assert!(!types_unify("generic1", "list.real"));
        assert!(types_unify("generic1", "generic2"));
    }
}
