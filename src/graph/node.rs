//! Node and port instances
//!
//! A `Node` is an instance of a `NodeClass` in a composition; it owns one
//! `Port` per port class, preserving order and identity. Nodes carry no
//! execution state.

use crate::graph::node_class::NodeClass;
use crate::graph::port_class::{EventThrottling, PortCategory, PortClass, PortDirection};
use std::sync::Arc;
use uuid::Uuid;

/// An instance of a port class on a node
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    /// Name of the port class this port instantiates.
    name: String,
    direction: PortDirection,
    /// Constant value for an unconnected data-and-event input. Opaque to the
    /// core; the runtime interprets it.
    constant: Option<String>,
    /// Per-instance throttling override. Triggers only.
    event_throttling: Option<EventThrottling>,
}

impl Port {
    fn new(class: &PortClass) -> Self {
        Self {
            name: class.name().to_string(),
            direction: class.direction(),
            constant: class.details().default_value(),
            event_throttling: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// The effective constant. Only meaningful for a data-and-event input
    /// with no connected data cable.
    pub fn constant(&self) -> Option<&str> {
        self.constant.as_deref()
    }

    pub(crate) fn set_constant(&mut self, value: Option<String>) {
        self.constant = value;
    }

    /// The throttling override, if this trigger port was given one
    pub fn event_throttling_override(&self) -> Option<EventThrottling> {
        self.event_throttling
    }

    pub(crate) fn set_event_throttling(&mut self, throttling: Option<EventThrottling>) {
        self.event_throttling = throttling;
    }
}

/// An instance of a node class in a composition
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique within the owning composition.
    id: Uuid,
    class: Arc<NodeClass>,
    title: String,
    /// Canvas coordinates, passed through verbatim by the core.
    position: (f64, f64),
    /// Rendering tint, opaque to the core.
    tint: Option<String>,
    /// Collapsed-typecast rendering hint.
    collapsed: bool,
    input_ports: Vec<Port>,
    output_ports: Vec<Port>,
    /// Host node and host input port, when this node is an attachment
    /// (typecast helper or list constructor collapsed onto a host input).
    /// Attachments stay ordinary nodes for semantic purposes.
    attachment: Option<(Uuid, String)>,
    /// Identifier this node had in the composition text format, kept so a
    /// loaded composition re-serializes with the same identifiers.
    graph_ident: Option<String>,
    /// Attributes from the composition text format the core does not model;
    /// preserved verbatim on re-serialize.
    extra_attributes: Vec<(String, String)>,
}

impl Node {
    /// Instantiates a class, installing one port per port class.
    /// An empty title falls back to the class's default title.
    pub fn new(class: Arc<NodeClass>, title: &str, position: (f64, f64)) -> Self {
        let title = if title.is_empty() {
            class.default_title_without_suffix().to_string()
        } else {
            title.to_string()
        };

        let input_ports = class.input_ports().iter().map(Port::new).collect();
        let output_ports = class.output_ports().iter().map(Port::new).collect();

        Self {
            id: Uuid::new_v4(),
            class,
            title,
            position,
            tint: None,
            collapsed: false,
            input_ports,
            output_ports,
            attachment: None,
            graph_ident: None,
            extra_attributes: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn class(&self) -> &Arc<NodeClass> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        self.class.class_name()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub(crate) fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: (f64, f64)) {
        self.position = position;
    }

    pub fn tint(&self) -> Option<&str> {
        self.tint.as_deref()
    }

    pub(crate) fn set_tint(&mut self, tint: Option<String>) {
        self.tint = tint;
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub(crate) fn set_collapsed(&mut self, collapsed: bool) {
        self.collapsed = collapsed;
    }

    pub fn input_ports(&self) -> &[Port] {
        &self.input_ports
    }

    pub fn output_ports(&self) -> &[Port] {
        &self.output_ports
    }

    /// Get input port by name
    pub fn input_port(&self, name: &str) -> Option<&Port> {
        self.input_ports.iter().find(|p| p.name() == name)
    }

    pub(crate) fn input_port_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.input_ports.iter_mut().find(|p| p.name() == name)
    }

    /// Get output port by name
    pub fn output_port(&self, name: &str) -> Option<&Port> {
        self.output_ports.iter().find(|p| p.name() == name)
    }

    pub(crate) fn output_port_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.output_ports.iter_mut().find(|p| p.name() == name)
    }

    /// The declaration behind a port of this node, in either direction
    pub fn port_class(&self, name: &str) -> Option<&PortClass> {
        self.class
            .input_port(name)
            .or_else(|| self.class.output_port(name))
    }

    /// Effective throttling of a trigger port: the instance override when
    /// present, the class default otherwise. None for non-triggers.
    pub fn effective_throttling(&self, port_name: &str) -> Option<EventThrottling> {
        let class = self.class.output_port(port_name)?;
        if class.category() != PortCategory::Trigger {
            return None;
        }
        Some(
            self.output_port(port_name)
                .and_then(|p| p.event_throttling_override())
                .unwrap_or_else(|| class.default_event_throttling()),
        )
    }

    /// Host node and host input port, when this node is an attachment
    pub fn attachment_host(&self) -> Option<(Uuid, &str)> {
        self.attachment.as_ref().map(|(n, p)| (*n, p.as_str()))
    }

    pub(crate) fn set_attachment_host(&mut self, host: Option<(Uuid, String)>) {
        self.attachment = host;
    }

    pub fn graph_ident(&self) -> Option<&str> {
        self.graph_ident.as_deref()
    }

    pub(crate) fn set_graph_ident(&mut self, ident: Option<String>) {
        self.graph_ident = ident;
    }

    pub fn extra_attributes(&self) -> &[(String, String)] {
        &self.extra_attributes
    }

    pub(crate) fn push_extra_attribute(&mut self, key: String, value: String) {
        self.extra_attributes.push((key, value));
    }

    /// Swaps in a replacement class, carrying over constants, throttling
    /// overrides, and visual state for ports that exist on both classes by
    /// name. Used by the specialization engine.
    pub(crate) fn replace_class(&mut self, class: Arc<NodeClass>) {
        let old_inputs = std::mem::take(&mut self.input_ports);
        let old_outputs = std::mem::take(&mut self.output_ports);

        self.input_ports = class
            .input_ports()
            .iter()
            .map(|pc| {
                let mut port = Port::new(pc);
                if let Some(old) = old_inputs.iter().find(|p| p.name() == pc.name()) {
                    port.constant = old.constant.clone();
                }
                port
            })
            .collect();
        self.output_ports = class
            .output_ports()
            .iter()
            .map(|pc| {
                let mut port = Port::new(pc);
                if let Some(old) = old_outputs.iter().find(|p| p.name() == pc.name()) {
                    port.event_throttling = old.event_throttling;
                }
                port
            })
            .collect();
        self.class = class;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node_class::NodeClass;

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

    #[test]
    fn test_instantiation_installs_one_port_per_class() {
        let node = Node::new(add_class(), "", (0.0, 0.0));
        assert_eq!(node.input_ports().len(), 2); // refresh + values
        assert_eq!(node.output_ports().len(), 1);
        assert_eq!(node.input_ports()[0].name(), "refresh");
        assert!(node.input_port("values").is_some());
        assert!(node.output_port("sum").is_some());
    }

    #[test]
    fn test_empty_title_falls_back_to_class_default() {
        let node = Node::new(add_class(), "", (0.0, 0.0));
        assert_eq!(node.title(), "Add");

        let named = Node::new(add_class(), "Total", (0.0, 0.0));
        assert_eq!(named.title(), "Total");
    }

    #[test]
    fn test_effective_throttling_prefers_override() {
        let mut class = NodeClass::new("vuo.time.fired");
        class.push_output_port(PortClass::trigger("fired", None));
        let mut node = Node::new(Arc::new(class), "", (0.0, 0.0));

        assert_eq!(
            node.effective_throttling("fired"),
            Some(EventThrottling::Enqueue)
        );
        node.output_port_mut("fired")
            .unwrap()
            .set_event_throttling(Some(EventThrottling::Drop));
        assert_eq!(
            node.effective_throttling("fired"),
            Some(EventThrottling::Drop)
        );
        assert_eq!(node.effective_throttling("refresh"), None);
    }

    #[test]
    fn test_replace_class_preserves_constants_by_name() {
        let mut node = Node::new(add_class(), "", (0.0, 0.0));
        node.input_port_mut("values")
            .unwrap()
            .set_constant(Some("[1,2]".to_string()));

        let mut replacement = NodeClass::new("vuo.math.add.real");
        replacement.push_input_port(PortClass::data_and_event(
            "values",
            PortDirection::Input,
            "list.real",
        ));
        replacement.push_output_port(PortClass::data_and_event(
            "sum",
            PortDirection::Output,
            "real",
        ));
        node.replace_class(Arc::new(replacement));

        assert_eq!(node.class_name(), "vuo.math.add.real");
        assert_eq!(node.input_port("values").unwrap().constant(), Some("[1,2]"));
    }
}
