//! Node class templates
//!
//! A node class is the immutable declaration of a node kind: its identity,
//! documentation metadata, ordered port interface, and lifecycle entry
//! points. Classes are parsed from compiled modules (`module::ModuleParser`),
//! synthesized by the specialization engine, or stood up as placeholders so
//! compositions referencing missing implementations still load.

use crate::graph::port_class::{PortCategory, PortClass, PortDirection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the event-only input present on every node class
pub const REFRESH_PORT_NAME: &str = "refresh";

/// Declared generic-type constraints from a node class's metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericTypeSpec {
    /// Specialization chosen when instantiating without an explicit choice
    pub default_type: Option<String>,
    /// Concrete innermost type names this generic accepts, in declaration order
    pub compatible_types: Vec<String>,
}

/// Descriptor for the instance data of a stateful node class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDataClass {
    /// Parameter name in the lifecycle entry functions
    pub name: String,
    /// Positional index of the instance-data parameter per entry function
    pub indices: crate::graph::port_class::EntryIndices,
}

/// An internal trigger of a subcomposition class, recovered from metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDescription {
    pub name: String,
    pub data_type: Option<String>,
    pub event_throttling: crate::graph::port_class::EventThrottling,
}

/// Which lifecycle entry functions the implementation module defines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleHooks {
    /// True when the class keeps instance data (`nodeInstanceEvent` family).
    pub stateful: bool,
    pub has_init: bool,
    pub has_fini: bool,
    pub has_trigger_start: bool,
    pub has_trigger_update: bool,
    pub has_trigger_stop: bool,
}

/// Whether a class carries a real port interface or stands in for a missing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassOrigin {
    /// Full port list recovered from a parsed implementation module.
    Substantial,
    /// Implementation missing; only the name and a signature snapshot are
    /// known. Compositions referencing the class remain loadable.
    Placeholder,
    /// Synthesized from a generic class by the specialization engine.
    Specialized,
}

/// Record of the generic class a specialized class was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecializationPedigree {
    /// Class name of the generic original
    pub generic_class_name: String,
    /// Innermost generic name -> chosen concrete innermost name
    pub substitutions: BTreeMap<String, String>,
}

/// A named, immutable node template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeClass {
    class_name: String,
    default_title: String,
    description: String,
    version: String,
    keywords: Vec<String>,
    node_set: Option<String>,
    deprecated: bool,
    example_compositions: Vec<String>,
    /// Ordered input declarations; the refresh port is always first.
    input_ports: Vec<PortClass>,
    /// Ordered output declarations; trigger ports appear only here.
    output_ports: Vec<PortClass>,
    instance_data: Option<InstanceDataClass>,
    lifecycle: LifecycleHooks,
    /// Internal trigger catalog; non-empty only for subcomposition classes.
    trigger_descriptions: Vec<TriggerDescription>,
    /// Generic-type constraints keyed by innermost generic name.
    generic_types: BTreeMap<String, GenericTypeSpec>,
    /// Module names this class needs linked in (non-generic port types).
    dependencies: BTreeSet<String>,
    origin: ClassOrigin,
    specialized_from: Option<SpecializationPedigree>,
}

impl NodeClass {
    /// Creates a substantial class. The module parser fills in ports and
    /// metadata through the `pub(crate)` mutators.
    pub(crate) fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            default_title: title_from_class_name(&class_name),
            class_name,
            description: String::new(),
            version: String::new(),
            keywords: Vec::new(),
            node_set: None,
            deprecated: false,
            example_compositions: Vec::new(),
            input_ports: vec![PortClass::event_only(REFRESH_PORT_NAME, PortDirection::Input)],
            output_ports: Vec::new(),
            instance_data: None,
            lifecycle: LifecycleHooks::default(),
            trigger_descriptions: Vec::new(),
            generic_types: BTreeMap::new(),
            dependencies: BTreeSet::new(),
            origin: ClassOrigin::Substantial,
            specialized_from: None,
        }
    }

    /// Creates a placeholder for a class whose implementation is missing.
    ///
    /// The signature snapshot (port names and any types the referencing
    /// composition mentions) is attached through the same mutators the
    /// parser uses.
    pub fn placeholder(class_name: impl Into<String>) -> Self {
        let mut class = Self::new(class_name);
        class.origin = ClassOrigin::Placeholder;
        class
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The class name rendered as an identifier for generated code.
    /// Possible characters: `[A-Za-z0-9_]`.
    pub fn class_identifier(&self) -> String {
        self.class_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    pub fn default_title(&self) -> &str {
        &self.default_title
    }

    /// Default title with any trailing ` (<n>)` counter stripped
    pub fn default_title_without_suffix(&self) -> &str {
        let title = self.default_title.as_str();
        if let Some(open) = title.rfind(" (") {
            let tail = &title[open + 2..];
            if tail.ends_with(')')
                && !tail[..tail.len() - 1].is_empty()
                && tail[..tail.len() - 1].chars().all(|c| c.is_ascii_digit())
            {
                return &title[..open];
            }
        }
        title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Declared keywords plus the automatic ones derived from the interface
    pub fn keywords(&self) -> Vec<String> {
        let mut keywords = self.keywords.clone();
        if self
            .output_ports
            .iter()
            .any(|p| p.category() == PortCategory::Trigger)
        {
            for kw in ["events", "trigger", "fire"] {
                keywords.push(kw.to_string());
            }
        }
        if self.class_name.contains(".type.") {
            keywords.push("conversion".to_string());
        }
        keywords
    }

    pub fn node_set(&self) -> Option<&str> {
        self.node_set.as_deref()
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn example_compositions(&self) -> &[String] {
        &self.example_compositions
    }

    /// Ordered input port declarations; index 0 is always the refresh port
    pub fn input_ports(&self) -> &[PortClass] {
        &self.input_ports
    }

    pub fn output_ports(&self) -> &[PortClass] {
        &self.output_ports
    }

    pub fn refresh_port(&self) -> &PortClass {
        &self.input_ports[0]
    }

    pub fn input_port(&self, name: &str) -> Option<&PortClass> {
        self.input_ports.iter().find(|p| p.name() == name)
    }

    pub fn output_port(&self, name: &str) -> Option<&PortClass> {
        self.output_ports.iter().find(|p| p.name() == name)
    }

    pub fn instance_data(&self) -> Option<&InstanceDataClass> {
        self.instance_data.as_ref()
    }

    pub fn is_stateful(&self) -> bool {
        self.lifecycle.stateful
    }

    pub fn lifecycle(&self) -> LifecycleHooks {
        self.lifecycle
    }

    /// True when this class wraps a composition rather than text code
    pub fn is_subcomposition(&self) -> bool {
        !self.trigger_descriptions.is_empty()
    }

    pub fn trigger_descriptions(&self) -> &[TriggerDescription] {
        &self.trigger_descriptions
    }

    pub fn generic_types(&self) -> &BTreeMap<String, GenericTypeSpec> {
        &self.generic_types
    }

    pub fn generic_type_spec(&self, generic_name: &str) -> Option<&GenericTypeSpec> {
        self.generic_types.get(generic_name)
    }

    /// True when any port's data type is (or contains) a generic placeholder
    pub fn is_generic(&self) -> bool {
        self.input_ports
            .iter()
            .chain(self.output_ports.iter())
            .any(|p| p.data_type().is_some_and(crate::types::is_generic_name))
    }

    /// Module names this class needs linked in
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn origin(&self) -> ClassOrigin {
        self.origin
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin == ClassOrigin::Placeholder
    }

    pub fn specialized_from(&self) -> Option<&SpecializationPedigree> {
        self.specialized_from.as_ref()
    }

    // Mutators used while a class is under construction by the module
    // parser, the composition loader, or the specialization engine. Once a
    // class is published to the catalog it is only handed out as
    // `Arc<NodeClass>` and never changes.

    pub(crate) fn set_default_title(&mut self, title: impl Into<String>) {
        self.default_title = title.into();
    }

    pub(crate) fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub(crate) fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub(crate) fn set_keywords(&mut self, keywords: Vec<String>) {
        self.keywords = keywords;
    }

    pub(crate) fn set_node_set(&mut self, node_set: Option<String>) {
        self.node_set = node_set;
    }

    pub(crate) fn set_deprecated(&mut self, deprecated: bool) {
        self.deprecated = deprecated;
    }

    pub(crate) fn set_example_compositions(&mut self, examples: Vec<String>) {
        self.example_compositions = examples;
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: LifecycleHooks) {
        self.lifecycle = lifecycle;
    }

    pub(crate) fn set_instance_data(&mut self, instance_data: Option<InstanceDataClass>) {
        self.instance_data = instance_data;
    }

    pub(crate) fn set_trigger_descriptions(&mut self, triggers: Vec<TriggerDescription>) {
        self.trigger_descriptions = triggers;
    }

    pub(crate) fn set_generic_types(&mut self, generic_types: BTreeMap<String, GenericTypeSpec>) {
        self.generic_types = generic_types;
    }

    pub(crate) fn add_dependency(&mut self, module_name: impl Into<String>) {
        self.dependencies.insert(module_name.into());
    }

    pub(crate) fn set_origin(&mut self, origin: ClassOrigin) {
        self.origin = origin;
    }

    pub(crate) fn set_specialized_from(&mut self, pedigree: Option<SpecializationPedigree>) {
        self.specialized_from = pedigree;
    }

    pub(crate) fn set_class_name(&mut self, class_name: impl Into<String>) {
        self.class_name = class_name.into();
    }

    /// Replaces the refresh declaration, keeping it first in the input list
    pub(crate) fn set_refresh_port(&mut self, port: PortClass) {
        self.input_ports[0] = port;
    }

    /// Appends an input declaration after the refresh port.
    /// Port names are unique per direction within a class.
    pub(crate) fn push_input_port(&mut self, port: PortClass) {
        debug_assert!(self.input_port(port.name()).is_none());
        self.input_ports.push(port);
    }

    pub(crate) fn push_output_port(&mut self, port: PortClass) {
        debug_assert!(self.output_port(port.name()).is_none());
        self.output_ports.push(port);
    }

    pub(crate) fn input_port_mut(&mut self, name: &str) -> Option<&mut PortClass> {
        self.input_ports.iter_mut().find(|p| p.name() == name)
    }

    pub(crate) fn output_port_mut(&mut self, name: &str) -> Option<&mut PortClass> {
        self.output_ports.iter_mut().find(|p| p.name() == name)
    }

    pub(crate) fn input_ports_mut(&mut self) -> &mut [PortClass] {
        &mut self.input_ports
    }

    pub(crate) fn output_ports_mut(&mut self) -> &mut [PortClass] {
        &mut self.output_ports
    }
}

/// Fallback display title for classes whose metadata declares none:
/// the last meaningful segment of the class name, capitalized.
fn title_from_class_name(class_name: &str) -> String {
    let segment = class_name.rsplit('.').next().unwrap_or(class_name);
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_port_is_first_input() {
        let class = NodeClass::new("vuo.math.add");
        assert_eq!(class.input_ports().len(), 1);
        assert_eq!(class.refresh_port().name(), REFRESH_PORT_NAME);
        assert_eq!(class.refresh_port().category(), PortCategory::EventOnly);
    }

    #[test]
    fn test_class_identifier_transcoding() {
        let class = NodeClass::new("vuo.math.lessThan-i64");
        assert_eq!(class.class_identifier(), "vuo_math_lessThan_i64");
    }

    #[test]
    fn test_default_title_without_suffix() {
        let mut class = NodeClass::new("vuo.math.add");
        class.set_default_title("Add (2)");
        assert_eq!(class.default_title_without_suffix(), "Add");

        class.set_default_title("Add (two)");
        assert_eq!(class.default_title_without_suffix(), "Add (two)");

        class.set_default_title("Add");
        assert_eq!(class.default_title_without_suffix(), "Add");
    }

    #[test]
    fn test_title_falls_back_to_class_name_segment() {
        let class = NodeClass::new("vuo.math.add");
        assert_eq!(class.default_title(), "Add");
    }

    #[test]
    fn test_trigger_classes_gain_automatic_keywords() {
        let mut class = NodeClass::new("vuo.time.fired");
        class.set_keywords(vec!["time".to_string()]);
        class.push_output_port(PortClass::trigger("fired", Some("real".to_string())));

        let keywords = class.keywords();
        assert!(keywords.contains(&"time".to_string()));
        assert!(keywords.contains(&"trigger".to_string()));
        assert!(keywords.contains(&"fire".to_string()));
    }

    #[test]
    fn test_typecast_classes_gain_conversion_keyword() {
        let class = NodeClass::new("vuo.type.integer.real");
        assert!(class.keywords().contains(&"conversion".to_string()));
    }

    #[test]
    fn test_generic_detection() {
        let mut class = NodeClass::new("vuo.list.get");
        class.push_input_port(PortClass::data_and_event(
            "list",
            PortDirection::Input,
            "list.generic1",
        ));
        assert!(class.is_generic());

        let plain = NodeClass::new("vuo.math.add");
        assert!(!plain.is_generic());
    }
}
