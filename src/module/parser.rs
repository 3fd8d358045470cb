//! Recovering a node class from a module IR
//!
//! The parser walks the entry functions in a fixed order (event, init,
//! trigger start, trigger update, trigger stop), merging the annotated
//! parameters of each into one port interface. A port appearing in several
//! entries is the same port class; the parser records the positional index
//! it occupies in each entry so the code generator can call the entries with
//! correctly shaped argument lists.

use crate::graph::node_class::{
    ClassOrigin, InstanceDataClass, LifecycleHooks, NodeClass, REFRESH_PORT_NAME,
};
use crate::graph::port_class::{
    EntryIndices, EventBlocking, PortCategory, PortClass, PortDetails, PortDirection,
};
use crate::module::annotation::{Annotation, Role};
use crate::module::ir::{self, FunctionIr, ModuleIr};
use crate::module::metadata::ModuleMetadata;
use crate::types::{self, TypeRegistry};
use crate::ModuleError;

/// How a parameter role is accepted in one entry function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Required,
    Optional,
    Disallowed,
}

/// Acceptance of each parameter role in one entry function
#[derive(Debug, Clone, Copy)]
struct Acceptance {
    input_data: Presence,
    output_data: Presence,
    input_event: Presence,
    output_event: Presence,
    output_trigger: Presence,
    instance_data: Presence,
}

impl Acceptance {
    fn of(&self, role: Role) -> Presence {
        match role {
            Role::InputData => self.input_data,
            Role::OutputData => self.output_data,
            Role::InputEvent => self.input_event,
            Role::OutputEvent => self.output_event,
            Role::OutputTrigger => self.output_trigger,
            Role::InstanceData => self.instance_data,
        }
    }
}

/// Which lifecycle entry a function is, for index bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Event,
    Init,
    TriggerStart,
    TriggerUpdate,
    TriggerStop,
}

impl Entry {
    fn slot(self, indices: &mut EntryIndices) -> &mut Option<usize> {
        match self {
            Entry::Event => &mut indices.event,
            Entry::Init => &mut indices.init,
            Entry::TriggerStart => &mut indices.trigger_start,
            Entry::TriggerUpdate => &mut indices.trigger_update,
            Entry::TriggerStop => &mut indices.trigger_stop,
        }
    }
}

/// One classified parameter
#[derive(Debug)]
struct ParsedParam {
    name: String,
    index: usize,
    by_pointer: bool,
    role: Option<Role>,
    /// `Some(None)` is an explicit `Type:void`.
    type_name: Option<Option<String>>,
    details: PortDetails,
}

/// Parses node classes out of module IR, interning value types as it goes
pub struct ModuleParser<'a> {
    registry: &'a TypeRegistry,
}

impl<'a> ModuleParser<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self { registry }
    }

    /// Recover the node class a module defines.
    ///
    /// Returns `ModuleError::NotANodeClass` when the module defines neither
    /// event entry symbol (the caller may discard it silently), and
    /// `ModuleError::Malformed` when it does but the declarations are
    /// inconsistent.
    pub fn parse(&self, module: &ModuleIr) -> Result<NodeClass, ModuleError> {
        let event_function = if let Some(f) = module.function(ir::NODE_EVENT) {
            f
        } else if let Some(f) = module.function(ir::NODE_INSTANCE_EVENT) {
            f
        } else {
            log::debug!("Module '{}' defines no node class", module.key);
            return Err(ModuleError::NotANodeClass(module.key.clone()));
        };
        let stateful = event_function.name == ir::NODE_INSTANCE_EVENT;

        let metadata = ModuleMetadata::parse(&module.key, &module.metadata);
        let mut class = NodeClass::new(&module.key);
        if !metadata.title.is_empty() {
            class.set_default_title(&metadata.title);
        }
        class.set_description(&metadata.description);
        class.set_version(&metadata.version);
        class.set_keywords(metadata.keywords.clone());
        class.set_node_set(metadata.node_set.clone());
        class.set_deprecated(metadata.is_deprecated);
        class.set_example_compositions(metadata.example_compositions.clone());
        class.set_generic_types(metadata.generic_type_specs());
        class.set_trigger_descriptions(metadata.trigger_descriptions());

        self.parse_function(
            &mut class,
            module,
            event_function,
            Entry::Event,
            Acceptance {
                input_data: Presence::Optional,
                output_data: Presence::Optional,
                input_event: Presence::Optional,
                output_event: Presence::Optional,
                output_trigger: Presence::Optional,
                instance_data: if stateful {
                    Presence::Required
                } else {
                    Presence::Disallowed
                },
            },
        )?;

        let mut lifecycle = LifecycleHooks {
            stateful,
            has_init: false,
            has_fini: module.function(ir::NODE_INSTANCE_FINI).is_some(),
            has_trigger_start: false,
            has_trigger_update: false,
            has_trigger_stop: false,
        };

        if stateful {
            if let Some(f) = module.function(ir::NODE_INSTANCE_INIT) {
                lifecycle.has_init = true;
                self.parse_function(
                    &mut class,
                    module,
                    f,
                    Entry::Init,
                    Acceptance {
                        input_data: Presence::Optional,
                        output_data: Presence::Disallowed,
                        input_event: Presence::Disallowed,
                        output_event: Presence::Disallowed,
                        output_trigger: Presence::Disallowed,
                        instance_data: Presence::Disallowed,
                    },
                )?;
            }
            if let Some(f) = module.function(ir::NODE_INSTANCE_TRIGGER_START) {
                lifecycle.has_trigger_start = true;
                self.parse_function(
                    &mut class,
                    module,
                    f,
                    Entry::TriggerStart,
                    Acceptance {
                        input_data: Presence::Optional,
                        output_data: Presence::Disallowed,
                        input_event: Presence::Disallowed,
                        output_event: Presence::Disallowed,
                        output_trigger: Presence::Optional,
                        instance_data: Presence::Required,
                    },
                )?;
            }
            if let Some(f) = module.function(ir::NODE_INSTANCE_TRIGGER_UPDATE) {
                lifecycle.has_trigger_update = true;
                self.parse_function(
                    &mut class,
                    module,
                    f,
                    Entry::TriggerUpdate,
                    Acceptance {
                        input_data: Presence::Optional,
                        output_data: Presence::Disallowed,
                        input_event: Presence::Disallowed,
                        output_event: Presence::Disallowed,
                        output_trigger: Presence::Optional,
                        instance_data: Presence::Required,
                    },
                )?;
            }
            if let Some(f) = module.function(ir::NODE_INSTANCE_TRIGGER_STOP) {
                lifecycle.has_trigger_stop = true;
                self.parse_function(
                    &mut class,
                    module,
                    f,
                    Entry::TriggerStop,
                    Acceptance {
                        input_data: Presence::Disallowed,
                        output_data: Presence::Disallowed,
                        input_event: Presence::Disallowed,
                        output_event: Presence::Disallowed,
                        output_trigger: Presence::Optional,
                        instance_data: Presence::Required,
                    },
                )?;
            }

            if !lifecycle.has_init || !lifecycle.has_fini {
                return Err(ModuleError::Malformed {
                    module: module.key.clone(),
                    reason: format!(
                        "stateful node class is missing {}",
                        if lifecycle.has_init {
                            ir::NODE_INSTANCE_FINI
                        } else {
                            ir::NODE_INSTANCE_INIT
                        }
                    ),
                });
            }
        }

        let has_triggers = class
            .output_ports()
            .iter()
            .any(|p| p.category() == PortCategory::Trigger);
        if stateful && has_triggers && !lifecycle.has_trigger_stop {
            return Err(ModuleError::Malformed {
                module: module.key.clone(),
                reason: format!(
                    "trigger ports are declared but {} is missing",
                    ir::NODE_INSTANCE_TRIGGER_STOP
                ),
            });
        }
        class.set_lifecycle(lifecycle);

        self.apply_port_policies(&mut class);
        self.record_dependencies(&mut class);
        class.set_origin(ClassOrigin::Substantial);

        log::info!(
            "Parsed node class '{}' ({} inputs, {} outputs{})",
            class.class_name(),
            class.input_ports().len(),
            class.output_ports().len(),
            if class.is_stateful() { ", stateful" } else { "" }
        );
        Ok(class)
    }

    /// Walk one entry function's parameters into the class under construction
    fn parse_function(
        &self,
        class: &mut NodeClass,
        module: &ModuleIr,
        function: &FunctionIr,
        entry: Entry,
        acceptance: Acceptance,
    ) -> Result<(), ModuleError> {
        let params = self.classify_parameters(module, function)?;

        // Check that all required roles and no disallowed roles are present.
        for role in [
            Role::InputData,
            Role::OutputData,
            Role::InputEvent,
            Role::OutputEvent,
            Role::OutputTrigger,
            Role::InstanceData,
        ] {
            let saw = params.iter().any(|p| p.role == Some(role));
            match acceptance.of(role) {
                Presence::Required if !saw => {
                    return Err(ModuleError::Malformed {
                        module: module.key.clone(),
                        reason: format!("{} is required in {}", role.as_str(), function.name),
                    });
                }
                Presence::Disallowed if saw => {
                    return Err(ModuleError::Malformed {
                        module: module.key.clone(),
                        reason: format!("{} is not allowed in {}", role.as_str(), function.name),
                    });
                }
                _ => {}
            }
        }

        // Outputs and instance data are written through, so they must be
        // declared by pointer.
        for param in &params {
            if let Some(role) = param.role {
                if role.requires_pointer() && !param.by_pointer {
                    return Err(ModuleError::Malformed {
                        module: module.key.clone(),
                        reason: format!(
                            "{} parameter '{}' must be a pointer",
                            role.as_str(),
                            param.name
                        ),
                    });
                }
            }
        }

        // The event portion of a data-and-event port is renamed to the data
        // parameter it pairs with (`Details.data`), merging the two into one
        // port. Work out each event parameter's final port name up front.
        let port_name_of_event = |p: &ParsedParam| -> String {
            p.details
                .data_pairing()
                .map(String::from)
                .unwrap_or_else(|| p.name.clone())
        };

        // Data parameters first: they name the port and carry its type.
        for param in params.iter().filter(|p| {
            matches!(p.role, Some(Role::InputData) | Some(Role::OutputData))
        }) {
            let direction = if param.role == Some(Role::InputData) {
                PortDirection::Input
            } else {
                PortDirection::Output
            };
            let type_name = match param.type_name.clone().flatten() {
                Some(t) => t,
                None => {
                    return Err(ModuleError::Malformed {
                        module: module.key.clone(),
                        reason: format!("data parameter '{}' has no value type", param.name),
                    });
                }
            };
            self.intern_type(class, &type_name);

            let existing = self.existing_port(class, &param.name, direction, module)?;
            match existing {
                Some(port_name) => {
                    let pc = port_class_mut(class, direction, &port_name);
                    *entry.slot(pc.data_indices_mut()) = Some(param.index);
                }
                None => {
                    let mut pc = PortClass::data_and_event(&param.name, direction, &type_name);
                    pc.details_mut().merge(&param.details);
                    *entry.slot(pc.data_indices_mut()) = Some(param.index);

                    // Fold in the event portion declared in this function.
                    if let Some(event_param) = params.iter().find(|p| {
                        p.role
                            .is_some_and(|r| matches!(r, Role::InputEvent | Role::OutputEvent))
                            && r_direction(p.role.unwrap()) == direction
                            && port_name_of_event(p) == param.name
                    }) {
                        pc.details_mut().merge(&event_param.details);
                        *entry.slot(pc.event_indices_mut()) = Some(event_param.index);
                    }

                    push_port(class, direction, pc);
                }
            }
        }

        // Event parameters that didn't pair with a data parameter above.
        for param in params.iter().filter(|p| {
            matches!(p.role, Some(Role::InputEvent) | Some(Role::OutputEvent))
        }) {
            let direction = r_direction(param.role.unwrap());
            let port_name = port_name_of_event(param);

            if param.details.data_pairing().is_some() {
                // Paired: the data arm has already recorded this parameter
                // when the pair was created in this function; for a port
                // created by an earlier function, just record the index.
                if let Some(existing) = self.existing_port(class, &port_name, direction, module)? {
                    let pc = port_class_mut(class, direction, &existing);
                    if entry.slot(pc.event_indices_mut()).is_none() {
                        *entry.slot(pc.event_indices_mut()) = Some(param.index);
                    }
                }
                continue;
            }

            match self.existing_port(class, &port_name, direction, module)? {
                Some(existing) => {
                    let pc = port_class_mut(class, direction, &existing);
                    *entry.slot(pc.event_indices_mut()) = Some(param.index);
                }
                None => {
                    let mut pc = PortClass::event_only(&port_name, direction);
                    pc.details_mut().merge(&param.details);
                    if let Some(Some(type_name)) = param.type_name.clone() {
                        self.intern_type(class, &type_name);
                        pc.set_data_type(Some(type_name));
                    }
                    *entry.slot(pc.event_indices_mut()) = Some(param.index);

                    if direction == PortDirection::Input && port_name == REFRESH_PORT_NAME {
                        class.set_refresh_port(pc);
                    } else {
                        push_port(class, direction, pc);
                    }
                }
            }
        }

        // Triggers.
        for param in params.iter().filter(|p| p.role == Some(Role::OutputTrigger)) {
            match self.existing_port(class, &param.name, PortDirection::Output, module)? {
                Some(existing) => {
                    let pc = port_class_mut(class, PortDirection::Output, &existing);
                    *entry.slot(pc.event_indices_mut()) = Some(param.index);
                }
                None => {
                    let type_name = param.type_name.clone().flatten();
                    if let Some(t) = &type_name {
                        self.intern_type(class, t);
                    }
                    let mut pc = PortClass::trigger(&param.name, type_name);
                    pc.details_mut().merge(&param.details);
                    *entry.slot(pc.event_indices_mut()) = Some(param.index);
                    class.push_output_port(pc);
                }
            }
        }

        // Instance data.
        for param in params.iter().filter(|p| p.role == Some(Role::InstanceData)) {
            let mut data = class.instance_data().cloned().unwrap_or(InstanceDataClass {
                name: param.name.clone(),
                indices: EntryIndices::default(),
            });
            *entry.slot(&mut data.indices) = Some(param.index);
            class.set_instance_data(Some(data));
        }

        Ok(())
    }

    /// Classify one function's parameters from their raw annotations
    fn classify_parameters(
        &self,
        module: &ModuleIr,
        function: &FunctionIr,
    ) -> Result<Vec<ParsedParam>, ModuleError> {
        let mut params = Vec::with_capacity(function.parameters.len());
        for (index, raw) in function.parameters.iter().enumerate() {
            let mut parsed = ParsedParam {
                name: raw.name.clone(),
                index,
                by_pointer: raw.by_pointer,
                role: None,
                type_name: None,
                details: PortDetails::new(),
            };
            for annotation in &raw.annotations {
                match Annotation::parse(annotation, &module.key)? {
                    Some(Annotation::Role(role)) => {
                        if parsed.role.is_some() {
                            return Err(ModuleError::Malformed {
                                module: module.key.clone(),
                                reason: format!(
                                    "parameter '{}' in {} has more than one role annotation",
                                    raw.name, function.name
                                ),
                            });
                        }
                        parsed.role = Some(role);
                    }
                    Some(Annotation::Type(type_name)) => parsed.type_name = Some(type_name),
                    Some(Annotation::Details(value)) => {
                        if let Some(details) = PortDetails::from_value(value) {
                            parsed.details.merge(&details);
                        }
                    }
                    None => {}
                }
            }
            params.push(parsed);
        }
        Ok(params)
    }

    /// Finds a port class already declared under `name`. A name declared as
    /// an input in one function and an output in another is a hard error.
    fn existing_port(
        &self,
        class: &NodeClass,
        name: &str,
        direction: PortDirection,
        module: &ModuleIr,
    ) -> Result<Option<String>, ModuleError> {
        let in_inputs = class.input_port(name).is_some();
        let in_outputs = class.output_port(name).is_some();
        match direction {
            PortDirection::Input if in_outputs => Err(ModuleError::Malformed {
                module: module.key.clone(),
                reason: format!(
                    "port '{}' is declared as an input port in one function and an output port in another",
                    name
                ),
            }),
            PortDirection::Output if in_inputs => Err(ModuleError::Malformed {
                module: module.key.clone(),
                reason: format!(
                    "port '{}' is declared as an input port in one function and an output port in another",
                    name
                ),
            }),
            PortDirection::Input => Ok(in_inputs.then(|| name.to_string())),
            PortDirection::Output => Ok(in_outputs.then(|| name.to_string())),
        }
    }

    /// Interns a port type, wiring generic placeholders to the class's
    /// declared constraints (with the list prefix carried onto them)
    fn intern_type(&self, class: &NodeClass, type_name: &str) {
        if types::is_generic_name(type_name) {
            let innermost = types::innermost_name(type_name).to_string();
            let spec = class.generic_type_spec(&innermost).cloned().unwrap_or_default();
            let prefix_len = type_name.len() - innermost.len();
            let prefix = &type_name[..prefix_len];
            let compatible = spec
                .compatible_types
                .iter()
                .map(|t| format!("{}{}", prefix, t))
                .collect();
            let default = spec.default_type.as_ref().map(|t| format!("{}{}", prefix, t));
            self.registry.intern_generic(type_name, compatible, default);
            if !prefix.is_empty() {
                let inner_compat = spec.compatible_types.clone();
                self.registry
                    .intern_generic(&innermost, inner_compat, spec.default_type.clone());
            }
        } else {
            self.registry.intern(type_name);
        }
    }

    /// Event blocking, throttling, and the port-action default, applied once
    /// the full interface is known
    fn apply_port_policies(&self, class: &mut NodeClass) {
        for pc in class.input_ports_mut() {
            if pc.name() == REFRESH_PORT_NAME {
                continue;
            }
            let declared_blocking = pc.details().get_str("eventBlocking").map(String::from);
            let explicit_none = match declared_blocking.as_deref() {
                Some(s) => match EventBlocking::parse(s) {
                    Some(blocking) => {
                        pc.set_event_blocking(blocking);
                        blocking == EventBlocking::None
                    }
                    None => {
                        log::warn!("Unknown option for \"eventBlocking\": {}", s);
                        false
                    }
                },
                None => false,
            };

            // A non-refresh input defaults to a port action when it has no
            // attached data or asked for eventBlocking none explicitly.
            match pc.details().has_port_action() {
                Some(has) => pc.set_port_action(has),
                None => {
                    if !pc.has_data() || explicit_none {
                        pc.set_port_action(true);
                    }
                }
            }
        }

        for pc in class.output_ports_mut() {
            if pc.category() != PortCategory::Trigger {
                continue;
            }
            if let Some(s) = pc.details().get_str("eventThrottling") {
                match crate::graph::port_class::EventThrottling::parse(s) {
                    Some(throttling) => pc.set_default_event_throttling(throttling),
                    None => log::warn!("Unknown option for \"eventThrottling\": {}", s),
                }
            }
        }
    }

    /// Non-generic port types become build dependencies the surrounding
    /// collaborator links against
    fn record_dependencies(&self, class: &mut NodeClass) {
        let mut deps = Vec::new();
        for pc in class.input_ports().iter().chain(class.output_ports()) {
            if let Some(type_name) = pc.data_type() {
                if !types::is_generic_name(type_name) {
                    deps.push(type_name.to_string());
                    deps.push(types::innermost_name(type_name).to_string());
                }
            }
        }
        for dep in deps {
            class.add_dependency(dep);
        }
    }
}

fn r_direction(role: Role) -> PortDirection {
    if role.is_input() {
        PortDirection::Input
    } else {
        PortDirection::Output
    }
}

fn port_class_mut<'c>(
    class: &'c mut NodeClass,
    direction: PortDirection,
    name: &str,
) -> &'c mut PortClass {
    match direction {
        PortDirection::Input => class.input_port_mut(name),
        PortDirection::Output => class.output_port_mut(name),
    }
    .expect("port existence checked by caller")
}

fn push_port(class: &mut NodeClass, direction: PortDirection, port: PortClass) {
    match direction {
        PortDirection::Input => class.push_input_port(port),
        PortDirection::Output => class.push_output_port(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ir::ParameterIr;

    fn parse(module: &ModuleIr) -> Result<NodeClass, ModuleError> {
        let registry = TypeRegistry::new();
        ModuleParser::new(&registry).parse(module)
    }

    /// A stateless add node: one data-and-event input, one data-and-event output.
    fn add_module() -> ModuleIr {
        ModuleIr::new("vuo.math.add")
            .with_metadata(serde_json::json!({
                "title": "Add",
                "version": "2.0.0",
                "keywords": ["sum", "+"],
            }))
            .with_function(FunctionIr::new(
                ir::NODE_EVENT,
                vec![
                    ParameterIr::new(
                        "values",
                        false,
                        vec!["InputData", "Type:list.real", r#"Details:{"default":[]}"#],
                    ),
                    ParameterIr::new("sum", true, vec!["OutputData", "Type:real"]),
                ],
            ))
    }

    #[test]
    fn test_stateless_class() {
        let class = parse(&add_module()).unwrap();
        assert_eq!(class.class_name(), "vuo.math.add");
        assert_eq!(class.default_title(), "Add");
        assert_eq!(class.version(), "2.0.0");
        assert!(!class.is_stateful());

        assert_eq!(class.input_ports().len(), 2);
        assert_eq!(class.input_ports()[0].name(), "refresh");
        let values = class.input_port("values").unwrap();
        assert_eq!(values.category(), PortCategory::DataAndEvent);
        assert_eq!(values.data_type(), Some("list.real"));
        assert_eq!(values.data_indices().event, Some(0));

        let sum = class.output_port("sum").unwrap();
        assert_eq!(sum.data_type(), Some("real"));
        assert_eq!(sum.data_indices().event, Some(1));
    }

    #[test]
    fn test_not_a_node_class() {
        let module = ModuleIr::new("vuo.someLibrary");
        assert!(matches!(parse(&module), Err(ModuleError::NotANodeClass(_))));
    }

    #[test]
    fn test_data_event_pairing() {
        let module = ModuleIr::new("vuo.logic.became.true").with_function(FunctionIr::new(
            ir::NODE_EVENT,
            vec![
                ParameterIr::new("value", false, vec!["InputData", "Type:boolean"]),
                ParameterIr::new(
                    "valueEvent",
                    false,
                    vec!["InputEvent", r#"Details:{"eventBlocking":"door","data":"value"}"#],
                ),
                ParameterIr::new("becameTrue", true, vec!["OutputEvent"]),
            ],
        ));

        let class = parse(&module).unwrap();
        // The event portion merged into the data port under the data name.
        assert_eq!(class.input_ports().len(), 2);
        let value = class.input_port("value").unwrap();
        assert_eq!(value.category(), PortCategory::DataAndEvent);
        assert_eq!(value.event_blocking(), EventBlocking::Door);
        assert_eq!(value.data_indices().event, Some(0));
        assert_eq!(value.event_indices().event, Some(1));

        let out = class.output_port("becameTrue").unwrap();
        assert_eq!(out.category(), PortCategory::EventOnly);
    }

    #[test]
    fn test_output_by_value_is_malformed() {
        let module = ModuleIr::new("vuo.test.bad").with_function(FunctionIr::new(
            ir::NODE_EVENT,
            vec![ParameterIr::new("out", false, vec!["OutputData", "Type:real"])],
        ));
        assert!(matches!(parse(&module), Err(ModuleError::Malformed { .. })));
    }

    #[test]
    fn test_disallowed_tag_is_malformed() {
        // Instance data in a stateless event function.
        let module = ModuleIr::new("vuo.test.bad").with_function(FunctionIr::new(
            ir::NODE_EVENT,
            vec![ParameterIr::new("ctx", true, vec!["InstanceData"])],
        ));
        assert!(matches!(parse(&module), Err(ModuleError::Malformed { .. })));
    }

    fn stateful_module() -> ModuleIr {
        ModuleIr::new("vuo.time.firePeriodically")
            .with_metadata(serde_json::json!({"title": "Fire Periodically"}))
            .with_function(FunctionIr::new(
                ir::NODE_INSTANCE_EVENT,
                vec![
                    ParameterIr::new("ctx", true, vec!["InstanceData"]),
                    ParameterIr::new("seconds", false, vec!["InputData", "Type:real"]),
                    ParameterIr::new(
                        "fired",
                        true,
                        vec!["OutputTrigger", r#"Details:{"eventThrottling":"drop"}"#],
                    ),
                ],
            ))
            .with_function(FunctionIr::new(
                ir::NODE_INSTANCE_INIT,
                vec![ParameterIr::new("seconds", false, vec!["InputData", "Type:real"])],
            ))
            .with_function(FunctionIr::new(ir::NODE_INSTANCE_FINI, vec![]))
            .with_function(FunctionIr::new(
                ir::NODE_INSTANCE_TRIGGER_START,
                vec![
                    ParameterIr::new("ctx", true, vec!["InstanceData"]),
                    ParameterIr::new("seconds", false, vec!["InputData", "Type:real"]),
                    ParameterIr::new("fired", true, vec!["OutputTrigger"]),
                ],
            ))
            .with_function(FunctionIr::new(
                ir::NODE_INSTANCE_TRIGGER_STOP,
                vec![
                    ParameterIr::new("ctx", true, vec!["InstanceData"]),
                    ParameterIr::new("fired", true, vec!["OutputTrigger"]),
                ],
            ))
    }

    #[test]
    fn test_stateful_class_with_trigger() {
        let class = parse(&stateful_module()).unwrap();
        assert!(class.is_stateful());
        assert!(class.lifecycle().has_init);
        assert!(class.lifecycle().has_fini);
        assert!(class.lifecycle().has_trigger_start);
        assert!(class.lifecycle().has_trigger_stop);

        let instance = class.instance_data().unwrap();
        assert_eq!(instance.name, "ctx");
        assert_eq!(instance.indices.event, Some(0));
        assert_eq!(instance.indices.trigger_start, Some(0));
        assert_eq!(instance.indices.trigger_stop, Some(0));

        // The same port class is shared across entries, with per-entry indices.
        let seconds = class.input_port("seconds").unwrap();
        assert_eq!(seconds.data_indices().event, Some(1));
        assert_eq!(seconds.data_indices().init, Some(0));
        assert_eq!(seconds.data_indices().trigger_start, Some(1));

        let fired = class.output_port("fired").unwrap();
        assert_eq!(fired.category(), PortCategory::Trigger);
        assert_eq!(
            fired.default_event_throttling(),
            crate::graph::port_class::EventThrottling::Drop
        );
        assert_eq!(fired.event_indices().event, Some(2));
        assert_eq!(fired.event_indices().trigger_start, Some(2));
        assert_eq!(fired.event_indices().trigger_stop, Some(1));
    }

    #[test]
    fn test_stateful_missing_fini_is_malformed() {
        let mut module = stateful_module();
        module.functions.retain(|f| f.name != ir::NODE_INSTANCE_FINI);
        let err = parse(&module).unwrap_err();
        match err {
            ModuleError::Malformed { reason, .. } => assert!(reason.contains("nodeInstanceFini")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_trigger_without_stop_is_malformed() {
        let mut module = stateful_module();
        module
            .functions
            .retain(|f| f.name != ir::NODE_INSTANCE_TRIGGER_STOP);
        assert!(matches!(parse(&module), Err(ModuleError::Malformed { .. })));
    }

    #[test]
    fn test_input_output_conflict_is_malformed() {
        let module = ModuleIr::new("vuo.test.conflict")
            .with_function(FunctionIr::new(
                ir::NODE_INSTANCE_EVENT,
                vec![
                    ParameterIr::new("ctx", true, vec!["InstanceData"]),
                    ParameterIr::new("x", true, vec!["OutputData", "Type:real"]),
                ],
            ))
            .with_function(FunctionIr::new(ir::NODE_INSTANCE_INIT, vec![
                ParameterIr::new("x", false, vec!["InputData", "Type:real"]),
            ]))
            .with_function(FunctionIr::new(ir::NODE_INSTANCE_FINI, vec![]));
        assert!(matches!(parse(&module), Err(ModuleError::Malformed { .. })));
    }

    #[test]
    fn test_port_action_defaults() {
        let module = ModuleIr::new("vuo.test.actions").with_function(FunctionIr::new(
            ir::NODE_EVENT,
            vec![
                // Event-only input with no details: port action by default.
                ParameterIr::new("reset", false, vec!["InputEvent"]),
                // Data input with no blocking declared: no port action.
                ParameterIr::new("width", false, vec!["InputData", "Type:real"]),
                // Data input with explicit eventBlocking none: port action.
                ParameterIr::new(
                    "uri",
                    false,
                    vec!["InputData", "Type:text", r#"Details:{"eventBlocking":"none"}"#],
                ),
                // Explicit hasPortAction wins over the default.
                ParameterIr::new(
                    "step",
                    false,
                    vec!["InputEvent", r#"Details:{"hasPortAction":false}"#],
                ),
            ],
        ));

        let class = parse(&module).unwrap();
        assert!(class.input_port("reset").unwrap().has_port_action());
        assert!(!class.input_port("width").unwrap().has_port_action());
        assert!(class.input_port("uri").unwrap().has_port_action());
        assert!(!class.input_port("step").unwrap().has_port_action());
        // The refresh port never has a port action.
        assert!(!class.refresh_port().has_port_action());
    }

    #[test]
    fn test_generic_types_interned_with_constraints() {
        let registry = TypeRegistry::new();
        let module = ModuleIr::new("vuo.list.get")
            .with_metadata(serde_json::json!({
                "title": "Get Item from List",
                "genericTypes": {
                    "generic1": {"defaultType": "real", "compatibleTypes": ["real", "integer"]}
                }
            }))
            .with_function(FunctionIr::new(
                ir::NODE_EVENT,
                vec![
                    ParameterIr::new("list", false, vec!["InputData", "Type:list.generic1"]),
                    ParameterIr::new("which", false, vec!["InputData", "Type:integer"]),
                    ParameterIr::new("item", true, vec!["OutputData", "Type:generic1"]),
                ],
            ));

        let class = ModuleParser::new(&registry).parse(&module).unwrap();
        assert!(class.is_generic());

        let list_generic = registry.lookup("list.generic1").unwrap();
        assert_eq!(
            list_generic.compatible_specializations(),
            ["list.real", "list.integer"]
        );
        assert_eq!(list_generic.default_specialization(), Some("list.real"));

        let generic = registry.lookup("generic1").unwrap();
        assert_eq!(generic.compatible_specializations(), ["real", "integer"]);

        // Non-generic types become dependencies; generic ones don't.
        assert!(class.dependencies().contains("integer"));
        assert!(!class.dependencies().contains("generic1"));
        assert!(!class.dependencies().contains("list.generic1"));
    }

    #[test]
    fn test_unknown_annotations_are_ignored() {
        let module = ModuleIr::new("vuo.test.future").with_function(FunctionIr::new(
            ir::NODE_EVENT,
            vec![ParameterIr::new(
                "x",
                false,
                vec!["InputData", "Type:real", "SomeFutureTag:payload"],
            )],
        ));
        let class = parse(&module).unwrap();
        assert!(class.input_port("x").is_some());
    }
}
