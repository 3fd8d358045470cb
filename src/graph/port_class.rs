//! Port declarations on a node class
//!
//! A `PortClass` is the declaration of one input or output endpoint; a
//! `Port` (see `graph::node`) is its instance on a node. The taxonomy here
//! (event-only vs. data-and-event vs. trigger, event blocking, throttling)
//! is what downstream code generation and the runtime scheduler key off.

use serde::{Deserialize, Serialize};

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Possible port categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortCategory {
    /// Carries events only; never references a value type.
    EventOnly,
    /// Carries a value and the event that delivered it; always has a type.
    DataAndEvent,
    /// An output that fires events on its own; outputs only.
    Trigger,
    /// A non-port argument such as instance data. Never instantiated on a node.
    NotAPort,
}

/// Event-blocking behavior of an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EventBlocking {
    /// An event received on this input reaches all output ports.
    #[default]
    None,
    /// An event received on this input may reach all, some, or none of the outputs.
    Door,
    /// An event received on this input never reaches any output.
    Wall,
}

impl EventBlocking {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(EventBlocking::None),
            "door" => Some(EventBlocking::Door),
            "wall" => Some(EventBlocking::Wall),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventBlocking::None => "none",
            EventBlocking::Door => "door",
            EventBlocking::Wall => "wall",
        }
    }
}

/// Event-throttling behavior of a trigger port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EventThrottling {
    /// Events fired from this port are eventually transmitted downstream.
    #[default]
    Enqueue,
    /// Events are dropped if they would have to wait on nodes downstream.
    Drop,
}

impl EventThrottling {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enqueue" => Some(EventThrottling::Enqueue),
            "drop" => Some(EventThrottling::Drop),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventThrottling::Enqueue => "enqueue",
            EventThrottling::Drop => "drop",
        }
    }
}

/// Dynamic per-port metadata, parsed from a `Details:` annotation payload.
///
/// Kept as a dynamic map so node authors can attach keys the core does not
/// model. Recognized keys: `name`, `default`, `suggestedMin`, `suggestedMax`,
/// `suggestedStep`, `eventBlocking`, `eventThrottling`, `hasPortAction`,
/// `data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortDetails(pub serde_json::Map<String, serde_json::Value>);

impl PortDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(|v| v.as_bool())
    }

    /// Human-readable display name, if the author overrode the identifier
    pub fn display_name(&self) -> Option<&str> {
        self.get_str("name")
    }

    /// Default constant value, rendered to the opaque string form the
    /// composition model stores
    pub fn default_value(&self) -> Option<String> {
        self.get("default").map(value_to_constant_string)
    }

    /// Name of the data parameter this event parameter pairs with
    pub fn data_pairing(&self) -> Option<&str> {
        self.get_str("data")
    }

    pub fn event_blocking(&self) -> Option<EventBlocking> {
        self.get_str("eventBlocking").and_then(EventBlocking::parse)
    }

    pub fn event_throttling(&self) -> Option<EventThrottling> {
        self.get_str("eventThrottling").and_then(EventThrottling::parse)
    }

    pub fn has_port_action(&self) -> Option<bool> {
        self.get_bool("hasPortAction")
    }

    /// Overlay `other`'s keys onto this map; `other` wins on collisions.
    pub(crate) fn merge(&mut self, other: &PortDetails) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

/// Renders a details value the way the runtime expects constants: strings
/// bare, everything else as its JSON text.
fn value_to_constant_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Positional index of a port's parameter in each lifecycle entry function.
///
/// A port appearing in several entries is the same port class; the indices
/// must agree with the parameter lists the code generator emits calls
/// against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryIndices {
    pub event: Option<usize>,
    pub init: Option<usize>,
    pub trigger_start: Option<usize>,
    pub trigger_update: Option<usize>,
    pub trigger_stop: Option<usize>,
}

/// A port type on a node class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortClass {
    /// The parameter's name, used as an identifier and for display.
    name: String,
    category: PortCategory,
    direction: PortDirection,
    /// Value type name for the data portion. Always present for
    /// data-and-event ports, optional for triggers, absent for event-only.
    data_type: Option<String>,
    /// Event-blocking behavior. Only applies to input ports.
    event_blocking: EventBlocking,
    /// Whether receiving an event triggers special behavior. Inputs only.
    port_action: bool,
    /// Default event-throttling behavior. Only applies to trigger ports.
    default_event_throttling: EventThrottling,
    details: PortDetails,
    /// Indices of the event portion's parameter (or the trigger parameter).
    event_indices: EntryIndices,
    /// Indices of the data portion's parameter, for data-and-event ports.
    data_indices: EntryIndices,
}

impl PortClass {
    pub fn event_only(name: impl Into<String>, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            category: PortCategory::EventOnly,
            direction,
            data_type: None,
            event_blocking: EventBlocking::None,
            port_action: false,
            default_event_throttling: EventThrottling::Enqueue,
            details: PortDetails::new(),
            event_indices: EntryIndices::default(),
            data_indices: EntryIndices::default(),
        }
    }

    pub fn data_and_event(
        name: impl Into<String>,
        direction: PortDirection,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: PortCategory::DataAndEvent,
            direction,
            data_type: Some(data_type.into()),
            event_blocking: EventBlocking::None,
            port_action: false,
            default_event_throttling: EventThrottling::Enqueue,
            details: PortDetails::new(),
            event_indices: EntryIndices::default(),
            data_indices: EntryIndices::default(),
        }
    }

    pub fn trigger(name: impl Into<String>, data_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            category: PortCategory::Trigger,
            direction: PortDirection::Output,
            data_type,
            event_blocking: EventBlocking::None,
            port_action: false,
            default_event_throttling: EventThrottling::Enqueue,
            details: PortDetails::new(),
            event_indices: EntryIndices::default(),
            data_indices: EntryIndices::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> PortCategory {
        self.category
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Value type name of the data portion, if this port carries data
    pub fn data_type(&self) -> Option<&str> {
        self.data_type.as_deref()
    }

    pub(crate) fn set_data_type(&mut self, data_type: Option<String>) {
        self.data_type = data_type;
        if self.category == PortCategory::EventOnly && self.data_type.is_some() {
            self.category = PortCategory::DataAndEvent;
        }
    }

    pub fn has_data(&self) -> bool {
        self.data_type.is_some()
    }

    pub fn event_blocking(&self) -> EventBlocking {
        self.event_blocking
    }

    pub(crate) fn set_event_blocking(&mut self, blocking: EventBlocking) {
        self.event_blocking = blocking;
    }

    pub fn has_port_action(&self) -> bool {
        self.port_action
    }

    pub(crate) fn set_port_action(&mut self, port_action: bool) {
        self.port_action = port_action;
    }

    pub fn default_event_throttling(&self) -> EventThrottling {
        self.default_event_throttling
    }

    pub(crate) fn set_default_event_throttling(&mut self, throttling: EventThrottling) {
        self.default_event_throttling = throttling;
    }

    pub fn details(&self) -> &PortDetails {
        &self.details
    }

    pub(crate) fn details_mut(&mut self) -> &mut PortDetails {
        &mut self.details
    }

    /// Display name: the `name` details key when present, the identifier otherwise
    pub fn display_name(&self) -> &str {
        self.details.display_name().unwrap_or(&self.name)
    }

    /// Parameter indices of the event portion (or trigger parameter)
    pub fn event_indices(&self) -> EntryIndices {
        self.event_indices
    }

    pub(crate) fn event_indices_mut(&mut self) -> &mut EntryIndices {
        &mut self.event_indices
    }

    /// Parameter indices of the data portion, for data-and-event ports
    pub fn data_indices(&self) -> EntryIndices {
        self.data_indices
    }

    pub(crate) fn data_indices_mut(&mut self) -> &mut EntryIndices {
        &mut self.data_indices
    }
}
