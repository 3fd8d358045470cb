//! The module IR stream: the contract between the core and whatever
//! toolchain reads compiled implementation modules
//!
//! The core never touches object files. The surrounding collaborator parses
//! a compiled module and hands over this structure: the module key, the
//! module-level metadata JSON, and per entry function the annotated
//! parameter list in positional order. The shape is serde-loadable so the
//! stream can cross a process boundary as JSON.

use serde::{Deserialize, Serialize};

/// Entry symbol of a stateless node class
pub const NODE_EVENT: &str = "nodeEvent";
/// Entry symbol of a stateful node class
pub const NODE_INSTANCE_EVENT: &str = "nodeInstanceEvent";
/// Allocates instance data; required for stateful classes
pub const NODE_INSTANCE_INIT: &str = "nodeInstanceInit";
/// Releases instance data; required for stateful classes
pub const NODE_INSTANCE_FINI: &str = "nodeInstanceFini";
/// Starts background triggers
pub const NODE_INSTANCE_TRIGGER_START: &str = "nodeInstanceTriggerStart";
/// Updates triggers after an input change
pub const NODE_INSTANCE_TRIGGER_UPDATE: &str = "nodeInstanceTriggerUpdate";
/// Stops background triggers; required when triggers are declared
pub const NODE_INSTANCE_TRIGGER_STOP: &str = "nodeInstanceTriggerStop";

/// One annotated parameter of an entry function.
///
/// The positional index is the parameter's position in the containing
/// `FunctionIr::parameters` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterIr {
    /// Parameter name as written in the implementation source
    pub name: String,
    /// True when the parameter is passed by pointer. Output data, output
    /// events, triggers, and instance data must be.
    #[serde(default)]
    pub by_pointer: bool,
    /// Raw annotation strings, `tag` or `tag:payload`
    #[serde(default)]
    pub annotations: Vec<String>,
}

impl ParameterIr {
    pub fn new(name: impl Into<String>, by_pointer: bool, annotations: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            by_pointer,
            annotations: annotations.into_iter().map(String::from).collect(),
        }
    }
}

/// One entry function of a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionIr {
    /// Entry symbol name (`nodeEvent`, `nodeInstanceInit`, ...)
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterIr>,
}

impl FunctionIr {
    pub fn new(name: impl Into<String>, parameters: Vec<ParameterIr>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
}

/// A compiled implementation module, reduced to what the core consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleIr {
    /// Module key; becomes the node class name.
    pub key: String,
    /// Module-level metadata JSON (`title`, `version`, `genericTypes`, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub functions: Vec<FunctionIr>,
}

impl ModuleIr {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            metadata: serde_json::Value::Null,
            functions: Vec::new(),
        }
    }

    /// Load a module IR from its JSON interchange form
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn function(&self, symbol: &str) -> Option<&FunctionIr> {
        self.functions.iter().find(|f| f.name == symbol)
    }

    /// A module is a node class when it defines either event entry symbol
    pub fn is_node_class(&self) -> bool {
        self.function(NODE_EVENT).is_some() || self.function(NODE_INSTANCE_EVENT).is_some()
    }

    /// Builder-style helpers used heavily by tests

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_function(mut self, function: FunctionIr) -> Self {
        self.functions.push(function);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_class_detection() {
        let stateless = ModuleIr::new("vuo.math.add")
            .with_function(FunctionIr::new(NODE_EVENT, vec![]));
        assert!(stateless.is_node_class());

        let stateful = ModuleIr::new("vuo.time.fired")
            .with_function(FunctionIr::new(NODE_INSTANCE_EVENT, vec![]));
        assert!(stateful.is_node_class());

        let library = ModuleIr::new("vuo.someLibrary");
        assert!(!library.is_node_class());
    }

    #[test]
    fn test_json_round_trip() {
        let ir = ModuleIr::new("vuo.math.add")
            .with_metadata(serde_json::json!({"title": "Add"}))
            .with_function(FunctionIr::new(
                NODE_EVENT,
                vec![ParameterIr::new("values", false, vec!["InputData", "Type:list.real"])],
            ));

        let json = serde_json::to_string(&ir).unwrap();
        let back = ModuleIr::from_json(&json).unwrap();
        assert_eq!(ir, back);
    }

    #[test]
    fn test_missing_fields_default() {
        let ir = ModuleIr::from_json(r#"{"key": "vuo.test"}"#).unwrap();
        assert_eq!(ir.key, "vuo.test");
        assert!(ir.functions.is_empty());
        assert!(ir.metadata.is_null());
    }
}
