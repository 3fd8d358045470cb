//! Common test utilities
//!
//! This module provides shared helpers for the integration tests: a catalog
//! pre-loaded with a handful of node classes, built through the module
//! parser exactly the way production classes are.

use cableflow::module::{FunctionIr, ModuleIr, ParameterIr};
use cableflow::{NodeClassCatalog, TypeRegistry};

/// A stateless add node: `values` in, `sum` out, both typed.
pub fn add_module() -> ModuleIr {
    ModuleIr::new("vuo.math.add")
        .with_metadata(serde_json::json!({
            "title": "Add",
            "version": "2.0.0",
            "keywords": ["sum", "+", "arithmetic"],
            "nodeSet": "vuo.math",
        }))
        .with_function(FunctionIr::new(
            "nodeEvent",
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

/// A stateless counter-style node with a real input and a real output.
pub fn count_module() -> ModuleIr {
    ModuleIr::new("vuo.math.count")
        .with_metadata(serde_json::json!({"title": "Count", "version": "1.0.0"}))
        .with_function(FunctionIr::new(
            "nodeEvent",
            vec![
                ParameterIr::new(
                    "increment",
                    false,
                    vec!["InputData", "Type:real", r#"Details:{"default":1}"#],
                ),
                ParameterIr::new("count", true, vec!["OutputData", "Type:real"]),
            ],
        ))
}

/// A generic list-indexing node constrained to a few concrete types.
pub fn list_get_module() -> ModuleIr {
    ModuleIr::new("vuo.list.get")
        .with_metadata(serde_json::json!({
            "title": "Get Item from List",
            "version": "1.0.0",
            "genericTypes": {
                "generic1": {
                    "defaultType": "real",
                    "compatibleTypes": ["real"]
                }
            }
        }))
        .with_function(FunctionIr::new(
            "nodeEvent",
            vec![
                ParameterIr::new("list", false, vec!["InputData", "Type:list.generic1"]),
                ParameterIr::new("which", false, vec!["InputData", "Type:integer"]),
                ParameterIr::new("item", true, vec!["OutputData", "Type:generic1"]),
            ],
        ))
}

/// A generic hold node whose compatible set has several choices.
pub fn hold_module() -> ModuleIr {
    ModuleIr::new("vuo.data.hold")
        .with_metadata(serde_json::json!({
            "title": "Hold Value",
            "version": "1.0.0",
            "genericTypes": {
                "generic1": {
                    "compatibleTypes": ["real", "integer", "text"]
                }
            }
        }))
        .with_function(FunctionIr::new(
            "nodeEvent",
            vec![
                ParameterIr::new("value", false, vec!["InputData", "Type:generic1"]),
                ParameterIr::new("heldValue", true, vec!["OutputData", "Type:generic1"]),
            ],
        ))
}

/// A stateful trigger node firing real values periodically.
pub fn fire_module() -> ModuleIr {
    ModuleIr::new("vuo.time.firePeriodically")
        .with_metadata(serde_json::json!({"title": "Fire Periodically", "version": "1.0.0"}))
        .with_function(FunctionIr::new(
            "nodeInstanceEvent",
            vec![
                ParameterIr::new("ctx", true, vec!["InstanceData"]),
                ParameterIr::new("seconds", false, vec!["InputData", "Type:real"]),
                ParameterIr::new("fired", true, vec!["OutputTrigger", "Type:real"]),
            ],
        ))
        .with_function(FunctionIr::new(
            "nodeInstanceInit",
            vec![ParameterIr::new(
                "seconds",
                false,
                vec!["InputData", "Type:real"],
            )],
        ))
        .with_function(FunctionIr::new("nodeInstanceFini", vec![]))
        .with_function(FunctionIr::new(
            "nodeInstanceTriggerStart",
            vec![
                ParameterIr::new("ctx", true, vec!["InstanceData"]),
                ParameterIr::new("seconds", false, vec!["InputData", "Type:real"]),
                ParameterIr::new("fired", true, vec!["OutputTrigger"]),
            ],
        ))
        .with_function(FunctionIr::new(
            "nodeInstanceTriggerStop",
            vec![
                ParameterIr::new("ctx", true, vec!["InstanceData"]),
                ParameterIr::new("fired", true, vec!["OutputTrigger"]),
            ],
        ))
}

/// A catalog loaded with every module above
pub fn loaded_catalog(registry: &TypeRegistry) -> NodeClassCatalog {
    let catalog = NodeClassCatalog::new();
    for module in [
        add_module(),
        count_module(),
        list_get_module(),
        hold_module(),
        fire_module(),
    ] {
        catalog
            .load_module(registry, &module)
            .expect("test module should parse");
    }
    catalog
}
