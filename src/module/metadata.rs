//! Module-level metadata
//!
//! A module declares its documentation and typing metadata as one JSON
//! object. Everything is optional; missing keys fall back to defaults so a
//! bare module still produces a usable node class.

use crate::graph::node_class::{GenericTypeSpec, TriggerDescription};
use crate::graph::port_class::EventThrottling;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Parsed module metadata
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModuleMetadata {
    pub title: String,
    pub description: String,
    pub version: String,
    pub keywords: Vec<String>,
    pub node_set: Option<String>,
    pub is_deprecated: bool,
    pub example_compositions: Vec<String>,
    /// Generic name -> constraints, from `genericTypes`
    pub generic_types: BTreeMap<String, GenericTypeMetadata>,
    /// Internal triggers of a subcomposition, from `triggers`
    pub triggers: Vec<TriggerMetadata>,
}

/// One entry in the `genericTypes` map
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenericTypeMetadata {
    pub default_type: Option<String>,
    pub compatible_types: Vec<String>,
}

/// One entry in a subcomposition's `triggers` array
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: Option<String>,
    pub event_throttling: Option<String>,
}

impl ModuleMetadata {
    /// Parse the metadata object. A null value yields the defaults; any
    /// other non-object value is ignored with a warning rather than
    /// rejecting the module.
    pub fn parse(module_key: &str, value: &serde_json::Value) -> Self {
        if value.is_null() {
            return Self::default();
        }
        match serde_json::from_value(value.clone()) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Ignoring unreadable metadata for module '{}': {}", module_key, e);
                Self::default()
            }
        }
    }

    /// The `genericTypes` entries converted to the node class representation
    pub fn generic_type_specs(&self) -> BTreeMap<String, GenericTypeSpec> {
        self.generic_types
            .iter()
            .map(|(name, meta)| {
                (
                    name.clone(),
                    GenericTypeSpec {
                        default_type: meta.default_type.clone(),
                        compatible_types: meta.compatible_types.clone(),
                    },
                )
            })
            .collect()
    }

    /// The `triggers` entries converted to the node class representation
    pub fn trigger_descriptions(&self) -> Vec<TriggerDescription> {
        self.triggers
            .iter()
            .map(|t| TriggerDescription {
                name: t.name.clone(),
                data_type: t.data_type.clone(),
                event_throttling: t
                    .event_throttling
                    .as_deref()
                    .and_then(EventThrottling::parse)
                    .unwrap_or_default(),
            })
            .collect()
    }
}
