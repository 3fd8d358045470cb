//! Specialization engine tests
//!
//! Generic node classes resolve to concrete variants across cable networks,
//! and back.

mod common;

use cableflow::specialize::SpecializationEngine;
use cableflow::{Composition, ModelError, TypeRegistry};

#[test]
fn test_generic_specialization_via_connect() {
    let registry = TypeRegistry::new();
    let catalog = common::loaded_catalog(&registry);
    let engine = SpecializationEngine::new(&catalog, &registry);

    let mut comp = Composition::new();
    let get = comp.add_node(catalog.lookup("vuo.list.get").unwrap(), "", (0.0, 0.0));
    let count = comp.add_node(catalog.lookup("vuo.math.count").unwrap(), "", (200.0, 0.0));

    // vuo.list.get's only compatible type is real, so connecting its generic
    // output to a real input auto-specializes the whole network.
    let cable_id = engine
        .connect_with_unification(&mut comp, get, "item", count, "increment", false)
        .unwrap();

    let node = comp.node(get).unwrap();
    assert_eq!(node.class_name(), "vuo.list.get.real");
    assert_eq!(
        node.port_class("item").unwrap().data_type(),
        Some("real")
    );
    assert_eq!(
        node.port_class("list").unwrap().data_type(),
        Some("list.real")
    );
    // The cable is preserved.
    assert!(comp.cable(cable_id).is_some());
    assert!(comp.cable_carries_data(comp.cable(cable_id).unwrap()));
}

#[test]
fn test_specialization_rollback_on_incompatible_type() {
    let registry = TypeRegistry::new();
    let catalog = common::loaded_catalog(&registry);
    let engine = SpecializationEngine::new(&catalog, &registry);

    let mut comp = Composition::new();
    let get = comp.add_node(catalog.lookup("vuo.list.get").unwrap(), "", (0.0, 0.0));
    let before = comp.node(get).unwrap().class_name().to_string();

    // "text" is outside vuo.list.get's compatible set.
    let result = engine.specialize(&mut comp, get, "item", "text");
    assert!(matches!(
        result,
        Err(ModelError::IncompatibleSpecialization { .. })
    ));
    // Nothing changed.
    assert_eq!(comp.node(get).unwrap().class_name(), before);
    assert!(catalog.lookup("vuo.list.get.text").is_none());
}

#[test]
fn test_specialize_then_unspecialize_restores_generic() {
    let registry = TypeRegistry::new();
    let catalog = common::loaded_catalog(&registry);
    let engine = SpecializationEngine::new(&catalog, &registry);

    let mut comp = Composition::new();
    let hold = comp.add_node(catalog.lookup("vuo.data.hold").unwrap(), "", (0.0, 0.0));
    comp.set_port_constant(hold, "value", "42").unwrap();

    engine.specialize(&mut comp, hold, "value", "integer").unwrap();
    assert_eq!(comp.node(hold).unwrap().class_name(), "vuo.data.hold.integer");
    // Constants carry across the class swap.
    assert_eq!(comp.effective_constant(hold, "value"), Some("42"));

    let deleted = engine.unspecialize(&mut comp, hold, "value").unwrap();
    assert!(deleted.is_empty());
    let node = comp.node(hold).unwrap();
    assert_eq!(node.class_name(), "vuo.data.hold");
    assert_eq!(
        node.port_class("value").unwrap().data_type(),
        Some("generic1")
    );
    assert_eq!(comp.effective_constant(hold, "value"), Some("42"));
}

#[test]
fn test_network_specializes_across_cables() {
    let registry = TypeRegistry::new();
    let catalog = common::loaded_catalog(&registry);
    let engine = SpecializationEngine::new(&catalog, &registry);

    let mut comp = Composition::new();
    let a = comp.add_node(catalog.lookup("vuo.data.hold").unwrap(), "", (0.0, 0.0));
    let b = comp.add_node(catalog.lookup("vuo.data.hold").unwrap(), "", (200.0, 0.0));
    comp.connect(a, "heldValue", b, "value", false).unwrap();

    engine.specialize(&mut comp, a, "value", "text").unwrap();

    assert_eq!(comp.node(a).unwrap().class_name(), "vuo.data.hold.text");
    assert_eq!(comp.node(b).unwrap().class_name(), "vuo.data.hold.text");
    // The linking cable still exists and now carries text.
    assert_eq!(comp.cables().len(), 1);
    assert!(comp.cable_carries_data(&comp.cables()[0]));
}

#[test]
fn test_respecialize_is_noop_on_same_type() {
    let registry = TypeRegistry::new();
    let catalog = common::loaded_catalog(&registry);
    let engine = SpecializationEngine::new(&catalog, &registry);

    let mut comp = Composition::new();
    let hold = comp.add_node(catalog.lookup("vuo.data.hold").unwrap(), "", (0.0, 0.0));

    engine.specialize(&mut comp, hold, "value", "real").unwrap();
    let revision = comp.revision();
    let deleted = engine.respecialize(&mut comp, hold, "value", "real").unwrap();
    assert!(deleted.is_empty());
    assert_eq!(comp.revision(), revision);
    assert_eq!(comp.node(hold).unwrap().class_name(), "vuo.data.hold.real");
}

#[test]
fn test_respecialize_switches_type() {
    let registry = TypeRegistry::new();
    let catalog = common::loaded_catalog(&registry);
    let engine = SpecializationEngine::new(&catalog, &registry);

    let mut comp = Composition::new();
    let hold = comp.add_node(catalog.lookup("vuo.data.hold").unwrap(), "", (0.0, 0.0));

    engine.specialize(&mut comp, hold, "value", "real").unwrap();
    engine.respecialize(&mut comp, hold, "value", "text").unwrap();
    let node = comp.node(hold).unwrap();
    assert_eq!(node.class_name(), "vuo.data.hold.text");
    assert_eq!(node.port_class("heldValue").unwrap().data_type(), Some("text"));
}

#[test]
fn test_ambiguous_generic_connection_left_unresolved() {
    let registry = TypeRegistry::new();
    let catalog = common::loaded_catalog(&registry);
    let engine = SpecializationEngine::new(&catalog, &registry);

    let mut comp = Composition::new();
    // vuo.data.hold accepts real, integer, and text with no default, so a
    // real connection is legal but doesn't pick for the user.
    let hold = comp.add_node(catalog.lookup("vuo.data.hold").unwrap(), "", (0.0, 0.0));
    let count = comp.add_node(catalog.lookup("vuo.math.count").unwrap(), "", (200.0, 0.0));

    engine
        .connect_with_unification(&mut comp, hold, "heldValue", count, "increment", false)
        .unwrap();
    assert_eq!(comp.node(hold).unwrap().class_name(), "vuo.data.hold");
    assert_eq!(
        comp.node(hold).unwrap().port_class("heldValue").unwrap().data_type(),
        Some("generic1")
    );
}

#[test]
fn test_incompatible_generic_connection_rejected() {
    let registry = TypeRegistry::new();
    let catalog = common::loaded_catalog(&registry);
    let engine = SpecializationEngine::new(&catalog, &registry);

    // A class whose only output is a point2d, outside vuo.data.hold's set.
    let point_module = cableflow::module::ModuleIr::new("vuo.point.make")
        .with_metadata(serde_json::json!({"title": "Make Point"}))
        .with_function(cableflow::module::FunctionIr::new(
            "nodeEvent",
            vec![cableflow::module::ParameterIr::new(
                "point",
                true,
                vec!["OutputData", "Type:point2d"],
            )],
        ));
    catalog.load_module(&registry, &point_module).unwrap();

    let mut comp = Composition::new();
    let point = comp.add_node(catalog.lookup("vuo.point.make").unwrap(), "", (0.0, 0.0));
    let hold = comp.add_node(catalog.lookup("vuo.data.hold").unwrap(), "", (200.0, 0.0));

    let result =
        engine.connect_with_unification(&mut comp, point, "point", hold, "value", false);
    assert!(matches!(result, Err(ModelError::TypeMismatch { .. })));
    assert!(comp.cables().is_empty());
}

#[test]
fn test_specialized_composition_round_trips() {
    let registry = TypeRegistry::new();
    let catalog = common::loaded_catalog(&registry);
    let engine = SpecializationEngine::new(&catalog, &registry);

    let mut comp = Composition::new();
    let hold = comp.add_node(catalog.lookup("vuo.data.hold").unwrap(), "", (0.0, 0.0));
    engine.specialize(&mut comp, hold, "value", "text").unwrap();

    // The specialized class is in the catalog now, so the composition
    // parses back against it.
    let text = comp.to_graph_text();
    let outcome = cableflow::graph::serialization::parse_composition(&text, &catalog).unwrap();
    assert!(outcome.issues.is_empty());
    let node = outcome.composition.nodes().next().unwrap();
    assert_eq!(node.class_name(), "vuo.data.hold.text");
    assert!(!node.class().is_placeholder());
}
