//! Specialization network discovery
//!
//! A network is the transitive closure of ports that must agree on one
//! concrete type: ports on the same node class sharing a generic type
//! variable, unioned across cables whose two endpoints both carry generic
//! types. Discovery is parameterized over a port-type view so the engine can
//! walk either the current classes (specialize) or the original generic
//! classes (unspecialize).

use crate::graph::composition::Composition;
use crate::types;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// The ports and nodes that must share one concrete type choice
#[derive(Debug, Default)]
pub struct Network {
    /// Member ports, in discovery order.
    pub ports: Vec<(Uuid, String)>,
    /// Innermost generic names involved, per node.
    pub generics_by_node: BTreeMap<Uuid, BTreeSet<String>>,
}

impl Network {
    pub fn nodes(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.generics_by_node.keys().copied()
    }

    pub fn contains_port(&self, node: Uuid, port: &str) -> bool {
        self.ports.iter().any(|(n, p)| *n == node && p == port)
    }
}

/// Find the network containing `(seed_node, seed_port)` under the given
/// port-type view. Returns an empty network when the seed port is not
/// generic in that view.
pub(crate) fn discover<F>(
    comp: &Composition,
    seed_node: Uuid,
    seed_port: &str,
    type_of: F,
) -> Network
where
    F: Fn(Uuid, &str) -> Option<String>,
{
    let mut network = Network::default();
    let mut queue: Vec<(Uuid, String)> = vec![(seed_node, seed_port.to_string())];
    let mut visited: BTreeSet<(Uuid, String)> = BTreeSet::new();

    while let Some((node_id, port_name)) = queue.pop() {
        if !visited.insert((node_id, port_name.clone())) {
            continue;
        }
        let Some(type_name) = type_of(node_id, &port_name) else {
            continue;
        };
        if !types::is_generic_name(&type_name) {
            continue;
        }
        let generic = types::innermost_name(&type_name).to_string();

        network.ports.push((node_id, port_name.clone()));
        network
            .generics_by_node
            .entry(node_id)
            .or_default()
            .insert(generic.clone());

        // Every port on this node using the same type variable.
        if let Some(node) = comp.node(node_id) {
            let class = node.class();
            for pc in class.input_ports().iter().chain(class.output_ports()) {
                if let Some(t) = type_of(node_id, pc.name()) {
                    if types::is_generic_name(&t) && types::innermost_name(&t) == generic {
                        queue.push((node_id, pc.name().to_string()));
                    }
                }
            }
        }

        // Cables where both endpoints are generic link networks.
        for cable in comp.cables() {
            let other = if cable.from_node() == node_id && cable.from_port() == port_name {
                Some((cable.to_node(), cable.to_port().to_string()))
            } else if cable.to_node() == node_id && cable.to_port() == port_name {
                Some((cable.from_node(), cable.from_port().to_string()))
            } else {
                None
            };
            if let Some((other_node, other_port)) = other {
                if let Some(t) = type_of(other_node, &other_port) {
                    if types::is_generic_name(&t) {
                        queue.push((other_node, other_port));
                    }
                }
            }
        }
    }

    network
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node_class::NodeClass;
    use crate::graph::port_class::{PortClass, PortDirection};
    use std::sync::Arc;

    fn hold_class() -> Arc<NodeClass> {
        let mut class = NodeClass::new("vuo.data.hold");
        class.push_input_port(PortClass::data_and_event(
            "value",
            PortDirection::Input,
            "generic1",
        ));
        class.push_output_port(PortClass::data_and_event(
            "heldValue",
            PortDirection::Output,
            "generic1",
        ));
        Arc::new(class)
    }

    fn current_view(comp: &Composition) -> impl Fn(Uuid, &str) -> Option<String> + '_ {
        |node_id, port| {
            comp.node(node_id)?
                .port_class(port)
                .and_then(|pc| pc.data_type().map(String::from))
        }
    }

    #[test]
    fn test_same_node_ports_share_network() {
        let mut comp = Composition::new();
        let n = comp.add_node(hold_class(), "", (0.0, 0.0));

        let network = discover(&comp, n, "value", current_view(&comp));
        assert!(network.contains_port(n, "value"));
        assert!(network.contains_port(n, "heldValue"));
        assert_eq!(network.generics_by_node[&n].len(), 1);
    }

    #[test]
    fn test_cables_union_networks() {
        let mut comp = Composition::new();
        let a = comp.add_node(hold_class(), "", (0.0, 0.0));
        let b = comp.add_node(hold_class(), "", (100.0, 0.0));
        comp.connect(a, "heldValue", b, "value", false).unwrap();

        let network = discover(&comp, a, "value", current_view(&comp));
        assert!(network.contains_port(b, "value"));
        assert!(network.contains_port(b, "heldValue"));
        assert_eq!(network.generics_by_node.len(), 2);
    }

    #[test]
    fn test_concrete_seed_yields_empty_network() {
        let mut class = NodeClass::new("vuo.math.count");
        class.push_input_port(PortClass::data_and_event(
            "increment",
            PortDirection::Input,
            "real",
        ));
        let mut comp = Composition::new();
        let n = comp.add_node(Arc::new(class), "", (0.0, 0.0));

        let network = discover(&comp, n, "increment", current_view(&comp));
        assert!(network.ports.is_empty());
    }
}
