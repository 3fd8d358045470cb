//! The specialization engine
//!
//! Replaces generic node classes with specialized variants (and back) by
//! unifying one concrete type choice across a cable network. Each operation
//! validates completely before mutating, so a failure leaves the composition
//! untouched.

use crate::catalog::NodeClassCatalog;
use crate::graph::composition::{types_unify, Composition};
use crate::graph::node_class::{ClassOrigin, NodeClass, SpecializationPedigree};
use crate::specialize::network::discover;
use crate::types::{self, TypeRegistry};
use crate::ModelError;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Atomic generic-type transforms over a composition
pub struct SpecializationEngine<'a> {
    catalog: &'a NodeClassCatalog,
    registry: &'a TypeRegistry,
}

impl<'a> SpecializationEngine<'a> {
    pub fn new(catalog: &'a NodeClassCatalog, registry: &'a TypeRegistry) -> Self {
        Self { catalog, registry }
    }

    /// Resolve the network containing `port` to the concrete type `concrete`
    /// (an innermost name such as `real`, or a list form whose innermost
    /// name is taken).
    ///
    /// Every participating node's class is swapped for its specialized
    /// variant; ports are rewired by name, and constants, throttling
    /// overrides, and visual state carry over. If the choice is incompatible
    /// with any participant, nothing changes.
    pub fn specialize(
        &self,
        comp: &mut Composition,
        node_id: Uuid,
        port_name: &str,
        concrete: &str,
    ) -> Result<(), ModelError> {
        let concrete = types::innermost_name(concrete).to_string();
        let seed_type = port_type(comp, node_id, port_name).ok_or_else(|| {
            ModelError::NotADataPort(port_name.to_string())
        })?;

        if !types::is_generic_name(&seed_type) {
            // Already concrete; specializing to the same type is a no-op.
            return if types::innermost_name(&seed_type) == concrete {
                Ok(())
            } else {
                Err(ModelError::IncompatibleSpecialization {
                    port: port_name.to_string(),
                    type_name: concrete,
                })
            };
        }

        let network = discover(comp, node_id, port_name, |n, p| port_type(comp, n, p));

        // Validate the choice against every participant before touching
        // anything; rejection must leave the composition as it was.
        for (member_node, generics) in &network.generics_by_node {
            let node = comp
                .node(*member_node)
                .ok_or(ModelError::NodeNotFound(*member_node))?;
            for generic in generics {
                let accepts = node
                    .class()
                    .generic_type_spec(generic)
                    .map(|spec| {
                        spec.compatible_types.is_empty()
                            || spec.compatible_types.iter().any(|t| *t == concrete)
                    })
                    .unwrap_or(true);
                if !accepts {
                    return Err(ModelError::IncompatibleSpecialization {
                        port: port_name.to_string(),
                        type_name: concrete,
                    });
                }
            }
        }

        // Resolve every replacement class up front.
        let mut replacements: Vec<(Uuid, Arc<NodeClass>)> = Vec::new();
        for (member_node, generics) in &network.generics_by_node {
            let node = comp
                .node(*member_node)
                .ok_or(ModelError::NodeNotFound(*member_node))?;
            let substitutions: BTreeMap<String, String> = generics
                .iter()
                .map(|g| (g.clone(), concrete.clone()))
                .collect();
            let replacement =
                self.specialized_class(node.class(), &substitutions)?;
            replacements.push((*member_node, replacement));
        }

        self.registry.intern(&concrete);
        comp.begin_mutation();
        for (member_node, class) in replacements {
            log::info!(
                "Specializing node {} to class '{}'",
                member_node,
                class.class_name()
            );
            if let Some(node) = comp.node_mut(member_node) {
                node.replace_class(class);
            }
        }
        comp.end_mutation();
        Ok(())
    }

    /// Reverse of `specialize`: restore the original generic class for every
    /// node in the network. Cables whose endpoint types no longer unify are
    /// deleted; their identities are returned for the caller.
    pub fn unspecialize(
        &self,
        comp: &mut Composition,
        node_id: Uuid,
        port_name: &str,
    ) -> Result<Vec<Uuid>, ModelError> {
        let seed = comp.node(node_id).ok_or(ModelError::NodeNotFound(node_id))?;
        if seed.class().specialized_from().is_none() {
            // Already generic (or never specialized): nothing to restore.
            return Ok(Vec::new());
        }

        // Walk the network as it would look with the generic classes back in
        // place, so sibling ports sharing the variable are found even though
        // their current types are concrete.
        let network = discover(comp, node_id, port_name, |n, p| {
            original_port_type(comp, self.catalog, n, p)
        });
        if network.ports.is_empty() {
            return Ok(Vec::new());
        }

        // Resolve every original class up front.
        let mut restorations: Vec<(Uuid, Arc<NodeClass>)> = Vec::new();
        for member_node in network.nodes() {
            let node = comp
                .node(member_node)
                .ok_or(ModelError::NodeNotFound(member_node))?;
            let Some(pedigree) = node.class().specialized_from() else {
                continue;
            };
            let original = self
                .catalog
                .lookup(&pedigree.generic_class_name)
                .ok_or_else(|| {
                    ModelError::SpecializedClassUnavailable(pedigree.generic_class_name.clone())
                })?;
            restorations.push((member_node, original));
        }

        comp.begin_mutation();
        for (member_node, class) in restorations {
            log::info!(
                "Restoring node {} to generic class '{}'",
                member_node,
                class.class_name()
            );
            if let Some(node) = comp.node_mut(member_node) {
                node.replace_class(class);
            }
        }

        // Delete cables whose types no longer unify under the restored
        // classes.
        let mismatched: Vec<Uuid> = comp
            .cables()
            .iter()
            .filter(|cable| {
                if cable.is_always_event_only() {
                    return false;
                }
                let from = comp.source_port_type(cable.from_node(), cable.from_port());
                let to = comp.target_port_type(cable.to_node(), cable.to_port());
                match (from, to) {
                    (Some(from), Some(to)) => !unify_with_constraints(comp, cable.from_node(), &from, cable.to_node(), &to),
                    _ => false,
                }
            })
            .map(|cable| cable.id())
            .collect();
        for cable_id in &mismatched {
            log::info!("Deleting cable {} left mismatched by unspecialization", cable_id);
            let _ = comp.disconnect(*cable_id);
        }
        comp.end_mutation();
        Ok(mismatched)
    }

    /// Switch a network to a different concrete type. A no-op when the port
    /// is already of the target type.
    pub fn respecialize(
        &self,
        comp: &mut Composition,
        node_id: Uuid,
        port_name: &str,
        concrete: &str,
    ) -> Result<Vec<Uuid>, ModelError> {
        let concrete_innermost = types::innermost_name(concrete);
        if let Some(current) = port_type(comp, node_id, port_name) {
            if !types::is_generic_name(&current)
                && types::innermost_name(&current) == concrete_innermost
            {
                return Ok(Vec::new());
            }
        }
        let deleted = self.unspecialize(comp, node_id, port_name)?;
        self.specialize(comp, node_id, port_name, concrete)?;
        Ok(deleted)
    }

    /// Connect two ports, resolving a generic-to-concrete meeting point.
    ///
    /// When the generic side has exactly one compatible specialization (or a
    /// declared default matching the concrete side), its network specializes
    /// automatically; when the concrete type is merely one of several
    /// options, the cable is left unresolved; otherwise the connection is
    /// rejected.
    pub fn connect_with_unification(
        &self,
        comp: &mut Composition,
        from_node: Uuid,
        from_port: &str,
        to_node: Uuid,
        to_port: &str,
        always_event_only: bool,
    ) -> Result<Uuid, ModelError> {
        let from_type = comp.source_port_type(from_node, from_port);
        let to_type = comp.target_port_type(to_node, to_port);

        if !always_event_only {
            if let (Some(from_type), Some(to_type)) = (&from_type, &to_type) {
                let pair = match (
                    types::is_generic_name(from_type),
                    types::is_generic_name(to_type),
                ) {
                    (true, false) => Some((from_node, from_port, from_type, to_type)),
                    (false, true) => Some((to_node, to_port, to_type, from_type)),
                    _ => None,
                };
                if let Some((generic_node, generic_port, generic_type, concrete_type)) = pair {
                    if types::is_list_name(generic_type) != types::is_list_name(concrete_type) {
                        return Err(ModelError::TypeMismatch {
                            from: from_type.clone(),
                            to: to_type.clone(),
                        });
                    }
                    let concrete = types::innermost_name(concrete_type).to_string();
                    let generic = types::innermost_name(generic_type).to_string();
                    let spec = comp
                        .node(generic_node)
                        .and_then(|n| n.class().generic_type_spec(&generic))
                        .cloned()
                        .unwrap_or_default();

                    let single_choice = spec.compatible_types.len() == 1;
                    let compatible = spec.compatible_types.is_empty()
                        || spec.compatible_types.iter().any(|t| *t == concrete);
                    if !compatible {
                        return Err(ModelError::TypeMismatch {
                            from: from_type.clone(),
                            to: to_type.clone(),
                        });
                    }
                    if single_choice || spec.default_type.as_deref() == Some(concrete.as_str()) {
                        self.specialize(comp, generic_node, generic_port, &concrete)?;
                    }
                    // Otherwise: leave the cable unresolved until the user
                    // picks a specialization.
                }
            }
        }

        comp.connect(from_node, from_port, to_node, to_port, always_event_only)
    }

    /// The specialized variant of `class` under the given substitutions,
    /// fetched from the catalog or synthesized from the generic class
    fn specialized_class(
        &self,
        class: &Arc<NodeClass>,
        substitutions: &BTreeMap<String, String>,
    ) -> Result<Arc<NodeClass>, ModelError> {
        let mut name = class.class_name().to_string();
        for concrete in substitutions.values() {
            name.push('.');
            name.push_str(concrete);
        }

        if let Some(existing) = self.catalog.lookup(&name) {
            if !existing.is_placeholder() {
                return Ok(existing);
            }
        }

        let mut specialized = (**class).clone();
        specialized.set_class_name(&name);
        let substitute = |pc: &mut crate::graph::port_class::PortClass| {
            if let Some(old_type) = pc.data_type().map(String::from) {
                let mut new_type = old_type;
                for (generic, concrete) in substitutions {
                    new_type = types::substitute_name(&new_type, generic, concrete);
                }
                self.registry.intern(&new_type);
                pc.set_data_type(Some(new_type));
            }
        };
        for pc in specialized.input_ports_mut() {
            substitute(pc);
        }
        for pc in specialized.output_ports_mut() {
            substitute(pc);
        }
        for concrete in substitutions.values() {
            specialized.add_dependency(concrete.clone());
        }
        specialized.set_origin(ClassOrigin::Specialized);
        specialized.set_specialized_from(Some(SpecializationPedigree {
            generic_class_name: class.class_name().to_string(),
            substitutions: substitutions.clone(),
        }));

        let (installed, _) = self.catalog.install(specialized);
        Ok(installed)
    }
}

/// Data type of a port in either direction, from the node's current class
fn port_type(comp: &Composition, node_id: Uuid, port_name: &str) -> Option<String> {
    comp.node(node_id)?
        .port_class(port_name)
        .and_then(|pc| pc.data_type().map(String::from))
}

/// Data type of a port as declared by the node's original generic class,
/// falling back to the current class for nodes that were never specialized
fn original_port_type(
    comp: &Composition,
    catalog: &NodeClassCatalog,
    node_id: Uuid,
    port_name: &str,
) -> Option<String> {
    let node = comp.node(node_id)?;
    let class = match node.class().specialized_from() {
        Some(pedigree) => catalog.lookup(&pedigree.generic_class_name)?,
        None => Arc::clone(node.class()),
    };
    class
        .input_port(port_name)
        .or_else(|| class.output_port(port_name))
        .and_then(|pc| pc.data_type().map(String::from))
}

/// Endpoint types unify when `types_unify` holds and, for a generic-concrete
/// pairing, the generic side's declared compatible set admits the concrete
/// innermost name
fn unify_with_constraints(
    comp: &Composition,
    from_node: Uuid,
    from_type: &str,
    to_node: Uuid,
    to_type: &str,
) -> bool {
    if !types_unify(from_type, to_type) {
        return false;
    }
    let (generic_node, generic_type, concrete_type) = match (
        types::is_generic_name(from_type),
        types::is_generic_name(to_type),
    ) {
        (true, false) => (from_node, from_type, to_type),
        (false, true) => (to_node, to_type, from_type),
        _ => return true,
    };
    let generic = types::innermost_name(generic_type);
    let concrete = types::innermost_name(concrete_type);
    comp.node(generic_node)
        .and_then(|n| n.class().generic_type_spec(generic))
        .map(|spec| {
            spec.compatible_types.is_empty() || spec.compatible_types.iter().any(|t| t == concrete)
        })
        .unwrap_or(true)
}
