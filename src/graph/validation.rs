//! Composition validation
//!
//! Runs post-mutation or pre-codegen and reports an issue list rather than
//! throwing; callers may ignore the result at their own risk. The feedback
//! pass works over the data-cable subgraph only: event-only cycles are legal,
//! and a cable downgraded to always-event-only never participates.

use crate::graph::composition::Composition;
use crate::graph::port_class::PortDirection;
use crate::types::is_generic_name;
use crate::{Issue, IssueKind};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use uuid::Uuid;

/// Run every validation pass over the composition
pub fn validate(comp: &Composition) -> Vec<Issue> {
    let mut issues = Vec::new();
    check_unresolved_classes(comp, &mut issues);
    check_cable_endpoints(comp, &mut issues);
    check_cable_types(comp, &mut issues);
    check_feedback_loops(comp, &mut issues);
    check_attachments(comp, &mut issues);
    check_protocol_compliance(comp, &mut issues);
    issues
}

/// Nodes whose classes are placeholders cannot be compiled
fn check_unresolved_classes(comp: &Composition, issues: &mut Vec<Issue>) {
    let mut reported: Vec<&str> = Vec::new();
    for node in comp.nodes() {
        if node.class().is_placeholder() && !reported.contains(&node.class_name()) {
            reported.push(node.class_name());
            issues.push(
                Issue::new(
                    IssueKind::UnresolvedDependency,
                    node.class_name(),
                    format!("node class '{}' has no implementation", node.class_name()),
                )
                .with_hint("install the module that provides it"),
            );
        }
    }
}

/// Every cable endpoint must reference a node and port that still exist
fn check_cable_endpoints(comp: &Composition, issues: &mut Vec<Issue>) {
    for cable in comp.cables() {
        let source_ok = if cable.from_node() == comp.published_input_node() {
            comp.published_input(cable.from_port()).is_some()
        } else {
            comp.node(cable.from_node())
                .is_some_and(|n| n.class().output_port(cable.from_port()).is_some())
        };
        let target_ok = if cable.to_node() == comp.published_output_node() {
            comp.published_output(cable.to_port()).is_some()
        } else {
            comp.node(cable.to_node())
                .is_some_and(|n| n.class().input_port(cable.to_port()).is_some())
        };
        if !source_ok || !target_ok {
            issues.push(Issue::new(
                IssueKind::InvariantViolation,
                cable.id().to_string(),
                format!(
                    "cable {}:{} -> {}:{} references a missing endpoint",
                    cable.from_node(),
                    cable.from_port(),
                    cable.to_node(),
                    cable.to_port()
                ),
            ));
        }
    }
}

/// Concrete endpoint types on a data cable must agree exactly; generics are
/// the specialization engine's business until they are resolved
fn check_cable_types(comp: &Composition, issues: &mut Vec<Issue>) {
    for cable in comp.cables() {
        if !comp.cable_carries_data(cable) {
            continue;
        }
        let from = comp.source_port_type(cable.from_node(), cable.from_port());
        let to = comp.target_port_type(cable.to_node(), cable.to_port());
        if let (Some(from), Some(to)) = (from, to) {
            if from != to && !is_generic_name(&from) && !is_generic_name(&to) {
                issues.push(
                    Issue::new(
                        IssueKind::TypeMismatch,
                        cable.id().to_string(),
                        format!("cable carries '{}' into a port expecting '{}'", from, to),
                    )
                    .with_hint("insert a type converter or respecialize the network"),
                );
            }
        }
    }
}

/// Any directed cycle in the data-cable subgraph cannot be scheduled
fn check_feedback_loops(comp: &Composition, issues: &mut Vec<Issue>) {
    let mut graph: DiGraph<Uuid, ()> = DiGraph::new();
    let mut indices: HashMap<Uuid, NodeIndex> = HashMap::new();

    for node in comp.nodes() {
        indices.insert(node.id(), graph.add_node(node.id()));
    }
    let mut self_loops: Vec<Uuid> = Vec::new();
    for cable in comp.cables() {
        if !comp.cable_carries_data(cable) {
            continue;
        }
        let (Some(&from), Some(&to)) = (
            indices.get(&cable.from_node()),
            indices.get(&cable.to_node()),
        ) else {
            continue;
        };
        if from == to {
            self_loops.push(cable.from_node());
        }
        graph.add_edge(from, to, ());
    }

    for component in tarjan_scc(&graph) {
        if component.len() < 2 {
            continue;
        }
        let members: Vec<String> = component
            .iter()
            .filter_map(|idx| graph.node_weight(*idx))
            .filter_map(|id| comp.node(*id))
            .map(|n| n.title().to_string())
            .collect();
        issues.push(
            Issue::new(
                IssueKind::FeedbackLoop,
                members.join(" -> "),
                "data cables form a feedback loop".to_string(),
            )
            .with_hint("break the loop with an event-only cable"),
        );
    }
    for node_id in self_loops {
        let title = comp
            .node(node_id)
            .map(|n| n.title().to_string())
            .unwrap_or_else(|| node_id.to_string());
        issues.push(
            Issue::new(
                IssueKind::FeedbackLoop,
                title,
                "a data cable feeds a node's own input".to_string(),
            )
            .with_hint("break the loop with an event-only cable"),
        );
    }
}

/// Attachments must still have their host node, and the host input port
/// must exist
fn check_attachments(comp: &Composition, issues: &mut Vec<Issue>) {
    for node in comp.nodes() {
        let Some((host_id, host_port)) = node.attachment_host() else {
            continue;
        };
        let host_ok = comp
            .node(host_id)
            .is_some_and(|host| host.class().input_port(host_port).is_some());
        if !host_ok {
            issues.push(
                Issue::new(
                    IssueKind::AttachmentOrphan,
                    node.title(),
                    format!("attachment '{}' lost its host port", node.title()),
                )
                .with_hint("delete the attachment or restore its host"),
            );
        }
    }
}

/// An active protocol's mandated published ports must be present, in order,
/// with the right types
fn check_protocol_compliance(comp: &Composition, issues: &mut Vec<Issue>) {
    let Some(protocol) = comp.active_protocol() else {
        return;
    };
    for (direction, mandated, actual) in [
        (
            PortDirection::Input,
            protocol.inputs(),
            comp.published_inputs(),
        ),
        (
            PortDirection::Output,
            protocol.outputs(),
            comp.published_outputs(),
        ),
    ] {
        let side = match direction {
            PortDirection::Input => "input",
            PortDirection::Output => "output",
        };
        for (position, port) in mandated.iter().enumerate() {
            match actual.get(position) {
                Some(published)
                    if published.name() == port.name
                        && published.data_type() == Some(port.data_type.as_str()) => {}
                _ => {
                    issues.push(
                        Issue::new(
                            IssueKind::ProtocolViolation,
                            port.name.as_str(),
                            format!(
                                "protocol '{}' requires published {} '{}' of type '{}' at position {}",
                                protocol.name(),
                                side,
                                port.name,
                                port.data_type,
                                position
                            ),
                        )
                        .with_hint("reactivate the protocol to restore its ports"),
                    );
                }
            }
        }
    }
}

/// True when no validation pass reports a protocol problem
pub fn is_protocol_compliant(comp: &Composition) -> bool {
    let mut issues = Vec::new();
    check_protocol_compliance(comp, &mut issues);
    issues.is_empty()
}
