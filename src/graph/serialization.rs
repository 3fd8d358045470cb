//! The composition text format
//!
//! Compositions persist as a graphviz-style labeled digraph: a header of
//! `key="value";` metadata lines, one line per node (and comment, and
//! published-port pseudo-node), then one line per cable. Serializing is
//! deterministic; re-serializing a just-parsed composition reproduces the
//! writer's output byte for byte.
//!
//! Parsing runs in two passes: nodes and published ports materialize first
//! (standing up placeholder classes for implementations the catalog lacks),
//! then cables. Per-element problems become issues; the rest of the
//! composition still loads.

use crate::catalog::NodeClassCatalog;
use crate::graph::comment::Comment;
use crate::graph::composition::Composition;
use crate::graph::node::Node;
use crate::graph::node_class::{NodeClass, REFRESH_PORT_NAME};
use crate::graph::port_class::{EventThrottling, PortClass, PortDetails, PortDirection};
use crate::graph::protocol::Protocol;
use crate::graph::published::PublishedPort;
use crate::{Issue, IssueKind, SerializationError};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;
use uuid::Uuid;

/// Identifier of the published-input pseudo-node in the text format
const PUBLISHED_INPUTS_IDENT: &str = "PublishedInputs";
/// Identifier of the published-output pseudo-node in the text format
const PUBLISHED_OUTPUTS_IDENT: &str = "PublishedOutputs";
/// `type` attribute of the published pseudo-nodes
const PUBLISHED_IN_TYPE: &str = "published.in";
const PUBLISHED_OUT_TYPE: &str = "published.out";

/// Header keys the writer emits in this fixed order
const HEADER_KEYS: [&str; 8] = [
    "name",
    "author",
    "copyright",
    "description",
    "version",
    "lastSaved",
    "icon",
    "protocol",
];

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^([A-Za-z_][A-Za-z0-9_]*)="((?:[^"\\]|\\.)*)"$"#).unwrap())
}

fn node_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*\[(.*)\]$").unwrap())
}

fn cable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^([A-Za-z_][A-Za-z0-9_]*):([A-Za-z_][A-Za-z0-9_]*(?:\[\d+\])?)\s*->\s*([A-Za-z_][A-Za-z0-9_]*):([A-Za-z_][A-Za-z0-9_]*(?:\[\d+\])?)\s*(?:\[(.*)\])?$",
        )
        .unwrap()
    })
}

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_\[\]]*)="((?:[^"\\]|\\.)*)""#).unwrap()
    })
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str(r"\\"),
            '"' => out.push_str(r#"\""#),
            '\n' => out.push_str(r"\n"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn format_position(position: (f64, f64)) -> String {
    format!("{:.6},{:.6}", position.0, position.1)
}

fn parse_position(s: &str) -> Option<(f64, f64)> {
    let (x, y) = s.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Strip non-alphanumeric characters; used to derive node identifiers from
/// titles when a composition was built programmatically
fn ident_fragment(s: &str) -> String {
    let fragment: String = s.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if fragment.is_empty() || fragment.starts_with(|c: char| c.is_ascii_digit()) {
        format!("Node{}", fragment)
    } else {
        fragment
    }
}

// --------------------------------------------------------------------------
// Writer
// --------------------------------------------------------------------------

/// Serialize a composition to the text format
pub fn serialize_composition(comp: &Composition) -> String {
    let mut out = String::new();
    let metadata = comp.metadata();

    let title = ident_fragment(&metadata.name);
    let title = if title == "Node" { "Composition".to_string() } else { title };
    out.push_str(&format!("digraph {}\n{{\n", title));

    // Header.
    let mut header: Vec<(String, String)> = Vec::new();
    for key in HEADER_KEYS {
        let value = match key {
            "name" => metadata.name.clone(),
            "author" => metadata.author.clone(),
            "copyright" => metadata.copyright.clone(),
            "description" => metadata.description.clone(),
            "version" => metadata.version.clone(),
            "lastSaved" => metadata
                .last_saved
                .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
                .unwrap_or_default(),
            "icon" => metadata.icon_path.clone().unwrap_or_default(),
            "protocol" => comp
                .active_protocol()
                .map(|p| p.name().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };
        if !value.is_empty() {
            header.push((key.to_string(), value));
        }
    }
    for (key, value) in &metadata.extra {
        header.push((key.clone(), value.clone()));
    }
    if !header.is_empty() {
        for (key, value) in &header {
            out.push_str(&format!("{}=\"{}\";\n", key, escape(value)));
        }
        out.push('\n');
    }

    // Node identifiers: parsed identifiers win, generated ones fill in.
    let idents = assign_idents(comp);

    // Nodes, ordered by identifier so output does not depend on identity
    // assignment order.
    let mut ordered: Vec<&Node> = comp.nodes().collect();
    ordered.sort_by(|a, b| idents[&a.id()].cmp(&idents[&b.id()]));
    for node in ordered {
        let ident = &idents[&node.id()];
        let mut attrs: Vec<(String, String)> = vec![
            ("type".to_string(), node.class_name().to_string()),
            ("label".to_string(), node.title().to_string()),
            ("pos".to_string(), format_position(node.position())),
        ];
        if let Some(tint) = node.tint() {
            attrs.push(("tint".to_string(), tint.to_string()));
        }
        if node.is_collapsed() {
            attrs.push(("collapsed".to_string(), "true".to_string()));
        }
        if let Some((host, host_port)) = node.attachment_host() {
            if let Some(host_ident) = idents.get(&host) {
                attrs.push(("host".to_string(), format!("{}:{}", host_ident, host_port)));
            }
        }
        for port in node.input_ports() {
            if let Some(constant) = port.constant() {
                attrs.push((format!("_{}", port.name()), constant.to_string()));
            }
        }
        for port in node.output_ports() {
            if let Some(throttling) = port.event_throttling_override() {
                attrs.push((
                    format!("_{}_eventThrottling", port.name()),
                    throttling.as_str().to_string(),
                ));
            }
        }
        for (key, value) in node.extra_attributes() {
            attrs.push((key.clone(), value.clone()));
        }
        out.push_str(&format!("{} [{}];\n", ident, format_attrs(&attrs)));
    }

    // Comments.
    for (i, comment) in comp.comments().iter().enumerate() {
        let attrs = vec![
            ("comment".to_string(), comment.text().to_string()),
            ("pos".to_string(), format_position(comment.position())),
        ];
        out.push_str(&format!("Comment{} [{}];\n", i + 1, format_attrs(&attrs)));
    }

    // Published pseudo-nodes.
    for (ident, type_attr, ports) in [
        (PUBLISHED_INPUTS_IDENT, PUBLISHED_IN_TYPE, comp.published_inputs()),
        (PUBLISHED_OUTPUTS_IDENT, PUBLISHED_OUT_TYPE, comp.published_outputs()),
    ] {
        if ports.is_empty() {
            continue;
        }
        let mut attrs = vec![("type".to_string(), type_attr.to_string())];
        for port in ports {
            attrs.push((
                format!("_{}_type", port.name()),
                port.data_type().unwrap_or("event").to_string(),
            ));
            for (key, value) in &port.details().0 {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                attrs.push((format!("_{}_{}", port.name(), key), rendered));
            }
        }
        out.push_str(&format!("{} [{}];\n", ident, format_attrs(&attrs)));
    }

    // Cables, in insertion order.
    if !comp.cables().is_empty() {
        out.push('\n');
        for cable in comp.cables() {
            let from_ident = if cable.from_node() == comp.published_input_node() {
                PUBLISHED_INPUTS_IDENT.to_string()
            } else {
                idents[&cable.from_node()].clone()
            };
            let to_ident = if cable.to_node() == comp.published_output_node() {
                PUBLISHED_OUTPUTS_IDENT.to_string()
            } else {
                idents[&cable.to_node()].clone()
            };
            let mut attrs: Vec<(String, String)> = Vec::new();
            if cable.is_always_event_only() {
                attrs.push(("event".to_string(), "true".to_string()));
            }
            if cable.is_hidden() {
                attrs.push(("hidden".to_string(), "true".to_string()));
            }
            if attrs.is_empty() {
                out.push_str(&format!(
                    "{}:{} -> {}:{};\n",
                    from_ident,
                    cable.from_port(),
                    to_ident,
                    cable.to_port()
                ));
            } else {
                out.push_str(&format!(
                    "{}:{} -> {}:{} [{}];\n",
                    from_ident,
                    cable.from_port(),
                    to_ident,
                    cable.to_port(),
                    format_attrs(&attrs)
                ));
            }
        }
    }

    out.push_str("}\n");
    out
}

fn format_attrs(attrs: &[(String, String)]) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Pick a unique text identifier for every node: the one it was parsed with
/// when available, otherwise `<Title><n>`
fn assign_idents(comp: &Composition) -> BTreeMap<Uuid, String> {
    let mut idents: BTreeMap<Uuid, String> = BTreeMap::new();
    let mut used: HashMap<String, u32> = HashMap::new();

    for node in comp.nodes() {
        if let Some(ident) = node.graph_ident() {
            idents.insert(node.id(), ident.to_string());
            used.insert(ident.to_string(), 0);
        }
    }
    for node in comp.nodes() {
        if idents.contains_key(&node.id()) {
            continue;
        }
        let base = ident_fragment(node.title());
        let mut counter = used.get(&base).copied().unwrap_or(0);
        loop {
            counter += 1;
            let candidate = format!("{}{}", base, counter);
            if !used.contains_key(&candidate) && !idents.values().any(|i| *i == candidate) {
                used.insert(base.clone(), counter);
                idents.insert(node.id(), candidate);
                break;
            }
        }
    }
    idents
}

// --------------------------------------------------------------------------
// Parser
// --------------------------------------------------------------------------

/// A parsed composition together with the per-element issues collected on
/// the way
#[derive(Debug)]
pub struct ParseOutcome {
    pub composition: Composition,
    pub issues: Vec<Issue>,
}

#[derive(Debug)]
struct NodeLine {
    ident: String,
    attrs: Vec<(String, String)>,
    line: usize,
}

#[derive(Debug)]
struct CableLine {
    from_ident: String,
    from_port: String,
    to_ident: String,
    to_port: String,
    attrs: Vec<(String, String)>,
    line: usize,
}

/// Split the body of the digraph into `;`-terminated statements, respecting
/// quoted strings. Returns `(starting line number, statement text)` pairs.
fn split_statements(body: &str, first_line: usize) -> Vec<(usize, String)> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut line = first_line;
    let mut statement_line = first_line;
    let mut in_quote = false;
    let mut escaped = false;

    for c in body.chars() {
        if c == '\n' {
            line += 1;
        }
        if in_quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quote = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_quote = true;
                current.push(c);
            }
            ';' => {
                let statement = current.trim().to_string();
                if !statement.is_empty() {
                    statements.push((statement_line, statement));
                }
                current.clear();
                statement_line = line;
            }
            _ => {
                if current.trim().is_empty() {
                    statement_line = line;
                }
                current.push(c);
            }
        }
    }
    let tail = current.trim().to_string();
    if !tail.is_empty() {
        statements.push((statement_line, tail));
    }
    statements
}

/// Parse a composition from the text format.
///
/// Classes missing from the catalog become placeholders reconstructed from
/// the ports the file mentions, so the composition loads regardless; each
/// skipped element adds an issue to the outcome.
pub fn parse_composition(
    text: &str,
    catalog: &NodeClassCatalog,
) -> Result<ParseOutcome, SerializationError> {
    let mut issues = Vec::new();
    let mut header: Vec<(String, String)> = Vec::new();
    let mut node_lines: Vec<NodeLine> = Vec::new();
    let mut cable_lines: Vec<CableLine> = Vec::new();

    // Everything before the opening brace must be the digraph header
    // (allowing `//` comment lines above it).
    let open = text
        .find('{')
        .ok_or_else(|| SerializationError::NotAComposition("no digraph body found".to_string()))?;
    let prefix = &text[..open];
    let header_line = prefix
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("//"))
        .collect::<Vec<_>>()
        .join(" ");
    let is_digraph = header_line
        .strip_prefix("digraph")
        .map(str::trim)
        .is_some_and(|name| name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    if !is_digraph {
        return Err(SerializationError::NotAComposition(
            "expected a digraph header".to_string(),
        ));
    }

    let close = text.rfind('}').ok_or_else(|| SerializationError::Syntax {
        line: text.lines().count(),
        reason: "missing closing brace".to_string(),
    })?;
    if close < open {
        return Err(SerializationError::Syntax {
            line: 1,
            reason: "closing brace precedes the digraph body".to_string(),
        });
    }
    let body = &text[open + 1..close];
    let first_line = text[..open].matches('\n').count() + 1;

    for (line_no, statement) in split_statements(body, first_line) {
        if statement.starts_with("//") {
            continue;
        }
        if let Some(caps) = cable_regex().captures(&statement) {
            cable_lines.push(CableLine {
                from_ident: caps[1].to_string(),
                from_port: caps[2].to_string(),
                to_ident: caps[3].to_string(),
                to_port: caps[4].to_string(),
                attrs: caps
                    .get(5)
                    .map(|m| parse_attrs(m.as_str()))
                    .unwrap_or_default(),
                line: line_no,
            });
        } else if let Some(caps) = node_regex().captures(&statement) {
            node_lines.push(NodeLine {
                ident: caps[1].to_string(),
                attrs: parse_attrs(&caps[2]),
                line: line_no,
            });
        } else if let Some(caps) = header_regex().captures(&statement) {
            header.push((caps[1].to_string(), unescape(&caps[2])));
        } else {
            issues.push(
                Issue::new(
                    IssueKind::ParseError,
                    format!("line {}", line_no),
                    format!("unrecognized statement: {}", statement),
                )
                .with_hint("the statement was skipped"),
            );
        }
    }

    let mut comp = Composition::new();
    comp.begin_mutation();

    apply_header(&mut comp, &header, &mut issues);

    // Stand up placeholder classes for implementations the catalog lacks,
    // reconstructing their signatures from everything the file mentions.
    install_placeholders(catalog, &node_lines, &cable_lines);

    // Pass 1: nodes, comments, published ports.
    let mut ident_to_node: HashMap<String, Uuid> = HashMap::new();
    let mut attachments: Vec<(Uuid, String, usize)> = Vec::new();
    for node_line in &node_lines {
        if node_line.ident == PUBLISHED_INPUTS_IDENT || node_line.ident == PUBLISHED_OUTPUTS_IDENT {
            let direction = if node_line.ident == PUBLISHED_INPUTS_IDENT {
                PortDirection::Input
            } else {
                PortDirection::Output
            };
            parse_published(&mut comp, direction, &node_line.attrs, &mut issues);
            continue;
        }
        if node_line.attrs.iter().any(|(k, _)| k == "comment") {
            parse_comment(&mut comp, &node_line.attrs);
            continue;
        }
        match parse_node(&mut comp, catalog, node_line, &mut issues) {
            Some((node_id, host)) => {
                ident_to_node.insert(node_line.ident.clone(), node_id);
                if let Some(host) = host {
                    attachments.push((node_id, host, node_line.line));
                }
            }
            None => {}
        }
    }

    // Attachment host references resolve after every node exists.
    for (node_id, host_ref, line) in attachments {
        let resolved = host_ref.split_once(':').and_then(|(ident, port)| {
            ident_to_node.get(ident).map(|id| (*id, port.to_string()))
        });
        match resolved {
            Some((host_id, host_port)) => {
                if let Err(e) = comp.attach(node_id, host_id, &host_port) {
                    issues.push(Issue::new(
                        IssueKind::ParseError,
                        format!("line {}", line),
                        format!("couldn't restore attachment: {}", e),
                    ));
                }
            }
            None => issues.push(Issue::new(
                IssueKind::ParseError,
                format!("line {}", line),
                format!("attachment host '{}' not found", host_ref),
            )),
        }
    }

    // The protocol header marks its mandated ports once they exist.
    if let Some(protocol) = comp.active_protocol().cloned() {
        mark_protocol_ports(&mut comp, &protocol);
    }

    // Pass 2: cables.
    for cable_line in &cable_lines {
        parse_cable(&mut comp, &ident_to_node, cable_line, &mut issues);
    }

    comp.end_mutation();
    Ok(ParseOutcome {
        composition: comp,
        issues,
    })
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    attr_regex()
        .captures_iter(raw)
        .map(|caps| (caps[1].to_string(), unescape(&caps[2])))
        .collect()
}

fn apply_header(comp: &mut Composition, header: &[(String, String)], issues: &mut Vec<Issue>) {
    let mut protocol: Option<Protocol> = None;
    {
        let metadata = comp.metadata_mut();
        for (key, value) in header {
            match key.as_str() {
                "name" => metadata.name = value.clone(),
                "author" => metadata.author = value.clone(),
                "copyright" => metadata.copyright = value.clone(),
                "description" => metadata.description = value.clone(),
                "version" => metadata.version = value.clone(),
                "lastSaved" => match chrono::DateTime::parse_from_rfc3339(value) {
                    Ok(t) => metadata.last_saved = Some(t.with_timezone(&chrono::Utc)),
                    Err(_) => issues.push(Issue::new(
                        IssueKind::ParseError,
                        "lastSaved",
                        format!("unreadable timestamp '{}'", value),
                    )),
                },
                "icon" => metadata.icon_path = Some(value.clone()),
                "protocol" => match Protocol::builtin(value) {
                    Some(p) => protocol = Some(p),
                    None => issues.push(Issue::new(
                        IssueKind::ParseError,
                        "protocol",
                        format!("unknown protocol '{}'", value),
                    )),
                },
                _ => metadata.extra.push((key.clone(), value.clone())),
            }
        }
    }
    if let Some(protocol) = protocol {
        comp.set_raw_protocol(protocol);
    }
}

/// Reconstruct placeholder classes from the ports the file refers to
fn install_placeholders(
    catalog: &NodeClassCatalog,
    node_lines: &[NodeLine],
    cable_lines: &[CableLine],
) {
    // Which class each identifier claims.
    let mut class_of_ident: HashMap<&str, &str> = HashMap::new();
    for node_line in node_lines {
        if let Some((_, class_name)) = node_line.attrs.iter().find(|(k, _)| k == "type") {
            class_of_ident.insert(&node_line.ident, class_name);
        }
    }

    // Port references per class, split by direction, in first-seen order.
    let mut inputs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut outputs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut push_ref = |map: &mut BTreeMap<String, Vec<String>>, class: &str, port: &str| {
        let ports = map.entry(class.to_string()).or_default();
        if !ports.iter().any(|p| p == port) {
            ports.push(port.to_string());
        }
    };

    for node_line in node_lines {
        let Some(class_name) = class_of_ident.get(node_line.ident.as_str()) else {
            continue;
        };
        for (key, _) in &node_line.attrs {
            if let Some(rest) = key.strip_prefix('_') {
                if let Some(port) = rest.strip_suffix("_eventThrottling") {
                    push_ref(&mut outputs, class_name, port);
                } else if !rest.contains('_') {
                    push_ref(&mut inputs, class_name, rest);
                }
            }
        }
    }
    for cable_line in cable_lines {
        if let Some(class_name) = class_of_ident.get(cable_line.from_ident.as_str()) {
            push_ref(&mut outputs, class_name, &cable_line.from_port);
        }
        if let Some(class_name) = class_of_ident.get(cable_line.to_ident.as_str()) {
            if cable_line.to_port != REFRESH_PORT_NAME {
                push_ref(&mut inputs, class_name, &cable_line.to_port);
            }
        }
    }

    let distinct_classes: std::collections::BTreeSet<&str> =
        class_of_ident.values().copied().collect();
    for class_name in distinct_classes {
        if class_name == PUBLISHED_IN_TYPE || class_name == PUBLISHED_OUT_TYPE {
            continue;
        }
        match catalog.lookup(class_name) {
            Some(existing) if !existing.is_placeholder() => continue,
            _ => {}
        }
        let mut class = NodeClass::placeholder(class_name);
        if let Some(ports) = inputs.get(class_name) {
            // The refresh port is already installed by the class constructor.
            for port in ports.iter().filter(|p| *p != REFRESH_PORT_NAME) {
                class.push_input_port(PortClass::event_only(port, PortDirection::Input));
            }
        }
        if let Some(ports) = outputs.get(class_name) {
            for port in ports {
                class.push_output_port(PortClass::event_only(port, PortDirection::Output));
            }
        }
        catalog.install(class);
    }
}

/// Materialize one node line. Returns the node id and the raw `host`
/// attachment reference, if any.
fn parse_node(
    comp: &mut Composition,
    catalog: &NodeClassCatalog,
    node_line: &NodeLine,
    issues: &mut Vec<Issue>,
) -> Option<(Uuid, Option<String>)> {
    let class_name = match node_line.attrs.iter().find(|(k, _)| k == "type") {
        Some((_, v)) => v.clone(),
        None => {
            issues.push(Issue::new(
                IssueKind::ParseError,
                node_line.ident.as_str(),
                format!("node on line {} has no type attribute", node_line.line),
            ));
            return None;
        }
    };
    let class = catalog.lookup_or_placeholder(&class_name);
    if class.is_placeholder() {
        issues.push(
            Issue::new(
                IssueKind::UnresolvedDependency,
                node_line.ident.as_str(),
                format!("node class '{}' is not installed", class_name),
            )
            .with_hint("the node was loaded as a placeholder"),
        );
    }

    let mut node = Node::new(class, "", (0.0, 0.0));
    node.set_graph_ident(Some(node_line.ident.clone()));
    let mut host = None;

    for (key, value) in &node_line.attrs {
        match key.as_str() {
            "type" => {}
            "label" => node.set_title(value.clone()),
            "pos" => match parse_position(value) {
                Some(position) => node.set_position(position),
                None => issues.push(Issue::new(
                    IssueKind::ParseError,
                    node_line.ident.as_str(),
                    format!("unreadable position '{}'", value),
                )),
            },
            "tint" => node.set_tint(Some(value.clone())),
            "collapsed" => node.set_collapsed(value == "true"),
            "host" => host = Some(value.clone()),
            _ if key.starts_with('_') => {
                let rest = &key[1..];
                if let Some(port_name) = rest.strip_suffix("_eventThrottling") {
                    match (node.output_port_mut(port_name), EventThrottling::parse(value)) {
                        (Some(port), Some(throttling)) => {
                            port.set_event_throttling(Some(throttling))
                        }
                        _ => issues.push(Issue::new(
                            IssueKind::ParseError,
                            format!("{}:{}", node_line.ident, port_name),
                            format!("couldn't restore throttling '{}'", value),
                        )),
                    }
                } else {
                    match node.input_port_mut(rest) {
                        Some(port) => port.set_constant(Some(value.clone())),
                        None => issues.push(Issue::new(
                            IssueKind::ParseError,
                            format!("{}:{}", node_line.ident, rest),
                            "constant names a port the class doesn't have".to_string(),
                        )),
                    }
                }
            }
            _ => node.push_extra_attribute(key.clone(), value.clone()),
        }
    }

    Some((comp.insert_node(node), host))
}

fn parse_comment(comp: &mut Composition, attrs: &[(String, String)]) {
    let mut text = String::new();
    let mut position = (0.0, 0.0);
    for (key, value) in attrs {
        match key.as_str() {
            "comment" => text = value.clone(),
            "pos" => {
                if let Some(p) = parse_position(value) {
                    position = p;
                }
            }
            _ => {}
        }
    }
    comp.add_comment(Comment::new(text, position));
}

fn parse_published(
    comp: &mut Composition,
    direction: PortDirection,
    attrs: &[(String, String)],
    issues: &mut Vec<Issue>,
) {
    // `_<name>_type` attributes declare the ports, in order; any other
    // `_<name>_<key>` attribute becomes a detail on the named port.
    let mut details: Vec<(String, PortDetails)> = Vec::new();
    for (key, value) in attrs {
        let Some(rest) = key.strip_prefix('_') else {
            continue;
        };
        if let Some(name) = rest.strip_suffix("_type") {
            let data_type = if value == "event" {
                None
            } else {
                Some(value.clone())
            };
            let port = PublishedPort::new(name, direction, data_type);
            if let Err(e) = comp.insert_published(port) {
                issues.push(Issue::new(
                    IssueKind::ParseError,
                    name,
                    format!("couldn't restore published port: {}", e),
                ));
            } else {
                details.push((name.to_string(), PortDetails::new()));
            }
        } else if let Some((name, detail_key)) = details
            .iter()
            .find_map(|(name, _)| {
                rest.strip_prefix(name.as_str())
                    .and_then(|r| r.strip_prefix('_'))
                    .map(|detail_key| (name.clone(), detail_key.to_string()))
            })
        {
            if let Some(entry) = details.iter_mut().find(|(n, _)| *n == name) {
                entry
                    .1
                     .0
                    .insert(detail_key, serde_json::Value::String(value.clone()));
            }
        }
    }
    for (name, port_details) in details {
        if port_details.is_empty() {
            continue;
        }
        comp.set_published_details(direction, &name, port_details);
    }
}

fn mark_protocol_ports(comp: &mut Composition, protocol: &Protocol) {
    for port in protocol.inputs() {
        comp.mark_protocol_port(PortDirection::Input, &port.name);
    }
    for port in protocol.outputs() {
        comp.mark_protocol_port(PortDirection::Output, &port.name);
    }
}

fn parse_cable(
    comp: &mut Composition,
    ident_to_node: &HashMap<String, Uuid>,
    cable_line: &CableLine,
    issues: &mut Vec<Issue>,
) {
    let subject = format!(
        "{}:{} -> {}:{}",
        cable_line.from_ident, cable_line.from_port, cable_line.to_ident, cable_line.to_port
    );

    let from_node = if cable_line.from_ident == PUBLISHED_INPUTS_IDENT {
        Some(comp.published_input_node())
    } else {
        ident_to_node.get(&cable_line.from_ident).copied()
    };
    let to_node = if cable_line.to_ident == PUBLISHED_OUTPUTS_IDENT {
        Some(comp.published_output_node())
    } else {
        ident_to_node.get(&cable_line.to_ident).copied()
    };
    let (Some(from_node), Some(to_node)) = (from_node, to_node) else {
        issues.push(
            Issue::new(
                IssueKind::ParseError,
                subject,
                format!("cable on line {} references an unknown node", cable_line.line),
            )
            .with_hint("the cable was skipped"),
        );
        return;
    };

    let always_event_only = cable_line
        .attrs
        .iter()
        .any(|(k, v)| k == "event" && v == "true");
    let hidden = cable_line
        .attrs
        .iter()
        .any(|(k, v)| k == "hidden" && v == "true");

    match comp.connect(
        from_node,
        &cable_line.from_port,
        to_node,
        &cable_line.to_port,
        always_event_only,
    ) {
        Ok(cable_id) => {
            if hidden {
                let _ = comp.set_cable_hidden(cable_id, true);
            }
        }
        Err(e) => issues.push(
            Issue::new(
                IssueKind::ParseError,
                subject,
                format!("cable on line {} couldn't be restored: {}", cable_line.line, e),
            )
            .with_hint("the cable was skipped"),
        ),
    }
}

// --------------------------------------------------------------------------
// File helpers
// --------------------------------------------------------------------------

impl Composition {
    /// Serialize to the composition text format
    pub fn to_graph_text(&self) -> String {
        serialize_composition(self)
    }

    /// Save to a file in the composition text format
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SerializationError> {
        std::fs::write(path.as_ref(), self.to_graph_text()).map_err(|source| {
            SerializationError::WriteFailed {
                path: path.as_ref().to_path_buf(),
                source,
            }
        })
    }

    /// Load from a file in the composition text format
    pub fn load_from_file<P: AsRef<Path>>(
        path: P,
        catalog: &NodeClassCatalog,
    ) -> Result<ParseOutcome, SerializationError> {
        let text =
            std::fs::read_to_string(path.as_ref()).map_err(|source| SerializationError::ReadFailed {
                path: path.as_ref().to_path_buf(),
                source,
            })?;
        parse_composition(&text, catalog)
    }
}
