//! Cableflow - Compiler front end for a node-based visual dataflow language
//!
//! This library provides the core functionality for Cableflow, including:
//! - Node class loading from compiled module IR
//! - Value type registry with generic/specialized type resolution
//! - The composition model (nodes, ports, cables, published ports)
//! - Composition text format round-tripping
//! - Validation and the generic-type specialization engine

pub mod catalog;
pub mod graph;
pub mod module;
pub mod specialize;
pub mod types;

/// Initialize the logging framework
///
/// Configures env_logger to support RUST_LOG environment variable.
/// Call this once at application startup.
///
/// # Examples
///
/// ```no_run
/// cableflow::init_logging();
/// log::info!("Application started");
/// ```
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .init();

    log::info!("Cableflow logging initialized");
}

/// Re-export commonly used types
pub use catalog::NodeClassCatalog;
pub use graph::{Cable, Composition, Node, NodeClass, Port, PortClass, PublishedPort};
pub use module::ModuleIr;
pub use types::TypeRegistry;

/// Application errors
#[derive(Debug, thiserror::Error)]
pub enum CableflowError {
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

/// Errors from parsing a node class out of a compiled module
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// The module defines neither `nodeEvent` nor `nodeInstanceEvent`, so it
    /// is not a node class at all. Callers may discard this silently.
    #[error("Module '{0}' does not define a node class")]
    NotANodeClass(String),

    #[error("Malformed module '{module}': {reason}")]
    Malformed { module: String, reason: String },
}

/// Errors from composition mutations. The attempted mutation is rolled back
/// before any of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Node class '{0}' is not in the catalog")]
    UnknownNodeClass(String),

    #[error("Node {0} not found in composition")]
    NodeNotFound(uuid::Uuid),

    #[error("Port '{port}' not found on node {node}")]
    PortNotFound { node: uuid::Uuid, port: String },

    #[error("Cable {0} not found in composition")]
    CableNotFound(uuid::Uuid),

    #[error("Invalid cable: {0}")]
    InvalidCable(String),

    #[error("Type mismatch: cannot connect {from} to {to}")]
    TypeMismatch { from: String, to: String },

    #[error("Port '{0}' does not carry data")]
    NotADataPort(String),

    #[error("Port '{0}' is not a trigger port")]
    NotATriggerPort(String),

    #[error("Port '{port}' has a connected data cable; constants apply only to unconnected inputs")]
    PortHasDataCable { port: String },

    #[error("Node {0} is still referenced by cables")]
    NodeHasCables(uuid::Uuid),

    #[error("Published port '{0}' not found")]
    PublishedPortNotFound(String),

    #[error("Published port name '{0}' is already in use")]
    PublishedNameInUse(String),

    #[error("Comment {0} not found in composition")]
    CommentNotFound(uuid::Uuid),

    #[error("Cannot specialize port '{port}' to '{type_name}': not in the compatible set")]
    IncompatibleSpecialization { port: String, type_name: String },

    #[error("Specialized node class '{0}' is unavailable; operation rolled back")]
    SpecializedClassUnavailable(String),
}

/// Errors from reading or writing the composition text format
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Not a composition: {0}")]
    NotAComposition(String),

    #[error("Syntax error on line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Classification of validation and load-time issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IssueKind {
    /// A module could not be turned into a node class.
    ModuleMalformed,
    /// A composition file element could not be loaded; the rest of the
    /// composition still loads.
    ParseError,
    /// A structural invariant does not hold.
    InvariantViolation,
    /// Cable or specialization types do not unify.
    TypeMismatch,
    /// A node references a class the catalog only has a placeholder for.
    UnresolvedDependency,
    /// A data-cable cycle that the scheduler cannot order.
    FeedbackLoop,
    /// The active protocol's mandated published ports are missing or mistyped.
    ProtocolViolation,
    /// An attachment whose host node or host port is gone.
    AttachmentOrphan,
}

/// A single validation or load-time issue.
///
/// Issues are collected into lists rather than thrown; callers may ignore
/// them at their own risk.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Identifier of the offending entity (node identifier, cable endpoint
    /// pair, class name, published port name).
    pub subject: String,
    /// Short user-facing description.
    pub summary: String,
    /// Optional suggestion for resolving the issue.
    pub hint: Option<String>,
}

impl Issue {
    pub fn new(kind: IssueKind, subject: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            summary: summary.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {} ({})", self.kind, self.summary, self.subject)?;
        if let Some(hint) = &self.hint {
            write!(f, " -- {}", hint)?;
        }
        Ok(())
    }
}
