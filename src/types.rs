//! Value types and the shared type registry
//!
//! Every port that carries data references exactly one value type by name.
//! A name is either concrete (known underlying storage) or a generic
//! placeholder that the specialization engine later resolves to one of its
//! compatible concrete types. The "list of T" relationship is a name-prefix
//! convention (`list.real` is a list of `real`).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// Name prefix marking a list type
pub const LIST_PREFIX: &str = "list.";

/// Regular expression matching generic placeholder names (`generic1`, ...)
fn generic_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^generic\d+$").unwrap())
}

/// Returns true if `name` is a list type name
pub fn is_list_name(name: &str) -> bool {
    name.starts_with(LIST_PREFIX)
}

/// Strips any number of list prefixes, returning the innermost type name
pub fn innermost_name(name: &str) -> &str {
    let mut inner = name;
    while let Some(stripped) = inner.strip_prefix(LIST_PREFIX) {
        inner = stripped;
    }
    inner
}

/// Wraps a type name into its list form
pub fn list_name(inner: &str) -> String {
    format!("{}{}", LIST_PREFIX, inner)
}

/// Returns true if `name` (or its innermost element type) is a generic placeholder
pub fn is_generic_name(name: &str) -> bool {
    generic_name_regex().is_match(innermost_name(name))
}

/// Substitute a generic innermost name with a concrete one, preserving the
/// list prefix. Returns `name` unchanged if its innermost name differs from
/// `generic`.
pub fn substitute_name(name: &str, generic: &str, concrete: &str) -> String {
    if innermost_name(name) != generic {
        return name.to_string();
    }
    let prefix_len = name.len() - innermost_name(name).len();
    format!("{}{}", &name[..prefix_len], concrete)
}

/// What a value type name refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    /// A type with known underlying storage.
    Concrete,
    /// A type variable, resolved by the specialization engine.
    Generic {
        /// Concrete names this generic may specialize to, in declaration order.
        compatible: Vec<String>,
        /// The specialization chosen when instantiating without an explicit choice.
        default: Option<String>,
    },
}

/// The authoritative record for one value type name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueType {
    name: String,
    kind: TypeKind,
}

impl ValueType {
    pub fn concrete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Concrete,
        }
    }

    pub fn generic(name: impl Into<String>, compatible: Vec<String>, default: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Generic { compatible, default },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn is_generic(&self) -> bool {
        matches!(self.kind, TypeKind::Generic { .. })
    }

    pub fn is_list(&self) -> bool {
        is_list_name(&self.name)
    }

    /// The ordered set of concrete names this type may specialize to.
    /// Empty for concrete types and for generics that declared no set.
    pub fn compatible_specializations(&self) -> &[String] {
        match &self.kind {
            TypeKind::Generic { compatible, .. } => compatible,
            TypeKind::Concrete => &[],
        }
    }

    /// The declared default specialization, if any.
    pub fn default_specialization(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Generic { default, .. } => default.as_deref(),
            TypeKind::Concrete => None,
        }
    }

    /// Returns true if specializing this type to `concrete` is permitted.
    /// A generic with no declared compatible set accepts any concrete type.
    pub fn accepts_specialization(&self, concrete: &str) -> bool {
        match &self.kind {
            TypeKind::Concrete => false,
            TypeKind::Generic { compatible, .. } => {
                compatible.is_empty() || compatible.iter().any(|c| c == concrete)
            }
        }
    }
}

/// The single authoritative record per value type name.
///
/// Shared by the composition model and the specialization engine: mutations
/// are serialized behind the write lock, lookups proceed in parallel.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<ValueType>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a type by name without creating it
    pub fn lookup(&self, name: &str) -> Option<Arc<ValueType>> {
        self.types.read().ok()?.get(name).cloned()
    }

    /// Get or create the record for `name`.
    ///
    /// Unknown names become new records: a generic placeholder when the name
    /// matches the generic-name pattern, a concrete entry otherwise.
    pub fn intern(&self, name: &str) -> Arc<ValueType> {
        if let Some(existing) = self.lookup(name) {
            return existing;
        }

        let record = if is_generic_name(name) {
            ValueType::generic(name, Vec::new(), None)
        } else {
            ValueType::concrete(name)
        };

        let mut types = self.types.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            types
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(record)),
        )
    }

    /// Get or create a generic record carrying compatibility metadata from a
    /// declaring node class.
    ///
    /// The first declaration with a non-empty compatible set wins; later
    /// declarations only fill in a record that had none.
    pub fn intern_generic(
        &self,
        name: &str,
        compatible: Vec<String>,
        default: Option<String>,
    ) -> Arc<ValueType> {
        let mut types = self.types.write().unwrap_or_else(|e| e.into_inner());
        match types.get(name) {
            Some(existing) if !existing.compatible_specializations().is_empty() => {
                Arc::clone(existing)
            }
            _ => {
                let record = Arc::new(ValueType::generic(name, compatible, default));
                types.insert(name.to_string(), Arc::clone(&record));
                record
            }
        }
    }

    /// Convenience wrapper over `lookup` for the ordered compatible set
    pub fn compatible_specializations(&self, generic_name: &str) -> Vec<String> {
        self.lookup(generic_name)
            .map(|t| t.compatible_specializations().to_vec())
            .unwrap_or_default()
    }

    /// Names of every interned type, sorted
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .types
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
