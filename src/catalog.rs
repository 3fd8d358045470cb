//! The node class catalog
//!
//! Maps class name to the published, immutable `NodeClass`. Classes are
//! added and removed atomically as modules load and unload; worker threads
//! share the catalog behind a read-write lock. Two variants coexist:
//! substantial classes parsed from modules, and placeholders standing in for
//! missing implementations so compositions keep loading.

use crate::graph::node_class::NodeClass;
use crate::module::{ModuleIr, ModuleParser};
use crate::types::TypeRegistry;
use crate::ModuleError;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// Class name -> node class, shared across threads
#[derive(Debug, Default)]
pub struct NodeClassCatalog {
    classes: RwLock<HashMap<String, Arc<NodeClass>>>,
}

impl NodeClassCatalog {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// Parse a module and install the resulting class.
    ///
    /// An existing class under the same name (a placeholder, or a previous
    /// version of the implementation) is replaced. Returns the installed
    /// class and whether a replacement happened.
    pub fn load_module(
        &self,
        registry: &TypeRegistry,
        module: &ModuleIr,
    ) -> Result<(Arc<NodeClass>, bool), ModuleError> {
        let class = ModuleParser::new(registry).parse(module)?;
        Ok(self.install(class))
    }

    /// Install an already-built class, replacing any existing entry
    pub fn install(&self, class: NodeClass) -> (Arc<NodeClass>, bool) {
        let name = class.class_name().to_string();
        let class = Arc::new(class);
        let mut classes = self.classes.write().unwrap_or_else(|e| e.into_inner());
        let replaced = classes.insert(name.clone(), Arc::clone(&class)).is_some();
        if replaced {
            log::info!("Node class '{}' already exists - replacing", name);
        } else {
            log::debug!("Registered node class '{}'", name);
        }
        (class, replaced)
    }

    /// Remove a class when its module unloads
    pub fn remove(&self, class_name: &str) -> Option<Arc<NodeClass>> {
        let mut classes = self.classes.write().unwrap_or_else(|e| e.into_inner());
        let removed = classes.remove(class_name);
        if removed.is_some() {
            log::info!("Removed node class '{}'", class_name);
        }
        removed
    }

    pub fn lookup(&self, class_name: &str) -> Option<Arc<NodeClass>> {
        self.classes.read().ok()?.get(class_name).cloned()
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.classes
            .read()
            .map(|c| c.contains_key(class_name))
            .unwrap_or(false)
    }

    /// Look up a class, standing up a placeholder when it is missing so the
    /// caller's composition stays loadable
    pub fn lookup_or_placeholder(&self, class_name: &str) -> Arc<NodeClass> {
        if let Some(class) = self.lookup(class_name) {
            return class;
        }
        log::warn!(
            "Node class '{}' is not installed; using a placeholder",
            class_name
        );
        let placeholder = Arc::new(NodeClass::placeholder(class_name));
        let mut classes = self.classes.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            classes
                .entry(class_name.to_string())
                .or_insert(placeholder),
        )
    }

    /// All installed classes, sorted by name
    pub fn classes(&self) -> Vec<Arc<NodeClass>> {
        let mut all: Vec<Arc<NodeClass>> = self
            .classes
            .read()
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.class_name().cmp(b.class_name()));
        all
    }

    pub fn len(&self) -> usize {
        self.classes.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Module names a class requires linked in, if the class is installed
    pub fn dependencies(&self, class_name: &str) -> Option<BTreeSet<String>> {
        self.lookup(class_name).map(|c| c.dependencies().clone())
    }

    /// Names of every placeholder currently standing in for a missing
    /// implementation
    pub fn placeholder_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .classes
            .read()
            .map(|c| {
                c.values()
                    .filter(|class| class.is_placeholder())
                    .map(|class| class.class_name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{FunctionIr, ParameterIr};

    fn add_module() -> ModuleIr {
        ModuleIr::new("vuo.math.add")
            .with_metadata(serde_json::json!({"title": "Add"}))
            .with_function(FunctionIr::new(
                crate::module::ir::NODE_EVENT,
                vec![
                    ParameterIr::new("values", false, vec!["InputData", "Type:list.real"]),
                    ParameterIr::new("sum", true, vec!["OutputData", "Type:real"]),
                ],
            ))
    }

    #[test]
    fn test_load_and_lookup() {
        let registry = TypeRegistry::new();
        let catalog = NodeClassCatalog::new();

        let (class, replaced) = catalog.load_module(&registry, &add_module()).unwrap();
        assert!(!replaced);
        assert_eq!(class.class_name(), "vuo.math.add");
        assert!(catalog.contains("vuo.math.add"));
        assert_eq!(catalog.len(), 1);

        // Reloading the module replaces the entry.
        let (_, replaced) = catalog.load_module(&registry, &add_module()).unwrap();
        assert!(replaced);
        assert_eq!(catalog.len(), 1);

        assert!(catalog.remove("vuo.math.add").is_some());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_placeholder_keeps_compositions_loadable() {
        let catalog = NodeClassCatalog::new();
        let placeholder = catalog.lookup_or_placeholder("vuo.missing.node");
        assert!(placeholder.is_placeholder());
        assert_eq!(catalog.placeholder_names(), ["vuo.missing.node"]);

        // A later real installation replaces the placeholder.
        let registry = TypeRegistry::new();
        let mut module = add_module();
        module.key = "vuo.missing.node".to_string();
        catalog.load_module(&registry, &module).unwrap();
        assert!(!catalog.lookup("vuo.missing.node").unwrap().is_placeholder());
        assert!(catalog.placeholder_names().is_empty());
    }

    #[test]
    fn test_dependencies_exposed() {
        let registry = TypeRegistry::new();
        let catalog = NodeClassCatalog::new();
        catalog.load_module(&registry, &add_module()).unwrap();

        let deps = catalog.dependencies("vuo.math.add").unwrap();
        assert!(deps.contains("list.real"));
        assert!(deps.contains("real"));
    }
}
