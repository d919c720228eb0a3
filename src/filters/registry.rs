//! Node registry for managing available node variants.

use crate::core::node::{Category, NodeMetadata, NodeVariant};
use indexmap::IndexMap;
use std::sync::Arc;

/// Factory function for creating variant instances.
pub type VariantFactory = Arc<dyn Fn() -> Box<dyn NodeVariant> + Send + Sync>;

/// Registry entry containing metadata and factory.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Factory function to create instances.
    pub factory: VariantFactory,
    /// Cached metadata (avoids creating an instance just to inspect it).
    pub metadata: NodeMetadata,
}

/// Registry of all available node variants.
///
/// Maps variant identifiers to factories, so front ends can build nodes
/// by name and list what is available.
pub struct NodeRegistry {
    /// Variants indexed by their unique ID.
    variants: IndexMap<String, RegistryEntry>,
    /// Variant IDs grouped by category.
    categories: IndexMap<Category, Vec<String>>,
}

impl NodeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            variants: IndexMap::new(),
            categories: IndexMap::new(),
        }
    }

    /// Create a registry pre-populated with built-in variants.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::filters::builtin::register_all(&mut registry);
        registry
    }

    /// Register a variant type. A later registration replaces an earlier
    /// one with the same ID.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn NodeVariant> + Send + Sync + 'static,
    {
        // Create a temporary instance to get metadata
        let metadata = factory().metadata();
        let id = metadata.id.clone();
        let category = metadata.category;

        if let Some(previous) = self.variants.shift_remove(&id) {
            if let Some(ids) = self.categories.get_mut(&previous.metadata.category) {
                ids.retain(|i| *i != id);
            }
            log::warn!("Replacing registered variant '{}'", id);
        }

        self.variants.insert(
            id.clone(),
            RegistryEntry {
                factory: Arc::new(factory),
                metadata,
            },
        );
        self.categories.entry(category).or_default().push(id);
    }

    /// Create a new instance of a variant by ID.
    pub fn create(&self, id: &str) -> Option<Box<dyn NodeVariant>> {
        self.variants.get(id).map(|e| (e.factory)())
    }

    /// Get metadata for a variant without creating an instance.
    pub fn get_metadata(&self, id: &str) -> Option<&NodeMetadata> {
        self.variants.get(id).map(|e| &e.metadata)
    }

    /// Check if a variant is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.variants.contains_key(id)
    }

    /// All registered variant IDs, in registration order.
    pub fn variant_ids(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(|s| s.as_str())
    }

    /// Variant IDs in a category.
    pub fn variants_by_category(&self, category: Category) -> Vec<&str> {
        self.categories
            .get(&category)
            .map(|ids| ids.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Search variants by ID, name or description.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();

        self.variants
            .values()
            .filter(|entry| {
                let m = &entry.metadata;
                m.id.to_lowercase().contains(&query)
                    || m.name.to_lowercase().contains(&query)
                    || m.description.to_lowercase().contains(&query)
            })
            .map(|entry| entry.metadata.id.as_str())
            .collect()
    }

    /// Remove a variant. Existing nodes of that variant are unaffected.
    pub fn unregister(&mut self, id: &str) -> bool {
        match self.variants.shift_remove(id) {
            Some(entry) => {
                if let Some(ids) = self.categories.get_mut(&entry.metadata.category) {
                    ids.retain(|i| i != id);
                }
                true
            }
            None => false,
        }
    }

    /// Get the total number of registered variants.
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Metadata grouped by category, each group sorted by name.
    pub fn grouped_by_category(&self) -> IndexMap<Category, Vec<&NodeMetadata>> {
        let mut grouped: IndexMap<Category, Vec<&NodeMetadata>> = IndexMap::new();

        for entry in self.variants.values() {
            grouped
                .entry(entry.metadata.category)
                .or_default()
                .push(&entry.metadata);
        }

        for variants in grouped.values_mut() {
            variants.sort_by(|a, b| a.name.cmp(&b.name));
        }

        grouped
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
