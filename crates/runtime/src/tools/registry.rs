//! Name-keyed tool registry.

use std::collections::HashMap;
use std::sync::Arc;

use protocol::ToolListing;
use tokio::sync::RwLock;

use super::ToolDescriptor;
use crate::{Error, Result};

/// Registered tools, in registration order.
///
/// Reads take a shared lock; registration holds the write lock only for the
/// insert, so a lookup sees either the whole descriptor or nothing.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<Entries>,
}

#[derive(Default)]
struct Entries {
    ordered: Vec<Arc<ToolDescriptor>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is taken; the existing tool stays.
    pub async fn register(&self, descriptor: ToolDescriptor) -> Result<Arc<ToolDescriptor>> {
        let mut entries = self.entries.write().await;
        if entries.by_name.contains_key(&descriptor.name) {
            return Err(Error::DuplicateName(descriptor.name));
        }

        let descriptor = Arc::new(descriptor);
        let index = entries.ordered.len();
        entries.by_name.insert(descriptor.name.clone(), index);
        entries.ordered.push(descriptor.clone());
        tracing::info!(tool = %descriptor.name, "registered tool");
        Ok(descriptor)
    }

    /// Get a tool by name.
    pub async fn lookup(&self, name: &str) -> Result<Arc<ToolDescriptor>> {
        let entries = self.entries.read().await;
        entries
            .by_name
            .get(name)
            .map(|&index| entries.ordered[index].clone())
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    /// Snapshot of all tools in registration order.
    pub async fn list(&self) -> ToolList {
        ToolList {
            tools: self.entries.read().await.ordered.clone(),
        }
    }

    /// Public listings of all tools in registration order.
    pub async fn listings(&self) -> Vec<ToolListing> {
        self.list().await.iter().map(|tool| tool.listing()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.ordered.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Point-in-time view of the registry; can be iterated any number of times.
#[derive(Debug, Clone, Default)]
pub struct ToolList {
    tools: Vec<Arc<ToolDescriptor>>,
}

impl ToolList {
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<ToolDescriptor>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl<'a> IntoIterator for &'a ToolList {
    type Item = &'a Arc<ToolDescriptor>;
    type IntoIter = std::slice::Iter<'a, Arc<ToolDescriptor>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tools.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::handler_fn;
    use protocol::{ParamSpec, ParamType, ParameterSchema};
    use serde_json::{Value, json};

    fn descriptor(name: &str, description: &str) -> ToolDescriptor {
        ToolDescriptor::new(
            name,
            description,
            ParameterSchema::new().field("q", ParamSpec::new(ParamType::String)),
            handler_fn(|_| async { Ok(Value::Null) }),
        )
    }

    #[tokio::test]
    async fn lookup_returns_registered_descriptor() {
        let registry = ToolRegistry::new();
        let registered = registry.register(descriptor("search", "Search")).await.unwrap();
        let found = registry.lookup("search").await.unwrap();
        assert!(Arc::ptr_eq(&registered, &found));
        assert!(Arc::ptr_eq(&registered.handler, &found.handler));
        assert_eq!(found.schema, registered.schema);
    }

    #[tokio::test]
    async fn duplicate_name_keeps_first() {
        let registry = ToolRegistry::new();
        registry.register(descriptor("search", "first")).await.unwrap();
        let err = registry
            .register(descriptor("search", "second"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName(name) if name == "search"));
        assert_eq!(registry.lookup("search").await.unwrap().description, "first");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_tool_lookup_fails() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.lookup("nope").await,
            Err(Error::UnknownTool(name)) if name == "nope"
        ));
    }

    #[tokio::test]
    async fn list_preserves_registration_order() {
        let registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(descriptor(name, name)).await.unwrap();
        }
        let list = registry.list().await;
        let first: Vec<_> = list.iter().map(|t| t.name.as_str()).collect();
        let second: Vec<_> = (&list).into_iter().map(|t| t.name.as_str()).collect();
        assert_eq!(first, vec!["zeta", "alpha", "mid"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn listings_reflect_current_state() {
        let registry = ToolRegistry::new();
        assert!(registry.listings().await.is_empty());
        registry.register(descriptor("search", "Search files")).await.unwrap();
        let listings = registry.listings().await;
        assert_eq!(listings.len(), 1);
        assert_eq!(
            serde_json::to_value(&listings[0]).unwrap(),
            json!({
                "name": "search",
                "description": "Search files",
                "parameterSchema": {"q": {"type": "string"}}
            })
        );
    }

    #[tokio::test]
    async fn concurrent_registration_admits_one_winner() {
        let registry = Arc::new(ToolRegistry::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .register(descriptor("shared", &format!("writer {i}")))
                    .await
                    .is_ok()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(registry.len().await, 1);
    }
}
