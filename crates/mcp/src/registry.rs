//! The capability registry.
//!
//! Populated once at startup, then shared as `Arc<Registry>` and only read.
//! Registration is the single place where name collisions are detected.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::capability::{Capability, CapabilityKind, Descriptor};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} `{name}` is already registered")]
    Duplicate { kind: CapabilityKind, name: String },
}

#[derive(Debug, Default)]
pub struct Registry {
    // registration order, for listing
    entries: Vec<Capability>,
    // lookup key (the URI for resources) -> entry
    index: HashMap<(CapabilityKind, String), usize>,
    // names are unique within a kind, whatever the lookup key
    names: HashSet<(CapabilityKind, String)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability. Fails if one of the same kind already has its name,
    /// or for resources its URI.
    pub fn register(&mut self, capability: Capability) -> Result<(), RegistryError> {
        let descriptor = capability.descriptor();
        let key = (descriptor.kind, descriptor.key().to_string());
        let name = (descriptor.kind, descriptor.name.clone());
        if self.index.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                kind: key.0,
                name: key.1,
            });
        }
        if self.names.contains(&name) {
            return Err(RegistryError::Duplicate {
                kind: name.0,
                name: name.1,
            });
        }
        tracing::debug!(kind = %key.0, name = %name.1, key = %key.1, "registered capability");
        self.index.insert(key, self.entries.len());
        self.names.insert(name);
        self.entries.push(capability);
        Ok(())
    }

    pub fn lookup(&self, kind: CapabilityKind, key: &str) -> Option<&Capability> {
        self.index
            .get(&(kind, key.to_string()))
            .map(|&i| &self.entries[i])
    }

    /// Descriptors of one kind, in registration order. Each call starts a
    /// fresh pass.
    pub fn list(&self, kind: CapabilityKind) -> impl Iterator<Item = &Descriptor> + '_ {
        self.entries
            .iter()
            .map(Capability::descriptor)
            .filter(move |d| d.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityError;
    use serde_json::{Value, json};

    fn echo(name: &str) -> Capability {
        Capability::new(
            Descriptor {
                kind: CapabilityKind::Tool,
                name: name.into(),
                description: format!("{name} tool"),
                input_schema: json!({ "type": "object", "properties": { "x": { "type": "string" } } }),
                output_schema: None,
                uri: None,
                mime_type: None,
            },
            |input: Value| async move { Ok::<_, CapabilityError>(input) },
        )
    }

    #[test]
    fn listed_descriptors_match_registration() {
        let mut registry = Registry::new();
        let a = echo("a");
        let b = echo("b");
        registry.register(a.clone()).unwrap();
        registry.register(b.clone()).unwrap();

        let listed: Vec<_> = registry.list(CapabilityKind::Tool).cloned().collect();
        assert_eq!(listed, vec![a.descriptor().clone(), b.descriptor().clone()]);
        // restartable
        assert_eq!(registry.list(CapabilityKind::Tool).count(), 2);
        assert_eq!(registry.list(CapabilityKind::Prompt).count(), 0);
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = Registry::new();
        registry.register(echo("a")).unwrap();
        let err = registry.register(echo("a")).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                kind: CapabilityKind::Tool,
                name: "a".into()
            }
        );
        assert_eq!(registry.len(), 1);
    }

    fn doc(uri: &str, name: &str) -> Capability {
        Capability::resource(uri, name, "docs", "text/markdown", || async {
            Ok::<_, CapabilityError>(String::from("# docs"))
        })
    }

    #[test]
    fn resource_names_are_unique_across_uris() {
        let mut registry = Registry::new();
        registry.register(doc("docs://a", "docs")).unwrap();
        let err = registry.register(doc("docs://b", "docs")).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                kind: CapabilityKind::Resource,
                name: "docs".into()
            }
        );
        assert_eq!(registry.list(CapabilityKind::Resource).count(), 1);
        assert!(registry.lookup(CapabilityKind::Resource, "docs://b").is_none());
    }

    #[test]
    fn resource_uris_are_unique() {
        let mut registry = Registry::new();
        registry.register(doc("docs://a", "first")).unwrap();
        assert!(registry.register(doc("docs://a", "second")).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_name_in_different_kinds_is_allowed() {
        let mut registry = Registry::new();
        registry.register(echo("summarize")).unwrap();
        let prompt = Capability::new(
            Descriptor {
                kind: CapabilityKind::Prompt,
                ..echo("summarize").descriptor().clone()
            },
            |_: Value| async { Ok::<_, CapabilityError>(json!([])) },
        );
        registry.register(prompt).unwrap();
        assert!(registry.lookup(CapabilityKind::Prompt, "summarize").is_some());
        assert!(registry.lookup(CapabilityKind::Resource, "summarize").is_none());
    }
}
