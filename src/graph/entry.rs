//! Named entry points into a step graph.

use super::{GraphError, StepId};
use indexmap::IndexMap;
use serde::Serialize;

/// A user-facing name bound to a root step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPoint {
    /// Name used on the command line.
    pub name: String,
    /// One-line summary shown by `list`.
    pub description: String,
    /// Step whose dependency closure the entry point executes.
    pub root: StepId,
}

/// Insertion-ordered map of entry points with an optional default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryPointRegistry {
    entries: IndexMap<String, EntryPoint>,
    default: Option<String>,
}

impl EntryPointRegistry {
    /// Add an entry point.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateEntryPoint`] when the name is taken.
    pub fn register(&mut self, entry: EntryPoint) -> Result<(), GraphError> {
        if self.entries.contains_key(&entry.name) {
            return Err(GraphError::DuplicateEntryPoint { name: entry.name });
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Make `name` the entry point used when none is requested.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownEntryPoint`] when `name` is not
    /// registered.
    pub fn set_default(&mut self, name: &str) -> Result<(), GraphError> {
        if !self.entries.contains_key(name) {
            return Err(GraphError::UnknownEntryPoint { name: name.to_owned() });
        }
        self.default = Some(name.to_owned());
        Ok(())
    }

    /// Look up an entry point by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EntryPoint> {
        self.entries.get(name)
    }

    /// The default entry point, if one was chosen.
    #[must_use]
    pub fn default_entry(&self) -> Option<&EntryPoint> {
        self.default.as_deref().and_then(|name| self.entries.get(name))
    }

    /// Iterate in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &EntryPoint> {
        self.entries.values()
    }

    /// Number of registered entry points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry point is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
