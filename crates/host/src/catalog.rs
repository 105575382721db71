//! Merged, name-unique tool catalog.

use crate::error::{HostError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A tool advertised by a connected server. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    /// Id of the server that owns this tool.
    pub server_id: String,
}

/// Name-addressable aggregate of every registered server's tools.
///
/// Duplicate names are rejected at registration; nothing is ever
/// silently overridden.
#[derive(Debug, Default)]
pub struct ToolCatalog {
    entries: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one server's descriptor batch, all-or-nothing.
    ///
    /// A name collision (with an already-registered tool or within the
    /// batch itself) fails the whole batch and leaves the catalog
    /// untouched.
    pub fn register(
        &mut self,
        server_id: &str,
        descriptors: Vec<ToolDescriptor>,
    ) -> Result<()> {
        let mut batch_names: HashMap<&str, ()> = HashMap::new();
        for d in &descriptors {
            if let Some(&i) = self.index.get(&d.name) {
                return Err(HostError::DuplicateToolName {
                    name: d.name.clone(),
                    existing: self.entries[i].server_id.clone(),
                    incoming: server_id.to_string(),
                });
            }
            if batch_names.insert(&d.name, ()).is_some() {
                return Err(HostError::DuplicateToolName {
                    name: d.name.clone(),
                    existing: server_id.to_string(),
                    incoming: server_id.to_string(),
                });
            }
        }

        for mut d in descriptors {
            d.server_id = server_id.to_string();
            self.index.insert(d.name.clone(), self.entries.len());
            self.entries.push(d);
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// All descriptors in registration order.
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the catalog as the tool block of the system prompt.
    pub fn render_for_prompt(&self) -> String {
        self.entries
            .iter()
            .map(|d| {
                format!(
                    "Tool: {}\nDescription: {}\nArguments (JSON Schema): {}",
                    d.name, d.description, d.input_schema
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
