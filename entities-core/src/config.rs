//! Tunables for documents and diffing.
//!
//! Both types deserialize with any serde format; missing fields take their
//! defaults.

use serde::Deserialize;

/// Sizing and limits for a [`crate::Document`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Bytes per standard text buffer.
    pub text_buffer_size: usize,
    /// Node records per standard node buffer.
    pub node_buffer_size: usize,
    /// Child references per standard child-array buffer.
    pub child_buffer_size: usize,
    /// Committed groups kept for undo; the oldest is evicted past this.
    pub history_capacity: usize,
    /// Deepest brace nesting the parser accepts.
    pub max_depth: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        DocumentConfig {
            text_buffer_size: 1 << 20,
            node_buffer_size: 16 * 1024,
            child_buffer_size: 32 * 1024,
            history_capacity: 100,
            max_depth: 256,
        }
    }
}

/// How entities are keyed when diffing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Entity-level leaf holding the entity's numeric submap index.
    pub submap_field: String,
    /// Unquoted `class` of the entity that names a submap.
    pub marker_class: String,
}

impl Default for DiffConfig {
    fn default() -> Self {
        DiffConfig {
            submap_field: "instanceId".to_string(),
            marker_class: "idWorldspawn".to_string(),
        }
    }
}
