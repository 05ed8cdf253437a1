//! Core domain types for kiln.

pub mod node_group;

// Re-exports
pub use node_group::{validate_name, Node, NodeGroup};
