//! Table and JSON output formatting for CLI commands.

use serde::Serialize;
use tabled::{Table, Tabled};

use drivetree_entity::node::Node;

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}

/// Node display row
#[derive(Debug, Serialize, Tabled)]
pub struct NodeRow {
    /// Node ID
    id: String,
    /// Name
    name: String,
    /// "folder" or "file"
    kind: String,
    /// Size in bytes
    size: i64,
    /// Last change
    updated_at: String,
}

impl From<&Node> for NodeRow {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.to_string(),
            name: node.name.clone(),
            kind: node.kind().to_string(),
            size: node.size_bytes,
            updated_at: node.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Print a list of items in the selected format
pub fn print_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No results found.");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string());
            println!("{json}");
        }
    }
}

/// Print one node as key-value pairs or JSON
pub fn print_node(node: &Node, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_kv("id", &node.id.to_string());
            print_kv("name", &node.name);
            print_kv("kind", &node.kind().to_string());
            print_kv(
                "parent",
                &node
                    .parent_id
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "(root)".to_string()),
            );
            print_kv("size", &node.size_bytes.to_string());
            if let Some(key) = &node.storage_key {
                print_kv("storage key", key);
            }
            if let Some(ct) = &node.content_type {
                print_kv("content type", ct);
            }
            print_kv("created", &node.created_at.to_rfc3339());
            print_kv("updated", &node.updated_at.to_rfc3339());
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(node).unwrap_or_else(|_| "{}".to_string());
            println!("{json}");
        }
    }
}

/// Print a success message
pub fn print_success(msg: &str) {
    eprintln!("✓ {msg}");
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    eprintln!("⚠ {msg}");
}

/// Print an error message
pub fn print_error(msg: &str) {
    eprintln!("✗ {msg}");
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<16} {}", format!("{key}:"), value);
}
