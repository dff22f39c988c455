//! MCP server merge.
//!
//! Servers are identified by name only. The destination always wins a name
//! collision; the source only fills in names the destination doesn't have.
//! A server another installed kit still ships is never removed.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::resolver::{resolve, Presence, Resolution};
use crate::types::McpSection;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct McpMergeDelta {
    /// `None` when neither side had an `mcp` section.
    pub section: Option<McpSection>,
    pub preserved: usize,
    pub skipped: usize,
    pub removed: usize,
    pub conflicts: Vec<String>,
    pub removed_servers: Vec<String>,
    pub newly_installed: Vec<String>,
    /// Sibling keys of `servers` the source filled in.
    pub rest_added: Vec<String>,
}

/// Merges the `mcp` sections. `installed` holds the server names a previous
/// install of this kit recorded; `claimed` maps server names other installed
/// kits ship to the kit that ships them.
pub fn merge_mcp(
    source: Option<&McpSection>,
    dest: Option<&McpSection>,
    installed: &HashSet<String>,
    claimed: &HashMap<String, String>,
) -> McpMergeDelta {
    let mut delta = McpMergeDelta::default();
    if source.is_none() && dest.is_none() {
        return delta;
    }

    let empty = Map::new();
    let source_servers = source.map(|s| &s.servers).unwrap_or(&empty);
    let dest_servers = dest.map(|d| &d.servers).unwrap_or(&empty);

    // Removal pass. Rebuilt rather than removed in place to keep file order.
    let mut servers: Map<String, Value> = Map::new();
    for (name, config) in dest_servers {
        let resolution = resolve(Presence {
            in_source: source_servers.contains_key(name),
            in_snapshot: installed.contains(name),
            in_dest: true,
        });
        if resolution == Resolution::Remove {
            if let Some(kit) = claimed.get(name) {
                debug!(server = %name, kit = %kit, "Keeping MCP server another kit still ships");
                servers.insert(name.clone(), config.clone());
                continue;
            }
            debug!(server = %name, "Removing deprecated MCP server");
            delta.removed += 1;
            delta.removed_servers.push(name.clone());
            continue;
        }
        servers.insert(name.clone(), config.clone());
    }

    // Addition pass.
    for (name, config) in source_servers {
        let resolution = resolve(Presence {
            in_source: true,
            in_snapshot: installed.contains(name),
            in_dest: servers.contains_key(name),
        });
        match resolution {
            Resolution::Conflict => {
                delta.preserved += 1;
                if servers.get(name) != Some(config) {
                    delta.conflicts.push(format!(
                        "MCP server \"{name}\" already configured, kept existing configuration"
                    ));
                }
            }
            Resolution::SkipUserDeleted => {
                debug!(server = %name, "Skipping MCP server the user removed");
                delta.skipped += 1;
            }
            _ => {
                servers.insert(name.clone(), config.clone());
                delta.newly_installed.push(name.clone());
            }
        }
    }

    let mut rest = dest.map(|d| d.rest.clone()).unwrap_or_default();
    if let Some(source) = source {
        for (key, value) in &source.rest {
            if !rest.contains_key(key) {
                rest.insert(key.clone(), value.clone());
                delta.rest_added.push(key.clone());
            }
        }
    }

    debug!(
        servers = servers.len(),
        added = delta.newly_installed.len(),
        preserved = delta.preserved,
        removed = delta.removed,
        "Merged MCP servers"
    );

    delta.section = Some(McpSection { servers, rest });
    delta
}
