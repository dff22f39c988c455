//! Settings merge engine.
//!
//! Reconciles a kit's template settings (the source) with the user's existing
//! settings (the destination) without losing user edits.
//!
//! # Module Structure
//!
//! - [`hooks`]: per-event hook merge with dedup, removal and origin tagging
//! - [`mcp`]: MCP server merge keyed by server name
//! - [`resolver`]: the add / skip / remove / preserve decision shared by both
//!
//! # Key Entry Points
//!
//! - [`merge_settings`]: one kit into one destination
//! - [`merge_settings_with`]: continue a multi-kit session, feeding the previous
//!   result's `merged` tree back in as the destination
//!
//! Sub-merges return deltas; this module folds them into [`MergeResult`].
//! Inputs are never mutated.

pub mod hooks;
pub mod mcp;
pub mod resolver;

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::types::{
    HookEntry, HookTable, InstalledSettings, KitClaims, McpSection, SettingsTree, HOOKS_KEY,
    MCP_KEY,
};
use hooks::{merge_hook_entries, HookMergeDelta};
use mcp::{merge_mcp, McpMergeDelta};

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Kit the source belongs to; used for `_origin` tags and `hooks_by_origin`.
    pub source_kit: Option<String>,
    /// What the previous install of this kit recorded. `None` is a fresh install.
    pub installed_settings: Option<InstalledSettings>,
    /// What other installed kits ship; never removed on this kit's behalf.
    pub claims: KitClaims,
}

impl MergeOptions {
    pub fn for_kit(kit: impl Into<String>) -> Self {
        Self {
            source_kit: Some(kit.into()),
            installed_settings: None,
            claims: KitClaims::default(),
        }
    }

    pub fn with_installed(mut self, installed: InstalledSettings) -> Self {
        self.installed_settings = Some(installed);
        self
    }

    pub fn with_claims(mut self, claims: KitClaims) -> Self {
        self.claims = claims;
        self
    }
}

/// Aggregate report of one or more merge passes.
///
/// Counters, lists and `hooks_by_origin` accumulate across passes when the
/// result is threaded through [`merge_settings_with`]; `merged` always holds
/// the latest tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub merged: SettingsTree,
    pub hooks_added: usize,
    pub hooks_preserved: usize,
    pub hooks_skipped: usize,
    pub hooks_removed: usize,
    pub mcp_servers_preserved: usize,
    pub mcp_servers_skipped: usize,
    pub mcp_servers_removed: usize,
    pub conflicts_detected: Vec<String>,
    pub removed_hooks: Vec<String>,
    pub removed_mcp_servers: Vec<String>,
    pub newly_installed_hooks: Vec<String>,
    pub newly_installed_servers: Vec<String>,
    /// Kit id → raw commands that kit added.
    pub hooks_by_origin: BTreeMap<String, Vec<String>>,
    /// Keys the source filled in: top-level names, and `mcp.<key>` for
    /// siblings of `mcp.servers`.
    pub keys_added: Vec<String>,
}

impl MergeResult {
    fn absorb_hooks(&mut self, delta: HookMergeDelta, origin: Option<&str>) -> Vec<HookEntry> {
        self.hooks_added += delta.added;
        self.hooks_preserved += delta.preserved;
        self.hooks_skipped += delta.skipped;
        self.hooks_removed += delta.removed;
        self.conflicts_detected.extend(delta.conflicts);
        self.removed_hooks.extend(delta.removed_hooks);
        self.newly_installed_hooks.extend(delta.newly_installed);
        if let Some(kit) = origin {
            if !delta.origin_commands.is_empty() {
                self.hooks_by_origin
                    .entry(kit.to_string())
                    .or_default()
                    .extend(delta.origin_commands);
            }
        }
        delta.entries
    }

    fn absorb_mcp(&mut self, delta: McpMergeDelta) -> Option<McpSection> {
        self.mcp_servers_preserved += delta.preserved;
        self.mcp_servers_skipped += delta.skipped;
        self.mcp_servers_removed += delta.removed;
        self.conflicts_detected.extend(delta.conflicts);
        self.removed_mcp_servers.extend(delta.removed_servers);
        self.newly_installed_servers.extend(delta.newly_installed);
        self.keys_added
            .extend(delta.rest_added.into_iter().map(|key| format!("{MCP_KEY}.{key}")));
        delta.section
    }

    /// True when any pass added or removed a hook, a server or a key.
    pub fn has_changes(&self) -> bool {
        self.hooks_added > 0
            || self.hooks_removed > 0
            || self.mcp_servers_removed > 0
            || !self.newly_installed_servers.is_empty()
            || !self.keys_added.is_empty()
    }
}

/// Merges `source` into `destination` and reports what happened.
pub fn merge_settings(
    source: &SettingsTree,
    destination: &SettingsTree,
    options: &MergeOptions,
) -> MergeResult {
    merge_settings_with(MergeResult::default(), source, destination, options)
}

/// Like [`merge_settings`], accumulating into a result from earlier passes.
pub fn merge_settings_with(
    prior: MergeResult,
    source: &SettingsTree,
    destination: &SettingsTree,
    options: &MergeOptions,
) -> MergeResult {
    let mut result = prior;
    let kit = options.source_kit.as_deref();
    let installed_hooks: HashSet<String> = options
        .installed_settings
        .as_ref()
        .map(InstalledSettings::hook_set)
        .unwrap_or_default();
    let installed_servers: HashSet<String> = options
        .installed_settings
        .as_ref()
        .map(InstalledSettings::server_set)
        .unwrap_or_default();

    let mut merged = destination.clone();

    if source.hooks.is_some() || destination.hooks.is_some() {
        let empty = HookTable::new();
        let src = source.hooks.as_ref().unwrap_or(&empty);
        let dst = destination.hooks.as_ref().unwrap_or(&empty);

        let mut events: Vec<&str> = dst.event_names().collect();
        for event in src.event_names() {
            if !dst.contains(event) {
                events.push(event);
            }
        }

        let mut table = HookTable::new();
        for event in events {
            let dest_entries = dst.get(event);
            let delta = merge_hook_entries(
                src.get(event).unwrap_or(&[]),
                dest_entries.unwrap_or(&[]),
                event,
                &installed_hooks,
                &options.claims.hooks,
                kit,
            );
            let entries = result.absorb_hooks(delta, kit);
            // Keep events the user left empty; drop ones this pass emptied.
            if !entries.is_empty() || dest_entries.is_some_and(|e| e.is_empty()) {
                table.insert(event, entries);
            }
        }
        merged.hooks = Some(table);
    }

    let mcp_delta = merge_mcp(
        source.mcp.as_ref(),
        destination.mcp.as_ref(),
        &installed_servers,
        &options.claims.mcp_servers,
    );
    if let Some(section) = result.absorb_mcp(mcp_delta) {
        merged.mcp = Some(section);
    }

    for (key, value) in &source.raw {
        let typed = (key == HOOKS_KEY && merged.hooks.is_some())
            || (key == MCP_KEY && merged.mcp.is_some());
        if typed || merged.raw.contains_key(key) {
            continue;
        }
        merged.raw.insert(key.clone(), value.clone());
        result.keys_added.push(key.clone());
    }

    debug!(
        kit = kit.unwrap_or("-"),
        hooks_added = result.hooks_added,
        hooks_removed = result.hooks_removed,
        conflicts = result.conflicts_detected.len(),
        "Settings merge pass complete"
    );

    result.merged = merged;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn tree(value: serde_json::Value) -> SettingsTree {
        SettingsTree::from_value(value)
    }

    #[test]
    fn test_empty_merge_has_zero_counters() {
        let result = merge_settings(&tree(json!({})), &tree(json!({})), &MergeOptions::default());
        assert_eq!(result.merged.to_value(), json!({}));
        assert_eq!(result, MergeResult::default());
    }

    #[test]
    fn test_source_fills_gaps_destination_wins() {
        let source = tree(json!({"model": "sonnet", "statusLine": {"type": "command"}}));
        let dest = tree(json!({"model": "opus", "theme": "dark"}));
        let result = merge_settings(&source, &dest, &MergeOptions::default());
        assert_eq!(
            result.merged.to_value(),
            json!({"model": "opus", "theme": "dark", "statusLine": {"type": "command"}})
        );
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let source = tree(json!({"hooks": {"Stop": [{"command": "a.sh"}]}, "x": 1}));
        let dest = tree(json!({"hooks": {"Stop": [{"command": "b.sh"}]}}));
        let (source_before, dest_before) = (source.clone(), dest.clone());
        let _ = merge_settings(&source, &dest, &MergeOptions::for_kit("kit"));
        assert_eq!(source, source_before);
        assert_eq!(dest, dest_before);
    }

    #[test]
    fn test_destination_only_events_pass_through() {
        let source = tree(json!({"hooks": {"Stop": [{"command": "kit.sh"}]}}));
        let dest = tree(json!({"hooks": {"Notification": [{"command": "mine.sh"}]}}));
        let result = merge_settings(&source, &dest, &MergeOptions::default());
        assert_eq!(
            result.merged.to_value()["hooks"],
            json!({
                "Notification": [{"command": "mine.sh"}],
                "Stop": [{"command": "kit.sh"}]
            })
        );
        assert_eq!(result.hooks_preserved, 1);
        assert_eq!(result.hooks_added, 1);
    }

    #[test]
    fn test_event_emptied_by_removal_is_dropped() {
        let dest = tree(json!({"hooks": {"Stop": [{"command": "old.sh"}], "Notification": []}}));
        let options = MergeOptions::default().with_installed(InstalledSettings {
            hooks: vec!["old.sh".to_string()],
            mcp_servers: vec![],
        });
        let result = merge_settings(&tree(json!({"hooks": {}})), &dest, &options);
        assert_eq!(result.merged.to_value()["hooks"], json!({"Notification": []}));
        assert_eq!(result.hooks_removed, 1);
    }

    #[test]
    fn test_malformed_destination_hooks_treated_as_empty() {
        let source = tree(json!({"hooks": {"Stop": [{"command": "kit.sh"}]}}));
        let dest = tree(json!({"hooks": "garbage", "keep": true}));
        let result = merge_settings(&source, &dest, &MergeOptions::default());
        assert_eq!(
            result.merged.to_value(),
            json!({"hooks": {"Stop": [{"command": "kit.sh"}]}, "keep": true})
        );
    }

    #[test]
    fn test_malformed_destination_hooks_kept_when_source_has_none() {
        let dest = tree(json!({"hooks": 5}));
        let result = merge_settings(&tree(json!({"a": 1})), &dest, &MergeOptions::default());
        assert_eq!(result.merged.to_value(), json!({"hooks": 5, "a": 1}));
    }

    #[test]
    fn test_origin_accumulates_across_passes() {
        let kit_a = tree(json!({"hooks": {"Stop": [{"command": "a.sh"}]}}));
        let kit_b = tree(json!({"hooks": {"Stop": [{"command": "b.sh"}, {"command": "a.sh"}]}}));

        let first = merge_settings(&kit_a, &SettingsTree::new(), &MergeOptions::for_kit("A"));
        let dest = first.merged.clone();
        let second = merge_settings_with(first, &kit_b, &dest, &MergeOptions::for_kit("B"));

        assert_eq!(second.hooks_by_origin["A"], vec!["a.sh"]);
        assert_eq!(second.hooks_by_origin["B"], vec!["b.sh"]);
        assert_eq!(second.hooks_added, 2);
        assert_eq!(second.conflicts_detected.len(), 1);
        assert_eq!(
            second.merged.to_value()["hooks"]["Stop"],
            json!([
                {"command": "a.sh", "_origin": "A"},
                {"command": "b.sh", "_origin": "B"}
            ])
        );
    }

    #[test]
    fn test_new_keys_count_as_changes() {
        let source = tree(json!({
            "statusLine": {"type": "command"},
            "mcp": {"enabled": true, "servers": {}}
        }));
        let result = merge_settings(&source, &tree(json!({"mcp": {}})), &MergeOptions::default());
        assert!(result.has_changes());
        assert_eq!(result.keys_added, vec!["mcp.enabled", "statusLine"]);

        let again = merge_settings(&source, &result.merged, &MergeOptions::default());
        assert!(!again.has_changes());
        assert!(again.keys_added.is_empty());
    }

    #[test]
    fn test_claimed_entries_survive_removal() {
        let dest = tree(json!({
            "hooks": {"Stop": [{"command": "shared.sh", "_origin": "a"}]},
            "mcp": {"servers": {"shared": {}}}
        }));
        let options = MergeOptions::for_kit("a")
            .with_installed(InstalledSettings {
                hooks: vec!["shared.sh".to_string()],
                mcp_servers: vec!["shared".to_string()],
            })
            .with_claims(KitClaims {
                hooks: HashMap::from([("shared.sh".to_string(), "b".to_string())]),
                mcp_servers: HashMap::from([("shared".to_string(), "b".to_string())]),
            });

        let result = merge_settings(&tree(json!({})), &dest, &options);

        assert_eq!(result.hooks_removed, 0);
        assert_eq!(result.mcp_servers_removed, 0);
        assert_eq!(
            result.merged.to_value(),
            json!({
                "hooks": {"Stop": [{"command": "shared.sh", "_origin": "b"}]},
                "mcp": {"servers": {"shared": {}}}
            })
        );
    }

    #[test]
    fn test_has_changes() {
        let source = tree(json!({"mcp": {"servers": {"fs": {}}}}));
        let first = merge_settings(&source, &SettingsTree::new(), &MergeOptions::default());
        assert!(first.has_changes());
        let second = merge_settings(&source, &first.merged, &MergeOptions::default());
        assert!(!second.has_changes());
    }
}
