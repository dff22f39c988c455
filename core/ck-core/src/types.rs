//! Typed view of a Claude settings file.
//!
//! Settings files are hand-edited, so nothing here rejects a file. Parsing
//! happens once, at ingestion: `hooks` and `mcp` become typed structures when
//! they have the expected shape, and every other key is carried as opaque JSON.
//! Malformed hook entries are dropped with a warning; a malformed `hooks` or
//! `mcp` value stays untouched in the raw map and the engine treats it as absent.

use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::normalize::normalize_command;

pub const HOOKS_KEY: &str = "hooks";
pub const MCP_KEY: &str = "mcp";
pub const SERVERS_KEY: &str = "servers";

// ═══════════════════════════════════════════════════════════════════════════════
// Hook Entries
// ═══════════════════════════════════════════════════════════════════════════════

/// A single hook command. `_origin` names the kit that installed it; user
/// authored entries have none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandHook {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub hook_type: Option<String>,
    pub command: String,
    #[serde(rename = "_origin", default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// `timeout`, `async` and anything else we don't interpret.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl CommandHook {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            hook_type: Some("command".to_string()),
            command: command.into(),
            origin: None,
            other: Map::new(),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn normalized(&self) -> String {
        normalize_command(&self.command)
    }

    fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// Hook kinds other than `command` (`prompt`, ...). These are carried through
/// untouched; only `command` hooks take part in the merge.
fn is_foreign_hook(value: &Value) -> bool {
    matches!(value.get("type"), Some(Value::String(kind)) if kind != "command")
}

/// A matcher label wrapping an ordered list of commands. Events that take no
/// matcher (SessionStart, Stop, ...) still use this wrapper with `matcher: None`.
///
/// Non-command items of the inner list live in `opaque` and are written back
/// after the commands.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherGroup {
    pub matcher: Option<String>,
    pub hooks: Vec<CommandHook>,
    pub opaque: Vec<Value>,
    pub other: Map<String, Value>,
}

impl MatcherGroup {
    pub fn new(matcher: Option<&str>, hooks: Vec<CommandHook>) -> Self {
        Self {
            matcher: matcher.map(str::to_string),
            hooks,
            opaque: Vec::new(),
            other: Map::new(),
        }
    }
}

impl Serialize for MatcherGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut items = Vec::with_capacity(self.hooks.len() + self.opaque.len());
        for cmd in &self.hooks {
            items.push(serde_json::to_value(cmd).map_err(S::Error::custom)?);
        }
        items.extend(self.opaque.iter().cloned());

        let mut map = serializer.serialize_map(None)?;
        if let Some(matcher) = &self.matcher {
            map.serialize_entry("matcher", matcher)?;
        }
        map.serialize_entry(HOOKS_KEY, &items)?;
        for (key, value) in &self.other {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HookEntry {
    Group(MatcherGroup),
    Command(CommandHook),
    /// A top-level hook of a kind the engine doesn't merge.
    Opaque(Value),
}

impl HookEntry {
    /// Parses one element of an event list. Returns `None` for anything that is
    /// neither a group, a command nor a foreign hook kind; inner entries that
    /// fail are dropped.
    pub fn from_value(value: &Value, event: &str) -> Option<Self> {
        let obj = value.as_object()?;

        if let Some(inner) = obj.get(HOOKS_KEY) {
            let items = inner.as_array()?;
            let mut hooks = Vec::new();
            let mut opaque = Vec::new();
            for item in items {
                match CommandHook::from_value(item) {
                    Some(cmd) => hooks.push(cmd),
                    None if is_foreign_hook(item) => {
                        debug!(event = %event, entry = %item, "Carrying non-command hook");
                        opaque.push(item.clone());
                    }
                    None => {
                        warn!(event = %event, entry = %item, "Dropping malformed hook command");
                    }
                }
            }

            let mut other = obj.clone();
            other.remove(HOOKS_KEY);
            let matcher = match other.get("matcher") {
                Some(Value::String(m)) => {
                    let m = m.clone();
                    other.remove("matcher");
                    Some(m)
                }
                _ => None,
            };

            return Some(HookEntry::Group(MatcherGroup {
                matcher,
                hooks,
                opaque,
                other,
            }));
        }

        match CommandHook::from_value(value) {
            Some(cmd) => Some(HookEntry::Command(cmd)),
            None if is_foreign_hook(value) => Some(HookEntry::Opaque(value.clone())),
            None => None,
        }
    }

    pub fn matcher(&self) -> Option<&str> {
        match self {
            HookEntry::Group(group) => group.matcher.as_deref(),
            HookEntry::Command(_) | HookEntry::Opaque(_) => None,
        }
    }

    /// The commands this entry contributes, in order.
    pub fn commands(&self) -> Vec<&CommandHook> {
        match self {
            HookEntry::Group(group) => group.hooks.iter().collect(),
            HookEntry::Command(cmd) => vec![cmd],
            HookEntry::Opaque(_) => Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Hook Table
// ═══════════════════════════════════════════════════════════════════════════════

/// Event name → ordered hook entries, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookTable {
    events: Vec<(String, Vec<HookEntry>)>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut table = HookTable::new();
        for (event, value) in map {
            let entries = match value.as_array() {
                Some(items) => items
                    .iter()
                    .filter_map(|item| {
                        let parsed = HookEntry::from_value(item, event);
                        if parsed.is_none() {
                            warn!(event = %event, entry = %item, "Dropping malformed hook entry");
                        }
                        parsed
                    })
                    .collect(),
                None => {
                    warn!(event = %event, "Hook event is not a list; treating as empty");
                    Vec::new()
                }
            };
            table.insert(event.clone(), entries);
        }
        table
    }

    pub fn get(&self, event: &str) -> Option<&[HookEntry]> {
        self.events
            .iter()
            .find(|(name, _)| name == event)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn contains(&self, event: &str) -> bool {
        self.get(event).is_some()
    }

    /// Replaces an existing event in place, or appends a new one.
    pub fn insert(&mut self, event: impl Into<String>, entries: Vec<HookEntry>) {
        let event = event.into();
        match self.events.iter_mut().find(|(name, _)| *name == event) {
            Some(slot) => slot.1 = entries,
            None => self.events.push((event, entries)),
        }
    }

    pub fn events(&self) -> impl Iterator<Item = (&str, &[HookEntry])> {
        self.events
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.as_slice()))
    }

    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Every command across all events, normalized.
    pub fn normalized_commands(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, entries) in self.events() {
            for entry in entries {
                for cmd in entry.commands() {
                    let normalized = cmd.normalized();
                    if seen.insert(normalized.clone()) {
                        out.push(normalized);
                    }
                }
            }
        }
        out
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (event, entries) in self.events() {
            let items = entries
                .iter()
                .filter_map(|entry| serde_json::to_value(entry).ok())
                .collect();
            map.insert(event.to_string(), Value::Array(items));
        }
        Value::Object(map)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MCP Section
// ═══════════════════════════════════════════════════════════════════════════════

/// The `mcp` object: a `servers` map keyed by server name, plus any sibling keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McpSection {
    pub servers: Map<String, Value>,
    /// Every other key of the `mcp` object, including a malformed `servers`.
    pub rest: Map<String, Value>,
}

impl McpSection {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let mut rest = obj.clone();
        let servers = match obj.get(SERVERS_KEY) {
            Some(Value::Object(servers)) => {
                rest.remove(SERVERS_KEY);
                servers.clone()
            }
            Some(_) => {
                warn!("mcp.servers is not an object; treating as empty");
                Map::new()
            }
            None => Map::new(),
        };
        Some(Self { servers, rest })
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.rest.clone();
        if !self.servers.is_empty() || !map.contains_key(SERVERS_KEY) {
            map.insert(SERVERS_KEY.to_string(), Value::Object(self.servers.clone()));
        }
        Value::Object(map)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Settings Tree
// ═══════════════════════════════════════════════════════════════════════════════

/// A whole settings file.
///
/// `raw` keeps every top-level key in file order. When `hooks` or `mcp` is
/// `Some`, the typed value replaces the raw one on output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsTree {
    pub hooks: Option<HookTable>,
    pub mcp: Option<McpSection>,
    pub raw: Map<String, Value>,
}

impl SettingsTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a parsed JSON document. A non-object root is an empty tree.
    pub fn from_value(value: Value) -> Self {
        let raw = match value {
            Value::Object(map) => map,
            other => {
                if !other.is_null() {
                    warn!("Settings root is not an object; treating as empty");
                }
                Map::new()
            }
        };

        let hooks = match raw.get(HOOKS_KEY) {
            Some(Value::Object(map)) => Some(HookTable::from_map(map)),
            Some(_) => {
                warn!("hooks is not an object; leaving it untouched");
                None
            }
            None => None,
        };
        let mcp = match raw.get(MCP_KEY) {
            Some(value) => {
                let section = McpSection::from_value(value);
                if section.is_none() {
                    warn!("mcp is not an object; leaving it untouched");
                }
                section
            }
            None => None,
        };

        Self { hooks, mcp, raw }
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.raw.clone();
        if let Some(hooks) = &self.hooks {
            map.insert(HOOKS_KEY.to_string(), hooks.to_value());
        }
        if let Some(mcp) = &self.mcp {
            map.insert(MCP_KEY.to_string(), mcp.to_value());
        }
        Value::Object(map)
    }
}

impl Serialize for SettingsTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettingsTree {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(SettingsTree::from_value)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Installed Snapshot
// ═══════════════════════════════════════════════════════════════════════════════

/// What a previous install of a kit put into the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledSettings {
    #[serde(default)]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
}

impl InstalledSettings {
    /// Tolerant parse: anything that isn't a list of strings is ignored.
    pub fn from_value(value: &Value) -> Self {
        let strings = |key: &str| -> Vec<String> {
            value
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            hooks: strings("hooks"),
            mcp_servers: strings("mcpServers"),
        }
    }

    /// The snapshot a successful install of `source` leaves behind.
    ///
    /// Every source command and server is recorded, including ones the user
    /// deleted and the merge skipped, so the next run keeps respecting them.
    pub fn from_source(source: &SettingsTree) -> Self {
        Self {
            hooks: source
                .hooks
                .as_ref()
                .map(HookTable::normalized_commands)
                .unwrap_or_default(),
            mcp_servers: source
                .mcp
                .as_ref()
                .map(|mcp| mcp.servers.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }

    /// Recorded commands, normalized so older raw records still match.
    pub fn hook_set(&self) -> HashSet<String> {
        self.hooks.iter().map(|c| normalize_command(c)).collect()
    }

    pub fn server_set(&self) -> HashSet<String> {
        self.mcp_servers.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty() && self.mcp_servers.is_empty()
    }
}

/// Hooks and MCP servers that other installed kits still ship, each mapped to
/// the kit that ships it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KitClaims {
    /// Normalized command → kit id.
    pub hooks: HashMap<String, String>,
    /// Server name → kit id.
    pub mcp_servers: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_command_and_group_entries() {
        let tree = SettingsTree::from_value(json!({
            "hooks": {
                "SessionStart": [{"type": "command", "command": "node a.js"}],
                "PreToolUse": [{"matcher": "Bash", "hooks": [
                    {"type": "command", "command": "node b.js", "timeout": 30}
                ]}]
            }
        }));
        let hooks = tree.hooks.unwrap();
        assert!(matches!(
            hooks.get("SessionStart").unwrap()[0],
            HookEntry::Command(_)
        ));
        let HookEntry::Group(group) = &hooks.get("PreToolUse").unwrap()[0] else {
            panic!("expected group");
        };
        assert_eq!(group.matcher.as_deref(), Some("Bash"));
        assert_eq!(group.hooks[0].other.get("timeout"), Some(&json!(30)));
    }

    #[test]
    fn test_group_without_matcher() {
        let entry = HookEntry::from_value(
            &json!({"hooks": [{"type": "command", "command": "x"}]}),
            "Stop",
        )
        .unwrap();
        assert_eq!(entry.matcher(), None);
        assert_eq!(entry.commands().len(), 1);
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let tree = SettingsTree::from_value(json!({
            "hooks": {
                "SessionStart": [
                    42,
                    {"type": "command"},
                    {"type": "command", "command": "ok.sh"},
                    {"matcher": "*", "hooks": [{"command": 7}, {"command": "inner.sh"}]}
                ],
                "Stop": "not-a-list"
            }
        }));
        let hooks = tree.hooks.unwrap();
        let start = hooks.get("SessionStart").unwrap();
        assert_eq!(start.len(), 2);
        assert_eq!(start[1].commands().len(), 1);
        assert_eq!(hooks.get("Stop").unwrap().len(), 0);
    }

    #[test]
    fn test_non_command_hooks_round_trip() {
        let value = json!({
            "hooks": {
                "Stop": [
                    {"matcher": "*", "hooks": [
                        {"type": "command", "command": "a.sh"},
                        {"type": "prompt", "prompt": "Did the tests pass?", "timeout": 30},
                        {"command": 7},
                        "junk"
                    ]},
                    {"type": "agent", "prompt": "Review the diff"}
                ]
            }
        });
        let tree = SettingsTree::from_value(value);
        let stop = tree.hooks.as_ref().unwrap().get("Stop").unwrap();
        let HookEntry::Group(group) = &stop[0] else {
            panic!("expected group");
        };
        assert_eq!(group.hooks.len(), 1);
        assert_eq!(group.opaque.len(), 1);
        assert!(matches!(stop[1], HookEntry::Opaque(_)));
        assert!(stop[1].commands().is_empty());

        assert_eq!(
            tree.to_value()["hooks"]["Stop"],
            json!([
                {"matcher": "*", "hooks": [
                    {"type": "command", "command": "a.sh"},
                    {"type": "prompt", "prompt": "Did the tests pass?", "timeout": 30}
                ]},
                {"type": "agent", "prompt": "Review the diff"}
            ])
        );
    }

    #[test]
    fn test_malformed_sections_stay_raw() {
        let value = json!({"hooks": "broken", "mcp": [1, 2], "theme": "dark"});
        let tree = SettingsTree::from_value(value.clone());
        assert!(tree.hooks.is_none());
        assert!(tree.mcp.is_none());
        assert_eq!(tree.to_value(), value);
    }

    #[test]
    fn test_non_object_root_is_empty() {
        assert_eq!(SettingsTree::from_value(json!([1])), SettingsTree::new());
        assert_eq!(SettingsTree::from_value(Value::Null).to_value(), json!({}));
    }

    #[test]
    fn test_round_trip_preserves_unknown_fields() {
        let value = json!({
            "model": "opus",
            "hooks": {
                "PostToolUse": [{"matcher": "*", "description": "lint", "hooks": [
                    {"type": "command", "command": "lint.sh", "async": true, "_origin": "engineer"}
                ]}]
            },
            "mcp": {"enabled": true, "servers": {"fs": {"command": "mcp-fs"}}}
        });
        let tree = SettingsTree::from_value(value.clone());
        assert_eq!(tree.to_value(), value);
    }

    #[test]
    fn test_origin_round_trips() {
        let cmd: CommandHook =
            serde_json::from_value(json!({"command": "a", "_origin": "kit-a"})).unwrap();
        assert_eq!(cmd.origin.as_deref(), Some("kit-a"));
        assert_eq!(
            serde_json::to_value(CommandHook::new("a").with_origin("kit-a")).unwrap(),
            json!({"type": "command", "command": "a", "_origin": "kit-a"})
        );
    }

    #[test]
    fn test_malformed_servers_kept_raw() {
        let section = McpSection::from_value(&json!({"servers": "oops"})).unwrap();
        assert!(section.servers.is_empty());
        assert_eq!(section.to_value(), json!({"servers": "oops"}));
    }

    #[test]
    fn test_installed_settings_tolerant_parse() {
        let parsed = InstalledSettings::from_value(&json!({
            "hooks": ["node a.js", 3, null],
            "mcpServers": "nope"
        }));
        assert_eq!(parsed.hooks, vec!["node a.js".to_string()]);
        assert!(parsed.mcp_servers.is_empty());
    }

    #[test]
    fn test_installed_settings_from_source() {
        let source = SettingsTree::from_value(json!({
            "hooks": {
                "SessionStart": [{"command": "node \"$CLAUDE_PROJECT_DIR\"/a.js"}],
                "Stop": [{"hooks": [{"command": "node $HOME/a.js"}, {"command": "b.sh"}]}]
            },
            "mcp": {"servers": {"fs": {}, "web": {}}}
        }));
        let snapshot = InstalledSettings::from_source(&source);
        assert_eq!(snapshot.hooks, vec!["node $HOME/a.js", "b.sh"]);
        assert_eq!(snapshot.mcp_servers, vec!["fs", "web"]);
    }

    #[test]
    fn test_table_insert_keeps_position() {
        let mut table = HookTable::new();
        table.insert("A", vec![]);
        table.insert("B", vec![]);
        table.insert("A", vec![HookEntry::Command(CommandHook::new("x"))]);
        let names: Vec<_> = table.event_names().collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(table.get("A").unwrap().len(), 1);
    }
}
