//! Per-event hook merge.
//!
//! Works on one event's entry list at a time. Matcher groups keep their shape:
//! comparisons run on the flattened commands, and every surviving or added
//! command lands back under its matcher label.
//!
//! Order of passes:
//! 1. destination dedup (first occurrence wins)
//! 2. removal of commands the kit deprecated
//! 3. source additions, conflicts and user-deletion skips
//!
//! Output is the retained destination entries in their original order,
//! followed by the additions in source order.
//!
//! A command another installed kit still ships is never removed: it stays put
//! and its `_origin` tag moves to that kit, so the other kit's next run sees
//! its own entry instead of a user deletion.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::resolver::{resolve, Presence, Resolution};
use crate::types::{CommandHook, HookEntry, MatcherGroup};

/// Everything one event merge produced. Counters are per command, not per
/// top-level entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookMergeDelta {
    pub entries: Vec<HookEntry>,
    pub added: usize,
    pub preserved: usize,
    pub skipped: usize,
    pub removed: usize,
    pub conflicts: Vec<String>,
    /// Raw commands removed as deprecated.
    pub removed_hooks: Vec<String>,
    /// Normalized commands added by this pass.
    pub newly_installed: Vec<String>,
    /// Raw commands added on behalf of the origin kit.
    pub origin_commands: Vec<String>,
}

/// Merges one event's source entries into its destination entries.
///
/// `installed` holds the normalized commands a previous install of this kit
/// recorded; empty means a fresh install. `claimed` maps normalized commands
/// other installed kits ship to the kit that ships them.
pub fn merge_hook_entries(
    source: &[HookEntry],
    dest: &[HookEntry],
    event: &str,
    installed: &HashSet<String>,
    claimed: &HashMap<String, String>,
    origin: Option<&str>,
) -> HookMergeDelta {
    let mut merge = EventMerge {
        event,
        installed,
        claimed,
        origin,
        source_commands: source
            .iter()
            .flat_map(HookEntry::commands)
            .map(CommandHook::normalized)
            .collect(),
        seen: HashSet::new(),
        present: HashMap::new(),
        taken: HashSet::new(),
        conflicts: Vec::new(),
        delta: HookMergeDelta::default(),
    };

    let mut entries = Vec::with_capacity(dest.len() + source.len());

    for entry in dest {
        match entry {
            HookEntry::Command(cmd) => {
                if let Some(kept) = merge.keep_dest(cmd) {
                    entries.push(HookEntry::Command(kept));
                }
            }
            HookEntry::Group(group) => {
                let kept: Vec<CommandHook> = group
                    .hooks
                    .iter()
                    .filter_map(|cmd| merge.keep_dest(cmd))
                    .collect();
                // A group we emptied goes away; one that arrived empty is the user's.
                if kept.is_empty() && group.opaque.is_empty() && !group.hooks.is_empty() {
                    continue;
                }
                entries.push(HookEntry::Group(MatcherGroup {
                    hooks: kept,
                    ..group.clone()
                }));
            }
            HookEntry::Opaque(_) => entries.push(entry.clone()),
        }
    }

    for entry in source {
        match entry {
            HookEntry::Command(cmd) => {
                if let Some(added) = merge.take_source(cmd, None) {
                    entries.push(HookEntry::Command(added));
                }
            }
            HookEntry::Group(group) => {
                let added: Vec<CommandHook> = group
                    .hooks
                    .iter()
                    .filter_map(|cmd| merge.take_source(cmd, group.matcher.as_deref()))
                    .collect();
                if added.is_empty() {
                    continue;
                }
                place_in_group(&mut entries, group, added);
            }
            // Re-adding would duplicate it on every run; there is no identity to dedup on.
            HookEntry::Opaque(_) => {}
        }
    }

    let mut delta = merge.finish();
    delta.entries = entries;

    debug!(
        event = %event,
        added = delta.added,
        preserved = delta.preserved,
        skipped = delta.skipped,
        removed = delta.removed,
        conflicts = delta.conflicts.len(),
        "Merged hook event"
    );

    delta
}

/// Appends `added` to the first group with the same matcher label, or to a new
/// group shaped like the source group (non-command items included).
fn place_in_group(
    entries: &mut Vec<HookEntry>,
    source_group: &MatcherGroup,
    added: Vec<CommandHook>,
) {
    let existing = entries.iter_mut().find_map(|entry| match entry {
        HookEntry::Group(group) if group.matcher == source_group.matcher => Some(group),
        _ => None,
    });

    match existing {
        Some(group) => group.hooks.extend(added),
        None => entries.push(HookEntry::Group(MatcherGroup {
            matcher: source_group.matcher.clone(),
            hooks: added,
            opaque: source_group.opaque.clone(),
            other: source_group.other.clone(),
        })),
    }
}

struct Conflict {
    matcher: Option<String>,
    command: String,
}

struct EventMerge<'a> {
    event: &'a str,
    installed: &'a HashSet<String>,
    claimed: &'a HashMap<String, String>,
    origin: Option<&'a str>,
    source_commands: HashSet<String>,
    /// Every destination command looked at, for dedup.
    seen: HashSet<String>,
    /// Destination commands that survived dedup and removal, with their origin tag.
    present: HashMap<String, Option<String>>,
    /// Source commands already added or skipped in this pass.
    taken: HashSet<String>,
    conflicts: Vec<Conflict>,
    delta: HookMergeDelta,
}

impl EventMerge<'_> {
    /// The destination command to keep, possibly re-tagged, or `None` when it
    /// is a duplicate or deprecated.
    fn keep_dest(&mut self, cmd: &CommandHook) -> Option<CommandHook> {
        let normalized = cmd.normalized();
        if !self.seen.insert(normalized.clone()) {
            debug!(event = self.event, command = %cmd.command, "Dropping duplicate destination hook");
            return None;
        }

        let resolution = resolve(Presence {
            in_source: self.source_commands.contains(&normalized),
            in_snapshot: self.installed.contains(&normalized),
            in_dest: true,
        });

        let mut kept = cmd.clone();
        if resolution == Resolution::Remove && !self.owned_by_other_kit(cmd) {
            match self.claimed.get(&normalized) {
                Some(kit) => {
                    debug!(
                        event = self.event,
                        command = %cmd.command,
                        kit = %kit,
                        "Handing shared hook to the kit that still ships it"
                    );
                    kept.origin = Some(kit.clone());
                }
                None => {
                    debug!(event = self.event, command = %cmd.command, "Removing deprecated hook");
                    self.delta.removed += 1;
                    self.delta.removed_hooks.push(cmd.command.clone());
                    return None;
                }
            }
        }

        self.present.insert(normalized, kept.origin.clone());
        self.delta.preserved += 1;
        Some(kept)
    }

    /// Returns the command to add, tagged with the origin kit, or `None` when
    /// the source command must not be installed.
    fn take_source(&mut self, cmd: &CommandHook, matcher: Option<&str>) -> Option<CommandHook> {
        let normalized = cmd.normalized();
        if self.taken.contains(&normalized) {
            return None;
        }

        let resolution = resolve(Presence {
            in_source: true,
            in_snapshot: self.installed.contains(&normalized),
            in_dest: self.present.contains_key(&normalized),
        });

        match resolution {
            Resolution::Conflict if self.installed_by_this_kit(&normalized) => {
                // Our own entry from an earlier run; nothing to report.
                None
            }
            Resolution::Conflict => {
                self.conflicts.push(Conflict {
                    matcher: matcher.map(str::to_string),
                    command: cmd.command.clone(),
                });
                None
            }
            Resolution::SkipUserDeleted => {
                debug!(event = self.event, command = %cmd.command, "Skipping hook the user removed");
                self.delta.skipped += 1;
                self.taken.insert(normalized);
                None
            }
            _ => {
                let mut added = cmd.clone();
                if let Some(kit) = self.origin {
                    added.origin = Some(kit.to_string());
                    self.delta.origin_commands.push(cmd.command.clone());
                }
                self.delta.added += 1;
                self.delta.newly_installed.push(normalized.clone());
                self.taken.insert(normalized);
                Some(added)
            }
        }
    }

    fn installed_by_this_kit(&self, normalized: &str) -> bool {
        match (self.present.get(normalized), self.origin) {
            (Some(Some(tag)), Some(kit)) => tag == kit,
            _ => false,
        }
    }

    /// Entries tagged by another kit belong to that kit's removal pass.
    fn owned_by_other_kit(&self, cmd: &CommandHook) -> bool {
        matches!(
            (cmd.origin.as_deref(), self.origin),
            (Some(tag), Some(kit)) if tag != kit
        )
    }

    fn finish(mut self) -> HookMergeDelta {
        let mut groups: Vec<(Option<String>, Vec<String>)> = Vec::new();
        for conflict in self.conflicts.drain(..) {
            match groups.iter_mut().find(|(m, _)| *m == conflict.matcher) {
                Some((_, commands)) => commands.push(conflict.command),
                None => groups.push((conflict.matcher, vec![conflict.command])),
            }
        }

        for (matcher, commands) in groups {
            self.delta
                .conflicts
                .push(conflict_message(self.event, matcher.as_deref(), &commands));
        }
        self.delta
    }
}

fn conflict_message(event: &str, matcher: Option<&str>, commands: &[String]) -> String {
    let context = match matcher {
        Some(m) => format!("{event} (matcher \"{m}\")"),
        None => event.to_string(),
    };

    if commands.len() == 1 {
        return format!(
            "{context}: hook \"{}\" already present, kept existing entry",
            commands[0]
        );
    }

    let mut unique: Vec<&str> = Vec::new();
    for command in commands {
        if !unique.contains(&command.as_str()) {
            unique.push(command);
        }
    }
    let listed = unique
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{context}: {} commands already present, kept existing entries: {listed}",
        commands.len()
    )
}
