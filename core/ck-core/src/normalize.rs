//! Command normalization for hook identity.
//!
//! A kit installed in project mode writes hook commands against
//! `$CLAUDE_PROJECT_DIR`; the same kit installed globally writes `$HOME`, and a
//! Windows install writes `%USERPROFILE%` with backslashes. All three point at
//! the same script, so the merge compares commands by their normalized form.
//!
//! The set of recognized placeholders is closed. Each one is listed in
//! [`PLACEHOLDER_PATTERNS`] and collapsed to [`CANONICAL_ROOT_TOKEN`].

use once_cell::sync::Lazy;
use regex::Regex;

/// The single token every recognized root placeholder is rewritten to.
pub const CANONICAL_ROOT_TOKEN: &str = "$HOME";

/// `(label, pattern)` pairs, applied in order. Quoted forms come first so the
/// quotes are consumed together with the variable.
pub const PLACEHOLDER_PATTERNS: [(&str, &str); 6] = [
    ("home-quoted", r#""(?:\$HOME|\$\{HOME\})""#),
    ("project-dir-quoted", r#""(?:\$CLAUDE_PROJECT_DIR|\$\{CLAUDE_PROJECT_DIR\})""#),
    ("userprofile-quoted", r#"(?i)"%USERPROFILE%""#),
    ("home", r"\$\{HOME\}|\$HOME\b"),
    ("project-dir", r"\$\{CLAUDE_PROJECT_DIR\}|\$CLAUDE_PROJECT_DIR\b"),
    ("userprofile", r"(?i)%USERPROFILE%"),
];

static PLACEHOLDER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    PLACEHOLDER_PATTERNS
        .iter()
        .map(|(_, pattern)| Regex::new(pattern).unwrap())
        .collect()
});

/// Returns the canonical form of a hook command.
///
/// Backslashes become forward slashes, then every recognized root placeholder
/// (quoted or not) becomes [`CANONICAL_ROOT_TOKEN`]. Nothing else in the
/// command changes. Total: input with no placeholders only gets the slash pass.
pub fn normalize_command(command: &str) -> String {
    let mut normalized = command.replace('\\', "/");
    for re in PLACEHOLDER_RES.iter() {
        if re.is_match(&normalized) {
            normalized = re
                .replace_all(&normalized, regex::NoExpand(CANONICAL_ROOT_TOKEN))
                .into_owned();
        }
    }
    normalized
}
