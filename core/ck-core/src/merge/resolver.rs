//! Deprecation vs. customization decisions.
//!
//! Both the hook merge and the MCP merge ask the same question about every
//! entry: given whether it is in the new source, whether a previous install
//! recorded it, and whether it is currently in the destination, what do we do?
//!
//! | in source | in snapshot | in dest | outcome           |
//! |-----------|-------------|---------|-------------------|
//! | yes       | any         | yes     | `Conflict`        |
//! | yes       | no          | no      | `Add`             |
//! | yes       | yes         | no      | `SkipUserDeleted` |
//! | no        | yes         | yes     | `Remove`          |
//! | no        | no          | yes     | `Preserve`        |
//! | no        | any         | no      | `Noop`            |

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Already present; keep the destination copy and report the collision.
    Conflict,
    /// New from the source.
    Add,
    /// We installed it before and the user deleted it. Don't resurrect it.
    SkipUserDeleted,
    /// We installed it before and the source no longer ships it.
    Remove,
    /// The user added it; not ours to touch.
    Preserve,
    Noop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub in_source: bool,
    pub in_snapshot: bool,
    pub in_dest: bool,
}

pub fn resolve(presence: Presence) -> Resolution {
    match (presence.in_source, presence.in_snapshot, presence.in_dest) {
        (true, _, true) => Resolution::Conflict,
        (true, true, false) => Resolution::SkipUserDeleted,
        (true, false, false) => Resolution::Add,
        (false, true, true) => Resolution::Remove,
        (false, false, true) => Resolution::Preserve,
        (false, _, false) => Resolution::Noop,
    }
}
