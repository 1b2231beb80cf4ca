//! Cycle detection for email threading
//!
//! Ensures that parent-child relationships don't create cycles in the thread tree.
//! A cycle would occur if we tried to make a parent a descendant of its own child.

use std::collections::HashSet;

use super::super::container::{ContainerArena, ContainerId};

/// Check if linking `child` under `parent` would create a cycle
///
/// Walks up the ancestry chain from the proposed parent. If the child is found
/// anywhere in that chain (including the parent itself), the link is refused.
///
/// ## Example
///
/// ```text
/// Current tree:  A → B → C
///
/// Trying to link: A under C (would create cycle A → B → C → A)
/// Result: true (cycle detected)
///
/// Trying to link: D under C (D is not in chain)
/// Result: false (safe to link)
/// ```
pub fn would_create_cycle(arena: &ContainerArena, parent: ContainerId, child: ContainerId) -> bool {
    // Track visited nodes in case the parent chain is itself corrupted
    let mut visited = HashSet::new();
    let mut current = Some(parent);

    while let Some(id) = current {
        if id == child || !visited.insert(id) {
            return true;
        }
        current = arena.parent(id);
    }

    false
}
