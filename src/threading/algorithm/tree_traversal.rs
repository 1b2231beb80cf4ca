//! Tree traversal utilities for email threading
//!
//! Ordering and flattening of the finished container forest. Both walks use an
//! explicit stack so deeply nested threads cannot overflow the call stack.

use chrono::{DateTime, Utc};

use super::super::container::{ContainerArena, ContainerId};
use super::super::subject_matching::display_subject;

/// A real message's position in the flattened listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEntry {
    pub id: ContainerId,
    pub depth: usize,
    pub display_subject: String,
}

fn sort_key(arena: &ContainerArena, id: ContainerId, dummy_date: DateTime<Utc>) -> DateTime<Utc> {
    arena[id]
        .message
        .as_ref()
        .map(|message| message.date)
        .unwrap_or(dummy_date)
}

/// Sort the root list and every sibling list beneath it by date, ascending
///
/// Dummy containers sort as `dummy_date`. The sort is stable, so equal dates
/// keep their construction order.
pub fn sort_by_date(arena: &mut ContainerArena, roots: &mut [ContainerId], dummy_date: DateTime<Utc>) {
    roots.sort_by_key(|&id| sort_key(arena, id, dummy_date));

    let mut stack: Vec<ContainerId> = roots.to_vec();
    while let Some(id) = stack.pop() {
        let mut children = arena.replace_children(id, Vec::new());
        children.sort_by_key(|&child| sort_key(arena, child, dummy_date));
        stack.extend(children.iter().copied());
        arena.replace_children(id, children);
    }
}

/// Flatten a forest in pre-order, annotating depth and display subject
///
/// Dummy containers are transparent: they are not emitted, and their children
/// take the dummy's depth and inherit the dummy's parent subject.
pub fn flatten_forest(arena: &ContainerArena, roots: &[ContainerId]) -> Vec<FlatEntry> {
    let mut entries = Vec::new();

    // Stack of (container, depth, subject of nearest real ancestor)
    let mut stack: Vec<(ContainerId, usize, Option<&str>)> =
        roots.iter().rev().map(|&id| (id, 0, None)).collect();

    while let Some((id, depth, parent_subject)) = stack.pop() {
        let container = &arena[id];

        let (child_depth, child_parent_subject) = match &container.message {
            Some(message) => {
                entries.push(FlatEntry {
                    id,
                    depth,
                    display_subject: display_subject(&message.subject, parent_subject, depth),
                });
                (depth + 1, Some(message.subject.as_str()))
            }
            None => (depth, parent_subject),
        };

        // Reverse order keeps the left-to-right sibling order on pop
        for &child in container.children.iter().rev() {
            stack.push((child, child_depth, child_parent_subject));
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use chrono::TimeZone;

    fn message(id: &str, subject: &str, minute: u32) -> Message {
        Message {
            message_id: id.to_string(),
            subject: subject.to_string(),
            references: Vec::new(),
            from_name: String::new(),
            from_addr: String::new(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap(),
            body: String::new(),
        }
    }

    #[test]
    fn test_flatten_simple_thread() {
        // A → B → C (all real)
        let mut arena = ContainerArena::new();
        let a = arena.alloc(Some(message("a", "Build", 0)));
        let b = arena.alloc(Some(message("b", "Re: Build", 1)));
        let c = arena.alloc(Some(message("c", "Something else", 2)));
        arena.add_child(a, b);
        arena.add_child(b, c);

        let entries = flatten_forest(&arena, &[a]);
        let depths: Vec<usize> = entries.iter().map(|e| e.depth).collect();
        assert_eq!(depths, vec![0, 1, 2]);
        assert_eq!(entries[0].display_subject, "Build");
        assert_eq!(entries[1].display_subject, "");
        assert_eq!(entries[2].display_subject, "Something else");
    }

    #[test]
    fn test_flatten_dummy_is_transparent() {
        // A (real) → D (dummy) → {B, C}
        let mut arena = ContainerArena::new();
        let a = arena.alloc(Some(message("a", "Build", 0)));
        let dummy = arena.alloc(None);
        let b = arena.alloc(Some(message("b", "Re: Build", 1)));
        let c = arena.alloc(Some(message("c", "Re: Build", 2)));
        arena.add_child(a, dummy);
        arena.add_child(dummy, b);
        arena.add_child(dummy, c);

        let entries = flatten_forest(&arena, &[a]);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].id, b);
        assert_eq!(entries[1].depth, 1);
        assert_eq!(entries[1].display_subject, "");
        assert_eq!(entries[2].depth, 1);
    }

    #[test]
    fn test_sort_children_by_date() {
        let mut arena = ContainerArena::new();
        let root = arena.alloc(Some(message("root", "Topic", 0)));
        let late = arena.alloc(Some(message("late", "Re: Topic", 30)));
        let early = arena.alloc(Some(message("early", "Re: Topic", 10)));
        arena.add_child(root, late);
        arena.add_child(root, early);

        let mut roots = vec![root];
        sort_by_date(&mut arena, &mut roots, DateTime::<Utc>::MIN_UTC);

        assert_eq!(arena.children(root), &[early, late]);
    }

    #[test]
    fn test_dummy_sorts_with_fallback_date() {
        let mut arena = ContainerArena::new();
        let real = arena.alloc(Some(message("real", "Topic", 5)));
        let dummy = arena.alloc(None);

        let mut roots = vec![real, dummy];
        sort_by_date(&mut arena, &mut roots, DateTime::<Utc>::MIN_UTC);
        assert_eq!(roots, vec![dummy, real]);

        let mut roots = vec![dummy, real];
        let after = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        sort_by_date(&mut arena, &mut roots, after);
        assert_eq!(roots, vec![real, dummy]);
    }
}
