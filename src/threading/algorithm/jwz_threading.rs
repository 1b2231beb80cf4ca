//! Core JWZ (Jamie Zawinski) threading algorithm implementation
//!
//! Implements the standard email threading algorithm as described at:
//! https://www.jwz.org/doc/threading.html
//!
//! ## Algorithm Overview
//!
//! 1. **Create Containers**: One container per message id, dummies for unseen references
//! 2. **Link References**: Chain consecutive references, then hang the message off the last
//! 3. **Find Roots**: Containers without a parent
//! 4. **Prune**: Drop or collapse dummy containers
//! 5. **Group by Subject**: Fold roots sharing a normalized subject
//! 6. **Sort**: Order every sibling list by date
//!
//! A run is synchronous and self-contained: the id table, subject table and
//! arena all live inside one call.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use super::super::container::{ContainerArena, ContainerId};
use super::super::subject_matching::group_by_subject;
use super::cycle_detection::would_create_cycle;
use super::tree_traversal::{flatten_forest, sort_by_date};
use crate::models::{Message, ThreadedMessage};

/// Tunables for a threading run.
#[derive(Debug, Clone)]
pub struct ThreadOptions {
    /// Date used to order dummy containers among their siblings.
    pub dummy_date: DateTime<Utc>,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            dummy_date: DateTime::<Utc>::MIN_UTC,
        }
    }
}

/// Ordered forest produced by one threading run.
#[derive(Debug)]
pub struct ThreadForest {
    arena: ContainerArena,
    roots: Vec<ContainerId>,
}

impl ThreadForest {
    /// Root containers in date order.
    pub fn roots(&self) -> &[ContainerId] {
        &self.roots
    }

    pub fn arena(&self) -> &ContainerArena {
        &self.arena
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Flattened, depth-annotated listing (messages cloned).
    pub fn flatten(&self) -> Vec<ThreadedMessage> {
        flatten_forest(&self.arena, &self.roots)
            .into_iter()
            .filter_map(|entry| {
                let message = self.arena[entry.id].message.clone()?;
                Some(ThreadedMessage {
                    message,
                    depth: entry.depth,
                    display_subject: entry.display_subject,
                })
            })
            .collect()
    }

    /// Flattened, depth-annotated listing, moving the messages out.
    pub fn into_flattened(mut self) -> Vec<ThreadedMessage> {
        let entries = flatten_forest(&self.arena, &self.roots);
        entries
            .into_iter()
            .filter_map(|entry| {
                let message = self.arena.take_message(entry.id)?;
                Some(ThreadedMessage {
                    message,
                    depth: entry.depth,
                    display_subject: entry.display_subject,
                })
            })
            .collect()
    }
}

/// Build conversation threads using the JWZ algorithm
///
/// Deterministic for a fixed input order and dates. Duplicate ids keep the
/// last message seen; dangling references become dummies; reference cycles
/// (including self-references) are cut by the descendant check.
pub fn build_threads(messages: Vec<Message>) -> ThreadForest {
    build_threads_with(messages, &ThreadOptions::default())
}

/// [`build_threads`] with explicit options.
pub fn build_threads_with(messages: Vec<Message>, options: &ThreadOptions) -> ThreadForest {
    let mut arena = ContainerArena::new();

    // Step 1-2: Create containers and link reference chains
    build_containers(&mut arena, messages);

    // Step 3: Find root set (containers with no parent)
    let root_set = identify_thread_roots(&arena);

    // Step 4: Prune empty containers
    let root_set = prune_empty_containers(&mut arena, root_set);

    // Step 5: Group roots sharing a subject
    let mut roots = group_by_subject(&mut arena, root_set);

    // Step 6: Sort every level by date
    sort_by_date(&mut arena, &mut roots, options.dummy_date);

    log::trace!("threaded {} containers into {} roots", arena.len(), roots.len());

    ThreadForest { arena, roots }
}

fn get_or_create(
    arena: &mut ContainerArena,
    id_table: &mut HashMap<String, ContainerId>,
    message_id: &str,
) -> ContainerId {
    if let Some(&id) = id_table.get(message_id) {
        return id;
    }
    let id = arena.alloc(None);
    id_table.insert(message_id.to_string(), id);
    id
}

/// References with duplicates removed, first occurrence kept.
fn unique_references(references: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    references
        .iter()
        .filter(|reference| seen.insert(reference.as_str()))
        .cloned()
        .collect()
}

/// Build the container graph from messages and their references
///
/// ## Example
///
/// ```text
/// Message M has References: <r1> <r2> <r3>
///
/// Creates links (when safe):
///   r1 (parent) → r2 (child)
///   r2 (parent) → r3 (child)
///   r3 (parent) → M (child)
/// ```
///
/// A reference is only re-linked if it has no parent yet; the message itself
/// is always moved under its last reference unless that would close a cycle.
fn build_containers(arena: &mut ContainerArena, messages: Vec<Message>) {
    let mut id_table: HashMap<String, ContainerId> = HashMap::new();

    for message in messages {
        let references = unique_references(&message.references);

        let container = match id_table.get(&message.message_id).copied() {
            Some(existing) => {
                arena.set_message(existing, message);
                existing
            }
            None => {
                let message_id = message.message_id.clone();
                let id = arena.alloc(Some(message));
                id_table.insert(message_id, id);
                id
            }
        };

        let mut previous: Option<ContainerId> = None;
        for reference in &references {
            let reference_container = get_or_create(arena, &mut id_table, reference);

            if let Some(parent) = previous {
                if arena.parent(reference_container).is_none()
                    && !would_create_cycle(arena, parent, reference_container)
                {
                    arena.add_child(parent, reference_container);
                }
            }

            previous = Some(reference_container);
        }

        if let Some(parent) = previous {
            if !would_create_cycle(arena, parent, container) {
                arena.add_child(parent, container);
            }
        }
    }
}

/// Find all thread roots, in container creation order.
fn identify_thread_roots(arena: &ContainerArena) -> Vec<ContainerId> {
    arena
        .ids()
        .filter(|&id| arena.parent(id).is_none())
        .collect()
}

/// Prune empty containers, children first
///
/// - childless dummy: discarded
/// - top-level dummy with one child: replaced by the child
/// - nested dummy: its children move up to the dummy's parent
/// - top-level dummy with several children: kept, it groups siblings whose
///   common ancestor never arrived
fn prune_empty_containers(arena: &mut ContainerArena, containers: Vec<ContainerId>) -> Vec<ContainerId> {
    let mut result = Vec::with_capacity(containers.len());

    for id in containers {
        let children = arena.replace_children(id, Vec::new());
        let children = prune_empty_containers(arena, children);

        if !arena.is_dummy(id) {
            arena.replace_children(id, children);
            result.push(id);
            continue;
        }

        match (arena.parent(id), children.len()) {
            (_, 0) => {
                arena.set_parent(id, None);
            }
            (None, 1) => {
                let child = children[0];
                arena.set_parent(child, None);
                result.push(child);
            }
            (None, _) => {
                arena.replace_children(id, children);
                result.push(id);
            }
            (Some(parent), _) => {
                for child in children {
                    arena.set_parent(child, Some(parent));
                    result.push(child);
                }
                arena.set_parent(id, None);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn message(id: &str, subject: &str, refs: &[&str], minutes: i64) -> Message {
        Message {
            message_id: id.to_string(),
            subject: subject.to_string(),
            references: refs.iter().map(|r| r.to_string()).collect(),
            from_name: "Tester".to_string(),
            from_addr: "tester@example.com".to_string(),
            date: base_date() + Duration::minutes(minutes),
            body: String::new(),
        }
    }

    fn ids_and_depths(messages: Vec<Message>) -> Vec<(String, usize)> {
        build_threads(messages)
            .into_flattened()
            .into_iter()
            .map(|m| (m.message.message_id, m.depth))
            .collect()
    }

    fn owned(pairs: &[(&str, usize)]) -> Vec<(String, usize)> {
        pairs.iter().map(|(id, depth)| (id.to_string(), *depth)).collect()
    }

    #[test]
    fn test_empty_input() {
        let forest = build_threads(Vec::new());
        assert!(forest.is_empty());
        assert!(forest.flatten().is_empty());
    }

    #[test]
    fn test_unreferenced_messages_are_separate_roots() {
        let result = ids_and_depths(vec![
            message("a", "First topic", &[], 0),
            message("b", "Second topic", &[], 1),
            message("c", "Third topic", &[], 2),
        ]);

        assert_eq!(result, owned(&[("a", 0), ("b", 0), ("c", 0)]));
    }

    #[test]
    fn test_simple_chain() {
        let forest = build_threads(vec![
            message("a", "Build", &[], 0),
            message("b", "Re: Build", &["a"], 1),
            message("c", "Re: Build", &["a", "b"], 2),
        ]);

        assert_eq!(forest.roots().len(), 1);
        let flat = forest.into_flattened();
        let ids: Vec<&str> = flat.iter().map(|m| m.message.message_id.as_str()).collect();
        let depths: Vec<usize> = flat.iter().map(|m| m.depth).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(depths, vec![0, 1, 2]);
        assert_eq!(flat[0].display_subject, "Build");
        assert_eq!(flat[1].display_subject, "");
        assert_eq!(flat[2].display_subject, "");
    }

    #[test]
    fn test_self_reference_terminates() {
        let forest = build_threads(vec![message("a", "Loop", &["a"], 0)]);

        assert_eq!(forest.roots().len(), 1);
        let root = forest.roots()[0];
        assert_eq!(forest.arena().parent(root), None);
        assert!(forest.arena().children(root).is_empty());
        assert_eq!(forest.flatten().len(), 1);
    }

    #[test]
    fn test_mutual_reference_cycle_terminates() {
        let result = ids_and_depths(vec![
            message("a", "Cycle", &["b"], 0),
            message("b", "Re: Cycle", &["a"], 1),
        ]);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].1, 0);
        assert_eq!(result[1].1, 1);
    }

    #[test]
    fn test_longer_reference_cycle_terminates() {
        let result = ids_and_depths(vec![
            message("a", "Ring", &["c", "b"], 0),
            message("b", "Re: Ring", &["a", "c"], 1),
            message("c", "Re: Ring", &["b", "a"], 2),
        ]);

        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_missing_parent_single_child_is_promoted() {
        let result = ids_and_depths(vec![message("b", "Re: Lost", &["missing"], 0)]);

        assert_eq!(result, owned(&[("b", 0)]));
    }

    #[test]
    fn test_missing_parent_groups_siblings() {
        let forest = build_threads(vec![
            message("b", "Re: Lost", &["missing"], 0),
            message("c", "Re: Lost", &["missing"], 1),
        ]);

        assert_eq!(forest.roots().len(), 1);
        assert!(forest.arena().is_dummy(forest.roots()[0]));
        let flat = forest.into_flattened();
        assert_eq!(flat.len(), 2);
        assert!(flat.iter().all(|m| m.depth == 0));
    }

    #[test]
    fn test_nested_missing_message_is_collapsed() {
        // a → (missing x) → c becomes a → c
        let result = ids_and_depths(vec![
            message("a", "Topic", &[], 0),
            message("c", "Re: Topic", &["a", "x"], 1),
        ]);

        assert_eq!(result, owned(&[("a", 0), ("c", 1)]));
    }

    #[test]
    fn test_same_subject_non_replies_share_dummy() {
        let forest = build_threads(vec![
            message("a", "Build", &[], 0),
            message("b", "Build", &[], 1),
        ]);

        assert_eq!(forest.roots().len(), 1);
        let root = forest.roots()[0];
        assert!(forest.arena().is_dummy(root));
        assert_eq!(forest.arena().children(root).len(), 2);

        let result: Vec<usize> = forest.flatten().iter().map(|m| m.depth).collect();
        assert_eq!(result, vec![0, 0]);
    }

    #[test]
    fn test_same_subject_reply_becomes_child() {
        let result = ids_and_depths(vec![
            message("a", "Build", &[], 0),
            message("b", "Re: Build", &[], 1),
        ]);

        assert_eq!(result, owned(&[("a", 0), ("b", 1)]));
    }

    #[test]
    fn test_same_subject_reply_first_still_nests_under_original() {
        let result = ids_and_depths(vec![
            message("b", "Re: Build", &[], 0),
            message("a", "Build", &[], 1),
        ]);

        assert_eq!(result, owned(&[("a", 0), ("b", 1)]));
    }

    #[test]
    fn test_reply_joins_representative_after_it_was_regrouped() {
        // The two "Build" posts fold under a new dummy first; the reply must
        // still land under the representative rather than be lost.
        let forest = build_threads(vec![
            message("a", "Build", &[], 0),
            message("b", "Build", &[], 1),
            message("c", "Re: Build", &[], 2),
        ]);

        assert_eq!(forest.roots().len(), 1);
        let root = forest.roots()[0];
        assert!(forest.arena().is_dummy(root));
        assert_eq!(forest.arena().children(root).len(), 2);

        let result: Vec<(String, usize)> = forest
            .into_flattened()
            .into_iter()
            .map(|m| (m.message.message_id, m.depth))
            .collect();
        assert_eq!(result, owned(&[("a", 0), ("c", 1), ("b", 0)]));
    }

    #[test]
    fn test_subject_grouping_prefers_real_over_dummy() {
        // A dummy root (two replies to a missing message) and a real "Lost" root
        let forest = build_threads(vec![
            message("b", "Re: Lost", &["missing"], 0),
            message("c", "Re: Lost", &["missing"], 1),
            message("d", "Lost", &[], 2),
        ]);

        assert_eq!(forest.roots().len(), 1);
        let root = forest.roots()[0];
        assert!(forest.arena().is_dummy(root));
        let flat = forest.into_flattened();
        assert_eq!(flat.len(), 3);
        assert!(flat.iter().all(|m| m.depth == 0));
    }

    #[test]
    fn test_duplicate_message_id_keeps_last() {
        let forest = build_threads(vec![
            message("a", "Old subject", &[], 0),
            message("a", "New subject", &[], 1),
        ]);

        let flat = forest.into_flattened();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].message.subject, "New subject");
    }

    #[test]
    fn test_duplicate_references_are_ignored() {
        let result = ids_and_depths(vec![
            message("a", "Topic", &[], 0),
            message("b", "Re: Topic", &["a", "a", "a"], 1),
        ]);

        assert_eq!(result, owned(&[("a", 0), ("b", 1)]));
    }

    #[test]
    fn test_siblings_sorted_by_date() {
        let forest = build_threads(vec![
            message("root", "Topic", &[], 0),
            message("late", "Re: Topic", &["root"], 30),
            message("early", "Re: Topic", &["root"], 10),
            message("middle", "Re: Topic", &["root"], 20),
            message("other", "Unrelated", &[], -5),
        ]);

        let arena = forest.arena();
        let root_dates: Vec<_> = forest
            .roots()
            .iter()
            .map(|&id| arena[id].message.as_ref().map(|m| m.date))
            .collect();
        assert!(root_dates.windows(2).all(|w| w[0] <= w[1]));

        for id in arena.ids() {
            let dates: Vec<_> = arena
                .children(id)
                .iter()
                .filter_map(|&child| arena[child].message.as_ref().map(|m| m.date))
                .collect();
            assert!(dates.windows(2).all(|w| w[0] <= w[1]));
        }

        let ids: Vec<String> = forest
            .into_flattened()
            .into_iter()
            .map(|m| m.message.message_id)
            .collect();
        assert_eq!(ids, vec!["other", "root", "early", "middle", "late"]);
    }

    #[test]
    fn test_dummy_date_option() {
        let late = ThreadOptions {
            dummy_date: base_date() + Duration::days(1),
        };
        let forest = build_threads_with(
            vec![
                message("b", "Re: Lost", &["missing"], 5),
                message("c", "Re: Lost", &["missing"], 6),
                message("z", "Zebra", &[], 10),
            ],
            &late,
        );

        let ids: Vec<String> = forest
            .into_flattened()
            .into_iter()
            .map(|m| m.message.message_id)
            .collect();
        assert_eq!(ids, vec!["z", "b", "c"]);
    }

    #[test]
    fn test_deterministic_for_fixed_input() {
        let input = vec![
            message("a", "Build", &[], 0),
            message("b", "Build", &[], 0),
            message("c", "Re: Build", &["a"], 0),
            message("d", "Re: Build", &["zz", "a"], 0),
        ];

        let first = ids_and_depths(input.clone());
        let second = ids_and_depths(input);
        assert_eq!(first, second);
    }
}
