//! Subject normalization and matching for email threading
//!
//! When References headers are missing or incomplete, roots that share a
//! normalized subject are folded together as a fallback. This is a heuristic:
//! two unrelated conversations with the same subject end up in one thread.
//!
//! The same normalization drives the display subject of flattened threads and
//! the search representative rules.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use super::algorithm::would_create_cycle;
use super::container::{ContainerArena, ContainerId};

static REPLY_PREFIX_REGEX: OnceLock<Regex> = OnceLock::new();
static VERSION_TAG_REGEX: OnceLock<Regex> = OnceLock::new();

/// One leading `Re:`, `Fwd:` or `Fw:` token, any case, plus trailing spaces.
fn reply_prefix_regex() -> &'static Regex {
    REPLY_PREFIX_REGEX
        .get_or_init(|| Regex::new(r"(?i)^(re|fwd|fw):\s*").expect("Invalid reply prefix regex"))
}

/// An isolated `v2`..`v9` word, as in `[PATCH v3 1/4]`.
fn version_tag_regex() -> &'static Regex {
    VERSION_TAG_REGEX.get_or_init(|| Regex::new(r"(?i)\bv[2-9]\b").expect("Invalid version tag regex"))
}

/// Normalize a subject for threading comparison
///
/// Strips a single leading reply/forward token and surrounding whitespace.
/// Case is preserved, so subject table keys stay exact.
///
/// ```rust
/// use inbox_index::threading::subject_matching::normalize_subject;
///
/// assert_eq!(normalize_subject("Re: Build broken"), "Build broken");
/// assert_eq!(normalize_subject("FWD:  Build broken "), "Build broken");
/// assert_eq!(normalize_subject("Re: Re: Build broken"), "Re: Build broken");
/// ```
pub fn normalize_subject(subject: &str) -> String {
    reply_prefix_regex().replace(subject, "").trim().to_string()
}

/// Whether the subject marks a reply (`Re:` in any case).
pub fn is_reply(subject: &str) -> bool {
    subject
        .get(..3)
        .map(|prefix| prefix.eq_ignore_ascii_case("re:"))
        .unwrap_or(false)
}

/// Whether the subject carries a whole-word `v2`..`v9` revision token.
pub fn has_version_tag(subject: &str) -> bool {
    version_tag_regex().is_match(subject)
}

/// Whether a message with this subject may represent its thread in listings.
pub fn is_starter_candidate(subject: &str) -> bool {
    !is_reply(subject) && !has_version_tag(subject)
}

/// Subject to show for a message in a flattened thread.
///
/// Empty when the normalized subject contains the normalized parent subject
/// (case-insensitively); roots always keep their subject.
pub fn display_subject(subject: &str, parent_subject: Option<&str>, depth: usize) -> String {
    if depth > 0 {
        if let Some(parent) = parent_subject {
            let parent_normalized = normalize_subject(parent).to_lowercase();
            let current_normalized = normalize_subject(subject).to_lowercase();
            if !parent_normalized.is_empty() && current_normalized.contains(&parent_normalized) {
                return String::new();
            }
        }
    }
    subject.to_string()
}

/// Build the representative table: normalized subject → root container
///
/// On collision a real container beats a dummy, and a non-reply beats a reply.
fn build_subject_table(
    arena: &ContainerArena,
    root_set: &[ContainerId],
) -> HashMap<String, ContainerId> {
    let mut subject_table: HashMap<String, ContainerId> = HashMap::new();

    for &container in root_set {
        let subject = normalize_subject(arena.subject(container));
        if subject.is_empty() {
            continue;
        }

        match subject_table.get(&subject).copied() {
            None => {
                subject_table.insert(subject, container);
            }
            Some(existing) => {
                let prefer_real = arena.is_dummy(existing) && !arena.is_dummy(container);
                let prefer_original =
                    is_reply(arena.subject(existing)) && !is_reply(arena.subject(container));
                if prefer_real || prefer_original {
                    subject_table.insert(subject, container);
                }
            }
        }
    }

    subject_table
}

/// Group root containers that share a normalized subject
///
/// Every root whose normalized subject maps to another representative is folded
/// into it; the result is the new root set in first-seen order.
pub fn group_by_subject(arena: &mut ContainerArena, root_set: Vec<ContainerId>) -> Vec<ContainerId> {
    let subject_table = build_subject_table(arena, &root_set);
    let mut grouped = Vec::with_capacity(root_set.len());
    let mut processed = HashSet::new();

    for container in root_set {
        if processed.contains(&container) {
            continue;
        }

        let subject = normalize_subject(arena.subject(container));
        let representative = match subject_table.get(&subject) {
            Some(&representative) if !subject.is_empty() && representative != container => {
                representative
            }
            _ => {
                grouped.push(container);
                processed.insert(container);
                continue;
            }
        };

        merge_subject_containers(arena, container, representative, &mut grouped, &mut processed);
        processed.insert(container);
    }

    grouped
}

/// Link `child` under `parent` unless that would close a cycle.
fn adopt(arena: &mut ContainerArena, parent: ContainerId, child: ContainerId) -> bool {
    if would_create_cycle(arena, parent, child) {
        return false;
    }
    arena.add_child(parent, child);
    true
}

/// Synthesize a dummy holding `first` then `second`.
fn group_under_dummy(arena: &mut ContainerArena, first: ContainerId, second: ContainerId) -> ContainerId {
    let dummy = arena.alloc(None);
    arena.add_child(dummy, first);
    arena.add_child(dummy, second);
    dummy
}

fn merge_subject_containers(
    arena: &mut ContainerArena,
    container: ContainerId,
    representative: ContainerId,
    grouped: &mut Vec<ContainerId>,
    processed: &mut HashSet<ContainerId>,
) {
    let container_is_reply = is_reply(arena.subject(container));

    if processed.contains(&representative) {
        if !container_is_reply {
            let dummy = group_under_dummy(arena, representative, container);
            match grouped.iter().position(|&c| c == representative) {
                Some(idx) => grouped[idx] = dummy,
                None => grouped.push(dummy),
            }
        } else if !adopt(arena, representative, container) {
            grouped.push(container);
        }
        return;
    }

    let representative_is_dummy = arena.is_dummy(representative);
    let container_is_dummy = arena.is_dummy(container);
    let representative_is_reply = is_reply(arena.subject(representative));

    let (parent, child) = if representative_is_dummy && !container_is_dummy {
        (representative, container)
    } else if !representative_is_dummy && container_is_dummy {
        (container, representative)
    } else if !representative_is_reply && container_is_reply {
        (representative, container)
    } else if representative_is_reply && !container_is_reply {
        (container, representative)
    } else {
        grouped.push(group_under_dummy(arena, representative, container));
        processed.insert(representative);
        return;
    };

    grouped.push(parent);
    if !adopt(arena, parent, child) {
        grouped.push(child);
    }
    processed.insert(representative);
}
