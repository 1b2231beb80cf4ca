//! Content repository access.
//!
//! Archives follow the public-inbox v2 convention: one message per commit,
//! stored as the blob `m` at the root of the commit tree. The indexer only
//! needs three operations from the repository, captured by
//! [`ContentRepository`]; [`GitRepository`] implements them with `gix`.

use gix::ObjectId;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by repository access.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to open repository: {0}")]
    Open(#[from] Box<gix::open::Error>),
    #[error("failed to refresh from remote: {0}")]
    Refresh(String),
    /// A resume point was given but the walk from the tip never reached it.
    #[error("commit {commit} is not reachable from the branch tip")]
    MissingResumePoint { commit: String },
    #[error("{0}")]
    Other(String),
}

/// Source of archive commits and their message blobs.
///
/// Calls may block on disk or network I/O.
pub trait ContentRepository: Send + Sync {
    /// Bring the local copy up to date with its remote.
    fn refresh(&self) -> Result<(), GitError>;

    /// Commits reachable from `branch` that are not ancestors of `since`,
    /// oldest first with parents always before children.
    fn commits_since(&self, branch: &str, since: Option<&str>) -> Result<Vec<String>, GitError>;

    /// Raw bytes of the message blob attached to `commit`, if it has one.
    fn blob_for_commit(&self, commit: &str) -> Result<Option<Vec<u8>>, GitError>;
}

/// Run a repository call on the blocking thread pool, keeping the async
/// workers free for readers while a walk is in progress.
pub async fn run_blocking<T, F>(
    repository: &Arc<dyn ContentRepository>,
    call: F,
) -> Result<T, GitError>
where
    F: FnOnce(&dyn ContentRepository) -> Result<T, GitError> + Send + 'static,
    T: Send + 'static,
{
    let repository = Arc::clone(repository);
    tokio::task::spawn_blocking(move || call(repository.as_ref()))
        .await
        .map_err(|e| GitError::Other(format!("repository task failed: {}", e)))?
}

/// Walk parents from `tip` without expanding past `since`, returning the
/// commits not reachable from `since` in topological order, oldest first.
///
/// Siblings keep the order in which `parents_of` reports them. Returns
/// [`GitError::MissingResumePoint`] if `since` is given but never reached.
///
/// On linear history the walk stops at `since`. When the new range holds a
/// merge, ancestors of `since` can be reached around it, so they are
/// collected and removed from the result.
pub fn topological_walk<F>(
    tip: &str,
    since: Option<&str>,
    mut parents_of: F,
) -> Result<Vec<String>, GitError>
where
    F: FnMut(&str) -> Result<Vec<String>, GitError>,
{
    let mut ordered = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut reached_since = false;
    let mut saw_merge = false;

    // (commit, parents already pushed)
    let mut stack: Vec<(String, bool)> = vec![(tip.to_string(), false)];

    while let Some((commit, expanded)) = stack.pop() {
        if expanded {
            ordered.push(commit);
            continue;
        }
        if Some(commit.as_str()) == since {
            reached_since = true;
            continue;
        }
        if !seen.insert(commit.clone()) {
            continue;
        }

        let parents = parents_of(&commit)?;
        saw_merge |= parents.len() > 1;
        stack.push((commit, true));
        for parent in parents.into_iter().rev() {
            if !seen.contains(&parent) {
                stack.push((parent, false));
            }
        }
    }

    let Some(since) = since else {
        return Ok(ordered);
    };
    if !reached_since {
        return Err(GitError::MissingResumePoint {
            commit: since.to_string(),
        });
    }
    if saw_merge {
        let hidden = ancestors(since, &mut parents_of)?;
        ordered.retain(|commit| !hidden.contains(commit));
    }

    Ok(ordered)
}

/// `start` and every commit reachable from it.
fn ancestors<F>(start: &str, parents_of: &mut F) -> Result<HashSet<String>, GitError>
where
    F: FnMut(&str) -> Result<Vec<String>, GitError>,
{
    let mut reachable = HashSet::new();
    let mut stack = vec![start.to_string()];

    while let Some(commit) = stack.pop() {
        if reachable.contains(&commit) {
            continue;
        }
        let parents = parents_of(&commit)?;
        reachable.insert(commit);
        stack.extend(parents.into_iter().filter(|p| !reachable.contains(p)));
    }

    Ok(reachable)
}

/// A local git repository holding a mailing-list archive.
pub struct GitRepository {
    path: PathBuf,
    repo: gix::ThreadSafeRepository,
    remote: String,
}

impl GitRepository {
    /// Open the repository at `path`, using remote `origin` for refreshes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GitError> {
        let path = path.as_ref().to_path_buf();
        let repo = gix::ThreadSafeRepository::open(&path).map_err(Box::new)?;
        Ok(Self {
            path,
            repo,
            remote: "origin".to_string(),
        })
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn find_commit<'r>(repo: &'r gix::Repository, commit: &str) -> Result<gix::Commit<'r>, GitError> {
        let oid = ObjectId::from_hex(commit.as_bytes())
            .map_err(|e| GitError::Other(format!("Invalid commit hash {}: {}", commit, e)))?;

        repo.find_object(oid)
            .map_err(|e| GitError::Other(format!("Failed to find commit {}: {}", commit, e)))?
            .try_into_commit()
            .map_err(|e| GitError::Other(format!("Object {} is not a commit: {}", commit, e)))
    }
}

impl ContentRepository for GitRepository {
    fn refresh(&self) -> Result<(), GitError> {
        let repo = self.repo.to_thread_local();
        log::info!("fetching {} into {}", self.remote, self.path.display());

        let remote = repo
            .find_remote(self.remote.as_str())
            .map_err(|e| GitError::Refresh(format!("unknown remote {}: {}", self.remote, e)))?;

        remote
            .connect(gix::remote::Direction::Fetch)
            .map_err(|e| GitError::Refresh(e.to_string()))?
            .prepare_fetch(gix::progress::Discard, Default::default())
            .map_err(|e| GitError::Refresh(e.to_string()))?
            .receive(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| GitError::Refresh(e.to_string()))?;

        Ok(())
    }

    fn commits_since(&self, branch: &str, since: Option<&str>) -> Result<Vec<String>, GitError> {
        let repo = self.repo.to_thread_local();

        let tip = repo
            .rev_parse_single(branch)
            .map_err(|e| GitError::Other(format!("Failed to resolve {}: {}", branch, e)))?
            .detach()
            .to_hex()
            .to_string();

        topological_walk(&tip, since, |commit| {
            let commit = Self::find_commit(&repo, commit)?;
            Ok(commit
                .parent_ids()
                .map(|id| id.detach().to_hex().to_string())
                .collect())
        })
    }

    fn blob_for_commit(&self, commit: &str) -> Result<Option<Vec<u8>>, GitError> {
        let repo = self.repo.to_thread_local();
        let commit = Self::find_commit(&repo, commit)?;

        let tree = commit
            .tree()
            .map_err(|e| GitError::Other(format!("Failed to get tree: {}", e)))?;

        // Prefer `m`; otherwise the first blob in the tree
        let mut found_entry = None;
        for entry in tree.iter() {
            let entry = entry.map_err(|e| GitError::Other(format!("Failed to iterate tree: {}", e)))?;
            if !entry.mode().is_blob() {
                continue;
            }
            if entry.filename() == "m" {
                found_entry = Some(entry);
                break;
            }
            if found_entry.is_none() {
                found_entry = Some(entry);
            }
        }

        let Some(entry) = found_entry else {
            return Ok(None);
        };

        let blob = entry
            .object()
            .map_err(|e| GitError::Other(format!("Failed to get object: {}", e)))?
            .try_into_blob()
            .map_err(|e| GitError::Other(format!("Object is not a blob: {}", e)))?;

        Ok(Some(blob.data.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(commit, parents)| {
                (
                    commit.to_string(),
                    parents.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }

    fn walk(
        graph: &HashMap<String, Vec<String>>,
        tip: &str,
        since: Option<&str>,
    ) -> Result<Vec<String>, GitError> {
        topological_walk(tip, since, |commit| {
            graph
                .get(commit)
                .cloned()
                .ok_or_else(|| GitError::Other(format!("unknown commit {}", commit)))
        })
    }

    #[test]
    fn test_linear_history_oldest_first() {
        let g = graph(&[("c3", &["c2"]), ("c2", &["c1"]), ("c1", &[])]);

        assert_eq!(walk(&g, "c3", None).unwrap(), vec!["c1", "c2", "c3"]);
        assert_eq!(walk(&g, "c3", Some("c1")).unwrap(), vec!["c2", "c3"]);
        assert!(walk(&g, "c3", Some("c3")).unwrap().is_empty());
    }

    #[test]
    fn test_merge_parents_before_children() {
        // c1 ← a ← m, c1 ← b ← m
        let g = graph(&[("m", &["a", "b"]), ("a", &["c1"]), ("b", &["c1"]), ("c1", &[])]);

        let order = walk(&g, "m", None).unwrap();
        let position = |c: &str| order.iter().position(|x| x == c).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position("c1") < position("a"));
        assert!(position("c1") < position("b"));
        assert!(position("a") < position("m"));
        assert!(position("b") < position("m"));
    }

    #[test]
    fn test_merge_hides_ancestors_of_resume_point() {
        // c1 ← c2 ← c3 ← m, c1 ← x ← m
        let g = graph(&[
            ("m", &["c3", "x"]),
            ("c3", &["c2"]),
            ("c2", &["c1"]),
            ("x", &["c1"]),
            ("c1", &[]),
        ]);

        assert_eq!(walk(&g, "m", Some("c3")).unwrap(), vec!["x", "m"]);
        assert_eq!(walk(&g, "m", Some("x")).unwrap(), vec!["c2", "c3", "m"]);
    }

    #[test]
    fn test_merged_resume_point_branch_is_fully_hidden() {
        // resume point m already merged x; only y and n are new
        let g = graph(&[
            ("n", &["m", "y"]),
            ("m", &["c2", "x"]),
            ("y", &["x"]),
            ("c2", &["c1"]),
            ("x", &["c1"]),
            ("c1", &[]),
        ]);

        assert_eq!(walk(&g, "n", Some("m")).unwrap(), vec!["y", "n"]);
    }

    #[test]
    fn test_missing_resume_point() {
        let g = graph(&[("c2", &["c1"]), ("c1", &[])]);

        let err = walk(&g, "c2", Some("gone")).unwrap_err();
        assert!(matches!(err, GitError::MissingResumePoint { ref commit } if commit == "gone"));
    }

    #[test]
    fn test_open_missing_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = GitRepository::open(dir.path().join("absent.git"));
        assert!(matches!(result, Err(GitError::Open(_))));
    }
}
