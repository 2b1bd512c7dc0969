//! The commit-graph rewriter: reproduces the reachable commit DAG under the
//! configured filters, in an order that guarantees every parent is rewritten
//! before its children, then repoints the refs.
//!
//! The driver is single-threaded and cooperative: one commit at a time, with
//! each gateway operation free to block on child I/O. Nothing repoints a ref
//! until every commit has been processed, so aborting mid-stream leaves the
//! original refs intact; already-written objects stay in the store as
//! unreachable garbage.

pub mod refs;
pub mod revmap;

use std::path::{Path, PathBuf};

use crate::errors::GitError;
use crate::gateway::FilterGateway;
use crate::hash::{Mark, ObjectHash, ObjectRef};
use crate::internal::object::commit::Commit;
use crate::internal::object::tag::Tag;
use crate::transform::{PathRule, TransformStats, TreeTransformer};
use revmap::RevMap;

/// Rewrites the message of a commit or tag.
pub type MsgFilter = Box<dyn FnMut(String) -> Result<String, GitError>>;

/// Rewrites one commit. Invoked with the gateway, the commit's old hash,
/// the already-remapped commit record, and the *original* (pre-remap)
/// parent list.
pub type CommitFilter = Box<
    dyn FnMut(&mut FilterGateway, &ObjectHash, Commit, &[ObjectRef]) -> Result<FilterResult, GitError>,
>;

/// Rewrites one annotated tag (already signature-stripped and remapped).
pub type TagFilter = Box<dyn FnMut(&mut FilterGateway, Tag) -> Result<Tag, GitError>>;

/// Invoked with the mark of a just-written commit so the caller can update
/// auxiliary maps.
pub type PostWrite = Box<dyn FnOnce(&mut FilterGateway, Mark) -> Result<(), GitError>>;

/// What a commit filter decided.
pub enum FilterResult {
    /// Continue with this commit record.
    Replace(Commit),
    /// Treat the commit as equivalent to an existing commit: install the
    /// alias in the revmap, write nothing.
    Alias(ObjectHash),
    /// Write this commit unconditionally, then hand the resulting mark to
    /// the callback.
    ReplaceAndNotify(Commit, PostWrite),
}

/// What a finished rewrite did.
#[derive(Debug, Default)]
pub struct RewriteSummary {
    /// Commits enumerated from the starting refs.
    pub commits_seen: usize,
    /// Commits that actually changed and were rewritten.
    pub commits_rewritten: usize,
    /// Transformer counters, when tree rules were configured.
    pub transform_stats: Option<TransformStats>,
}

/// Builder-style driver for a whole-history rewrite.
///
/// With no filters configured the rewrite is the identity: every ref ends
/// unchanged and the revmap stays empty.
pub struct HistoryRewriter {
    gateway: FilterGateway,
    repo: PathBuf,
    refs: Option<Vec<String>>,
    msg_filter: Option<MsgFilter>,
    commit_filter: Option<CommitFilter>,
    tag_filter: Option<TagFilter>,
    rules: Vec<PathRule<FilterGateway>>,
    prefix_sensitive: bool,
    backup_prefix: Option<String>,
    revmap_path: Option<PathBuf>,
    progress_interval: usize,
}

impl HistoryRewriter {
    /// Open the repository at `repo` and spawn the gateway channels.
    pub fn new(repo: &Path) -> Result<HistoryRewriter, GitError> {
        Ok(HistoryRewriter {
            gateway: FilterGateway::open(repo)?,
            repo: repo.to_path_buf(),
            refs: None,
            msg_filter: None,
            commit_filter: None,
            tag_filter: None,
            rules: Vec::new(),
            prefix_sensitive: true,
            backup_prefix: Some("refs/original".to_string()),
            revmap_path: None,
            progress_interval: 100,
        })
    }

    /// Restrict the rewrite to these refs instead of every branch and tag.
    pub fn refs(mut self, refs: Vec<String>) -> Self {
        self.refs = Some(refs);
        self
    }

    pub fn msg_filter(mut self, filter: MsgFilter) -> Self {
        self.msg_filter = Some(filter);
        self
    }

    pub fn commit_filter(mut self, filter: CommitFilter) -> Self {
        self.commit_filter = Some(filter);
        self
    }

    pub fn tag_filter(mut self, filter: TagFilter) -> Self {
        self.tag_filter = Some(filter);
        self
    }

    /// Path rules fed to the tree transformer, applied to every reachable
    /// tree.
    pub fn tree_rules(mut self, rules: Vec<PathRule<FilterGateway>>) -> Self {
        self.rules = rules;
        self
    }

    /// Whether actions depend on the position a tree appears at; turning
    /// this off lets the transformer share cache entries across paths.
    pub fn prefix_sensitive(mut self, sensitive: bool) -> Self {
        self.prefix_sensitive = sensitive;
        self
    }

    /// Namespace for backups of repointed refs (default `refs/original`);
    /// `None` disables backups.
    pub fn backup_prefix(mut self, prefix: Option<String>) -> Self {
        self.backup_prefix = prefix;
        self
    }

    /// Persist the revmap here; an existing file is loaded first and its
    /// commits are skipped, making reruns incremental.
    pub fn revmap_path(mut self, path: PathBuf) -> Self {
        self.revmap_path = Some(path);
        self
    }

    /// Log progress every `interval` commits; 0 disables.
    pub fn progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Run the rewrite to completion, update the refs, persist the revmap,
    /// and close the gateway.
    pub fn run(mut self) -> Result<RewriteSummary, GitError> {
        if let Some(prefix) = self.backup_prefix.as_deref()
            && !prefix.starts_with("refs/")
        {
            return Err(GitError::InvalidRefName(prefix.to_string()));
        }

        let reflist = match self.refs.take() {
            Some(refs) => refs,
            None => refs::list_refs(&self.repo)?,
        };
        tracing::info!("getting list of commits");
        let revlist = refs::rev_list(&self.repo, &reflist)?;

        let mut revmap = match self.revmap_path.as_deref() {
            Some(path) if path.exists() => RevMap::load(path)?,
            _ => RevMap::new(),
        };

        let mut transformer = (!self.rules.is_empty())
            .then(|| TreeTransformer::new(std::mem::take(&mut self.rules), self.prefix_sensitive));

        tracing::info!("filtering {} commits", revlist.len());
        let mut summary = RewriteSummary {
            commits_seen: revlist.len(),
            ..RewriteSummary::default()
        };

        for (index, rev) in revlist.iter().enumerate() {
            if self.progress_interval > 0 && index % self.progress_interval == 0 {
                tracing::info!("rewriting commit {index}/{}", revlist.len());
            }
            // Already processed on a previous (persisted) run.
            if revmap.contains(rev) {
                continue;
            }

            let old_commit = self.gateway.parse_commit(&ObjectRef::Hash(*rev))?;
            let mut commit = old_commit.clone();
            let original_parents = old_commit.parents.clone();
            commit.parents = commit
                .parents
                .iter()
                .map(|parent| revmap.remap(parent))
                .collect();

            if let Some(filter) = self.msg_filter.as_mut() {
                commit.message = filter(std::mem::take(&mut commit.message))
                    .map_err(|e| GitError::FilterFailed(format!("message filter at {rev}: {e}")))?;
            }
            if let Some(transformer) = transformer.as_mut() {
                commit.tree = transformer.transform(&mut self.gateway, &commit.tree)?;
            }

            if let Some(filter) = self.commit_filter.as_mut() {
                let result = filter(&mut self.gateway, rev, commit, &original_parents)
                    .map_err(|e| GitError::FilterFailed(format!("commit filter at {rev}: {e}")))?;
                commit = match result {
                    FilterResult::Replace(commit) => commit,
                    FilterResult::Alias(hash) => {
                        revmap.insert(*rev, ObjectRef::Hash(hash));
                        continue;
                    }
                    FilterResult::ReplaceAndNotify(commit, notify) => {
                        let mark = self.gateway.write_commit(&commit)?;
                        notify(&mut self.gateway, mark).map_err(|e| {
                            GitError::FilterFailed(format!("post-write callback at {rev}: {e}"))
                        })?;
                        revmap.insert(*rev, ObjectRef::Mark(mark));
                        summary.commits_rewritten += 1;
                        continue;
                    }
                };
            }

            if commit != old_commit {
                let mark = self.gateway.write_commit(&commit)?;
                revmap.insert(*rev, ObjectRef::Mark(mark));
                summary.commits_rewritten += 1;
            }
        }

        refs::update_refs(
            &mut self.gateway,
            &self.repo,
            &reflist,
            &revmap,
            self.backup_prefix.as_deref(),
            self.msg_filter.as_mut(),
            self.tag_filter.as_mut(),
        )?;

        if let Some(path) = self.revmap_path.as_deref() {
            let gateway = &mut self.gateway;
            revmap.save(path, |mark| gateway.resolve_mark(mark))?;
        }

        if let Some(transformer) = transformer.as_ref() {
            let stats = transformer.stats();
            tracing::info!(
                tree_cache_hits = stats.tree_cache_hits,
                trees_retrieved = stats.trees_retrieved,
                trees_written = stats.trees_written,
                actions_invoked = stats.actions_invoked,
                "tree transformer statistics"
            );
            summary.transform_stats = Some(stats);
        }
        tracing::info!(
            "filtered {} commits, {} were changed",
            summary.commits_seen,
            summary.commits_rewritten
        );

        self.gateway.close()?;
        Ok(summary)
    }
}
