//! Ref enumeration and the post-rewrite reference updater.
//!
//! After commit rewriting completes, every named ref in the caller-supplied
//! list is visited once: commit refs are repointed through the revmap,
//! annotated tags are rewritten (target remapped, signature stripped, user
//! filters applied) and originals are preserved under a backup prefix when
//! one was given. There is no cross-ref atomicity; callers that need it run
//! on a clone.

use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use crate::errors::GitError;
use crate::gateway::FilterGateway;
use crate::hash::{ObjectHash, ObjectRef};
use crate::internal::object::types::ObjectType;
use crate::rewrite::revmap::RevMap;
use crate::rewrite::{MsgFilter, TagFilter};

fn run_git(repo: &Path, channel: &'static str, args: &[&str]) -> Result<String, GitError> {
    let output = Command::new("git").args(args).current_dir(repo).output()?;
    if !output.status.success() {
        return Err(GitError::ChildFailure {
            channel,
            code: output.status.code().unwrap_or(-1),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Every branch and tag ref, fully qualified. The usual starting set for a
/// whole-repository rewrite.
pub fn list_refs(repo: &Path) -> Result<Vec<String>, GitError> {
    let stdout = run_git(
        repo,
        "ref-list",
        &[
            "-c",
            "core.warnAmbiguousRefs=false",
            "rev-parse",
            "--symbolic-full-name",
            "--branches",
            "--tags",
        ],
    )?;
    Ok(stdout.lines().map(str::to_string).collect())
}

/// All commits reachable from `refs`, oldest first: every commit appears
/// after all of its ancestors, so parents are always rewritten before their
/// children.
pub fn rev_list(repo: &Path, refs: &[String]) -> Result<Vec<ObjectHash>, GitError> {
    if refs.is_empty() {
        return Ok(Vec::new());
    }
    let mut args = vec!["rev-list", "--reverse", "--topo-order"];
    args.extend(refs.iter().map(String::as_str));
    let stdout = run_git(repo, "rev-list", &args)?;
    stdout.lines().map(ObjectHash::from_str).collect()
}

struct RefEntry {
    hash: ObjectHash,
    kind: ObjectType,
    name: String,
}

fn for_each_ref(repo: &Path, refs: &[String]) -> Result<Vec<RefEntry>, GitError> {
    if refs.is_empty() {
        return Ok(Vec::new());
    }
    let mut args = vec!["for-each-ref"];
    args.extend(refs.iter().map(String::as_str));
    let stdout = run_git(repo, "for-each-ref", &args)?;

    let mut entries = Vec::new();
    for line in stdout.lines() {
        // `<hash> <kind>\t<refname>`
        let (target, name) = line.split_once('\t').ok_or_else(|| {
            GitError::ProtocolError {
                channel: "for-each-ref",
                msg: format!("unexpected line: {line:?}"),
            }
        })?;
        let (hash, kind) = target.split_once(' ').ok_or_else(|| {
            GitError::ProtocolError {
                channel: "for-each-ref",
                msg: format!("unexpected line: {line:?}"),
            }
        })?;
        entries.push(RefEntry {
            hash: ObjectHash::from_str(hash)?,
            kind: ObjectType::from_str(kind)?,
            name: name.to_string(),
        });
    }
    Ok(entries)
}

/// Repoint every ref in `refs` at its rewritten target.
pub(crate) fn update_refs(
    gateway: &mut FilterGateway,
    repo: &Path,
    refs: &[String],
    revmap: &RevMap,
    backup_prefix: Option<&str>,
    mut msg_filter: Option<&mut MsgFilter>,
    mut tag_filter: Option<&mut TagFilter>,
) -> Result<(), GitError> {
    tracing::info!("updating refs");

    for entry in for_each_ref(repo, refs)? {
        match entry.kind {
            ObjectType::Commit => {
                let Some(new) = revmap.get(&entry.hash) else {
                    continue;
                };
                tracing::info!("updating ref {} {} -> {}", entry.name, entry.hash, new);
                if let Some(prefix) = backup_prefix {
                    gateway.reset_ref(
                        &format!("{prefix}/{}", entry.name),
                        &ObjectRef::Hash(entry.hash),
                    )?;
                }
                gateway.reset_ref(&entry.name, new)?;
            }
            ObjectType::Tag => {
                update_tag_ref(
                    gateway,
                    &entry,
                    revmap,
                    backup_prefix,
                    msg_filter.as_deref_mut(),
                    tag_filter.as_deref_mut(),
                )?;
            }
            kind => {
                tracing::warn!("ref {} points at a {kind}, skipping", entry.name);
            }
        }
    }
    Ok(())
}

fn update_tag_ref(
    gateway: &mut FilterGateway,
    entry: &RefEntry,
    revmap: &RevMap,
    backup_prefix: Option<&str>,
    msg_filter: Option<&mut MsgFilter>,
    tag_filter: Option<&mut TagFilter>,
) -> Result<(), GitError> {
    let mut tag = gateway.parse_tag(&entry.hash)?;

    if format!("refs/tags/{}", tag.name) != entry.name {
        tracing::warn!(
            "tag {} has mismatched embedded tagname {}, skipping",
            entry.name,
            tag.name
        );
        return Ok(());
    }
    if tag.object_type != ObjectType::Commit {
        tracing::warn!(
            "tag {} points at a {}, not a commit, skipping",
            entry.name,
            tag.object_type
        );
        return Ok(());
    }

    // Strip the signature before taking the comparison snapshot, so a tag
    // is not rewritten merely because its signature was stripped.
    let was_signed = tag.strip_signature();
    let old_tag = tag.clone();

    if let Some(target) = tag.object.as_hash()
        && let Some(new) = revmap.get(target)
    {
        tag.object = *new;
    }

    if let Some(filter) = msg_filter {
        tag.message = filter(std::mem::take(&mut tag.message))
            .map_err(|e| GitError::FilterFailed(format!("message filter on {}: {e}", entry.name)))?;
    }
    if let Some(filter) = tag_filter {
        tag = filter(gateway, tag)
            .map_err(|e| GitError::FilterFailed(format!("tag filter on {}: {e}", entry.name)))?;
    }

    if tag != old_tag {
        tracing::info!("updating tag {}", entry.name);
        if let Some(prefix) = backup_prefix {
            gateway.reset_ref(
                &format!("{prefix}/{}", entry.name),
                &ObjectRef::Hash(entry.hash),
            )?;
        }
        gateway.write_tag(&tag)?;
        if was_signed {
            tracing::warn!("stripped signature from tag {} ({})", tag.name, entry.hash);
        }
    }
    Ok(())
}
