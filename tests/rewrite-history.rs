//! End-to-end history rewrites against scratch repositories: path deletion
//! with directory collapse, message rewrites, merge parent remapping, tag
//! rewriting and revmap-driven incremental reruns.

#[macro_use]
mod common;

use std::str::FromStr;

use git_rewrite::hash::ObjectHash;
use git_rewrite::rewrite::revmap::RevMap;
use git_rewrite::rewrite::{FilterResult, HistoryRewriter};
use git_rewrite::transform::PathRule;

use common::{commit, git, init_repo, ls_tree, parents_of, rev_parse, stage_file};

#[test]
fn identity_rewrite_is_a_no_op() {
    require_git!();
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    stage_file(repo, "hello.txt", "hello\n");
    commit(repo, "one");
    stage_file(repo, "more.txt", "more\n");
    let head = commit(repo, "two");

    let summary = HistoryRewriter::new(repo)
        .unwrap()
        .commit_filter(Box::new(|_gateway, _old, commit, _parents| {
            Ok(FilterResult::Replace(commit))
        }))
        .run()
        .unwrap();

    assert_eq!(summary.commits_seen, 2);
    assert_eq!(summary.commits_rewritten, 0);
    assert_eq!(rev_parse(repo, "main"), head);
    // Nothing moved, so nothing was backed up.
    assert!(git(repo, &["for-each-ref", "refs/original"]).is_empty());
}

#[test]
fn delete_path_collapses_empty_directories() {
    require_git!();
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    stage_file(repo, "a/b/c.bin", "payload\n");
    stage_file(repo, "keep.txt", "keep\n");
    let old_head = commit(repo, "with binary");

    let summary = HistoryRewriter::new(repo)
        .unwrap()
        .tree_rules(vec![PathRule::delete(r".*/c\.bin").unwrap()])
        .run()
        .unwrap();
    assert_eq!(summary.commits_rewritten, 1);

    let new_head = rev_parse(repo, "main");
    assert_ne!(new_head, old_head);
    // The intermediate a/ and a/b/ directories collapsed away entirely.
    assert_eq!(ls_tree(repo, "main"), vec!["keep.txt".to_string()]);
    // The original head is preserved under the backup prefix.
    assert_eq!(rev_parse(repo, "refs/original/refs/heads/main"), old_head);
}

#[test]
fn message_rewrite_keeps_tree() {
    require_git!();
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    stage_file(repo, "hello.txt", "hello\n");
    let old_head = commit(repo, "hello\n\nfooter: 1");
    let old_tree = rev_parse(repo, "main^{tree}");

    let revmap_path = repo.join("revmap.txt");
    HistoryRewriter::new(repo)
        .unwrap()
        .msg_filter(Box::new(|msg| Ok(format!("[x] {msg}"))))
        .revmap_path(revmap_path.clone())
        .run()
        .unwrap();

    let new_head = rev_parse(repo, "main");
    assert_ne!(new_head, old_head);
    assert_eq!(rev_parse(repo, "main^{tree}"), old_tree);
    let message = git(repo, &["show", "-s", "--format=%B", "main"]);
    assert!(message.starts_with("[x] hello"));

    // The persisted revmap holds the resolved old -> new pair.
    let revmap = RevMap::load(&revmap_path).unwrap();
    let old_hash = ObjectHash::from_str(&old_head).unwrap();
    assert_eq!(revmap.get(&old_hash).unwrap().to_string(), new_head);
}

#[test]
fn merge_parents_remap_in_order() {
    require_git!();
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    stage_file(repo, "keep.txt", "keep\n");
    commit(repo, "root");

    // Branch A grows the file the rule deletes; branch B stays clean.
    git(repo, &["checkout", "-q", "-b", "side"]);
    stage_file(repo, "other.txt", "other\n");
    let commit_b = commit(repo, "side work");

    git(repo, &["checkout", "-q", "main"]);
    stage_file(repo, "drop.zip", "zipped\n");
    let commit_a = commit(repo, "add archive");
    git(repo, &["merge", "-q", "--no-ff", "-m", "merge side", "side"]);

    let revmap_path = repo.join("revmap.txt");
    HistoryRewriter::new(repo)
        .unwrap()
        .tree_rules(vec![PathRule::delete(r".*\.zip").unwrap()])
        .revmap_path(revmap_path.clone())
        .run()
        .unwrap();

    // B was untouched, so its branch still points at the original commit.
    assert_eq!(rev_parse(repo, "side"), commit_b);

    let revmap = RevMap::load(&revmap_path).unwrap();
    let new_a = revmap
        .get(&ObjectHash::from_str(&commit_a).unwrap())
        .unwrap()
        .to_string();
    assert_ne!(new_a, commit_a);

    // The rewritten merge keeps parent order: [A', B].
    assert_eq!(parents_of(repo, "main"), vec![new_a, commit_b]);
}

#[test]
fn tag_rewrite_strips_signature_and_backs_up() {
    require_git!();
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    stage_file(repo, "drop.zip", "zipped\n");
    stage_file(repo, "keep.txt", "keep\n");
    commit(repo, "tagged work");

    let message = "release one\n\n-----BEGIN PGP SIGNATURE-----\n\
not a real signature\n\
-----END PGP SIGNATURE-----\n";
    git(repo, &["tag", "-a", "-m", message, "v1"]);
    let old_tag = rev_parse(repo, "refs/tags/v1");

    HistoryRewriter::new(repo)
        .unwrap()
        .tree_rules(vec![PathRule::delete(r".*\.zip").unwrap()])
        .run()
        .unwrap();

    let new_tag = rev_parse(repo, "refs/tags/v1");
    assert_ne!(new_tag, old_tag);
    assert_eq!(rev_parse(repo, "refs/original/refs/tags/v1"), old_tag);

    let body = git(repo, &["cat-file", "tag", "refs/tags/v1"]);
    assert!(body.contains("tag v1"));
    assert!(body.contains("release one"));
    assert!(!body.contains("PGP SIGNATURE"));
    // The rewritten tag targets the rewritten commit.
    assert!(body.contains(&format!("object {}", rev_parse(repo, "main"))));
}

#[test]
fn non_commit_tag_is_left_alone() {
    require_git!();
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    stage_file(repo, "drop.zip", "zipped\n");
    commit(repo, "work");
    let tree = rev_parse(repo, "main^{tree}");
    git(repo, &["tag", "-a", "-m", "points at a tree", "treetag", tree.as_str()]);
    let old_tag = rev_parse(repo, "refs/tags/treetag");

    HistoryRewriter::new(repo)
        .unwrap()
        .tree_rules(vec![PathRule::delete(r".*\.zip").unwrap()])
        .run()
        .unwrap();

    assert_eq!(rev_parse(repo, "refs/tags/treetag"), old_tag);
    assert!(git(repo, &["for-each-ref", "refs/original/refs/tags/treetag"]).is_empty());
}

#[test]
fn shared_subtrees_hit_the_transform_cache() {
    require_git!();
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    stage_file(repo, "shared/data.zip", "zipped\n");
    stage_file(repo, "shared/keep.txt", "keep\n");
    stage_file(repo, "one.txt", "one\n");
    commit(repo, "first");
    stage_file(repo, "two.txt", "two\n");
    commit(repo, "second");

    let summary = HistoryRewriter::new(repo)
        .unwrap()
        .tree_rules(vec![PathRule::delete(r".*\.zip").unwrap()])
        .prefix_sensitive(false)
        .run()
        .unwrap();

    assert_eq!(summary.commits_rewritten, 2);
    let stats = summary.transform_stats.unwrap();
    // The shared/ subtree is identical in both commits: rewritten once,
    // served from the cache the second time.
    assert!(stats.tree_cache_hits >= 1, "stats: {stats:?}");
    assert_eq!(
        ls_tree(repo, "main"),
        vec![
            "one.txt".to_string(),
            "shared/keep.txt".to_string(),
            "two.txt".to_string()
        ]
    );
}

#[test]
fn rerun_with_persisted_revmap_is_a_no_op() {
    require_git!();
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    stage_file(repo, "a/b/c.bin", "payload\n");
    stage_file(repo, "keep.txt", "keep\n");
    commit(repo, "with binary");

    let revmap_path = repo.join("revmap.txt");
    let rule = || vec![PathRule::delete(r".*/c\.bin").unwrap()];

    HistoryRewriter::new(repo)
        .unwrap()
        .tree_rules(rule())
        .revmap_path(revmap_path.clone())
        .run()
        .unwrap();
    let head_after_first = rev_parse(repo, "main");

    let summary = HistoryRewriter::new(repo)
        .unwrap()
        .tree_rules(rule())
        .revmap_path(revmap_path.clone())
        .run()
        .unwrap();

    assert_eq!(summary.commits_rewritten, 0);
    assert_eq!(rev_parse(repo, "main"), head_after_first);
}

#[test]
fn commit_filter_alias_skips_write() {
    require_git!();
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    stage_file(repo, "hello.txt", "hello\n");
    let first = commit(repo, "one");
    stage_file(repo, "more.txt", "more\n");
    let second = commit(repo, "two");
    let first_hash = ObjectHash::from_str(&first).unwrap();

    // Collapse every commit onto the first one.
    HistoryRewriter::new(repo)
        .unwrap()
        .commit_filter(Box::new(move |_gateway, old, commit, _parents| {
            if *old == first_hash {
                Ok(FilterResult::Replace(commit))
            } else {
                Ok(FilterResult::Alias(first_hash))
            }
        }))
        .run()
        .unwrap();

    assert_eq!(rev_parse(repo, "main"), first);
    // The backup preserves the pre-rewrite head.
    assert_eq!(rev_parse(repo, "refs/original/refs/heads/main"), second);
}
