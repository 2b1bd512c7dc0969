//! The import channel: a long-running `git fast-import` child used to
//! construct commit and tag objects and to repoint refs.
//!
//! Commits are written against a scratch ref with an explicit mark, a
//! detached `from` and one `merge` line per parent; that shape makes the
//! parent list exactly the merge list, in order, regardless of what the
//! scratch ref pointed at before. The root tree is installed with a single
//! `M 40000` filemodify at the empty path. The scratch ref is deleted again
//! on close.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::str::FromStr;

use crate::errors::GitError;
use crate::hash::{Mark, ObjectHash, ObjectRef, get_hash_kind};
use crate::internal::object::commit::Commit;
use crate::internal::object::tag::Tag;

const CHANNEL: &str = "import";

/// Scratch ref the commit command targets; deleted on close.
const SCRATCH_REF: &str = "refs/git-rewrite-tmp-ref";

pub struct FastImportChannel {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: BufReader<ChildStdout>,
    next_mark: u64,
}

fn protocol_err(msg: impl Into<String>) -> GitError {
    GitError::ProtocolError {
        channel: CHANNEL,
        msg: msg.into(),
    }
}

impl FastImportChannel {
    pub fn spawn(repo: &Path) -> Result<FastImportChannel, GitError> {
        let mut child = Command::new("git")
            .args(["fast-import", "--force", "--date-format=raw", "--done", "--quiet"])
            .current_dir(repo)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        Ok(FastImportChannel {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
            next_mark: 1,
        })
    }

    fn stdin(&mut self) -> Result<&mut BufWriter<ChildStdin>, GitError> {
        self.stdin
            .as_mut()
            .ok_or_else(|| protocol_err("channel already closed"))
    }

    /// Enqueue one commit object; returns the mark representing it (usable
    /// as a parent of later commits).
    pub fn write_commit(&mut self, commit: &Commit) -> Result<Mark, GitError> {
        let mark = Mark(self.next_mark);
        self.next_mark += 1;

        let zero = ObjectHash::zero_str(get_hash_kind());
        let mut request = format!(
            "commit {SCRATCH_REF}\nmark {mark}\nauthor {}\ncommitter {}\ndata {}\n{}\nfrom {zero}\n",
            commit.author,
            commit.committer,
            commit.message.len(),
            commit.message,
        );
        for parent in &commit.parents {
            request.push_str(&format!("merge {parent}\n"));
        }
        request.push_str(&format!("M 40000 {} \n\n", commit.tree));

        let stdin = self.stdin()?;
        stdin.write_all(request.as_bytes())?;
        Ok(mark)
    }

    /// Enqueue one annotated tag object. The child names the resulting ref
    /// `refs/tags/<name>` by itself; callers reset the ref separately when
    /// that is not the desired location.
    pub fn write_tag(&mut self, tag: &Tag) -> Result<(), GitError> {
        let request = format!(
            "tag {}\nfrom {}\ntagger {}\ndata {}\n{}\n",
            tag.name,
            tag.object,
            tag.tagger,
            tag.message.len(),
            tag.message,
        );
        let stdin = self.stdin()?;
        stdin.write_all(request.as_bytes())?;
        Ok(())
    }

    /// Point `name` at `target`; the all-zero hash deletes the ref.
    pub fn reset_ref(&mut self, name: &str, target: &ObjectRef) -> Result<(), GitError> {
        if !name.starts_with("refs/") {
            return Err(GitError::InvalidRefName(name.to_string()));
        }
        let stdin = self.stdin()?;
        write!(stdin, "reset {name}\nfrom {target}\n\n")?;
        Ok(())
    }

    /// Resolve a mark to its concrete hash. Forces a flush of all pending
    /// commands, so this is the most blocking operation on the channel.
    pub fn get_mark(&mut self, mark: Mark) -> Result<ObjectHash, GitError> {
        let stdin = self.stdin()?;
        writeln!(stdin, "get-mark {mark}")?;
        stdin.flush()?;

        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(protocol_err("unexpected EOF while resolving mark"));
        }
        ObjectHash::from_str(line.trim())
            .map_err(|_| protocol_err(format!("bad get-mark response: {line:?}")))
    }

    /// Delete the scratch ref, signal `done` and reap the child.
    pub fn close(mut self) -> Result<(), GitError> {
        let zero = ObjectRef::Hash(ObjectHash::zero(get_hash_kind()));
        self.reset_ref(SCRATCH_REF, &zero)?;
        let stdin = self.stdin()?;
        stdin.write_all(b"done\n")?;
        stdin.flush()?;
        drop(self.stdin.take());

        let status = self.child.wait()?;
        if !status.success() {
            return Err(GitError::ChildFailure {
                channel: CHANNEL,
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}
