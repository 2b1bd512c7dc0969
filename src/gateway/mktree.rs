//! The tree-writer channel: a long-running `git mktree -z --batch` child
//! that constructs tree objects from entry lists (fast-import cannot create
//! bare trees by itself).
//!
//! Each request is one NUL-delimited batch of entry records plus a blank
//! record; the child answers with one hash line per batch.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::str::FromStr;

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::internal::object::tree::{TreeMap, to_mktree_data};

const CHANNEL: &str = "tree-writer";

pub struct MktreeChannel {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: BufReader<ChildStdout>,
}

fn protocol_err(msg: impl Into<String>) -> GitError {
    GitError::ProtocolError {
        channel: CHANNEL,
        msg: msg.into(),
    }
}

impl MktreeChannel {
    pub fn spawn(repo: &Path) -> Result<MktreeChannel, GitError> {
        let mut child = Command::new("git")
            .args(["mktree", "-z", "--batch"])
            .current_dir(repo)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        Ok(MktreeChannel {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
        })
    }

    /// Write one tree object from a (fully clean) entry map and return its
    /// hash.
    pub fn write_tree(&mut self, entries: &TreeMap) -> Result<ObjectHash, GitError> {
        let batch = to_mktree_data(entries)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| protocol_err("channel already closed"))?;
        stdin.write_all(&batch)?;
        stdin.flush()?;

        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(protocol_err("unexpected EOF while reading tree hash"));
        }
        ObjectHash::from_str(line.trim())
            .map_err(|_| protocol_err(format!("bad tree hash line: {line:?}")))
    }

    /// Signal end-of-input and reap the child.
    pub fn close(mut self) -> Result<(), GitError> {
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
