//! The object-reader channel: a long-running `git cat-file --batch` child
//! giving random-access reads by hash without per-object process startup.
//!
//! The protocol is strict request/response: the caller writes `<hex>\n`, the
//! child answers `<hex> <kind> <size>\n`, `<size>` payload bytes and one
//! terminating newline. Anything else is a protocol error and fatal to the
//! rewrite.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::internal::object::types::ObjectType;

const CHANNEL: &str = "object-reader";

pub struct CatFileChannel {
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

impl CatFileChannel {
    pub fn spawn(repo: &Path) -> Result<CatFileChannel, GitError> {
        let mut child = Command::new("git")
            .args(["cat-file", "--batch"])
            .current_dir(repo)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        Ok(CatFileChannel {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
        })
    }

    fn stdin(&mut self) -> Result<&mut BufWriter<ChildStdin>, GitError> {
        self.stdin
            .as_mut()
            .ok_or_else(|| protocol_err("channel already closed"))
    }

    /// Read one object: returns its kind and raw payload.
    pub fn read_object(&mut self, id: &ObjectHash) -> Result<(ObjectType, Vec<u8>), GitError> {
        let stdin = self.stdin()?;
        writeln!(stdin, "{id}")?;
        stdin.flush()?;

        let mut header = String::new();
        if self.stdout.read_line(&mut header)? == 0 {
            return Err(protocol_err("unexpected EOF while reading header"));
        }
        let parts: Vec<&str> = header.split_whitespace().collect();
        match parts.as_slice() {
            [_, "missing"] => return Err(GitError::ObjectMissing(id.to_string())),
            [_, _, _] => {}
            _ => return Err(protocol_err(format!("unexpected response: {header:?}"))),
        }
        let kind = ObjectType::from_bytes(parts[1].as_bytes())?;
        let size: usize = parts[2]
            .parse()
            .map_err(|_| protocol_err(format!("bad size in header: {header:?}")))?;

        let mut payload = vec![0u8; size];
        self.stdout.read_exact(&mut payload)?;
        let mut terminator = [0u8; 1];
        self.stdout.read_exact(&mut terminator)?;
        if terminator != [b'\n'] {
            return Err(protocol_err("missing terminating newline after payload"));
        }

        Ok((kind, payload))
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
