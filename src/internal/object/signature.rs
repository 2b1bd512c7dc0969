//! Author, committer and tagger identity lines.
//!
//! An identity line is `Name <email> <seconds-since-epoch> <timezone>`. The
//! identity part is kept whole rather than split into name and email: real
//! histories contain idents that do not survive a name/email round trip, and
//! the import channel accepts the whole string verbatim. The timestamp is
//! the raw `<seconds> <tz>` pair, never reinterpreted.

use std::fmt::Display;

use bstr::ByteSlice;

use crate::errors::GitError;

/// One identity + raw timestamp, as it appears in commit `author`/`committer`
/// headers and tag `tagger` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// The whole `Name <email>` identity, including the angle brackets.
    pub ident: String,
    /// The raw timestamp, e.g. `1757467768 +0800`.
    pub date: String,
}

impl Signature {
    pub fn new(ident: impl Into<String>, date: impl Into<String>) -> Signature {
        Signature {
            ident: ident.into(),
            date: date.into(),
        }
    }

    /// Parse the payload of an identity header (everything after the
    /// `author ` / `committer ` / `tagger ` keyword).
    ///
    /// The split point is the first `> ` after the identity, which isolates
    /// the raw timestamp without parsing it.
    pub fn from_data(data: &[u8]) -> Result<Signature, GitError> {
        let pos = data.find("> ").ok_or_else(|| {
            GitError::InvalidCommitObject(format!(
                "identity line without `> `: {}",
                String::from_utf8_lossy(data)
            ))
        })?;
        let ident = String::from_utf8_lossy(&data[..pos + 1]).to_string();
        let date = String::from_utf8_lossy(&data[pos + 2..]).trim().to_string();
        Ok(Signature { ident, date })
    }

    /// Re-serialize to the identity-header payload form.
    pub fn to_data(&self) -> Vec<u8> {
        format!("{} {}", self.ident, self.date).into_bytes()
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.ident, self.date)
    }
}
