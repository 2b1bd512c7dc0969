//! The Commit object is a data structure used to represent a specific version
//! of a project's files at a particular point in time.
//!
//! Each commit object contains the following information:
//!
//! - A reference to the top-level tree for this commit.
//! - The ordered parent commits: index 0 is the first-parent, the primary
//!   linear history; the remainder are merge parents.
//! - The author and committer identities with raw timestamps.
//! - The commit message.
//!
//! Two parse-time normalizations are applied so that rewritten commits are
//! acceptable to the import channel:
//!
//! - `gpgsig` / `gpgsig-sha256` headers are silently dropped. A signature
//!   over rewritten content is unverifiable, so there is nothing useful to
//!   preserve.
//! - Messages stored under a non-UTF-8 `encoding` header are re-encoded to
//!   UTF-8 (the only encoding fast-import accepts); undecodable bytes become
//!   the substitution character and the header is dropped.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;

use crate::errors::GitError;
use crate::hash::{ObjectHash, ObjectRef};
use crate::internal::object::ObjectTrait;
use crate::internal::object::signature::Signature;
use crate::internal::object::types::ObjectType;

/// The `Commit` struct is used to represent a commit object.
///
/// Unlike stored objects, a `Commit` value carries no id of its own: the
/// rewrite loop compares old and new records field-wise to decide whether a
/// write is needed at all, and freshly written commits are addressed by mark
/// until resolved. Parents are `ObjectRef`s for the same reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectHash,
    pub parents: Vec<ObjectRef>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "tree: {}", self.tree)?;
        for parent in self.parents.iter() {
            writeln!(f, "parent: {parent}")?;
        }
        writeln!(f, "author {}", self.author)?;
        writeln!(f, "committer {}", self.committer)?;
        writeln!(f, "{}", self.message)
    }
}

impl Commit {
    pub fn new(
        author: Signature,
        committer: Signature,
        tree: ObjectHash,
        parents: Vec<ObjectRef>,
        message: &str,
    ) -> Commit {
        Commit {
            tree,
            parents,
            author,
            committer,
            message: message.to_string(),
        }
    }

    /// The first-parent, when the commit has parents at all.
    pub fn first_parent(&self) -> Option<&ObjectRef> {
        self.parents.first()
    }

    /// Decode raw message bytes according to the `encoding` header value.
    ///
    /// Unknown labels fall back to lossy UTF-8; a missing header means the
    /// message is already canonical.
    fn decode_message(raw: &[u8], encoding: Option<&str>) -> String {
        match encoding {
            Some(label) => match encoding_rs::Encoding::for_label(label.as_bytes()) {
                Some(enc) => {
                    let (decoded, _, had_errors) = enc.decode(raw);
                    if had_errors {
                        tracing::warn!("lossy re-encode of {label} commit message");
                    }
                    decoded.into_owned()
                }
                None => {
                    tracing::warn!("unknown message encoding {label}, assuming UTF-8");
                    String::from_utf8_lossy(raw).into_owned()
                }
            },
            None => String::from_utf8_lossy(raw).into_owned(),
        }
    }
}

impl ObjectTrait for Commit {
    fn from_bytes(data: &[u8]) -> Result<Self, GitError> {
        // Signature continuation lines begin with a space, so the first
        // blank line is always the header/message boundary.
        let boundary = data.find(b"\n\n").ok_or_else(|| {
            GitError::InvalidCommitObject("missing header/message boundary".to_string())
        })?;
        let headers = &data[..boundary];
        let raw_message = &data[boundary + 2..];

        let mut tree: Option<ObjectHash> = None;
        let mut parents: Vec<ObjectRef> = Vec::new();
        let mut author: Option<Signature> = None;
        let mut committer: Option<Signature> = None;
        let mut encoding: Option<String> = None;
        let mut in_signature = false;

        for line in headers.split_str(b"\n") {
            if line.starts_with(b" ") {
                // Continuation line; only signature blocks use these, and
                // signatures are dropped.
                if in_signature {
                    continue;
                }
                return Err(GitError::InvalidCommitObject(format!(
                    "unexpected continuation line: {}",
                    String::from_utf8_lossy(line)
                )));
            }
            in_signature = false;

            let space = line.find_byte(b' ').ok_or_else(|| {
                GitError::InvalidCommitObject(format!(
                    "malformed header line: {}",
                    String::from_utf8_lossy(line)
                ))
            })?;
            let (kind, payload) = (&line[..space], &line[space + 1..]);

            match kind {
                b"tree" => {
                    tree = Some(ObjectHash::from_str(&String::from_utf8_lossy(payload))?);
                }
                b"parent" => {
                    parents.push(ObjectRef::Hash(ObjectHash::from_str(
                        &String::from_utf8_lossy(payload),
                    )?));
                }
                b"author" => {
                    author = Some(Signature::from_data(payload)?);
                }
                b"committer" => {
                    committer = Some(Signature::from_data(payload)?);
                }
                b"encoding" => {
                    encoding = Some(String::from_utf8_lossy(payload).trim().to_string());
                }
                b"gpgsig" | b"gpgsig-sha256" => {
                    // Unverifiable after a rewrite; dropped without warning.
                    in_signature = true;
                }
                _ => {
                    return Err(GitError::InvalidCommitObject(format!(
                        "unexpected header `{}`",
                        String::from_utf8_lossy(kind)
                    )));
                }
            }
        }

        let non_utf8 = encoding.as_deref().filter(|label| {
            !label.eq_ignore_ascii_case("utf-8") && !label.eq_ignore_ascii_case("utf8")
        });
        let message = Commit::decode_message(raw_message, non_utf8);

        Ok(Commit {
            tree: tree
                .ok_or_else(|| GitError::InvalidCommitObject("missing tree header".to_string()))?,
            parents,
            author: author.ok_or_else(|| {
                GitError::InvalidCommitObject("missing author header".to_string())
            })?,
            committer: committer.ok_or_else(|| {
                GitError::InvalidCommitObject("missing committer header".to_string())
            })?,
            message,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    /// [Git-Internals-Git-Objects](https://git-scm.com/book/en/v2/Git-Internals-Git-Objects)
    ///
    /// Only valid once every parent is a concrete hash; marks have no raw
    /// object representation.
    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();

        data.extend(b"tree ");
        data.extend(self.tree.to_string().as_bytes());
        data.push(0x0a);

        for parent in &self.parents {
            data.extend(b"parent ");
            data.extend(parent.to_string().as_bytes());
            data.push(0x0a);
        }

        data.extend(b"author ");
        data.extend(self.author.to_data());
        data.push(0x0a);
        data.extend(b"committer ");
        data.extend(self.committer.to_data());
        data.push(0x0a);
        data.push(0x0a);
        data.extend(self.message.as_bytes());

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};

    fn signed_commit() -> Commit {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        // Continuation lines carry a leading space, written as \x20 so the
        // literal's line-continuations cannot swallow it.
        let raw_commit = b"tree 341e54913a3a43069f2927cc0f703e5a9f730df1\n\
parent 57d7685c60213a9da465cf900f31933be3a7ee39\n\
author benjamin.747 <benjamin.747@outlook.com> 1757467768 +0800\n\
committer benjamin.747 <benjamin.747@outlook.com> 1757491219 +0800\n\
gpgsig -----BEGIN PGP SIGNATURE-----\n\
\x20\n\
\x20iQJNBAABCAA3FiEEs4MaYUV7JcjxsVMPyqxGczTZ6K4FAmjBMC4ZHGJlbmphbWlu\n\
\x20Ljc0N0BvdXRsb29rLmNvbQAKCRDKrEZzNNnorj73EADNpsyLAHsB3NgoeH+uy9Vq\n\
\x20e3qERPp5b7+hA+M7jKPyJg==\n\
\x20=UeLf\n\
\x20-----END PGP SIGNATURE-----\n\
\n\
test parse commit from bytes\n";
        Commit::from_bytes(raw_commit).unwrap()
    }

    #[test]
    fn test_from_bytes_drops_gpgsig() {
        let commit = signed_commit();

        assert_eq!(
            commit.tree.to_string(),
            "341e54913a3a43069f2927cc0f703e5a9f730df1"
        );
        assert_eq!(
            commit.author.ident,
            "benjamin.747 <benjamin.747@outlook.com>"
        );
        assert_eq!(commit.author.date, "1757467768 +0800");
        assert_eq!(commit.committer.date, "1757491219 +0800");

        // The signature block lives in the headers, not the message, and is
        // gone after parsing.
        assert!(!commit.message.contains("PGP SIGNATURE"));
        assert_eq!(commit.message, "test parse commit from bytes\n");
    }

    #[test]
    fn test_parent_order_preserved() {
        let commit = signed_commit();
        assert_eq!(commit.parents.len(), 1);
        assert_eq!(
            commit.first_parent().unwrap().to_string(),
            "57d7685c60213a9da465cf900f31933be3a7ee39"
        );
    }

    #[test]
    fn test_latin1_message_reencoded() {
        let mut raw: Vec<u8> = Vec::new();
        raw.extend(b"tree 341e54913a3a43069f2927cc0f703e5a9f730df1\n");
        raw.extend(b"author a <a@b> 1 +0000\n");
        raw.extend(b"committer a <a@b> 1 +0000\n");
        raw.extend(b"encoding ISO-8859-1\n");
        raw.extend(b"\n");
        raw.extend(b"caf\xe9\n");

        let commit = Commit::from_bytes(&raw).unwrap();
        assert_eq!(commit.message, "caf\u{e9}\n");
    }

    #[test]
    fn test_unsigned_round_trip() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let raw = b"tree 341e54913a3a43069f2927cc0f703e5a9f730df1\n\
parent 57d7685c60213a9da465cf900f31933be3a7ee39\n\
parent 8ab686eafeb1f44702738c8b0f24f2567c36da6d\n\
author a <a@b> 1 +0000\n\
committer c <c@d> 2 -0700\n\
\n\
hello\n\nfooter: 1\n";
        let commit = Commit::from_bytes(raw).unwrap();
        assert_eq!(commit.to_data().unwrap(), raw.to_vec());
        assert_eq!(
            Commit::from_bytes(&commit.to_data().unwrap()).unwrap(),
            commit
        );
    }

    #[test]
    fn test_unknown_header_is_error() {
        let raw = b"tree 341e54913a3a43069f2927cc0f703e5a9f730df1\n\
frobnicate yes\n\
author a <a@b> 1 +0000\n\
committer a <a@b> 1 +0000\n\
\nx";
        assert!(Commit::from_bytes(raw).is_err());
    }

    #[test]
    fn test_field_wise_equality() {
        let a = signed_commit();
        let mut b = a.clone();
        assert_eq!(a, b);
        b.message.push('x');
        assert_ne!(a, b);
    }
}
