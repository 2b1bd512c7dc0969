//! The annotated Tag object: a first-class object with its own hash,
//! pointing at another object (almost always a commit) and carrying a
//! tagger identity and a message.
//!
//! Unlike commits, a tag's PGP signature lives inside the message body, not
//! in a header. Parsing preserves it; the reference updater strips it only
//! when it decides to rewrite the tag, so unchanged tags keep their
//! signatures intact.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;

use crate::errors::GitError;
use crate::hash::ObjectRef;
use crate::internal::object::ObjectTrait;
use crate::internal::object::signature::Signature;
use crate::internal::object::types::ObjectType;

/// The literal sentinel opening a signature block inside a tag message.
const SIGNATURE_SENTINEL: &str = "\n-----BEGIN PGP SIGNATURE-----\n";

/// The `Tag` struct is used to represent an annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// The object this tag points at; a mark when the target was just
    /// rewritten and not yet resolved.
    pub object: ObjectRef,
    /// The kind of the target object.
    pub object_type: ObjectType,
    /// The embedded tag name (should match the tail of the ref path).
    pub name: String,
    pub tagger: Signature,
    pub message: String,
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "object: {}", self.object)?;
        writeln!(f, "type: {}", self.object_type)?;
        writeln!(f, "tag: {}", self.name)?;
        writeln!(f, "tagger {}", self.tagger)?;
        writeln!(f, "{}", self.message)
    }
}

impl Tag {
    /// Remove a trailing signature block from the message, if any.
    ///
    /// Returns whether the tag was signed. The updater calls this before
    /// taking its comparison snapshot so that a tag is not rewritten merely
    /// because its signature was stripped.
    pub fn strip_signature(&mut self) -> bool {
        if let Some(pos) = self.message.find(SIGNATURE_SENTINEL) {
            self.message.truncate(pos);
            return true;
        }
        false
    }
}

impl ObjectTrait for Tag {
    fn from_bytes(data: &[u8]) -> Result<Self, GitError> {
        let boundary = data.find(b"\n\n").ok_or_else(|| {
            GitError::InvalidTagObject("missing header/message boundary".to_string())
        })?;
        let headers = &data[..boundary];
        let message = String::from_utf8_lossy(&data[boundary + 2..]).into_owned();

        let mut object: Option<ObjectRef> = None;
        let mut object_type: Option<ObjectType> = None;
        let mut name: Option<String> = None;
        let mut tagger: Option<Signature> = None;

        for line in headers.split_str(b"\n") {
            let space = line.find_byte(b' ').ok_or_else(|| {
                GitError::InvalidTagObject(format!(
                    "malformed header line: {}",
                    String::from_utf8_lossy(line)
                ))
            })?;
            let (kind, payload) = (&line[..space], &line[space + 1..]);

            match kind {
                b"object" => {
                    object = Some(ObjectRef::from_str(&String::from_utf8_lossy(payload))?);
                }
                b"type" => {
                    object_type = Some(ObjectType::from_bytes(payload)?);
                }
                b"tag" => {
                    name = Some(String::from_utf8_lossy(payload).to_string());
                }
                b"tagger" => {
                    tagger = Some(Signature::from_data(payload)?);
                }
                _ => {
                    return Err(GitError::InvalidTagObject(format!(
                        "unexpected header `{}`",
                        String::from_utf8_lossy(kind)
                    )));
                }
            }
        }

        Ok(Tag {
            object: object
                .ok_or_else(|| GitError::InvalidTagObject("missing object header".to_string()))?,
            object_type: object_type
                .ok_or_else(|| GitError::InvalidTagObject("missing type header".to_string()))?,
            name: name
                .ok_or_else(|| GitError::InvalidTagObject("missing tag header".to_string()))?,
            tagger: tagger
                .ok_or_else(|| GitError::InvalidTagObject("missing tagger header".to_string()))?,
            message,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();

        data.extend(b"object ");
        data.extend(self.object.to_string().as_bytes());
        data.push(0x0a);
        data.extend(b"type ");
        data.extend(self.object_type.to_string().as_bytes());
        data.push(0x0a);
        data.extend(b"tag ");
        data.extend(self.name.as_bytes());
        data.push(0x0a);
        data.extend(b"tagger ");
        data.extend(self.tagger.to_data());
        data.push(0x0a);
        data.push(0x0a);
        data.extend(self.message.as_bytes());

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_tag() -> Vec<u8> {
        b"object 57d7685c60213a9da465cf900f31933be3a7ee39\n\
type commit\n\
tag v1.4\n\
tagger lou <lou@example.com> 1137088807 -0800\n\
\n\
release 1.4\n"
            .to_vec()
    }

    #[test]
    fn test_parse_tag() {
        let tag = Tag::from_bytes(&raw_tag()).unwrap();
        assert_eq!(
            tag.object.to_string(),
            "57d7685c60213a9da465cf900f31933be3a7ee39"
        );
        assert_eq!(tag.object_type, ObjectType::Commit);
        assert_eq!(tag.name, "v1.4");
        assert_eq!(tag.tagger.ident, "lou <lou@example.com>");
        assert_eq!(tag.message, "release 1.4\n");
    }

    #[test]
    fn test_round_trip() {
        let tag = Tag::from_bytes(&raw_tag()).unwrap();
        assert_eq!(tag.to_data().unwrap(), raw_tag());
    }

    #[test]
    fn test_strip_signature() {
        let mut raw = raw_tag();
        raw.truncate(raw.len() - 1); // drop the trailing newline before the block
        raw.extend(
            b"\n-----BEGIN PGP SIGNATURE-----\n\
iQAbCdEf\n\
-----END PGP SIGNATURE-----\n",
        );
        let mut tag = Tag::from_bytes(&raw).unwrap();
        assert!(tag.message.contains("PGP SIGNATURE"));

        assert!(tag.strip_signature());
        assert_eq!(tag.message, "release 1.4");

        // Idempotent on an unsigned message.
        assert!(!tag.strip_signature());
        assert_eq!(tag.message, "release 1.4");
    }

    #[test]
    fn test_non_commit_target_parses() {
        let raw = b"object 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
type tree\n\
tag tree-tag\n\
tagger lou <lou@example.com> 1137088807 -0800\n\
\n\
points at a tree\n";
        let tag = Tag::from_bytes(raw).unwrap();
        assert_eq!(tag.object_type, ObjectType::Tree);
    }
}
