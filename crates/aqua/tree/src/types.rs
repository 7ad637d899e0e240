use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::tree::AquaTree;

/// Content hash identifying one revision.
///
/// Lowercase hex, optionally `0x`-prefixed (scalar mode). The same string is
/// the revision's key in `AquaTree::revisions` and the value recomputed from
/// the revision's own fields during verification.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationHash(String);

impl VerificationHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// The empty parent marker carried by a genesis revision.
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex digits without the optional `0x` prefix.
    pub fn digits(&self) -> &str {
        self.0.strip_prefix("0x").unwrap_or(&self.0)
    }

    /// `true` when the hash is 64 lowercase hex digits, optionally `0x`-prefixed.
    pub fn is_well_formed(&self) -> bool {
        let digits = self.digits();
        digits.len() == 64
            && digits
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Debug for VerificationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.digits();
        let short: String = digits.chars().take(12).collect();
        write!(f, "VerificationHash({})", short)
    }
}

impl fmt::Display for VerificationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VerificationHash {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for VerificationHash {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for VerificationHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How a revision's verification hash is derived from its fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashingMethod {
    /// `0x` + sha256 of the canonical serialization of all fields.
    Scalar,
    /// Merkle root over per-field leaf hashes; the leaves are stored.
    Tree,
}

impl HashingMethod {
    /// Parse the `Method: <name>` suffix carried in a revision's `version` tag.
    pub fn from_version_tag(version: &str) -> Option<Self> {
        let (_, method) = version.rsplit_once("Method:")?;
        match method.trim() {
            "scalar" => Some(Self::Scalar),
            "tree" => Some(Self::Tree),
            _ => None,
        }
    }
}

impl fmt::Display for HashingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Tree => write!(f, "tree"),
        }
    }
}

/// Closed set of revision kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionType {
    File,
    Form,
    Signature,
    Witness,
    Link,
}

impl fmt::Display for RevisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Form => write!(f, "form"),
            Self::Signature => write!(f, "signature"),
            Self::Witness => write!(f, "witness"),
            Self::Link => write!(f, "link"),
        }
    }
}

/// Externally supplied file used to resolve content during verification.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileObject {
    pub file_name: String,
    pub file_content: FileContent,
    #[serde(default)]
    pub path: String,
}

impl FileObject {
    pub fn new(file_name: impl Into<String>, file_content: FileContent) -> Self {
        Self {
            file_name: file_name.into(),
            file_content,
            path: String::new(),
        }
    }

    pub fn text(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(file_name, FileContent::Text(text.into()))
    }

    pub fn bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(file_name, FileContent::Bytes(bytes))
    }

    /// Wrap an exported tree under the `<file>.aqua.json` naming convention.
    pub fn aqua_tree(file_name: &str, tree: AquaTree) -> Self {
        Self::new(aqua_file_name(file_name), FileContent::Tree(Box::new(tree)))
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// Name under which the tree of `file_name` is exported.
pub fn aqua_file_name(file_name: &str) -> String {
    format!("{}.aqua.json", file_name)
}

/// File payload: raw bytes, text, or an already-parsed tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileContent {
    Tree(Box<AquaTree>),
    Text(String),
    Bytes(Vec<u8>),
}

impl FileContent {
    /// Bytes hashed for `file_hash` checks.
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Self::Text(text) => Cow::Borrowed(text.as_bytes()),
            Self::Bytes(bytes) => Cow::Borrowed(bytes),
            Self::Tree(tree) => Cow::Owned(serde_json::to_vec(tree).unwrap_or_default()),
        }
    }

    /// Interpret the payload as an exported tree, if it is one.
    pub fn to_tree(&self) -> Option<AquaTree> {
        match self {
            Self::Tree(tree) => Some(tree.as_ref().clone()),
            Self::Text(text) => AquaTree::from_json(text).ok(),
            Self::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|text| AquaTree::from_json(text).ok()),
        }
    }
}

/// Opaque capability bag handed to signer and witness backends.
///
/// The engine never inspects it. `Debug` output never shows values.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}
