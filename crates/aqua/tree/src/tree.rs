use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::error::AquaError;
use crate::revision::Revision;
use crate::types::VerificationHash;

/// Parent/child structure rebuilt from the flat revision map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionTree {
    pub hash: VerificationHash,
    pub children: Vec<RevisionTree>,
}

impl RevisionTree {
    pub fn leaf(hash: VerificationHash) -> Self {
        Self {
            hash,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(RevisionTree::size).sum::<usize>()
    }
}

/// Path index and current head.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMapping {
    /// Terminal hash of every root-to-leaf path -> the path, root first.
    pub paths: IndexMap<VerificationHash, Vec<VerificationHash>>,
    #[serde(rename = "latestHash")]
    pub latest_hash: VerificationHash,
}

/// A content-addressed revision chain.
///
/// `revisions` and `file_index` are the stored state. `tree` and
/// `treeMapping` are derived and regenerated on every change, including
/// after deserialization, so hand-edited derived fields are never trusted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AquaTreeDocument")]
pub struct AquaTree {
    revisions: IndexMap<VerificationHash, Revision>,
    file_index: IndexMap<VerificationHash, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tree: Option<RevisionTree>,
    #[serde(rename = "treeMapping")]
    tree_mapping: TreeMapping,
}

/// Wire shape accepted on load. Revisions are parsed one by one so a bad
/// entry is reported with its own hash.
#[derive(Deserialize)]
struct AquaTreeDocument {
    revisions: IndexMap<VerificationHash, Value>,
    #[serde(default)]
    file_index: IndexMap<VerificationHash, String>,
}

impl TryFrom<AquaTreeDocument> for AquaTree {
    type Error = AquaError;

    fn try_from(doc: AquaTreeDocument) -> Result<Self, Self::Error> {
        let mut revisions = IndexMap::with_capacity(doc.revisions.len());
        for (hash, raw) in doc.revisions {
            let revision = parse_revision(&hash, raw)?;
            revisions.insert(hash, revision);
        }
        Ok(Self::from_parts(revisions, doc.file_index))
    }
}

fn parse_revision(hash: &VerificationHash, raw: Value) -> Result<Revision, AquaError> {
    serde_json::from_value(raw).map_err(|e| {
        let text = e.to_string();
        match text
            .strip_prefix("missing field `")
            .and_then(|rest| rest.split_once('`'))
        {
            Some((field, _)) => AquaError::MissingField {
                hash: hash.clone(),
                field: field.to_string(),
            },
            None => AquaError::InvalidRevision {
                hash: hash.clone(),
                reason: text,
            },
        }
    })
}

impl AquaTree {
    /// Assemble a tree from stored state and derive `tree`/`treeMapping`.
    pub fn from_parts(
        revisions: IndexMap<VerificationHash, Revision>,
        file_index: IndexMap<VerificationHash, String>,
    ) -> Self {
        let mut tree = Self {
            revisions,
            file_index,
            tree: None,
            tree_mapping: TreeMapping::default(),
        };
        tree.rebuild();
        tree
    }

    pub fn from_json(json: &str) -> Result<Self, AquaError> {
        let doc: AquaTreeDocument = serde_json::from_str(json)?;
        Self::try_from(doc)
    }

    pub fn from_value(value: Value) -> Result<Self, AquaError> {
        let doc: AquaTreeDocument = serde_json::from_value(value)?;
        Self::try_from(doc)
    }

    pub fn to_json(&self) -> Result<String, AquaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn revisions(&self) -> &IndexMap<VerificationHash, Revision> {
        &self.revisions
    }

    pub fn file_index(&self) -> &IndexMap<VerificationHash, String> {
        &self.file_index
    }

    pub fn tree(&self) -> Option<&RevisionTree> {
        self.tree.as_ref()
    }

    pub fn tree_mapping(&self) -> &TreeMapping {
        &self.tree_mapping
    }

    pub fn revision(&self, hash: &VerificationHash) -> Option<&Revision> {
        self.revisions.get(hash)
    }

    pub fn contains(&self, hash: &VerificationHash) -> bool {
        self.revisions.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Head of the longest chain, the default parent for the next revision.
    pub fn latest_hash(&self) -> Option<&VerificationHash> {
        if self.tree_mapping.latest_hash.is_empty() {
            None
        } else {
            Some(&self.tree_mapping.latest_hash)
        }
    }

    pub fn latest(&self) -> Option<&Revision> {
        self.latest_hash().and_then(|h| self.revisions.get(h))
    }

    /// First revision with an empty parent hash.
    pub fn genesis(&self) -> Option<(&VerificationHash, &Revision)> {
        self.revisions.iter().find(|(_, rev)| rev.is_genesis())
    }

    /// Identity of the tree across links: its genesis hash.
    pub fn identity(&self) -> Option<&VerificationHash> {
        self.genesis().map(|(hash, _)| hash)
    }

    /// `file_hash` of the genesis revision.
    pub fn genesis_file_hash(&self) -> Option<&str> {
        self.genesis().and_then(|(_, rev)| rev.body.file_hash())
    }

    /// `true` if any revision notarizes content with this file hash.
    pub fn contains_file_hash(&self, file_hash: &str) -> bool {
        self.revisions
            .values()
            .any(|rev| rev.body.file_hash() == Some(file_hash))
    }

    /// File name associated with the genesis revision, if indexed.
    pub fn file_name(&self) -> Option<&str> {
        self.identity()
            .and_then(|h| self.file_index.get(h))
            .map(String::as_str)
    }

    /// New tree with `revision` appended under `hash`.
    pub fn with_revision(&self, hash: VerificationHash, revision: Revision) -> Self {
        let mut next = self.clone();
        next.insert_revision(hash, revision);
        next
    }

    pub(crate) fn insert_revision(&mut self, hash: VerificationHash, revision: Revision) {
        self.revisions.insert(hash, revision);
        self.rebuild();
    }

    pub(crate) fn replace_revision(
        &mut self,
        hash: &VerificationHash,
        revision: Revision,
    ) -> Result<(), AquaError> {
        let slot = self
            .revisions
            .get_mut(hash)
            .ok_or_else(|| AquaError::RevisionNotFound(hash.clone()))?;
        *slot = revision;
        self.rebuild();
        Ok(())
    }

    pub(crate) fn remove_revision(&mut self, hash: &VerificationHash) -> Option<Revision> {
        let removed = self.revisions.shift_remove(hash);
        if removed.is_some() {
            self.rebuild();
        }
        removed
    }

    pub(crate) fn index_file(&mut self, hash: VerificationHash, file_name: impl Into<String>) {
        self.file_index.insert(hash, file_name.into());
    }

    pub(crate) fn unindex_file(&mut self, hash: &VerificationHash) -> Option<String> {
        self.file_index.shift_remove(hash)
    }

    fn rebuild(&mut self) {
        self.tree = build_tree(&self.revisions);
        self.tree_mapping = match &self.tree {
            Some(root) => find_longest_path(root),
            None => TreeMapping::default(),
        };
    }
}

/// Rebuild the parent/child structure.
///
/// The first revision with an empty parent is the root. Children keep the
/// insertion order of `revisions`. Revisions that cannot be reached from the
/// root are left out and logged.
pub fn build_tree(revisions: &IndexMap<VerificationHash, Revision>) -> Option<RevisionTree> {
    let root = revisions
        .iter()
        .find(|(_, rev)| rev.is_genesis())
        .map(|(hash, _)| hash.clone())?;

    let mut children: HashMap<&VerificationHash, Vec<&VerificationHash>> = HashMap::new();
    for (hash, rev) in revisions {
        if !rev.is_genesis() {
            children
                .entry(&rev.previous_verification_hash)
                .or_default()
                .push(hash);
        }
    }

    let mut placed = HashSet::new();
    let tree = attach(&root, &children, &mut placed);

    if placed.len() < revisions.len() {
        for hash in revisions.keys().filter(|h| !placed.contains(*h)) {
            warn!(hash = %hash, "Revision not reachable from genesis; left out of tree");
        }
    }
    Some(tree)
}

fn attach<'a>(
    hash: &'a VerificationHash,
    children: &HashMap<&'a VerificationHash, Vec<&'a VerificationHash>>,
    placed: &mut HashSet<&'a VerificationHash>,
) -> RevisionTree {
    placed.insert(hash);
    let mut node = RevisionTree::leaf(hash.clone());
    if let Some(kids) = children.get(hash) {
        for kid in kids {
            if !placed.contains(*kid) {
                node.children.push(attach(kid, children, placed));
            }
        }
    }
    node
}

/// Enumerate root-to-leaf paths depth-first and pick the longest.
///
/// Only a strictly longer path replaces the current best, so on a tie the
/// first leaf reached in traversal order wins.
pub fn find_longest_path(root: &RevisionTree) -> TreeMapping {
    let mut mapping = TreeMapping::default();
    let mut best = 0usize;
    let mut path = Vec::new();
    walk(root, &mut path, &mut mapping, &mut best);
    mapping
}

fn walk(
    node: &RevisionTree,
    path: &mut Vec<VerificationHash>,
    mapping: &mut TreeMapping,
    best: &mut usize,
) {
    path.push(node.hash.clone());
    if node.children.is_empty() {
        if path.len() > *best {
            *best = path.len();
            mapping.latest_hash = node.hash.clone();
        }
        mapping.paths.insert(node.hash.clone(), path.clone());
    } else {
        for child in &node.children {
            walk(child, path, mapping, best);
        }
    }
    path.pop();
}
