use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{AquaError, RevisionFault};
use crate::log::LogBook;
use crate::tree::AquaTree;
use crate::types::{FileObject, HashingMethod, RevisionType, VerificationHash};

use super::checks::{self, RevisionOutcome};
use super::links::LinkScope;
use super::{Mode, RevisionInfo, VerifyContext};

/// One revision in the verification graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub hash: VerificationHash,
    pub previous_hash: VerificationHash,
    pub timestamp: String,
    pub revision_type: RevisionType,
    pub is_valid: bool,
    pub method: HashingMethod,
    /// Type-specific facts; `None` when the revision failed.
    pub info: Option<RevisionInfo>,
    /// Failure reason when `is_valid` is false.
    pub error: Option<String>,
    pub children: Vec<GraphNode>,
    /// Genesis nodes of trees this revision links to.
    pub linked_children: Vec<GraphNode>,
}

impl GraphNode {
    /// Number of nodes in this subtree, linked trees excluded.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(GraphNode::size).sum::<usize>()
    }

    pub fn find(&self, hash: &VerificationHash) -> Option<&GraphNode> {
        if &self.hash == hash {
            return Some(self);
        }
        self.children
            .iter()
            .chain(self.linked_children.iter())
            .find_map(|c| c.find(hash))
    }
}

/// Result of the graph traversal. Returned even when revisions fail, so
/// the failure can be shown in place.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationGraph {
    pub root: GraphNode,
    pub is_valid: bool,
    pub latest_hash: Option<VerificationHash>,
    #[serde(skip)]
    pub failures: Vec<RevisionFault>,
}

/// Structure pass: every revision's parent must already be placed when the
/// revision is reached in insertion order.
pub(crate) fn check_structure(tree: &AquaTree) -> Result<(), AquaError> {
    if tree.is_empty() {
        return Err(AquaError::EmptyTree);
    }
    let mut placed: HashSet<&VerificationHash> = HashSet::with_capacity(tree.len());
    let mut genesis_seen = false;
    for (hash, revision) in tree.revisions() {
        if revision.is_genesis() {
            if genesis_seen {
                return Err(AquaError::InvalidRevision {
                    hash: hash.clone(),
                    reason: "second genesis revision".into(),
                });
            }
            genesis_seen = true;
        } else if !placed.contains(&revision.previous_verification_hash) {
            return Err(AquaError::DetachedChain {
                hash: hash.clone(),
                previous: revision.previous_verification_hash.clone(),
            });
        }
        placed.insert(hash);
    }
    Ok(())
}

/// Graph variant of the verification walk.
///
/// Fails fast on structural problems, then checks revisions concurrently and
/// assembles one [`GraphNode`] per revision. Revision logs are appended in
/// insertion order regardless of completion order.
pub(crate) fn build_graph_inner<'a>(
    ctx: &'a VerifyContext<'a>,
    tree: &'a AquaTree,
    files: &'a [FileObject],
    scope: &'a LinkScope,
    book: &'a mut LogBook,
) -> BoxFuture<'a, Result<VerificationGraph, AquaError>> {
    async move {
        if let Err(error) = check_structure(tree) {
            book.error(format!("Structure check failed: {}", error));
            return Err(error);
        }

        let revisions: Vec<_> = tree.revisions().iter().collect();
        let mut books: Vec<LogBook> = revisions
            .iter()
            .map(|_| LogBook::with_indent(book.indent()))
            .collect();

        let outcomes: Vec<Result<RevisionOutcome, AquaError>> = join_all(
            revisions
                .iter()
                .zip(books.iter_mut())
                .map(|((hash, revision), rev_book)| {
                    checks::check_revision(
                        ctx, tree, hash, revision, files, scope, rev_book, Mode::Graph,
                    )
                }),
        )
        .await;

        let mut nodes: HashMap<VerificationHash, GraphNode> = HashMap::with_capacity(tree.len());
        let mut failures = Vec::new();
        for (((hash, revision), outcome), rev_book) in
            revisions.iter().zip(outcomes).zip(books)
        {
            book.extend(rev_book);
            let (is_valid, info, error, linked) = match outcome {
                Ok(RevisionOutcome { info, linked }) => {
                    book.success(format!("Revision {} verified", hash));
                    (true, Some(info), None, linked)
                }
                Err(error) => {
                    book.error(format!("Revision {}: {}", hash, error));
                    let text = error.to_string();
                    failures.push(RevisionFault {
                        hash: (*hash).clone(),
                        error,
                    });
                    (false, None, Some(text), Vec::new())
                }
            };
            nodes.insert(
                (*hash).clone(),
                GraphNode {
                    hash: (*hash).clone(),
                    previous_hash: revision.previous_verification_hash.clone(),
                    timestamp: revision.local_timestamp.clone(),
                    revision_type: revision.revision_type(),
                    is_valid,
                    method: revision.hashing_method(),
                    info,
                    error,
                    children: Vec::new(),
                    linked_children: linked,
                },
            );
        }

        let genesis = tree
            .genesis()
            .map(|(hash, _)| hash.clone())
            .ok_or(AquaError::MissingGenesis)?;
        let root = assemble(&genesis, tree, &mut nodes).ok_or(AquaError::MissingGenesis)?;

        let is_valid = failures.is_empty();
        if is_valid {
            book.success(format!("Graph for tree {} verified", genesis));
        } else {
            book.error(format!(
                "Graph for tree {} has {} invalid revision(s)",
                genesis,
                failures.len()
            ));
        }
        Ok(VerificationGraph {
            root,
            is_valid,
            latest_hash: tree.latest_hash().cloned(),
            failures,
        })
    }
    .boxed()
}

/// Nest nodes along the derived revision tree.
fn assemble(
    hash: &VerificationHash,
    tree: &AquaTree,
    nodes: &mut HashMap<VerificationHash, GraphNode>,
) -> Option<GraphNode> {
    let mut node = nodes.remove(hash)?;
    let children: Vec<VerificationHash> = find_tree_node(tree, hash)
        .map(|t| t.children.iter().map(|c| c.hash.clone()).collect())
        .unwrap_or_default();
    for child in children {
        if let Some(child_node) = assemble(&child, tree, nodes) {
            node.children.push(child_node);
        }
    }
    Some(node)
}

fn find_tree_node<'t>(
    tree: &'t AquaTree,
    hash: &VerificationHash,
) -> Option<&'t crate::tree::RevisionTree> {
    fn search<'t>(
        node: &'t crate::tree::RevisionTree,
        hash: &VerificationHash,
    ) -> Option<&'t crate::tree::RevisionTree> {
        if &node.hash == hash {
            return Some(node);
        }
        node.children.iter().find_map(|c| search(c, hash))
    }
    tree.tree().and_then(|root| search(root, hash))
}
