use crate::error::AquaError;
use crate::log::LogBook;
use crate::revision::{Revision, RevisionBody};
use crate::tree::AquaTree;
use crate::types::{aqua_file_name, FileObject, VerificationHash};

use super::graph::{self, GraphNode};
use super::{verify_tree_inner, Mode, RevisionInfo, VerifyContext};

/// Trees on the current link-recursion path, by genesis hash.
#[derive(Clone, Debug, Default)]
pub struct LinkScope {
    path: Vec<VerificationHash>,
}

impl LinkScope {
    /// Scope rooted at the tree being verified.
    pub fn root(identity: &VerificationHash) -> Self {
        Self {
            path: vec![identity.clone()],
        }
    }

    pub fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    pub fn contains(&self, identity: &VerificationHash) -> bool {
        self.path.contains(identity)
    }

    /// Scope one level deeper. Refuses to re-enter a tree already on the
    /// path or to go deeper than `max_depth`.
    pub fn enter(&self, identity: &VerificationHash, max_depth: usize) -> Result<Self, AquaError> {
        if self.contains(identity) {
            return Err(AquaError::LinkCycle(identity.clone()));
        }
        if self.depth() + 1 > max_depth {
            return Err(AquaError::LinkDepthExceeded(max_depth));
        }
        let mut path = self.path.clone();
        path.push(identity.clone());
        Ok(Self { path })
    }
}

/// Find the exported tree that contains `linked_hash`.
///
/// First by name (`file_index[linked_hash]` + `.aqua.json`), then, when
/// `deep_scan` is set, by scanning every supplied file that parses as a tree.
pub fn resolve_linked_tree(
    source: &AquaTree,
    linked_hash: &VerificationHash,
    files: &[FileObject],
    deep_scan: bool,
    book: &mut LogBook,
) -> Option<AquaTree> {
    if let Some(name) = source.file_index().get(linked_hash) {
        let expected = aqua_file_name(name);
        let by_name = files
            .iter()
            .filter(|f| f.file_name == expected)
            .filter_map(|f| f.file_content.to_tree())
            .find(|t| t.contains(linked_hash));
        if by_name.is_some() {
            return by_name;
        }
        book.hint(format!("{} not supplied or does not contain {}", expected, linked_hash));
    }

    if !deep_scan {
        return None;
    }
    let found = files
        .iter()
        .filter_map(|f| f.file_content.to_tree().map(|t| (f, t)))
        .find(|(_, t)| t.contains(linked_hash));
    if let Some((file, _)) = &found {
        book.hint(format!("Deep link scan found {} in {}", linked_hash, file.file_name));
    }
    found.map(|(_, t)| t)
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn check_link(
    ctx: &VerifyContext<'_>,
    tree: &AquaTree,
    hash: &VerificationHash,
    revision: &Revision,
    files: &[FileObject],
    scope: &LinkScope,
    book: &mut LogBook,
    mode: Mode,
) -> Result<(RevisionInfo, Vec<GraphNode>), AquaError> {
    let RevisionBody::Link {
        link_verification_hashes,
        link_file_hashes,
        ..
    } = &revision.body
    else {
        return Err(AquaError::InvalidRevision {
            hash: hash.clone(),
            reason: "not a link revision".into(),
        });
    };

    if link_verification_hashes.is_empty()
        || link_verification_hashes.len() != link_file_hashes.len()
    {
        return Err(AquaError::InvalidRevision {
            hash: hash.clone(),
            reason: format!(
                "{} linked hashes but {} file hashes",
                link_verification_hashes.len(),
                link_file_hashes.len()
            ),
        });
    }

    let mut linked_nodes = Vec::new();
    for (linked_hash, file_hash) in link_verification_hashes.iter().zip(link_file_hashes) {
        let linked = resolve_linked_tree(tree, linked_hash, files, ctx.config.deep_link_scan, book)
            .ok_or_else(|| AquaError::LinkedTreeNotFound(linked_hash.clone()))?;

        let computed = linked.genesis_file_hash().unwrap_or_default();
        if computed != file_hash.as_str() {
            return Err(AquaError::LinkedTreeInvalid {
                hash: linked_hash.clone(),
                source: Box::new(AquaError::FileHashMismatch {
                    hash: linked_hash.clone(),
                    expected: file_hash.clone(),
                    computed: computed.to_string(),
                }),
            });
        }

        let identity = linked
            .identity()
            .cloned()
            .ok_or(AquaError::MissingGenesis)?;
        let child_scope = scope.enter(&identity, ctx.config.max_link_depth)?;

        let mut child_book = book.child();
        child_book.info(format!(
            "Following link {} into tree {}",
            linked_hash, identity
        ));
        let result = match mode {
            Mode::Plain => verify_tree_inner(ctx, &linked, files, &child_scope, &mut child_book)
                .await
                .map(|_| None),
            Mode::Graph => graph::build_graph_inner(ctx, &linked, files, &child_scope, &mut child_book)
                .await
                .and_then(|g| {
                    if g.is_valid {
                        Ok(Some(g.root))
                    } else {
                        Err(AquaError::Verification {
                            failures: g.failures,
                        })
                    }
                }),
        };
        book.extend(child_book);

        match result {
            Ok(node) => linked_nodes.extend(node),
            Err(error) => {
                book.error(format!("Linked tree at {} failed verification", linked_hash));
                return Err(AquaError::LinkedTreeInvalid {
                    hash: linked_hash.clone(),
                    source: Box::new(error),
                });
            }
        }
    }

    Ok((
        RevisionInfo::Link {
            linked_hashes: link_verification_hashes.clone(),
        },
        linked_nodes,
    ))
}
