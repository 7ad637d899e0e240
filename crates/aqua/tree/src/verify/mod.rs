//! Verification engine.
//!
//! ```text
//! verify_tree ──► for each revision (insertion order)
//!                   ├─ structure: parent present in tree
//!                   ├─ hash check: recompute scalar hash / Merkle root
//!                   └─ type check: file │ form │ signature │ witness │ link
//!                                                                    │
//!                              recurse into linked tree ◄────────────┘
//!                              (cycle guard + depth bound)
//!
//! verify_and_build_graph ──► structure pass (fail fast on detached chain)
//!                           ─► per-revision checks concurrently
//!                           ─► GraphNode tree with linked children
//! ```
//!
//! Every call collects diagnostics in a [`LogBook`]; linked-tree checks log
//! one indentation level deeper and are flattened into the parent's book.

pub mod checks;
pub mod graph;
pub mod links;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::config::AquaConfig;
use crate::error::{AquaError, RevisionFault};
use crate::log::LogBook;
use crate::platform::PlatformServices;
use crate::signer::SignerRegistry;
use crate::tree::AquaTree;
use crate::types::{FileObject, HashingMethod, RevisionType, VerificationHash};
use crate::witness::WitnessRegistry;

pub use graph::{GraphNode, VerificationGraph};
pub use links::LinkScope;

/// Type-specific facts established while checking one revision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RevisionInfo {
    File {
        file_hash: String,
        /// Content was embedded in the revision rather than supplied.
        embedded: bool,
    },
    Form {
        verified_fields: Vec<String>,
        redacted_fields: Vec<String>,
    },
    Signature {
        signature_type: String,
        wallet_address: String,
    },
    Witness {
        network: String,
        timestamp: i64,
        merkle_root: String,
        transaction_hash: String,
    },
    Link {
        linked_hashes: Vec<VerificationHash>,
    },
}

/// One revision that passed verification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevisionReport {
    pub hash: VerificationHash,
    pub revision_type: RevisionType,
    pub method: HashingMethod,
    pub info: RevisionInfo,
}

/// Summary of a tree that verified end to end.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeVerification {
    /// Genesis hash.
    pub identity: VerificationHash,
    pub latest_hash: Option<VerificationHash>,
    pub revisions: Vec<RevisionReport>,
}

/// Which flavour of traversal is running; linked trees are verified with
/// the same flavour as their parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
    Plain,
    Graph,
}

/// Borrowed engine collaborators for one verification run.
pub(crate) struct VerifyContext<'a> {
    pub config: &'a AquaConfig,
    pub signers: &'a SignerRegistry,
    pub witnesses: &'a WitnessRegistry,
    pub platform: &'a dyn PlatformServices,
}

/// Verify every revision of `tree`, recursing into linked trees.
///
/// Succeeds only if every revision passes both its hash check and its type
/// check. All failing revisions are collected into
/// [`AquaError::Verification`].
pub(crate) fn verify_tree_inner<'a>(
    ctx: &'a VerifyContext<'a>,
    tree: &'a AquaTree,
    files: &'a [FileObject],
    scope: &'a LinkScope,
    book: &'a mut LogBook,
) -> BoxFuture<'a, Result<TreeVerification, AquaError>> {
    async move {
        // Check 1: the tree has a genesis revision
        if tree.is_empty() {
            book.error("Aqua tree has no revisions");
            return Err(AquaError::EmptyTree);
        }
        let identity = match tree.genesis() {
            Some((hash, _)) => hash.clone(),
            None => {
                book.error("No genesis revision found");
                return Err(AquaError::MissingGenesis);
            }
        };
        book.info(format!(
            "Verifying tree {} ({} revisions)",
            identity,
            tree.len()
        ));

        let mut reports = Vec::with_capacity(tree.len());
        let mut failures = Vec::new();

        for (hash, revision) in tree.revisions() {
            // Check 2: exactly one genesis
            if revision.is_genesis() && hash != &identity {
                let error = AquaError::InvalidRevision {
                    hash: hash.clone(),
                    reason: "second genesis revision".into(),
                };
                book.error(format!("Revision {}: {}", hash, error));
                failures.push(RevisionFault {
                    hash: hash.clone(),
                    error,
                });
                continue;
            }

            // Check 3: the parent is part of this chain
            if !revision.is_genesis() && !tree.contains(&revision.previous_verification_hash) {
                if revision.revision_type() == RevisionType::Link {
                    book.warning(format!(
                        "Link revision {} extends {} from outside this tree",
                        hash, revision.previous_verification_hash
                    ));
                } else {
                    let error = AquaError::DetachedChain {
                        hash: hash.clone(),
                        previous: revision.previous_verification_hash.clone(),
                    };
                    book.error(format!("Revision {}: {}", hash, error));
                    failures.push(RevisionFault {
                        hash: hash.clone(),
                        error,
                    });
                    continue;
                }
            }

            // Check 4: hash and type-specific checks
            match checks::check_revision(ctx, tree, hash, revision, files, scope, book, Mode::Plain)
                .await
            {
                Ok(outcome) => {
                    book.success(format!(
                        "Revision {} ({}) verified",
                        hash,
                        revision.revision_type()
                    ));
                    reports.push(RevisionReport {
                        hash: hash.clone(),
                        revision_type: revision.revision_type(),
                        method: revision.hashing_method(),
                        info: outcome.info,
                    });
                }
                Err(error) => {
                    book.error(format!("Revision {}: {}", hash, error));
                    failures.push(RevisionFault {
                        hash: hash.clone(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            book.success(format!("Tree {} verified", identity));
            Ok(TreeVerification {
                identity,
                latest_hash: tree.latest_hash().cloned(),
                revisions: reports,
            })
        } else {
            book.error(format!(
                "Tree {} failed verification ({} of {} revisions)",
                identity,
                failures.len(),
                tree.len()
            ));
            Err(AquaError::Verification { failures })
        }
    }
    .boxed()
}
