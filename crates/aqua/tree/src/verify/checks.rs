use std::collections::HashSet;

use crate::error::AquaError;
use crate::form;
use crate::hashing;
use crate::log::LogBook;
use crate::revision::{Revision, RevisionBody};
use crate::signer::SignatureMaterial;
use crate::timestamp;
use crate::tree::AquaTree;
use crate::types::{FileObject, HashingMethod, VerificationHash};

use super::graph::GraphNode;
use super::links::{self, LinkScope};
use super::{Mode, RevisionInfo, VerifyContext};

pub(crate) struct RevisionOutcome {
    pub info: RevisionInfo,
    pub linked: Vec<GraphNode>,
}

/// Hash check followed by the type-specific check. A hash failure stops the
/// revision before any type check runs.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn check_revision(
    ctx: &VerifyContext<'_>,
    tree: &AquaTree,
    hash: &VerificationHash,
    revision: &Revision,
    files: &[FileObject],
    scope: &LinkScope,
    book: &mut LogBook,
    mode: Mode,
) -> Result<RevisionOutcome, AquaError> {
    check_hash(ctx, hash, revision, book)?;

    let mut linked = Vec::new();
    let info = match &revision.body {
        RevisionBody::File { .. } => check_file(tree, hash, revision, files, book)?,
        RevisionBody::Form { .. } => check_form(hash, revision, book)?,
        RevisionBody::Signature { .. } => check_signature(ctx, hash, revision).await?,
        RevisionBody::Witness { .. } => check_witness(ctx, hash, revision, book).await?,
        RevisionBody::Link { .. } => {
            let (info, nodes) =
                links::check_link(ctx, tree, hash, revision, files, scope, book, mode).await?;
            linked = nodes;
            info
        }
    };
    Ok(RevisionOutcome { info, linked })
}

/// Recompute the verification hash from stored fields and compare it to the
/// revision's key.
pub(crate) fn check_hash(
    ctx: &VerifyContext<'_>,
    hash: &VerificationHash,
    revision: &Revision,
    book: &mut LogBook,
) -> Result<HashingMethod, AquaError> {
    let method = revision.hashing_method();

    if let Some(declared) = revision.declared_method() {
        if declared != method {
            let error = AquaError::MethodMismatch {
                hash: hash.clone(),
                declared: declared.to_string(),
                inferred: method.to_string(),
            };
            if ctx.config.fail_on_method_mismatch {
                return Err(error);
            }
            book.warning(format!("{}; verifying as {}", error, method));
        }
    }

    if !timestamp::is_valid_timestamp(&revision.local_timestamp) {
        book.warning(format!(
            "Revision {} has malformed local_timestamp `{}`",
            hash, revision.local_timestamp
        ));
    }

    match method {
        HashingMethod::Scalar => {
            let computed = revision.compute_hash()?;
            if computed != *hash {
                return Err(AquaError::HashMismatch {
                    expected: hash.clone(),
                    computed,
                });
            }
        }
        HashingMethod::Tree if revision.has_redacted_fields() => {
            check_redacted_root(hash, revision, book)?;
        }
        HashingMethod::Tree => {
            let leaves = revision.compute_leaves()?;
            let computed = hashing::merkle_root(&leaves)
                .map(VerificationHash::new)
                .ok_or_else(|| AquaError::InvalidRevision {
                    hash: hash.clone(),
                    reason: "revision has no fields".into(),
                })?;
            if computed != *hash {
                return Err(AquaError::HashMismatch {
                    expected: hash.clone(),
                    computed,
                });
            }
            if revision.leaves.as_deref() != Some(leaves.as_slice()) {
                return Err(AquaError::HashMismatch {
                    expected: hash.clone(),
                    computed: revision.stored_root().unwrap_or_default(),
                });
            }
        }
    }
    Ok(method)
}

/// A redacted revision keeps its identity through its stored leaves. Every
/// field still visible must contribute one of those leaves.
fn check_redacted_root(
    hash: &VerificationHash,
    revision: &Revision,
    book: &mut LogBook,
) -> Result<(), AquaError> {
    let stored = revision.leaves.as_deref().unwrap_or_default();
    let root = revision
        .stored_root()
        .ok_or_else(|| AquaError::InvalidRevision {
            hash: hash.clone(),
            reason: "redacted revision has no stored leaves".into(),
        })?;
    if root != *hash {
        return Err(AquaError::HashMismatch {
            expected: hash.clone(),
            computed: root,
        });
    }

    let fields = revision.fields()?;
    if fields.len() != stored.len() {
        return Err(AquaError::InvalidRevision {
            hash: hash.clone(),
            reason: format!(
                "{} fields but {} stored leaves",
                fields.len(),
                stored.len()
            ),
        });
    }

    let known: HashSet<&str> = stored.iter().map(String::as_str).collect();
    for (name, value) in &fields {
        if form::is_redacted(name) {
            continue;
        }
        let leaf = hashing::leaf_hash(name, value);
        if !known.contains(leaf.as_str()) {
            return Err(AquaError::FormLeafMismatch {
                hash: hash.clone(),
                field: name.clone(),
                expected: "a stored leaf".into(),
                computed: leaf,
            });
        }
    }
    book.warning(format!(
        "Revision {} is partially redacted; hash checked against stored leaves",
        hash
    ));
    Ok(())
}

/// Resolve the external file backing a `file` revision.
pub(crate) fn resolve_file<'f>(
    tree: &AquaTree,
    hash: &VerificationHash,
    files: &'f [FileObject],
) -> Option<&'f FileObject> {
    let name = tree
        .file_index()
        .get(hash)
        .map(String::as_str)
        .or_else(|| tree.file_name())?;
    files.iter().find(|f| {
        f.file_name == name
            || std::path::Path::new(&f.path)
                .file_name()
                .is_some_and(|n| n.to_str() == Some(name))
    })
}

fn check_file(
    tree: &AquaTree,
    hash: &VerificationHash,
    revision: &Revision,
    files: &[FileObject],
    book: &mut LogBook,
) -> Result<RevisionInfo, AquaError> {
    let RevisionBody::File {
        file_hash, content, ..
    } = &revision.body
    else {
        return Err(AquaError::InvalidRevision {
            hash: hash.clone(),
            reason: "not a file revision".into(),
        });
    };

    let (computed, embedded) = match content {
        Some(text) => (hashing::sha256_hex(text), true),
        None => {
            let file = resolve_file(tree, hash, files).ok_or_else(|| AquaError::FileNotFound {
                hash: hash.clone(),
                file_name: tree
                    .file_index()
                    .get(hash)
                    .cloned()
                    .or_else(|| tree.file_name().map(str::to_string))
                    .unwrap_or_default(),
            })?;
            book.hint(format!("Resolved content of {} from {}", hash, file.file_name));
            (hashing::sha256_hex(file.file_content.to_bytes()), false)
        }
    };

    if computed != *file_hash {
        return Err(AquaError::FileHashMismatch {
            hash: hash.clone(),
            expected: file_hash.clone(),
            computed,
        });
    }
    Ok(RevisionInfo::File {
        file_hash: file_hash.clone(),
        embedded,
    })
}

/// Positional form check: walk the sorted field names and compare each
/// visible `forms_*` field's leaf to the stored leaf at the same index.
///
/// Renaming a field to `<key>.deleted` can move it past siblings that share
/// its prefix (`forms_a` vs `forms_a-b`), which shifts the indices of those
/// siblings. That desync is reproduced here, not corrected.
fn check_form(
    hash: &VerificationHash,
    revision: &Revision,
    book: &mut LogBook,
) -> Result<RevisionInfo, AquaError> {
    let fields = revision.fields()?;
    let mut verified = Vec::new();
    let mut redacted = Vec::new();

    let Some(leaves) = revision.leaves.as_deref() else {
        // scalar mode: the hash check already covered every value
        verified.extend(
            fields
                .keys()
                .filter(|k| form::is_form_field(k))
                .cloned(),
        );
        return Ok(RevisionInfo::Form {
            verified_fields: verified,
            redacted_fields: redacted,
        });
    };

    let mut mismatch = None;
    for (index, (name, value)) in fields.iter().enumerate() {
        if !form::is_form_field(name) {
            continue;
        }
        if form::is_redacted(name) {
            book.warning(format!(
                "Field {} on {} is redacted and cannot be verified",
                name, hash
            ));
            redacted.push(name.clone());
            continue;
        }
        let leaf = hashing::leaf_hash(name, value);
        match leaves.get(index) {
            Some(stored) if *stored == leaf => verified.push(name.clone()),
            Some(stored) => {
                book.error(format!("Field {} on {} does not match its leaf", name, hash));
                if mismatch.is_none() {
                    mismatch = Some(AquaError::FormLeafMismatch {
                        hash: hash.clone(),
                        field: name.clone(),
                        expected: stored.clone(),
                        computed: leaf,
                    });
                }
            }
            None => book.warning(format!(
                "Field {} on {} has no stored leaf at index {}",
                name, hash, index
            )),
        }
    }

    match mismatch {
        Some(error) => Err(error),
        None => Ok(RevisionInfo::Form {
            verified_fields: verified,
            redacted_fields: redacted,
        }),
    }
}

async fn check_signature(
    ctx: &VerifyContext<'_>,
    hash: &VerificationHash,
    revision: &Revision,
) -> Result<RevisionInfo, AquaError> {
    let RevisionBody::Signature {
        signature,
        signature_public_key,
        signature_wallet_address,
        signature_type,
    } = &revision.body
    else {
        return Err(AquaError::InvalidRevision {
            hash: hash.clone(),
            reason: "not a signature revision".into(),
        });
    };

    let signer = ctx.signers.get(signature_type)?;
    let material = SignatureMaterial {
        signature: signature.clone(),
        public_key: signature_public_key.clone(),
        wallet_address: signature_wallet_address.clone(),
        signature_type: signature_type.clone(),
    };
    let valid = signer
        .verify(
            &material,
            signature_wallet_address,
            &revision.previous_verification_hash,
        )
        .await?;
    if !valid {
        return Err(AquaError::InvalidSignature { hash: hash.clone() });
    }
    Ok(RevisionInfo::Signature {
        signature_type: signature_type.clone(),
        wallet_address: signature_wallet_address.clone(),
    })
}

async fn check_witness(
    ctx: &VerifyContext<'_>,
    hash: &VerificationHash,
    revision: &Revision,
    book: &mut LogBook,
) -> Result<RevisionInfo, AquaError> {
    let RevisionBody::Witness {
        witness_merkle_root,
        witness_timestamp,
        witness_network,
        witness_transaction_hash,
        witness_merkle_proof,
        ..
    } = &revision.body
    else {
        return Err(AquaError::InvalidRevision {
            hash: hash.clone(),
            reason: "not a witness revision".into(),
        });
    };

    let backend = ctx.witnesses.get(witness_network)?;
    if backend.requires_network() && !ctx.platform.is_online() {
        return Err(AquaError::Connectivity(format!(
            "witness network {} is unreachable while offline",
            witness_network
        )));
    }

    let confirmed = backend
        .verify(
            witness_transaction_hash,
            witness_merkle_root,
            *witness_timestamp,
        )
        .await?;
    if !confirmed {
        return Err(AquaError::WitnessNotConfirmed {
            hash: hash.clone(),
            network: witness_network.clone(),
        });
    }

    let parent = revision.previous_verification_hash.as_str();
    if !witness_merkle_proof.iter().any(|p| p == parent) {
        return Err(AquaError::InvalidRevision {
            hash: hash.clone(),
            reason: "witnessed hash is not part of the merkle proof".into(),
        });
    }

    if ctx.config.verify_witness_proofs {
        let computed = match witness_merkle_proof.as_slice() {
            [] => {
                return Err(AquaError::InvalidRevision {
                    hash: hash.clone(),
                    reason: "empty merkle proof".into(),
                })
            }
            [single] => single.clone(),
            many => hashing::merkle_root(many).unwrap_or_default(),
        };
        if computed != *witness_merkle_root {
            return Err(AquaError::WitnessProofMismatch {
                hash: hash.clone(),
                expected: witness_merkle_root.clone(),
                computed,
            });
        }
        if witness_merkle_proof.len() > 1 {
            book.hint(format!(
                "Batch witness proof of {} entries reproduces root",
                witness_merkle_proof.len()
            ));
        }
    }

    Ok(RevisionInfo::Witness {
        network: witness_network.clone(),
        timestamp: *witness_timestamp,
        merkle_root: witness_merkle_root.clone(),
        transaction_hash: witness_transaction_hash.clone(),
    })
}
