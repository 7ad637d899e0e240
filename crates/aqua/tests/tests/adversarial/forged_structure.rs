//! Adversarial test: structurally forged trees.
//!
//! Every forgery here keeps each revision's own hash consistent, so only the
//! structure and cross-revision checks can catch it.

use aqua_tree::{
    AquaConfig, AquaError, AquaTree, FileObject, HashingMethod, Revision, RevisionBody,
    VerificationHash,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::common::{aquafier, faults, genesis, has_cause, opts, tamper, text_file};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sealed_file_revision(parent: VerificationHash, file_hash: &str) -> (VerificationHash, Revision) {
    Revision::new(
        parent,
        "20240601093000",
        RevisionBody::File {
            file_hash: file_hash.to_string(),
            file_nonce: "00".repeat(32),
            content: None,
        },
    )
    .seal(HashingMethod::Scalar)
    .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn child_stored_before_parent() {
    let (aq, _) = aquafier(AquaConfig::default());
    let embed = opts().embed_content(true);
    let tree = aq
        .create_genesis_revision(&text_file("o.txt", "1"), &embed)
        .unwrap()
        .into_value();
    let tree = aq
        .create_content_revision(&tree, &text_file("o.txt", "2"), &embed)
        .unwrap()
        .into_value();

    let reordered = tamper(&tree, |doc| {
        let revisions = doc["revisions"].as_object().unwrap();
        let mut flipped = Map::new();
        for (k, v) in revisions.iter().rev() {
            flipped.insert(k.clone(), v.clone());
        }
        doc["revisions"] = Value::Object(flipped);
    });

    // Parent lookup alone is satisfied; causal order is not.
    assert!(aq.verify_tree(&reordered, &[]).await.is_ok());
    let failure = aq.verify_and_build_graph(&reordered, &[]).await.unwrap_err();
    assert!(matches!(failure.error, AquaError::DetachedChain { .. }));
}

#[tokio::test]
async fn second_genesis_is_structural() {
    let (aq, _) = aquafier(AquaConfig::default());
    let file = text_file("g.txt", "g");
    let tree = genesis(&aq, &file);

    let (hash, revision) = sealed_file_revision(VerificationHash::none(), "ab");
    let mut revisions = tree.revisions().clone();
    revisions.insert(hash, revision);
    let forged = AquaTree::from_parts(revisions, tree.file_index().clone());

    assert_eq!(forged.identity(), tree.identity());
    let failure = aq.verify_and_build_graph(&forged, &[file]).await.unwrap_err();
    assert!(matches!(failure.error, AquaError::InvalidRevision { .. }));
}

#[tokio::test]
async fn injected_revision_with_foreign_parent() {
    let (aq, _) = aquafier(AquaConfig::default());
    let file = text_file("p.txt", "p");
    let tree = genesis(&aq, &file);

    let foreign = VerificationHash::new(format!("0x{}", "ab".repeat(32)));
    let (hash, revision) = sealed_file_revision(foreign.clone(), "cd");
    let mut revisions = tree.revisions().clone();
    revisions.insert(hash.clone(), revision);
    let forged = AquaTree::from_parts(revisions, tree.file_index().clone());

    // Unreachable from genesis, so the head stays put.
    assert_eq!(forged.latest_hash(), tree.latest_hash());

    let failure = aq.verify_tree(&forged, &[file.clone()]).await.unwrap_err();
    let faults = faults(&failure.error);
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].hash, hash);
    assert!(matches!(
        &faults[0].error,
        AquaError::DetachedChain { previous, .. } if previous == &foreign
    ));

    let failure = aq.verify_and_build_graph(&forged, &[file]).await.unwrap_err();
    assert!(matches!(failure.error, AquaError::DetachedChain { .. }));
}

#[tokio::test]
async fn swapped_stored_leaves() {
    let (aq, _) = aquafier(AquaConfig::tree());
    let file = text_file("l.txt", "leaves");
    let tree = genesis(&aq, &file);
    let hash = tree.identity().unwrap().clone();

    let forged = tamper(&tree, |doc| {
        let leaves = doc["revisions"][hash.as_str()]["leaves"]
            .as_array_mut()
            .unwrap();
        leaves.swap(0, 1);
    });
    let failure = aq.verify_tree(&forged, &[file]).await.unwrap_err();
    assert!(matches!(
        faults(&failure.error)[0].error,
        AquaError::HashMismatch { .. }
    ));
}

#[tokio::test]
async fn extra_field_beside_redaction() {
    let (aq, _) = aquafier(AquaConfig::tree());
    let form = text_file(
        "f.json",
        serde_json::json!({"name": "Ada", "role": "admin"}).to_string(),
    );
    let tree = aq
        .create_form_revision(None, &form, &opts())
        .unwrap()
        .into_value();
    let hash = tree.identity().unwrap().clone();
    let hidden = aq.hide_form_field(&tree, &hash, "role").unwrap().into_value();

    let forged = tamper(&hidden, |doc| {
        doc["revisions"][hash.as_str()]["forms_is_admin"] = true.into();
    });
    let failure = aq.verify_tree(&forged, &[]).await.unwrap_err();
    assert!(matches!(
        faults(&failure.error)[0].error,
        AquaError::InvalidRevision { .. }
    ));
}

#[tokio::test]
async fn substituted_linked_tree() {
    let (aq, _) = aquafier(AquaConfig::default());
    let a_file = text_file("a.txt", "alpha");
    let b_file = text_file("b.txt", "beta");
    let x_file = text_file("x.txt", "impostor");
    let b = genesis(&aq, &b_file);
    let a = aq
        .link_revision(&genesis(&aq, &a_file), &[b.clone()], &opts())
        .unwrap()
        .into_value();

    // An impostor tree that carries B's genesis behind its own.
    let x = genesis(&aq, &x_file);
    let mut revisions: IndexMap<_, _> = x.revisions().clone();
    let (b_hash, b_genesis) = b.genesis().unwrap();
    revisions.insert(b_hash.clone(), b_genesis.clone());
    let impostor = AquaTree::from_parts(revisions, x.file_index().clone());
    assert!(impostor.contains(b_hash));

    let files = vec![
        a_file,
        b_file,
        x_file,
        FileObject::aqua_tree("b.txt", impostor),
    ];
    let failure = aq.verify_tree(&a, &files).await.unwrap_err();
    assert!(has_cause(&failure.error, &|e| matches!(
        e,
        AquaError::FileHashMismatch { .. }
    )));
    assert!(matches!(
        faults(&failure.error)[0].error,
        AquaError::LinkedTreeInvalid { .. }
    ));
}
