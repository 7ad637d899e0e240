//! End-to-end test: file revisions form a content-addressed chain.
//!
//! Genesis and content revisions are sealed under both hashing methods,
//! re-verified against the supplied files, and any edit to a stored revision
//! is caught by the hash check.

use aqua_tree::hashing::sha256_hex;
use aqua_tree::{AquaConfig, AquaError, HashingMethod, RevisionBody, RevisionType};

use crate::common::{aquafier, faults, genesis, opts, tamper, text_file};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn genesis_round_trip_verifies() {
    let (aq, _) = aquafier(AquaConfig::default());
    let file = text_file("notes.txt", "meeting notes");
    let tree = genesis(&aq, &file);

    let verified = aq.verify_tree(&tree, &[file]).await.unwrap().into_value();
    assert_eq!(&verified.identity, tree.identity().unwrap());
    assert_eq!(verified.revisions.len(), 1);
    assert_eq!(verified.revisions[0].revision_type, RevisionType::File);
}

#[tokio::test]
async fn hello_scalar_hash_matches_its_key() {
    let (aq, _) = aquafier(AquaConfig::default());
    let tree = genesis(&aq, &text_file("hello.txt", "hello"));
    let (hash, revision) = tree.genesis().unwrap();

    assert_eq!(revision.body.file_hash(), Some(sha256_hex("hello").as_str()));
    assert_eq!(
        revision.body.file_hash(),
        Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
    );
    assert_eq!(revision.hashing_method(), HashingMethod::Scalar);
    assert!(revision.leaves.is_none());
    assert_eq!(&revision.compute_hash().unwrap(), hash);

    // One character of the timestamp is enough to change the hash.
    let mut edited = revision.clone();
    edited.local_timestamp.replace_range(13..14, "1");
    assert_ne!(edited.local_timestamp, revision.local_timestamp);
    assert_ne!(&edited.compute_hash().unwrap(), hash);
}

#[tokio::test]
async fn tampered_file_hash_fails_hash_check() {
    let (aq, _) = aquafier(AquaConfig::default());
    let file = text_file("hello.txt", "hello");
    let tree = genesis(&aq, &file);
    let hash = tree.identity().unwrap().clone();

    let forged = tamper(&tree, |doc| {
        doc["revisions"][hash.as_str()]["file_hash"] = sha256_hex("goodbye").into();
    });
    let failure = aq.verify_tree(&forged, &[file]).await.unwrap_err();
    let faults = faults(&failure.error);
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].hash, hash);
    match &faults[0].error {
        AquaError::HashMismatch { expected, computed } => {
            assert_eq!(expected, &hash);
            assert_ne!(computed, &hash);
        }
        other => panic!("expected HashMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn tree_mode_leaf_tamper_is_detected() {
    let (aq, _) = aquafier(AquaConfig::tree());
    let file = text_file("data.csv", "a,b\n1,2\n");
    let tree = genesis(&aq, &file);
    let hash = tree.identity().unwrap().clone();
    assert_eq!(tree.latest().unwrap().hashing_method(), HashingMethod::Tree);
    assert!(aq.verify_tree(&tree, &[file.clone()]).await.is_ok());

    let forged = tamper(&tree, |doc| {
        doc["revisions"][hash.as_str()]["local_timestamp"] = "20240601093001".into();
    });
    let failure = aq.verify_tree(&forged, &[file]).await.unwrap_err();
    assert!(matches!(
        faults(&failure.error)[0].error,
        AquaError::HashMismatch { .. }
    ));
}

#[tokio::test]
async fn content_mismatch_with_supplied_file() {
    let (aq, _) = aquafier(AquaConfig::default());
    let tree = genesis(&aq, &text_file("hello.txt", "hello"));

    let other = text_file("hello.txt", "HELLO");
    let failure = aq.verify_tree(&tree, &[other]).await.unwrap_err();
    assert!(matches!(
        faults(&failure.error)[0].error,
        AquaError::FileHashMismatch { .. }
    ));

    let failure = aq.verify_tree(&tree, &[]).await.unwrap_err();
    assert!(matches!(
        faults(&failure.error)[0].error,
        AquaError::FileNotFound { .. }
    ));
}

#[tokio::test]
async fn content_revisions_extend_the_head() {
    let (aq, platform) = aquafier(AquaConfig::default());
    let embed = opts().embed_content(true);
    let v1 = text_file("draft.md", "# Draft");
    let tree = aq.create_genesis_revision(&v1, &embed).unwrap().into_value();

    platform.advance(30);
    let v2 = text_file("draft.md", "# Draft\n\nSecond pass");
    let tree = aq
        .create_content_revision(&tree, &v2, &embed)
        .unwrap()
        .into_value();
    platform.advance(30);
    let v3 = text_file("draft.md", "# Final");
    let tree = aq
        .create_content_revision(&tree, &v3, &embed)
        .unwrap()
        .into_value();

    assert_eq!(tree.len(), 3);
    let path = &tree.tree_mapping().paths[tree.latest_hash().unwrap()];
    assert_eq!(path.len(), 3);
    assert_eq!(&path[0], tree.identity().unwrap());

    let latest = tree.latest().unwrap();
    assert_eq!(latest.local_timestamp, "20240601093100");
    match &latest.body {
        RevisionBody::File { content, .. } => assert_eq!(content.as_deref(), Some("# Final")),
        other => panic!("expected file body, got {:?}", other),
    }

    let verified = aq.verify_tree(&tree, &[]).await.unwrap().into_value();
    assert_eq!(verified.revisions.len(), 3);
}

#[tokio::test]
async fn fork_resolves_head_to_longer_branch() {
    let (aq, _) = aquafier(AquaConfig::default());
    let embed = opts().embed_content(true);
    let tree = aq
        .create_genesis_revision(&text_file("f.txt", "v1"), &embed)
        .unwrap()
        .into_value();
    let root = tree.identity().unwrap().clone();

    let left = aq
        .create_content_revision(&tree, &text_file("f.txt", "left"), &embed)
        .unwrap()
        .into_value();
    let left_hash = left.latest_hash().unwrap().clone();

    let forked = aq
        .create_content_revision(
            &left,
            &text_file("f.txt", "right"),
            &embed.clone().parent(root.clone()),
        )
        .unwrap()
        .into_value();
    // Tie: the first-discovered branch keeps the head.
    assert_eq!(forked.latest_hash(), Some(&left_hash));
    assert_eq!(forked.tree().unwrap().children.len(), 2);

    let right_hash = forked
        .revisions()
        .keys()
        .last()
        .cloned()
        .unwrap();
    let longer = aq
        .create_content_revision(
            &forked,
            &text_file("f.txt", "right again"),
            &embed.clone().parent(right_hash.clone()),
        )
        .unwrap()
        .into_value();
    let tail = longer.latest_hash().unwrap().clone();
    assert_ne!(tail, left_hash);
    assert_eq!(longer.revision(&tail).unwrap().previous_verification_hash, right_hash);

    assert!(aq.verify_tree(&longer, &[]).await.is_ok());
}

#[tokio::test]
async fn method_override_per_revision() {
    let (aq, _) = aquafier(AquaConfig::default());
    let embed = opts().embed_content(true);
    let tree = aq
        .create_genesis_revision(&text_file("m.txt", "one"), &embed)
        .unwrap()
        .into_value();
    let tree = aq
        .create_content_revision(
            &tree,
            &text_file("m.txt", "two"),
            &embed.clone().method(HashingMethod::Tree),
        )
        .unwrap()
        .into_value();

    let methods: Vec<_> = tree
        .revisions()
        .values()
        .map(|r| r.hashing_method())
        .collect();
    assert_eq!(methods, vec![HashingMethod::Scalar, HashingMethod::Tree]);
    assert!(tree.latest().unwrap().version.as_deref().unwrap().ends_with("Method: tree"));

    let verified = aq.verify_tree(&tree, &[]).await.unwrap().into_value();
    assert_eq!(verified.revisions[1].method, HashingMethod::Tree);
}
