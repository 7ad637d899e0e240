//! End-to-end test: verification graph and batch verification.
//!
//! The graph variant nests one node per revision along the derived tree,
//! hangs linked trees under their link revision, and keeps invalid revisions
//! in place. Only structural corruption fails the whole call.

use aqua_tree::{AquaConfig, AquaError, AquaTree, FileObject, RevisionType};

use crate::common::{aquafier, faults, genesis, opts, signer_credentials, tamper, text_file};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn graph_nests_revisions_along_chain() {
    let (aq, _) = aquafier(AquaConfig::default());
    let file = text_file("plan.txt", "plan");
    let tree = genesis(&aq, &file);
    let tree = aq
        .sign_revision(&tree, "ed25519", &signer_credentials(3), &opts())
        .await
        .unwrap()
        .into_value();
    let tree = aq
        .witness_revision(&tree, "local", &Default::default(), &opts())
        .await
        .unwrap()
        .into_value();

    let graph = aq
        .verify_and_build_graph(&tree, &[file])
        .await
        .unwrap()
        .into_value();
    assert!(graph.is_valid);
    assert!(graph.failures.is_empty());
    assert_eq!(graph.latest_hash.as_ref(), tree.latest_hash());
    assert_eq!(graph.root.size(), 3);
    assert_eq!(&graph.root.hash, tree.identity().unwrap());

    let signature = &graph.root.children[0];
    assert_eq!(signature.revision_type, RevisionType::Signature);
    assert_eq!(signature.previous_hash, graph.root.hash);
    assert_eq!(signature.children[0].revision_type, RevisionType::Witness);
    assert!(signature.children[0].info.is_some());
}

#[tokio::test]
async fn graph_serializes_for_reporting() {
    let (aq, _) = aquafier(AquaConfig::default());
    let file = text_file("plan.txt", "plan");
    let tree = genesis(&aq, &file);
    let graph = aq
        .verify_and_build_graph(&tree, &[file])
        .await
        .unwrap()
        .into_value();

    let value = serde_json::to_value(&graph).unwrap();
    assert_eq!(value["isValid"], true);
    assert_eq!(value["root"]["revisionType"], "file");
    assert_eq!(value["root"]["info"]["type"], "file");
    assert!(value.get("failures").is_none());
}

#[tokio::test]
async fn graph_keeps_invalid_revision_in_place() {
    let (aq, _) = aquafier(AquaConfig::default());
    let embed = opts().embed_content(true);
    let tree = aq
        .create_genesis_revision(&text_file("r.txt", "one"), &embed)
        .unwrap()
        .into_value();
    let tree = aq
        .create_content_revision(&tree, &text_file("r.txt", "two"), &embed)
        .unwrap()
        .into_value();
    let head = tree.latest_hash().unwrap().clone();

    let forged = tamper(&tree, |doc| {
        doc["revisions"][head.as_str()]["content"] = "three".into();
    });
    let success = aq.verify_and_build_graph(&forged, &[]).await.unwrap();
    let graph = success.value;
    assert!(!graph.is_valid);
    assert_eq!(graph.failures.len(), 1);
    assert!(graph.root.is_valid);

    let bad = graph.root.find(&head).unwrap();
    assert!(!bad.is_valid);
    assert!(bad.info.is_none());
    assert!(bad.error.as_deref().unwrap().contains("hash mismatch"));
    assert!(success.logs.iter().any(|e| e.message.contains("invalid revision")));
}

#[tokio::test]
async fn graph_fails_fast_on_detached_chain() {
    let (aq, _) = aquafier(AquaConfig::default());
    let embed = opts().embed_content(true);
    let tree = aq
        .create_genesis_revision(&text_file("d.txt", "one"), &embed)
        .unwrap()
        .into_value();
    let tree = aq
        .create_content_revision(&tree, &text_file("d.txt", "two"), &embed)
        .unwrap()
        .into_value();
    let head = tree.latest_hash().unwrap().clone();

    let detached = tamper(&tree, |doc| {
        doc["revisions"][head.as_str()]["previous_verification_hash"] = "0xdeadbeef".into();
    });

    let failure = aq.verify_and_build_graph(&detached, &[]).await.unwrap_err();
    match &failure.error {
        AquaError::DetachedChain { hash, previous } => {
            assert_eq!(hash, &head);
            assert_eq!(previous.as_str(), "0xdeadbeef");
        }
        other => panic!("expected DetachedChain, got {:?}", other),
    }

    // The plain walk reports the same revision and keeps going.
    let failure = aq.verify_tree(&detached, &[]).await.unwrap_err();
    let faults = faults(&failure.error);
    assert_eq!(faults.len(), 1);
    assert!(matches!(faults[0].error, AquaError::DetachedChain { .. }));
}

#[tokio::test]
async fn both_walks_reject_a_second_genesis() {
    let (aq, _) = aquafier(AquaConfig::default());
    let file = text_file("twin.txt", "twin");
    let first = genesis(&aq, &file);
    let second = genesis(&aq, &file);
    let (second_hash, second_genesis) = second.genesis().unwrap();
    assert_ne!(first.identity(), Some(second_hash));

    let mut revisions = first.revisions().clone();
    revisions.insert(second_hash.clone(), second_genesis.clone());
    let merged = AquaTree::from_parts(revisions, first.file_index().clone());

    let failure = aq.verify_tree(&merged, &[file.clone()]).await.unwrap_err();
    let faults = faults(&failure.error);
    assert_eq!(faults.len(), 1);
    assert_eq!(&faults[0].hash, second_hash);
    assert!(matches!(faults[0].error, AquaError::InvalidRevision { .. }));

    let failure = aq.verify_and_build_graph(&merged, &[file]).await.unwrap_err();
    assert!(matches!(
        &failure.error,
        AquaError::InvalidRevision { hash, .. } if hash == second_hash
    ));
}

#[tokio::test]
async fn graph_attaches_linked_tree() {
    let (aq, _) = aquafier(AquaConfig::default());
    let a_file = text_file("a.txt", "alpha");
    let b_file = text_file("b.txt", "beta");
    let b = genesis(&aq, &b_file);
    let a = aq
        .link_revision(&genesis(&aq, &a_file), &[b.clone()], &opts())
        .unwrap()
        .into_value();
    let files = vec![a_file, b_file, FileObject::aqua_tree("b.txt", b.clone())];

    let graph = aq
        .verify_and_build_graph(&a, &files)
        .await
        .unwrap()
        .into_value();
    assert!(graph.is_valid);
    let link = &graph.root.children[0];
    assert_eq!(link.revision_type, RevisionType::Link);
    assert_eq!(link.linked_children.len(), 1);
    assert_eq!(&link.linked_children[0].hash, b.identity().unwrap());
    assert!(graph.root.find(b.identity().unwrap()).is_some());
}

#[tokio::test]
async fn graph_of_empty_tree_fails() {
    let (aq, _) = aquafier(AquaConfig::default());
    let failure = aq
        .verify_and_build_graph(&AquaTree::default(), &[])
        .await
        .unwrap_err();
    assert!(matches!(failure.error, AquaError::EmptyTree));
}

#[tokio::test]
async fn batch_results_keep_input_order() {
    let (aq, _) = aquafier(AquaConfig::default());
    let good = text_file("good.txt", "good");
    let other = text_file("other.txt", "other");
    let trees = vec![
        genesis(&aq, &good),
        AquaTree::default(),
        genesis(&aq, &other),
    ];

    let results = aq.verify_batch(&trees, &[good, other]).await;
    assert_eq!(results.len(), 3);
    assert_eq!(
        results[0].as_ref().unwrap().value.identity,
        *trees[0].identity().unwrap()
    );
    assert!(matches!(
        results[1].as_ref().unwrap_err().error,
        AquaError::EmptyTree
    ));
    assert_eq!(
        results[2].as_ref().unwrap().value.identity,
        *trees[2].identity().unwrap()
    );
}
