//! Property tests: the derived tree places every reachable revision once and
//! its head is the tail of the first longest path.

use aqua_tree::tree::{build_tree, find_longest_path};
use aqua_tree::{Revision, RevisionBody, VerificationHash};
use indexmap::IndexMap;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn node_hash(i: usize) -> VerificationHash {
    VerificationHash::new(format!("0x{:064x}", i))
}

fn revision(parent: Option<usize>, i: usize) -> Revision {
    Revision::new(
        parent.map(node_hash).unwrap_or_else(VerificationHash::none),
        "20240101000000",
        RevisionBody::File {
            file_hash: "ff".into(),
            file_nonce: format!("{:02x}", i),
            content: None,
        },
    )
}

/// Generate a parent index for every non-genesis node; node `i` picks a
/// parent among `0..i`, so insertion order is causal.
fn arb_parents(max: usize) -> impl Strategy<Value = Vec<usize>> {
    (1..max).prop_flat_map(|n| {
        (1..=n)
            .map(|i| (0..i).boxed())
            .collect::<Vec<_>>()
    })
}

fn revisions_of(parents: &[usize]) -> IndexMap<VerificationHash, Revision> {
    let mut revisions = IndexMap::new();
    revisions.insert(node_hash(0), revision(None, 0));
    for (offset, parent) in parents.iter().enumerate() {
        let i = offset + 1;
        revisions.insert(node_hash(i), revision(Some(*parent), i));
    }
    revisions
}

/// First leaf of maximal depth in depth-first order, children visited in
/// insertion order.
fn expected_head(parents: &[usize]) -> (usize, usize) {
    let n = parents.len() + 1;
    let mut children = vec![Vec::new(); n];
    for (offset, parent) in parents.iter().enumerate() {
        children[*parent].push(offset + 1);
    }
    let mut best = (0usize, 0usize);
    let mut stack = vec![(0usize, 1usize)];
    while let Some((node, depth)) = stack.pop() {
        if children[node].is_empty() {
            if depth > best.1 {
                best = (node, depth);
            }
        } else {
            for child in children[node].iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn linear_chain_head_is_tail() {
    let revisions = revisions_of(&[0, 1]);
    let mapping = find_longest_path(&build_tree(&revisions).unwrap());
    assert_eq!(mapping.latest_hash, node_hash(2));
    assert_eq!(
        mapping.paths[&node_hash(2)],
        vec![node_hash(0), node_hash(1), node_hash(2)]
    );
}

#[test]
fn fork_prefers_longer_branch_then_first_on_tie() {
    // 0 -> 1, 0 -> 2 -> 3
    let revisions = revisions_of(&[0, 0, 2]);
    let mapping = find_longest_path(&build_tree(&revisions).unwrap());
    assert_eq!(mapping.latest_hash, node_hash(3));

    // 0 -> 1, 0 -> 2
    let revisions = revisions_of(&[0, 0]);
    let mapping = find_longest_path(&build_tree(&revisions).unwrap());
    assert_eq!(mapping.latest_hash, node_hash(1));
    assert_eq!(mapping.paths.len(), 2);
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Every revision of a causally ordered map is placed exactly once.
    #[test]
    fn every_revision_is_placed(parents in arb_parents(24)) {
        let revisions = revisions_of(&parents);
        let root = build_tree(&revisions).unwrap();
        prop_assert_eq!(root.size(), revisions.len());
        prop_assert_eq!(&root.hash, &node_hash(0));
    }

    /// The head is the first deepest leaf, and its path runs root to head.
    #[test]
    fn head_is_first_deepest_leaf(parents in arb_parents(24)) {
        let revisions = revisions_of(&parents);
        let mapping = find_longest_path(&build_tree(&revisions).unwrap());
        let (head, depth) = expected_head(&parents);

        prop_assert_eq!(&mapping.latest_hash, &node_hash(head));
        let path = &mapping.paths[&mapping.latest_hash];
        prop_assert_eq!(path.len(), depth);
        prop_assert_eq!(&path[0], &node_hash(0));
        for pair in path.windows(2) {
            prop_assert_eq!(&revisions[&pair[1]].previous_verification_hash, &pair[0]);
        }
    }

    /// One path per leaf.
    #[test]
    fn paths_cover_every_leaf(parents in arb_parents(24)) {
        let revisions = revisions_of(&parents);
        let mapping = find_longest_path(&build_tree(&revisions).unwrap());
        let leaf_count = (0..revisions.len())
            .filter(|i| !parents.contains(i))
            .count();
        prop_assert_eq!(mapping.paths.len(), leaf_count);
    }
}
