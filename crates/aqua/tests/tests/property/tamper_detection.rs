//! Property tests: any genesis verifies against its own file, and editing
//! any single hashed field of the stored revision breaks the hash check.

use aqua_tree::{AquaConfig, AquaError, HashingMethod};
use proptest::prelude::*;

use crate::common::{aquafier, faults, genesis, tamper, text_file};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn arb_method() -> impl Strategy<Value = HashingMethod> {
    prop_oneof![Just(HashingMethod::Scalar), Just(HashingMethod::Tree)]
}

/// Fields of a file revision that feed its verification hash.
fn arb_hashed_field() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("file_hash"),
        Just("file_nonce"),
        Just("local_timestamp"),
        Just("previous_verification_hash"),
        Just("version"),
    ]
}

fn config_for(method: HashingMethod) -> AquaConfig {
    AquaConfig {
        default_method: method,
        ..AquaConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Building a genesis and verifying it against the same file succeeds.
    #[test]
    fn genesis_round_trip(content in "[ -~]{0,200}", method in arb_method()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (aq, _) = aquafier(config_for(method));
            let file = text_file("doc.txt", content.as_str());
            let tree = genesis(&aq, &file);
            prop_assert_eq!(tree.latest().unwrap().hashing_method(), method);
            prop_assert!(aq.verify_tree(&tree, &[file]).await.is_ok());
            Ok(())
        })?;
    }

    /// A one-character edit to any hashed field is a hash mismatch.
    #[test]
    fn single_field_edit_is_detected(
        content in "[a-z]{1,40}",
        method in arb_method(),
        field in arb_hashed_field(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (aq, _) = aquafier(config_for(method));
            let file = text_file("doc.txt", content.as_str());
            let tree = genesis(&aq, &file);
            let hash = tree.identity().unwrap().clone();

            let forged = tamper(&tree, |doc| {
                let slot = &mut doc["revisions"][hash.as_str()][field];
                let mut text = slot.as_str().unwrap_or_default().to_string();
                text.push('0');
                *slot = text.into();
            });

            if field == "previous_verification_hash" {
                // The genesis now points outside the tree.
                prop_assert!(forged.identity().is_none());
                prop_assert!(aq.verify_tree(&forged, &[file]).await.is_err());
                return Ok(());
            }

            let failure = aq.verify_tree(&forged, &[file]).await.unwrap_err();
            let faults = faults(&failure.error);
            prop_assert_eq!(faults.len(), 1);
            prop_assert!(
                matches!(faults[0].error, AquaError::HashMismatch { .. }),
                "unexpected {:?}",
                faults[0].error
            );
            Ok(())
        })?;
    }
}
