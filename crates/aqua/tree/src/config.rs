use serde::{Deserialize, Serialize};

use crate::error::AquaError;
use crate::types::HashingMethod;

pub const DEFAULT_VERSION_PREFIX: &str = "https://aqua-protocol.org/docs/v3/schema_2";

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AquaConfig {
    /// Hashing method for new revisions when the caller does not pick one.
    pub default_method: HashingMethod,
    /// Embed file text in genesis/content revisions.
    pub embed_content: bool,
    /// Maximum link recursion depth.
    pub max_link_depth: usize,
    /// Fall back to scanning every supplied file when a linked tree is not
    /// found under its `<file>.aqua.json` name.
    pub deep_link_scan: bool,
    /// Recompute batch witness Merkle proofs.
    pub verify_witness_proofs: bool,
    /// Treat a `version` tag that disagrees with the inferred method as a
    /// structural error instead of a warning.
    pub fail_on_method_mismatch: bool,
    pub version_prefix: String,
}

impl Default for AquaConfig {
    fn default() -> Self {
        Self {
            default_method: HashingMethod::Scalar,
            embed_content: false,
            max_link_depth: 32,
            deep_link_scan: true,
            verify_witness_proofs: true,
            fail_on_method_mismatch: false,
            version_prefix: DEFAULT_VERSION_PREFIX.to_string(),
        }
    }
}

impl AquaConfig {
    /// Merkle-tree hashing by default, so form fields can be redacted.
    pub fn tree() -> Self {
        Self {
            default_method: HashingMethod::Tree,
            ..Self::default()
        }
    }

    /// Strict verification: method mismatches fail, no deep link scan,
    /// shallow link recursion.
    pub fn strict() -> Self {
        Self {
            max_link_depth: 8,
            deep_link_scan: false,
            fail_on_method_mismatch: true,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, AquaError> {
        Ok(serde_json::from_str(json)?)
    }
}
