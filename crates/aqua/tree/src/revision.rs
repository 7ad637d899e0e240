use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::AquaError;
use crate::form;
use crate::hashing;
use crate::types::{HashingMethod, RevisionType, VerificationHash};

/// One immutable step in an Aqua chain.
///
/// Serialized flat: the common fields, the `revision_type` tag and the
/// type-specific fields all live at the same JSON level. The revision's
/// verification hash is derived from that flat object minus `leaves`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub previous_verification_hash: VerificationHash,
    pub local_timestamp: String,
    #[serde(flatten)]
    pub body: RevisionBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaves: Option<Vec<String>>,
}

/// Type-specific fields, tagged by `revision_type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "revision_type", rename_all = "snake_case")]
pub enum RevisionBody {
    File {
        file_hash: String,
        file_nonce: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Form {
        file_hash: String,
        file_nonce: String,
        /// `forms_<key>` entries, including redacted `forms_<key>.deleted`.
        #[serde(flatten)]
        fields: BTreeMap<String, Value>,
    },
    Signature {
        signature: String,
        signature_public_key: String,
        signature_wallet_address: String,
        signature_type: String,
    },
    Witness {
        witness_merkle_root: String,
        witness_timestamp: i64,
        witness_network: String,
        witness_smart_contract_address: String,
        witness_transaction_hash: String,
        witness_sender_account_address: String,
        witness_merkle_proof: Vec<String>,
    },
    Link {
        link_type: String,
        link_require_indepth_verification: bool,
        link_verification_hashes: Vec<VerificationHash>,
        link_file_hashes: Vec<String>,
    },
}

impl RevisionBody {
    pub fn revision_type(&self) -> RevisionType {
        match self {
            Self::File { .. } => RevisionType::File,
            Self::Form { .. } => RevisionType::Form,
            Self::Signature { .. } => RevisionType::Signature,
            Self::Witness { .. } => RevisionType::Witness,
            Self::Link { .. } => RevisionType::Link,
        }
    }

    /// Hash of the file content this revision notarizes, if any.
    pub fn file_hash(&self) -> Option<&str> {
        match self {
            Self::File { file_hash, .. } | Self::Form { file_hash, .. } => Some(file_hash),
            _ => None,
        }
    }
}

impl Revision {
    pub fn new(
        previous_verification_hash: VerificationHash,
        local_timestamp: impl Into<String>,
        body: RevisionBody,
    ) -> Self {
        Self {
            previous_verification_hash,
            local_timestamp: local_timestamp.into(),
            body,
            version: None,
            leaves: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn revision_type(&self) -> RevisionType {
        self.body.revision_type()
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_verification_hash.is_empty()
    }

    /// Method inferred from storage: `leaves` present means tree mode.
    pub fn hashing_method(&self) -> HashingMethod {
        if self.leaves.is_some() {
            HashingMethod::Tree
        } else {
            HashingMethod::Scalar
        }
    }

    /// Method named by the `version` tag, if the revision carries one.
    pub fn declared_method(&self) -> Option<HashingMethod> {
        self.version
            .as_deref()
            .and_then(HashingMethod::from_version_tag)
    }

    /// `true` when a form revision has at least one hidden field.
    pub fn has_redacted_fields(&self) -> bool {
        match &self.body {
            RevisionBody::Form { fields, .. } => fields.keys().any(|k| form::is_redacted(k)),
            _ => false,
        }
    }

    /// Every own field except `leaves`, sorted by name.
    pub fn fields(&self) -> Result<BTreeMap<String, Value>, AquaError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map.into_iter().filter(|(k, _)| k != "leaves").collect()),
            _ => Err(AquaError::Serialization(
                "revision did not serialize to an object".into(),
            )),
        }
    }

    /// Leaf hashes of the current field values.
    pub fn compute_leaves(&self) -> Result<Vec<String>, AquaError> {
        Ok(hashing::derive_leaves(&self.fields()?))
    }

    /// Recompute the verification hash using the inferred method.
    pub fn compute_hash(&self) -> Result<VerificationHash, AquaError> {
        match self.hashing_method() {
            HashingMethod::Scalar => Ok(hashing::scalar_hash(&self.fields()?)),
            HashingMethod::Tree => {
                let leaves = self.compute_leaves()?;
                hashing::merkle_root(&leaves)
                    .map(VerificationHash::new)
                    .ok_or_else(|| AquaError::InvalidRevision {
                        hash: VerificationHash::none(),
                        reason: "revision has no fields to hash".into(),
                    })
            }
        }
    }

    /// Root over the stored `leaves`, ignoring current field values.
    ///
    /// Redacted revisions keep their identity through this root.
    pub fn stored_root(&self) -> Option<VerificationHash> {
        self.leaves
            .as_deref()
            .and_then(hashing::merkle_root)
            .map(VerificationHash::new)
    }

    /// Finalize a freshly built revision: attach `leaves` in tree mode and
    /// return the verification hash it will be keyed under.
    pub fn seal(mut self, method: HashingMethod) -> Result<(VerificationHash, Self), AquaError> {
        self.leaves = None;
        if method == HashingMethod::Tree {
            self.leaves = Some(self.compute_leaves()?);
        }
        let hash = self.compute_hash()?;
        Ok((hash, self))
    }
}

/// The exact text a signer signs for a revision whose parent is `hash`.
pub fn signing_message(hash: &VerificationHash) -> String {
    format!("I sign this revision: [{}]", hash)
}

/// Version tag carried by newly created revisions.
pub fn version_tag(prefix: &str, method: HashingMethod) -> String {
    format!("{} | SHA256 | Method: {}", prefix, method)
}
