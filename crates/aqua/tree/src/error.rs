use std::fmt;

use crate::log::LogEntry;
use crate::types::VerificationHash;

/// Errors from building and verifying Aqua trees.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AquaError {
    // ── Structural ──────────────────────────────────────────────────
    #[error("aqua tree has no revisions")]
    EmptyTree,
    #[error("no genesis revision (empty previous_verification_hash) found")]
    MissingGenesis,
    #[error("revision not found: {0}")]
    RevisionNotFound(VerificationHash),
    #[error("revision {hash} is missing mandatory field `{field}`")]
    MissingField {
        hash: VerificationHash,
        field: String,
    },
    #[error("detached chain: revision {hash} references unplaced parent {previous}")]
    DetachedChain {
        hash: VerificationHash,
        previous: VerificationHash,
    },
    #[error("revision {hash} declares method {declared} but is stored as {inferred}")]
    MethodMismatch {
        hash: VerificationHash,
        declared: String,
        inferred: String,
    },
    #[error("invalid revision {hash}: {reason}")]
    InvalidRevision {
        hash: VerificationHash,
        reason: String,
    },
    #[error("invalid form data: {0}")]
    InvalidForm(String),

    // ── Hash mismatch ───────────────────────────────────────────────
    #[error("verification hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch {
        expected: VerificationHash,
        computed: VerificationHash,
    },
    #[error("file hash mismatch on {hash}: expected {expected}, computed {computed}")]
    FileHashMismatch {
        hash: VerificationHash,
        expected: String,
        computed: String,
    },
    #[error("form field `{field}` on {hash} does not match its leaf: expected {expected}, computed {computed}")]
    FormLeafMismatch {
        hash: VerificationHash,
        field: String,
        expected: String,
        computed: String,
    },
    #[error("witness merkle proof on {hash} does not reproduce root: expected {expected}, computed {computed}")]
    WitnessProofMismatch {
        hash: VerificationHash,
        expected: String,
        computed: String,
    },

    // ── Rejected by a backend ───────────────────────────────────────
    #[error("signature on {hash} is invalid")]
    InvalidSignature { hash: VerificationHash },
    #[error("witness on {hash} was not confirmed by network {network}")]
    WitnessNotConfirmed {
        hash: VerificationHash,
        network: String,
    },

    // ── External dependency ─────────────────────────────────────────
    #[error("no connectivity: {0}")]
    Connectivity(String),
    #[error("unsupported signature type: {0}")]
    UnsupportedSignatureType(String),
    #[error("unsupported witness network: {0}")]
    UnsupportedWitnessNetwork(String),
    #[error("backend error: {0}")]
    Backend(String),

    // ── Redaction ───────────────────────────────────────────────────
    #[error("redaction error on {hash}: {reason}")]
    Redaction {
        hash: VerificationHash,
        reason: String,
    },

    // ── Links ───────────────────────────────────────────────────────
    #[error("self-interlink refused: tree already contains file hash {0}")]
    SelfLink(String),
    #[error("linked tree for {0} could not be resolved")]
    LinkedTreeNotFound(VerificationHash),
    #[error("link cycle detected at tree {0}")]
    LinkCycle(VerificationHash),
    #[error("link recursion deeper than {0} levels")]
    LinkDepthExceeded(usize),
    #[error("linked tree at {hash} failed verification: {source}")]
    LinkedTreeInvalid {
        hash: VerificationHash,
        source: Box<AquaError>,
    },

    // ── I/O and encoding ────────────────────────────────────────────
    #[error("file content for {hash} not found: {file_name}")]
    FileNotFound {
        hash: VerificationHash,
        file_name: String,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(String),

    // ── Aggregate ───────────────────────────────────────────────────
    #[error("verification failed for {} revision(s)", .failures.len())]
    Verification { failures: Vec<RevisionFault> },
}

/// Coarse classification of an [`AquaError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Structural,
    HashMismatch,
    Rejected,
    External,
    Redaction,
    Link,
    Io,
}

impl AquaError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyTree
            | Self::MissingGenesis
            | Self::RevisionNotFound(_)
            | Self::MissingField { .. }
            | Self::DetachedChain { .. }
            | Self::MethodMismatch { .. }
            | Self::InvalidRevision { .. }
            | Self::InvalidForm(_) => ErrorCategory::Structural,
            Self::HashMismatch { .. }
            | Self::FileHashMismatch { .. }
            | Self::FormLeafMismatch { .. }
            | Self::WitnessProofMismatch { .. } => ErrorCategory::HashMismatch,
            Self::InvalidSignature { .. } | Self::WitnessNotConfirmed { .. } => {
                ErrorCategory::Rejected
            }
            Self::Connectivity(_)
            | Self::UnsupportedSignatureType(_)
            | Self::UnsupportedWitnessNetwork(_)
            | Self::Backend(_) => ErrorCategory::External,
            Self::Redaction { .. } => ErrorCategory::Redaction,
            Self::SelfLink(_)
            | Self::LinkedTreeNotFound(_)
            | Self::LinkCycle(_)
            | Self::LinkDepthExceeded(_)
            | Self::LinkedTreeInvalid { .. } => ErrorCategory::Link,
            Self::FileNotFound { .. } | Self::Serialization(_) | Self::Io(_) => ErrorCategory::Io,
            Self::Verification { failures } => failures
                .first()
                .map(|f| f.error.category())
                .unwrap_or(ErrorCategory::Structural),
        }
    }

    /// `true` when the failure may clear up on retry (connectivity, backend
    /// availability). Results failing only for transient reasons must not be
    /// cached as permanently invalid.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Verification { failures } => {
                !failures.is_empty() && failures.iter().all(|f| f.error.is_transient())
            }
            Self::LinkedTreeInvalid { source, .. } => source.is_transient(),
            other => other.category() == ErrorCategory::External,
        }
    }
}

impl From<serde_json::Error> for AquaError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for AquaError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// One failed revision inside an aggregated verification error.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionFault {
    pub hash: VerificationHash,
    pub error: AquaError,
}

impl fmt::Display for RevisionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.hash, self.error)
    }
}

/// Successful outcome plus the diagnostics produced on the way.
#[derive(Debug, Clone)]
pub struct Success<T> {
    pub value: T,
    pub logs: Vec<LogEntry>,
}

impl<T> Success<T> {
    pub fn new(value: T, logs: Vec<LogEntry>) -> Self {
        Self { value, logs }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Success<U> {
        Success {
            value: f(self.value),
            logs: self.logs,
        }
    }
}

/// Failed outcome: the error plus every diagnostic logged before it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct Failure {
    #[source]
    pub error: AquaError,
    pub logs: Vec<LogEntry>,
}

impl Failure {
    pub fn new(error: AquaError, logs: Vec<LogEntry>) -> Self {
        Self { error, logs }
    }

    pub fn is_transient(&self) -> bool {
        self.error.is_transient()
    }

    pub fn category(&self) -> ErrorCategory {
        self.error.category()
    }
}

impl From<AquaError> for Failure {
    fn from(error: AquaError) -> Self {
        Self {
            error,
            logs: Vec::new(),
        }
    }
}

/// Tagged result returned across the public API.
pub type AquaResult<T> = Result<Success<T>, Failure>;
