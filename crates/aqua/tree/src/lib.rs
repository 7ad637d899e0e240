#![deny(unsafe_code)]
//! # aqua-tree
//!
//! Aqua Tree: a content-addressed, append-only revision chain used to
//! notarize, sign, witness and link files and structured forms, and to
//! re-verify that history independently.
//!
//! ## Architecture
//!
//! ```text
//! FileObject ──► Aquafier (builders) ──► Revision ──► seal ──► AquaTree
//!                                          │           │          │
//!                              Signer / Witness   leaves + root   tree + treeMapping
//!
//! AquaTree + FileObjects ──► verify ──► hash check ──► type check ──► linked trees
//! ```
//!
//! Every revision is keyed by its verification hash:
//! - scalar mode: `"0x" + sha256(canonical_json(fields))`
//! - tree mode: Merkle root over `sha256("<field>:<value>")` leaves in sorted
//!   field order, the unpaired node of a level promoted, never duplicated
//!
//! The method is inferred from the presence of `leaves`.
//!
//! ## Key Types
//!
//! - [`AquaTree`]: revisions, file index, derived tree and head
//! - [`Revision`] / [`RevisionBody`]: one step, tagged by revision type
//! - [`Aquafier`]: engine handle for builders, verification, persistence
//! - [`Signer`] / [`Witness`]: external backends behind registries
//! - [`PlatformServices`]: injected clock, connectivity and file access
//! - [`AquaError`] / [`AquaResult`]: categorized errors with diagnostic logs

pub mod aquafier;
pub mod config;
pub mod error;
pub mod form;
pub mod hashing;
pub mod log;
pub mod platform;
pub mod revision;
pub mod signer;
pub mod timestamp;
pub mod tree;
pub mod types;
pub mod verify;
pub mod witness;

// Re-export primary types.
pub use aquafier::{Aquafier, AquafierBuilder, RevisionOptions};
pub use config::AquaConfig;
pub use error::{AquaError, AquaResult, ErrorCategory, Failure, RevisionFault, Success};
pub use log::{LogBook, LogEntry, LogLevel};
pub use platform::{InMemoryPlatform, NativePlatform, PlatformServices};
pub use revision::{signing_message, Revision, RevisionBody};
pub use signer::{Ed25519Signer, SignatureMaterial, Signer, SignerRegistry, ED25519_SECRET_KEY};
pub use tree::{AquaTree, RevisionTree, TreeMapping};
pub use types::{
    aqua_file_name, Credentials, FileContent, FileObject, HashingMethod, RevisionType,
    VerificationHash,
};
pub use verify::{
    GraphNode, RevisionInfo, RevisionReport, TreeVerification, VerificationGraph,
};
pub use witness::{InMemoryWitness, Witness, WitnessReceipt, WitnessRegistry};
