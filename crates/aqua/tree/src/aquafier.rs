use futures::future::join_all;
use rand::Rng;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AquaConfig;
use crate::error::{AquaError, AquaResult, Failure, Success};
use crate::form;
use crate::hashing;
use crate::log::LogBook;
use crate::platform::{NativePlatform, PlatformServices};
use crate::revision::{version_tag, Revision, RevisionBody};
use crate::signer::{Signer, SignerRegistry};
use crate::timestamp;
use crate::tree::AquaTree;
use crate::types::{
    aqua_file_name, Credentials, FileContent, FileObject, HashingMethod, VerificationHash,
};
use crate::verify::graph::build_graph_inner;
use crate::verify::{verify_tree_inner, LinkScope, TreeVerification, VerificationGraph, VerifyContext};
use crate::witness::{InMemoryWitness, Witness, WitnessRegistry};

/// Per-call overrides for revision builders.
#[derive(Clone, Debug, Default)]
pub struct RevisionOptions {
    /// Hashing method; the configured default when unset.
    pub method: Option<HashingMethod>,
    /// Embed text content in file revisions; the configured default when unset.
    pub embed_content: Option<bool>,
    /// Revision to extend; the tree's latest hash when unset.
    pub parent: Option<VerificationHash>,
}

impl RevisionOptions {
    pub fn method(mut self, method: HashingMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn embed_content(mut self, embed: bool) -> Self {
        self.embed_content = Some(embed);
        self
    }

    pub fn parent(mut self, parent: VerificationHash) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// Engine handle: builds revisions and verifies trees.
///
/// Builders never mutate the tree they are given; they return a new tree
/// with exactly one revision appended (or changed, for redaction).
pub struct Aquafier {
    config: AquaConfig,
    signers: SignerRegistry,
    witnesses: WitnessRegistry,
    platform: Arc<dyn PlatformServices>,
}

/// Builder for [`Aquafier`].
pub struct AquafierBuilder {
    config: AquaConfig,
    signers: SignerRegistry,
    witnesses: WitnessRegistry,
    platform: Option<Arc<dyn PlatformServices>>,
}

impl AquafierBuilder {
    fn new() -> Self {
        let mut witnesses = WitnessRegistry::new();
        witnesses.register(Arc::new(InMemoryWitness::new()));
        Self {
            config: AquaConfig::default(),
            signers: SignerRegistry::with_defaults(),
            witnesses,
            platform: None,
        }
    }

    pub fn config(mut self, config: AquaConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a signer, replacing any with the same signature type.
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signers.register(signer);
        self
    }

    /// Register a witness backend, replacing any on the same network.
    pub fn witness(mut self, witness: Arc<dyn Witness>) -> Self {
        self.witnesses.register(witness);
        self
    }

    pub fn platform(mut self, platform: Arc<dyn PlatformServices>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn build(self) -> Aquafier {
        Aquafier {
            config: self.config,
            signers: self.signers,
            witnesses: self.witnesses,
            platform: self
                .platform
                .unwrap_or_else(|| Arc::new(NativePlatform::new())),
        }
    }
}

impl Default for Aquafier {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn finish<T>(mut book: LogBook, result: Result<T, AquaError>) -> AquaResult<T> {
    match result {
        Ok(value) => Ok(Success::new(value, book.into_entries())),
        Err(error) => {
            book.error(error.to_string());
            Err(Failure::new(error, book.into_entries()))
        }
    }
}

fn new_nonce() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

impl Aquafier {
    pub fn builder() -> AquafierBuilder {
        AquafierBuilder::new()
    }

    pub fn config(&self) -> &AquaConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<dyn PlatformServices> {
        &self.platform
    }

    fn context(&self) -> VerifyContext<'_> {
        VerifyContext {
            config: &self.config,
            signers: &self.signers,
            witnesses: &self.witnesses,
            platform: self.platform.as_ref(),
        }
    }

    fn method(&self, options: &RevisionOptions) -> HashingMethod {
        options.method.unwrap_or(self.config.default_method)
    }

    fn now(&self) -> String {
        timestamp::format_timestamp(self.platform.now())
    }

    fn resolve_parent(
        tree: &AquaTree,
        options: &RevisionOptions,
    ) -> Result<VerificationHash, AquaError> {
        match &options.parent {
            Some(parent) if tree.contains(parent) => Ok(parent.clone()),
            Some(parent) => Err(AquaError::RevisionNotFound(parent.clone())),
            None => tree.latest_hash().cloned().ok_or(AquaError::EmptyTree),
        }
    }

    /// Seal `revision` and append it to a copy of `tree`.
    fn append(
        &self,
        tree: &AquaTree,
        revision: Revision,
        method: HashingMethod,
        book: &mut LogBook,
    ) -> Result<(VerificationHash, AquaTree), AquaError> {
        let revision_type = revision.revision_type();
        let (hash, revision) = revision
            .with_version(version_tag(&self.config.version_prefix, method))
            .seal(method)?;
        if tree.contains(&hash) {
            return Err(AquaError::InvalidRevision {
                hash,
                reason: "revision already present in tree".into(),
            });
        }
        let next = tree.with_revision(hash.clone(), revision);
        info!(hash = %hash, revision_type = %revision_type, method = %method, "Appended revision");
        book.success(format!("Appended {} revision {}", revision_type, hash));
        Ok((hash, next))
    }

    // ── File revisions ─────────────────────────────────────────────

    fn file_body(&self, file: &FileObject, options: &RevisionOptions) -> RevisionBody {
        let bytes = file.file_content.to_bytes();
        let embed = options.embed_content.unwrap_or(self.config.embed_content);
        let content = if embed {
            match &file.file_content {
                FileContent::Text(text) => Some(text.clone()),
                _ => std::str::from_utf8(&bytes).ok().map(str::to_string),
            }
        } else {
            None
        };
        RevisionBody::File {
            file_hash: hashing::sha256_hex(&bytes),
            file_nonce: new_nonce(),
            content,
        }
    }

    /// Start a new tree notarizing `file`.
    pub fn create_genesis_revision(
        &self,
        file: &FileObject,
        options: &RevisionOptions,
    ) -> AquaResult<AquaTree> {
        let mut book = LogBook::new();
        let result = (|| -> Result<_, AquaError> {
            let method = self.method(options);
            let revision = Revision::new(
                VerificationHash::none(),
                self.now(),
                self.file_body(file, options),
            );
            let (hash, mut tree) = self.append(&AquaTree::default(), revision, method, &mut book)?;
            tree.index_file(hash, file.file_name.clone());
            Ok(tree)
        })();
        finish(book, result)
    }

    /// Record a new version of the file's content.
    pub fn create_content_revision(
        &self,
        tree: &AquaTree,
        file: &FileObject,
        options: &RevisionOptions,
    ) -> AquaResult<AquaTree> {
        let mut book = LogBook::new();
        let result = (|| -> Result<_, AquaError> {
            let parent = Self::resolve_parent(tree, options)?;
            let revision = Revision::new(parent, self.now(), self.file_body(file, options));
            let (hash, mut next) = self.append(tree, revision, self.method(options), &mut book)?;
            next.index_file(hash, file.file_name.clone());
            Ok(next)
        })();
        finish(book, result)
    }

    // ── Forms ──────────────────────────────────────────────────────

    /// Append a form revision built from a JSON object file. Without a tree,
    /// the form becomes the genesis of a new one.
    pub fn create_form_revision(
        &self,
        tree: Option<&AquaTree>,
        file: &FileObject,
        options: &RevisionOptions,
    ) -> AquaResult<AquaTree> {
        let mut book = LogBook::new();
        let result = (|| -> Result<_, AquaError> {
            let bytes = file.file_content.to_bytes();
            let fields = form::parse_form(&bytes)?;
            book.info(format!("Parsed {} form fields from {}", fields.len(), file.file_name));
            let body = RevisionBody::Form {
                file_hash: hashing::sha256_hex(&bytes),
                file_nonce: new_nonce(),
                fields,
            };
            let method = self.method(options);
            match tree {
                Some(tree) => {
                    let parent = Self::resolve_parent(tree, options)?;
                    let revision = Revision::new(parent, self.now(), body);
                    let (_, next) = self.append(tree, revision, method, &mut book)?;
                    Ok(next)
                }
                None => {
                    let revision = Revision::new(VerificationHash::none(), self.now(), body);
                    let (hash, mut next) =
                        self.append(&AquaTree::default(), revision, method, &mut book)?;
                    next.index_file(hash, file.file_name.clone());
                    Ok(next)
                }
            }
        })();
        finish(book, result)
    }

    fn redactable(tree: &AquaTree, hash: &VerificationHash) -> Result<Revision, AquaError> {
        let revision = tree
            .revision(hash)
            .ok_or_else(|| AquaError::RevisionNotFound(hash.clone()))?;
        if !matches!(revision.body, RevisionBody::Form { .. }) {
            return Err(AquaError::Redaction {
                hash: hash.clone(),
                reason: format!("{} revisions have no form fields", revision.revision_type()),
            });
        }
        if revision.leaves.is_none() {
            return Err(AquaError::Redaction {
                hash: hash.clone(),
                reason: "scalar-mode revisions cannot be redacted".into(),
            });
        }
        Ok(revision.clone())
    }

    /// Hide form field `key` (`x` or `forms_x`) of revision `hash`. The
    /// revision keeps its verification hash.
    pub fn hide_form_field(
        &self,
        tree: &AquaTree,
        hash: &VerificationHash,
        key: &str,
    ) -> AquaResult<AquaTree> {
        let mut book = LogBook::new();
        let result = (|| -> Result<_, AquaError> {
            let mut revision = Self::redactable(tree, hash)?;
            if let RevisionBody::Form { fields, .. } = &mut revision.body {
                form::hide_field(hash, fields, key)?;
            }
            let mut next = tree.clone();
            next.replace_revision(hash, revision)?;
            info!(hash = %hash, field = %form::form_key(key), "Redacted form field");
            book.success(format!("Hid field {} on {}", form::form_key(key), hash));
            Ok(next)
        })();
        finish(book, result)
    }

    /// Restore a hidden form field. `value` must be the original value.
    pub fn unhide_form_field(
        &self,
        tree: &AquaTree,
        hash: &VerificationHash,
        key: &str,
        value: Value,
    ) -> AquaResult<AquaTree> {
        let mut book = LogBook::new();
        let result = (|| -> Result<_, AquaError> {
            let mut revision = Self::redactable(tree, hash)?;
            let leaves = revision.leaves.clone().unwrap_or_default();
            if let RevisionBody::Form { fields, .. } = &mut revision.body {
                form::unhide_field(hash, fields, &leaves, key, value)?;
            }
            let mut next = tree.clone();
            next.replace_revision(hash, revision)?;
            info!(hash = %hash, field = %form::form_key(key), "Restored form field");
            book.success(format!("Restored field {} on {}", form::form_key(key), hash));
            Ok(next)
        })();
        finish(book, result)
    }

    // ── Signatures and witnesses ───────────────────────────────────

    /// Sign the tree's latest revision (or `options.parent`).
    pub async fn sign_revision(
        &self,
        tree: &AquaTree,
        signature_type: &str,
        credentials: &Credentials,
        options: &RevisionOptions,
    ) -> AquaResult<AquaTree> {
        let mut book = LogBook::new();
        let result = async {
            let parent = Self::resolve_parent(tree, options)?;
            let signer = self.signers.get(signature_type)?;
            let material = signer.sign(&parent, credentials).await?;
            debug!(wallet = %material.wallet_address, target = %parent, "Signed revision");
            let revision = Revision::new(
                parent,
                self.now(),
                RevisionBody::Signature {
                    signature: material.signature,
                    signature_public_key: material.public_key,
                    signature_wallet_address: material.wallet_address,
                    signature_type: material.signature_type,
                },
            );
            let (_, next) = self.append(tree, revision, self.method(options), &mut book)?;
            Ok::<_, AquaError>(next)
        }
        .await;
        finish(book, result)
    }

    fn witness_backend(&self, network: &str) -> Result<Arc<dyn Witness>, AquaError> {
        let backend = self.witnesses.get(network)?;
        if backend.requires_network() && !self.platform.is_online() {
            return Err(AquaError::Connectivity(format!(
                "witness network {} needs connectivity",
                network
            )));
        }
        Ok(backend)
    }

    /// Anchor the tree's latest hash with the `network` witness.
    pub async fn witness_revision(
        &self,
        tree: &AquaTree,
        network: &str,
        credentials: &Credentials,
        options: &RevisionOptions,
    ) -> AquaResult<AquaTree> {
        let mut book = LogBook::new();
        let result = async {
            let parent = Self::resolve_parent(tree, options)?;
            let backend = self.witness_backend(network)?;
            let receipt = backend.witness(parent.as_str(), credentials).await?;
            book.info(format!(
                "Anchored {} on {} in {}",
                parent, network, receipt.transaction_hash
            ));
            let revision = Revision::new(
                parent.clone(),
                self.now(),
                RevisionBody::Witness {
                    witness_merkle_root: parent.to_string(),
                    witness_timestamp: receipt.timestamp,
                    witness_network: network.to_string(),
                    witness_smart_contract_address: receipt.smart_contract_address,
                    witness_transaction_hash: receipt.transaction_hash,
                    witness_sender_account_address: receipt.sender_account_address,
                    witness_merkle_proof: vec![parent.to_string()],
                },
            );
            let (_, next) = self.append(tree, revision, self.method(options), &mut book)?;
            Ok::<_, AquaError>(next)
        }
        .await;
        finish(book, result)
    }

    /// Anchor the Merkle root of several trees' latest hashes once, then
    /// append a witness revision to each tree in order.
    pub async fn witness_multiple_trees(
        &self,
        trees: &[AquaTree],
        network: &str,
        credentials: &Credentials,
        options: &RevisionOptions,
    ) -> AquaResult<Vec<AquaTree>> {
        let mut book = LogBook::new();
        let result = async {
            let proof: Vec<String> = trees
                .iter()
                .map(|t| t.latest_hash().map(|h| h.to_string()).ok_or(AquaError::EmptyTree))
                .collect::<Result<_, _>>()?;
            let root = hashing::merkle_root(&proof).ok_or(AquaError::EmptyTree)?;
            let backend = self.witness_backend(network)?;
            let receipt = backend.witness(&root, credentials).await?;
            book.info(format!(
                "Anchored batch root {} for {} trees in {}",
                root,
                trees.len(),
                receipt.transaction_hash
            ));

            let mut witnessed = Vec::with_capacity(trees.len());
            for (tree, latest) in trees.iter().zip(&proof) {
                let revision = Revision::new(
                    VerificationHash::new(latest.clone()),
                    self.now(),
                    RevisionBody::Witness {
                        witness_merkle_root: root.clone(),
                        witness_timestamp: receipt.timestamp,
                        witness_network: network.to_string(),
                        witness_smart_contract_address: receipt.smart_contract_address.clone(),
                        witness_transaction_hash: receipt.transaction_hash.clone(),
                        witness_sender_account_address: receipt.sender_account_address.clone(),
                        witness_merkle_proof: proof.clone(),
                    },
                );
                let (_, next) = self.append(tree, revision, self.method(options), &mut book)?;
                witnessed.push(next);
            }
            Ok::<_, AquaError>(witnessed)
        }
        .await;
        finish(book, result)
    }

    // ── Links ──────────────────────────────────────────────────────

    /// Link `tree` to one or more other trees.
    pub fn link_revision(
        &self,
        tree: &AquaTree,
        targets: &[AquaTree],
        options: &RevisionOptions,
    ) -> AquaResult<AquaTree> {
        let mut book = LogBook::new();
        let result = self.link_inner(tree, targets, options, &mut book);
        finish(book, result)
    }

    fn link_inner(
        &self,
        tree: &AquaTree,
        targets: &[AquaTree],
        options: &RevisionOptions,
        book: &mut LogBook,
    ) -> Result<AquaTree, AquaError> {
        if targets.is_empty() {
            return Err(AquaError::InvalidRevision {
                hash: VerificationHash::none(),
                reason: "no link targets".into(),
            });
        }
        let parent = Self::resolve_parent(tree, options)?;

        let mut hashes = Vec::with_capacity(targets.len());
        let mut file_hashes = Vec::with_capacity(targets.len());
        let mut names = Vec::with_capacity(targets.len());
        for target in targets {
            let latest = target.latest_hash().cloned().ok_or(AquaError::EmptyTree)?;
            let file_hash = target
                .genesis_file_hash()
                .ok_or(AquaError::MissingGenesis)?
                .to_string();
            if tree.contains_file_hash(&file_hash) {
                return Err(AquaError::SelfLink(file_hash));
            }
            let name = target.file_name().map(str::to_string).ok_or_else(|| {
                AquaError::InvalidRevision {
                    hash: latest.clone(),
                    reason: "link target has no indexed file name".into(),
                }
            })?;
            hashes.push(latest);
            file_hashes.push(file_hash);
            names.push(name);
        }

        let revision = Revision::new(
            parent,
            self.now(),
            RevisionBody::Link {
                link_type: "aqua".to_string(),
                link_require_indepth_verification: true,
                link_verification_hashes: hashes.clone(),
                link_file_hashes: file_hashes,
            },
        );
        let (_, mut next) = self.append(tree, revision, self.method(options), book)?;
        for (latest, name) in hashes.into_iter().zip(names) {
            book.info(format!("Linked {} ({})", latest, name));
            next.index_file(latest, name);
        }
        Ok(next)
    }

    /// Link every source tree to `targets`, one source at a time.
    pub fn link_multiple_trees(
        &self,
        sources: &[AquaTree],
        targets: &[AquaTree],
        options: &RevisionOptions,
    ) -> AquaResult<Vec<AquaTree>> {
        let mut book = LogBook::new();
        let result = sources
            .iter()
            .map(|source| self.link_inner(source, targets, options, &mut book))
            .collect::<Result<Vec<_>, _>>();
        finish(book, result)
    }

    // ── Removal ────────────────────────────────────────────────────

    /// Drop the latest revision, pruning the `file_index` entries it added
    /// that no remaining link revision still refers to.
    pub fn remove_last_revision(&self, tree: &AquaTree) -> AquaResult<AquaTree> {
        let mut book = LogBook::new();
        let result = (|| -> Result<_, AquaError> {
            let latest = tree.latest_hash().cloned().ok_or(AquaError::EmptyTree)?;
            let mut next = tree.clone();
            let removed = next
                .remove_revision(&latest)
                .ok_or_else(|| AquaError::RevisionNotFound(latest.clone()))?;
            next.unindex_file(&latest);
            if let RevisionBody::Link {
                link_verification_hashes,
                ..
            } = &removed.body
            {
                for linked in link_verification_hashes {
                    let still_linked = next.revisions().values().any(|rev| {
                        matches!(
                            &rev.body,
                            RevisionBody::Link { link_verification_hashes, .. }
                                if link_verification_hashes.contains(linked)
                        )
                    });
                    if !still_linked {
                        next.unindex_file(linked);
                    }
                }
            }
            info!(hash = %latest, revision_type = %removed.revision_type(), "Removed last revision");
            if next.is_empty() {
                book.info("Removed genesis revision; tree is empty");
            } else {
                book.success(format!("Removed revision {}", latest));
            }
            Ok(next)
        })();
        finish(book, result)
    }

    // ── Verification ───────────────────────────────────────────────

    /// Verify every revision of `tree`, recursing into linked trees found
    /// among `files`.
    pub async fn verify_tree(
        &self,
        tree: &AquaTree,
        files: &[FileObject],
    ) -> AquaResult<TreeVerification> {
        let ctx = self.context();
        let scope = tree.identity().map(LinkScope::root).unwrap_or_default();
        let mut book = LogBook::new();
        match verify_tree_inner(&ctx, tree, files, &scope, &mut book).await {
            Ok(verification) => Ok(Success::new(verification, book.into_entries())),
            Err(error) => Err(Failure::new(error, book.into_entries())),
        }
    }

    /// Verify `tree` and return a node graph for reporting. Invalid
    /// revisions appear in the graph; only structural problems fail.
    pub async fn verify_and_build_graph(
        &self,
        tree: &AquaTree,
        files: &[FileObject],
    ) -> AquaResult<VerificationGraph> {
        let ctx = self.context();
        let scope = tree.identity().map(LinkScope::root).unwrap_or_default();
        let mut book = LogBook::new();
        match build_graph_inner(&ctx, tree, files, &scope, &mut book).await {
            Ok(graph) => Ok(Success::new(graph, book.into_entries())),
            Err(error) => Err(Failure::new(error, book.into_entries())),
        }
    }

    /// Verify independent trees concurrently. Results keep input order.
    pub async fn verify_batch(
        &self,
        trees: &[AquaTree],
        files: &[FileObject],
    ) -> Vec<AquaResult<TreeVerification>> {
        join_all(trees.iter().map(|tree| self.verify_tree(tree, files))).await
    }

    // ── Persistence ────────────────────────────────────────────────

    pub async fn load_tree(&self, path: &str) -> AquaResult<AquaTree> {
        let mut book = LogBook::new();
        let result = async {
            let bytes = self.platform.read_file(path).await?;
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| AquaError::Serialization(format!("{}: {}", path, e)))?;
            let tree = AquaTree::from_json(text)?;
            book.info(format!("Loaded {} revisions from {}", tree.len(), path));
            Ok::<_, AquaError>(tree)
        }
        .await;
        finish(book, result)
    }

    /// Write `tree` as `<file_name>.aqua.json`; returns the path written.
    pub async fn save_tree(&self, tree: &AquaTree, file_name: &str) -> AquaResult<String> {
        let mut book = LogBook::new();
        let result = async {
            let path = aqua_file_name(file_name);
            let json = tree.to_json()?;
            self.platform.write_file(&path, json.as_bytes()).await?;
            book.info(format!("Saved {} revisions to {}", tree.len(), path));
            Ok::<_, AquaError>(path)
        }
        .await;
        finish(book, result)
    }

    /// Read a file into a [`FileObject`] named after the path's last
    /// component. UTF-8 content becomes text, anything else raw bytes.
    pub async fn load_file_object(&self, path: &str) -> AquaResult<FileObject> {
        let book = LogBook::new();
        let result = async {
            let bytes = self.platform.read_file(path).await?;
            let name = Path::new(path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(path)
                .to_string();
            let content = match String::from_utf8(bytes) {
                Ok(text) => FileContent::Text(text),
                Err(e) => FileContent::Bytes(e.into_bytes()),
            };
            Ok::<_, AquaError>(FileObject::new(name, content).with_path(path))
        }
        .await;
        finish(book, result)
    }
}
