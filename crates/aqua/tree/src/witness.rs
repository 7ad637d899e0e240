//! Witness contract, registry and the in-memory reference backend.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::AquaError;
use crate::hashing;
use crate::types::Credentials;

/// What a witness backend hands back after anchoring a hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessReceipt {
    /// External reference to the anchoring event.
    pub transaction_hash: String,
    /// Account that submitted the anchor.
    pub sender_account_address: String,
    /// Contract, service URL or other locator of the anchoring system.
    pub smart_contract_address: String,
    /// Unix seconds at which the anchor was recorded.
    pub timestamp: i64,
}

/// An anchoring backend for one `witness_network`.
#[async_trait]
pub trait Witness: Send + Sync {
    fn network(&self) -> &str;

    /// Whether verification needs connectivity. Offline verification of
    /// such a backend fails closed.
    fn requires_network(&self) -> bool;

    async fn witness(
        &self,
        hash: &str,
        credentials: &Credentials,
    ) -> Result<WitnessReceipt, AquaError>;

    /// `Ok(true)` only if the external record anchors `expected_hash` at
    /// `expected_timestamp`.
    async fn verify(
        &self,
        transaction_hash: &str,
        expected_hash: &str,
        expected_timestamp: i64,
    ) -> Result<bool, AquaError>;
}

/// Witness backends keyed by network name.
#[derive(Clone, Default)]
pub struct WitnessRegistry {
    witnesses: HashMap<String, Arc<dyn Witness>>,
}

impl WitnessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, witness: Arc<dyn Witness>) {
        self.witnesses.insert(witness.network().to_string(), witness);
    }

    pub fn get(&self, network: &str) -> Result<Arc<dyn Witness>, AquaError> {
        self.witnesses
            .get(network)
            .cloned()
            .ok_or_else(|| AquaError::UnsupportedWitnessNetwork(network.to_string()))
    }

    pub fn networks(&self) -> Vec<&str> {
        let mut networks: Vec<&str> = self.witnesses.keys().map(String::as_str).collect();
        networks.sort_unstable();
        networks
    }
}

impl std::fmt::Debug for WitnessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WitnessRegistry")
            .field("networks", &self.networks())
            .finish()
    }
}

pub const LOCAL_WITNESS_NETWORK: &str = "local";

#[derive(Clone, Debug)]
struct Anchor {
    hash: String,
    timestamp: i64,
}

/// Anchors hashes in process memory. Clones share the same anchor log.
#[derive(Clone, Default)]
pub struct InMemoryWitness {
    anchors: Arc<RwLock<HashMap<String, Anchor>>>,
    counter: Arc<AtomicU64>,
}

impl InMemoryWitness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.read().map(|a| a.len()).unwrap_or(0)
    }

    fn sender_address() -> String {
        let digest = hashing::sha256_hex("aqua-local-witness");
        format!("0x{}", &digest[..40])
    }
}

#[async_trait]
impl Witness for InMemoryWitness {
    fn network(&self) -> &str {
        LOCAL_WITNESS_NETWORK
    }

    fn requires_network(&self) -> bool {
        false
    }

    async fn witness(
        &self,
        hash: &str,
        _credentials: &Credentials,
    ) -> Result<WitnessReceipt, AquaError> {
        let timestamp = Utc::now().timestamp();
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let transaction_hash = format!(
            "0x{}",
            hashing::sha256_hex(format!("{}:{}:{}", hash, timestamp, seq))
        );

        let mut anchors = self
            .anchors
            .write()
            .map_err(|e| AquaError::Backend(format!("lock poisoned: {}", e)))?;
        anchors.insert(
            transaction_hash.clone(),
            Anchor {
                hash: hash.to_string(),
                timestamp,
            },
        );

        Ok(WitnessReceipt {
            transaction_hash,
            sender_account_address: Self::sender_address(),
            smart_contract_address: "memory://aqua-witness".to_string(),
            timestamp,
        })
    }

    async fn verify(
        &self,
        transaction_hash: &str,
        expected_hash: &str,
        expected_timestamp: i64,
    ) -> Result<bool, AquaError> {
        let anchors = self
            .anchors
            .read()
            .map_err(|e| AquaError::Backend(format!("lock poisoned: {}", e)))?;
        Ok(anchors
            .get(transaction_hash)
            .map(|a| a.hash == expected_hash && a.timestamp == expected_timestamp)
            .unwrap_or(false))
    }
}
