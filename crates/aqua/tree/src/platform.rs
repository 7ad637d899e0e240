use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::AquaError;

/// Ambient platform capabilities: clock, connectivity, file access.
///
/// Core logic never touches the host directly; the engine consults this
/// capability at its boundary.
#[async_trait]
pub trait PlatformServices: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn is_online(&self) -> bool;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, AquaError>;

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), AquaError>;
}

/// Host platform: system clock and `std::fs`.
#[derive(Debug)]
pub struct NativePlatform {
    online: AtomicBool,
}

impl NativePlatform {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformServices for NativePlatform {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, AquaError> {
        std::fs::read(path).map_err(|e| AquaError::Io(format!("{}: {}", path, e)))
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), AquaError> {
        std::fs::write(path, bytes).map_err(|e| AquaError::Io(format!("{}: {}", path, e)))
    }
}

/// In-memory platform for tests: settable clock, online toggle, file map.
#[derive(Clone)]
pub struct InMemoryPlatform {
    now: Arc<RwLock<DateTime<Utc>>>,
    online: Arc<AtomicBool>,
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryPlatform {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(now)),
            online: Arc::new(AtomicBool::new(true)),
            files: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        if let Ok(mut slot) = self.now.write() {
            *slot = now;
        }
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        if let Ok(mut slot) = self.now.write() {
            *slot += chrono::Duration::seconds(seconds);
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn insert_file(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), bytes.into());
        }
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[async_trait]
impl PlatformServices for InMemoryPlatform {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, AquaError> {
        let files = self
            .files
            .read()
            .map_err(|e| AquaError::Io(format!("lock poisoned: {}", e)))?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| AquaError::Io(format!("{}: not found", path)))
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), AquaError> {
        let mut files = self
            .files
            .write()
            .map_err(|e| AquaError::Io(format!("lock poisoned: {}", e)))?;
        files.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}
