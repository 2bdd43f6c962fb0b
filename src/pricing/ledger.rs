//! Price-increase ledger: remembers when each product last had an increase
//! accepted, and enforces the cooldown window.
//!
//! The in-memory map is authoritative for the process lifetime. Every
//! `record_increase` writes the full map through a `LedgerStore`; a failed
//! write is logged and otherwise ignored.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{COOLDOWN_DAYS, ProductId, canonicalize};
use crate::error::LedgerError;

/// Serialized ledger: canonical product id → ISO-8601 timestamp.
pub type LedgerSnapshot = BTreeMap<String, String>;

/// Persistence port for the ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the last saved snapshot. `Ok(None)` when nothing was saved yet.
    async fn load(&self) -> Result<Option<LedgerSnapshot>, LedgerError>;

    /// Replace the saved snapshot.
    async fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), LedgerError>;
}

/// Flat JSON file, e.g. `{"ABC123": "2025-01-15T10:00:00+00:00"}`.
pub struct JsonFileLedgerStore {
    path: PathBuf,
}

impl JsonFileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LedgerStore for JsonFileLedgerStore {
    async fn load(&self) -> Result<Option<LedgerSnapshot>, LedgerError> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).await?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        // Write-then-rename so a crash mid-write never leaves a truncated file.
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-memory store, for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryLedgerStore {
    snapshot: std::sync::Mutex<Option<LedgerSnapshot>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            snapshot: std::sync::Mutex::new(Some(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Option<LedgerSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> Result<Option<LedgerSnapshot>, LedgerError> {
        Ok(self.snapshot())
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        Ok(())
    }
}

/// Cooldown ledger for price increases.
pub struct PriceLedger {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
    store: Box<dyn LedgerStore>,
    /// Held across snapshot + save so saves land in record order.
    persist: Mutex<()>,
}

impl PriceLedger {
    /// Load the ledger from `store`. Missing or corrupt data yields an empty ledger.
    pub async fn load(store: Box<dyn LedgerStore>) -> Self {
        let entries = match store.load().await {
            Ok(Some(snapshot)) => {
                let entries = parse_snapshot(snapshot);
                info!(entries = entries.len(), "Loaded price increase ledger");
                entries
            }
            Ok(None) => {
                info!("No existing price increase ledger found");
                HashMap::new()
            }
            Err(e) => {
                error!(error = %e, "Failed to load price increase ledger, starting empty");
                HashMap::new()
            }
        };

        Self {
            entries: RwLock::new(entries),
            store,
            persist: Mutex::new(()),
        }
    }

    /// Whether `product` had an increase accepted within the cooldown window.
    pub async fn has_recent_increase(&self, product: &ProductId) -> bool {
        self.has_recent_increase_at(product, Utc::now()).await
    }

    /// Same as [`has_recent_increase`](Self::has_recent_increase) with an explicit clock.
    ///
    /// A timestamp exactly `COOLDOWN_DAYS` old still counts as recent.
    pub async fn has_recent_increase_at(&self, product: &ProductId, now: DateTime<Utc>) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(product.as_str())
            .is_some_and(|last| *last >= now - Duration::days(COOLDOWN_DAYS))
    }

    /// Record an increase for `product` now and persist the ledger.
    pub async fn record_increase(&self, product: &ProductId) {
        self.record_increase_at(product, Utc::now()).await;
    }

    /// Same as [`record_increase`](Self::record_increase) with an explicit timestamp.
    pub async fn record_increase_at(&self, product: &ProductId, at: DateTime<Utc>) {
        let _persist = self.persist.lock().await;
        let snapshot = {
            let mut entries = self.entries.write().await;
            entries.insert(product.as_str().to_string(), at);
            to_snapshot(&entries)
        };

        info!(product_id = %product, at = %at.to_rfc3339(), "Recorded price increase");

        match self.store.save(&snapshot).await {
            Ok(()) => info!(entries = snapshot.len(), "Price increase ledger saved"),
            Err(e) => error!(
                product_id = %product,
                error = %e,
                "Failed to persist price increase ledger"
            ),
        }
    }

    /// Last recorded increase for `product`, if any.
    pub async fn last_increase(&self, product: &ProductId) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(product.as_str()).copied()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn to_snapshot(entries: &HashMap<String, DateTime<Utc>>) -> LedgerSnapshot {
    entries
        .iter()
        .map(|(k, v)| (k.clone(), v.to_rfc3339()))
        .collect()
}

fn parse_snapshot(snapshot: LedgerSnapshot) -> HashMap<String, DateTime<Utc>> {
    let mut entries = HashMap::with_capacity(snapshot.len());
    for (product, raw) in snapshot {
        match parse_timestamp(&raw) {
            Some(at) => {
                let key = canonicalize(&product);
                // Two raw keys may canonicalize to the same id; keep the latest.
                let slot = entries.entry(key).or_insert(at);
                if at > *slot {
                    *slot = at;
                }
            }
            None => warn!(product_id = %product, raw = %raw, "Skipping unparsable ledger entry"),
        }
    }
    entries
}

/// RFC 3339, or a naive ISO-8601 timestamp interpreted as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn pid(raw: &str) -> ProductId {
        ProductId::parse(raw).unwrap()
    }

    /// Store that always fails to save.
    struct FailingStore;

    #[async_trait]
    impl LedgerStore for FailingStore {
        async fn load(&self) -> Result<Option<LedgerSnapshot>, LedgerError> {
            Err(LedgerError::Io(std::io::Error::other("disk gone")))
        }
        async fn save(&self, _snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
            Err(LedgerError::Io(std::io::Error::other("disk gone")))
        }
    }

    /// Shares a `MemoryLedgerStore` so tests can inspect what was saved.
    struct SharedStore(Arc<MemoryLedgerStore>);

    #[async_trait]
    impl LedgerStore for SharedStore {
        async fn load(&self) -> Result<Option<LedgerSnapshot>, LedgerError> {
            self.0.load().await
        }
        async fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
            self.0.save(snapshot).await
        }
    }

    #[tokio::test]
    async fn recent_immediately_after_record() {
        let ledger = PriceLedger::load(Box::new(MemoryLedgerStore::new())).await;
        let product = pid("abc123");
        assert!(!ledger.has_recent_increase(&product).await);
        ledger.record_increase(&product).await;
        assert!(ledger.has_recent_increase(&product).await);
    }

    #[tokio::test]
    async fn cooldown_boundary_is_inclusive() {
        let ledger = PriceLedger::load(Box::new(MemoryLedgerStore::new())).await;
        let product = pid("ABC123");
        let now = Utc::now();

        ledger
            .record_increase_at(&product, now - Duration::days(COOLDOWN_DAYS))
            .await;
        assert!(ledger.has_recent_increase_at(&product, now).await);

        let just_after = now + Duration::milliseconds(1);
        assert!(!ledger.has_recent_increase_at(&product, just_after).await);

        ledger
            .record_increase_at(&product, now - Duration::days(8))
            .await;
        assert!(!ledger.has_recent_increase_at(&product, now).await);
    }

    #[tokio::test]
    async fn latest_record_overwrites() {
        let ledger = PriceLedger::load(Box::new(MemoryLedgerStore::new())).await;
        let product = pid("P1");
        let now = Utc::now();
        ledger.record_increase_at(&product, now - Duration::days(30)).await;
        ledger.record_increase_at(&product, now).await;
        assert_eq!(ledger.len().await, 1);
        assert_eq!(ledger.last_increase(&product).await, Some(now));
    }

    #[tokio::test]
    async fn save_failure_keeps_memory_state() {
        let ledger = PriceLedger::load(Box::new(FailingStore)).await;
        assert!(ledger.is_empty().await);
        let product = pid("P2");
        ledger.record_increase(&product).await;
        assert!(ledger.has_recent_increase(&product).await);
    }

    #[tokio::test]
    async fn record_persists_full_snapshot() {
        let store = Arc::new(MemoryLedgerStore::new());
        let ledger = PriceLedger::load(Box::new(SharedStore(Arc::clone(&store)))).await;
        ledger.record_increase(&pid("a1")).await;
        ledger.record_increase(&pid("b2")).await;

        let saved = store.snapshot().unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.contains_key("A1"));
        assert!(DateTime::parse_from_rfc3339(&saved["B2"]).is_ok());
    }

    #[tokio::test]
    async fn load_accepts_legacy_naive_timestamps() {
        let recent = (Utc::now() - Duration::days(1)).naive_utc();
        let snapshot = LedgerSnapshot::from([
            ("abc123".to_string(), recent.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
            ("OLD1".to_string(), "2020-01-01T00:00:00".to_string()),
            ("BAD".to_string(), "yesterday".to_string()),
        ]);
        let ledger = PriceLedger::load(Box::new(MemoryLedgerStore::with_snapshot(snapshot))).await;

        assert_eq!(ledger.len().await, 2);
        assert!(ledger.has_recent_increase(&pid("ABC123")).await);
        assert!(!ledger.has_recent_increase(&pid("OLD1")).await);
        assert!(!ledger.has_recent_increase(&pid("BAD")).await);
    }

    #[tokio::test]
    async fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("price_increase_log.json");

        {
            let ledger = PriceLedger::load(Box::new(JsonFileLedgerStore::new(&path))).await;
            assert!(ledger.is_empty().await);
            ledger.record_increase(&pid("xyz789")).await;
        }

        let raw = std::fs::read_to_string(&path).unwrap();
        let on_disk: LedgerSnapshot = serde_json::from_str(&raw).unwrap();
        assert!(on_disk.contains_key("XYZ789"));

        let reloaded = PriceLedger::load(Box::new(JsonFileLedgerStore::new(&path))).await;
        assert!(reloaded.has_recent_increase(&pid("xyz789")).await);
    }

    #[tokio::test]
    async fn corrupt_file_yields_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("price_increase_log.json");
        std::fs::write(&path, "{ not json").unwrap();

        let ledger = PriceLedger::load(Box::new(JsonFileLedgerStore::new(&path))).await;
        assert!(ledger.is_empty().await);

        // Still usable and overwrites the corrupt file.
        ledger.record_increase(&pid("P9")).await;
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("P9"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_on_distinct_products_all_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("price_increase_log.json");
        let ledger = Arc::new(PriceLedger::load(Box::new(JsonFileLedgerStore::new(&path))).await);

        for round in 0..5 {
            let handles: Vec<_> = (0..32)
                .map(|i| {
                    let ledger = Arc::clone(&ledger);
                    tokio::spawn(async move {
                        ledger.record_increase(&pid(&format!("R{round}P{i}"))).await;
                    })
                })
                .collect();
            for h in handles {
                h.await.unwrap();
            }

            let expected = ledger.len().await;
            let reloaded = PriceLedger::load(Box::new(JsonFileLedgerStore::new(&path))).await;
            assert_eq!(reloaded.len().await, expected, "round {round}");
        }
        assert_eq!(ledger.len().await, 5 * 32);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
