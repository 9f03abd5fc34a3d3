//! Per-user request counters with exclusive read-modify-write.
//!
//! The store owns one `Mutex` around its storage backend.  Recording a hit
//! holds that lock for the whole load → increment → save cycle, so two
//! requests never interleave and no increment is lost.  Reads take the same
//! lock and therefore never observe a half-written file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

/// Default location of the counters file.
pub const DEFAULT_STATS_FILE: &str = "user_statistics.txt";

/// Username → number of recorded requests, in username order.
pub type UsageCounters = BTreeMap<String, u64>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed counters line {line}: {content:?}")]
    Corrupt { line: usize, content: String },
    #[error("usage store lock poisoned")]
    Poisoned,
}

/// Where the counters live between mutations.
pub trait CounterStorage: Send {
    /// Read every counter.  Storage that does not exist yet reads as empty.
    fn load(&mut self) -> Result<UsageCounters, StoreError>;

    /// Replace every counter.
    fn save(&mut self, counters: &UsageCounters) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// File storage
// ---------------------------------------------------------------------------

/// Line-oriented `username count` file, fully rewritten on every save.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CounterStorage for FileStorage {
    fn load(&mut self) -> Result<UsageCounters, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => parse_counters(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("creating empty counters file {}", self.path.display());
                fs::write(&self.path, "").map_err(|e| self.io_error(e))?;
                Ok(UsageCounters::new())
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn save(&mut self, counters: &UsageCounters) -> Result<(), StoreError> {
        // Sibling file first, then rename over the original.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, format_counters(counters)).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

/// Parse `username count` lines.  Blank lines are skipped.
pub fn parse_counters(text: &str) -> Result<UsageCounters, StoreError> {
    let mut counters = UsageCounters::new();
    for (index, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        let (user, count) = match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => continue,
            (Some(user), Some(count), None) => (user, count),
            _ => {
                return Err(StoreError::Corrupt {
                    line: index + 1,
                    content: line.to_string(),
                })
            }
        };
        let count = count.parse::<u64>().map_err(|_| StoreError::Corrupt {
            line: index + 1,
            content: line.to_string(),
        })?;
        counters.insert(user.to_string(), count);
    }
    Ok(counters)
}

/// Render counters as `username count` lines.
pub fn format_counters(counters: &UsageCounters) -> String {
    counters
        .iter()
        .map(|(user, count)| format!("{} {}\n", user, count))
        .collect()
}

// ---------------------------------------------------------------------------
// In-memory storage
// ---------------------------------------------------------------------------

/// Counters kept in process memory only.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    counters: UsageCounters,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with `counters`.
    pub fn with_counters(counters: UsageCounters) -> Self {
        Self { counters }
    }
}

impl CounterStorage for MemoryStorage {
    fn load(&mut self) -> Result<UsageCounters, StoreError> {
        Ok(self.counters.clone())
    }

    fn save(&mut self, counters: &UsageCounters) -> Result<(), StoreError> {
        self.counters = counters.clone();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Serialises every access to one [`CounterStorage`].
pub struct UsageStore {
    storage: Mutex<Box<dyn CounterStorage>>,
}

impl UsageStore {
    pub fn new(storage: impl CounterStorage + 'static) -> Self {
        Self {
            storage: Mutex::new(Box::new(storage)),
        }
    }

    /// Store backed by the counters file at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(FileStorage::new(path))
    }

    /// Store kept in memory only.
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// Record one request for `username` and return every counter as saved.
    pub fn record(&self, username: &str) -> Result<UsageCounters, StoreError> {
        let mut storage = self.storage.lock().map_err(|_| StoreError::Poisoned)?;
        let mut counters = storage.load()?;
        *counters.entry(username.to_string()).or_insert(0) += 1;
        storage.save(&counters)?;
        log::debug!("recorded hit for {username}: {}", counters[username]);
        Ok(counters)
    }

    /// Every counter, read under the same lock as [`UsageStore::record`].
    pub fn snapshot(&self) -> Result<UsageCounters, StoreError> {
        let mut storage = self.storage.lock().map_err(|_| StoreError::Poisoned)?;
        storage.load()
    }
}

impl std::fmt::Debug for UsageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// Storage whose save fails, to check nothing is half-applied.
    struct FailingSave;

    impl CounterStorage for FailingSave {
        fn load(&mut self) -> Result<UsageCounters, StoreError> {
            Ok(UsageCounters::new())
        }

        fn save(&mut self, _: &UsageCounters) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: PathBuf::from("/dev/full"),
                source: io::Error::new(io::ErrorKind::Other, "disk full"),
            })
        }
    }

    /// Storage that counts how often it is touched.
    struct Counting {
        inner: MemoryStorage,
        loads: Arc<AtomicUsize>,
        saves: Arc<AtomicUsize>,
    }

    impl CounterStorage for Counting {
        fn load(&mut self) -> Result<UsageCounters, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load()
        }

        fn save(&mut self, counters: &UsageCounters) -> Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(counters)
        }
    }

    #[test]
    fn first_hit_initialises_to_one() {
        let store = UsageStore::in_memory();
        let counters = store.record("1110").unwrap();
        assert_eq!(counters.get("1110"), Some(&1));
    }

    #[test]
    fn two_hits_add_two() {
        let store = UsageStore::in_memory();
        store.record("1111").unwrap();
        let counters = store.record("1111").unwrap();
        assert_eq!(counters["1111"], 2);
    }

    #[test]
    fn users_are_counted_separately() {
        let store = UsageStore::in_memory();
        store.record("1111").unwrap();
        store.record("1112").unwrap();
        store.record("1111").unwrap();
        let counters = store.snapshot().unwrap();
        assert_eq!(counters["1111"], 2);
        assert_eq!(counters["1112"], 1);
    }

    #[test]
    fn prefilled_storage_is_incremented() {
        let mut initial = UsageCounters::new();
        initial.insert("1113".to_string(), 41);
        let store = UsageStore::new(MemoryStorage::with_counters(initial));
        assert_eq!(store.record("1113").unwrap()["1113"], 42);
    }

    #[test]
    fn snapshot_is_idempotent() {
        let store = UsageStore::in_memory();
        store.record("1111").unwrap();
        let first = store.snapshot().unwrap();
        let second = store.snapshot().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn record_loads_and_saves_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let saves = Arc::new(AtomicUsize::new(0));
        let store = UsageStore::new(Counting {
            inner: MemoryStorage::new(),
            loads: Arc::clone(&loads),
            saves: Arc::clone(&saves),
        });
        store.record("1111").unwrap();
        store.snapshot().unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn save_failure_is_reported() {
        let store = UsageStore::new(FailingSave);
        assert!(matches!(store.record("1111"), Err(StoreError::Io { .. })));
    }

    #[test]
    fn concurrent_hits_are_not_lost() {
        let store = Arc::new(UsageStore::in_memory());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..25 {
                        store.record("1111").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.snapshot().unwrap()["1111"], 400);
    }

    #[test]
    fn parse_and_format() {
        let text = "1110 3\n\n1111   12\n";
        let counters = parse_counters(text).unwrap();
        assert_eq!(counters["1110"], 3);
        assert_eq!(counters["1111"], 12);
        assert_eq!(format_counters(&counters), "1110 3\n1111 12\n");
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(matches!(
            parse_counters("1110 3\n1111\n"),
            Err(StoreError::Corrupt { line: 2, .. })
        ));
        assert!(matches!(
            parse_counters("1110 three\n"),
            Err(StoreError::Corrupt { line: 1, .. })
        ));
        assert!(matches!(
            parse_counters("1110 3 4\n"),
            Err(StoreError::Corrupt { line: 1, .. })
        ));
        assert!(matches!(
            parse_counters("1110 -3\n"),
            Err(StoreError::Corrupt { line: 1, .. })
        ));
    }

    #[test]
    fn format_empty_is_empty() {
        assert_eq!(format_counters(&UsageCounters::new()), "");
    }
}
