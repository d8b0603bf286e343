//! Best-effort monthly page view counters.
//!
//! Counting never blocks on I/O while holding the lock and never fails a
//! request: snapshot problems are logged and dropped.

use chrono::{DateTime, Datelike, Utc};
use parking_lot::RwLock;
use rand::{Rng, thread_rng};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tracing::warn;

const SNAPSHOT_INTERVAL_SECS: u64 = 300;
const SNAPSHOT_RANDOM_CHANCE: f64 = 0.1;

/// Counter key, rendered as `pageviews:{year}:{month}:{board_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageViewKey {
    pub year: i32,
    pub month: u32,
    pub board_id: String,
}

impl PageViewKey {
    pub fn new(board_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
            board_id: board_id.to_string(),
        }
    }
}

impl fmt::Display for PageViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pageviews:{}:{}:{}", self.year, self.month, self.board_id)
    }
}

#[derive(Clone)]
pub struct PageViews {
    shared: Arc<PageViewsShared>,
}

impl PageViews {
    /// Counters that are appended to `path` as JSON lines from time to time.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self::with_path(Some(path.into()))
    }

    pub fn ephemeral() -> Self {
        Self::with_path(None)
    }

    fn with_path(path: Option<PathBuf>) -> Self {
        Self {
            shared: Arc::new(PageViewsShared {
                counts: RwLock::new(HashMap::new()),
                persistence: SnapshotWriter::new(path),
            }),
        }
    }

    pub fn record(&self, board_id: &str) -> u64 {
        self.record_at(board_id, Utc::now())
    }

    pub fn record_at(&self, board_id: &str, at: DateTime<Utc>) -> u64 {
        if board_id.is_empty() {
            return 0;
        }
        let key = PageViewKey::new(board_id, at);
        let mut guard = self.shared.counts.write();
        let count = guard.entry(key).or_insert(0);
        *count = count.saturating_add(1);
        let total = *count;
        let snapshot = self
            .shared
            .persistence
            .should_snapshot()
            .then(|| snapshot_of(&guard));
        drop(guard);
        if let Some(snapshot) = snapshot {
            self.shared.persistence.write_snapshot(&snapshot);
        }
        total
    }

    pub fn count(&self, key: &PageViewKey) -> u64 {
        self.shared.counts.read().get(key).copied().unwrap_or(0)
    }
}

struct PageViewsShared {
    counts: RwLock<HashMap<PageViewKey, u64>>,
    persistence: SnapshotWriter,
}

#[derive(Serialize)]
struct Snapshot {
    captured_at: u64,
    counters: HashMap<String, u64>,
}

fn snapshot_of(counts: &HashMap<PageViewKey, u64>) -> Snapshot {
    Snapshot {
        captured_at: now_ts(),
        counters: counts
            .iter()
            .map(|(key, count)| (key.to_string(), *count))
            .collect(),
    }
}

struct SnapshotWriter {
    path: Option<PathBuf>,
    last_flush: AtomicU64,
}

impl SnapshotWriter {
    fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            last_flush: AtomicU64::new(0),
        }
    }

    fn should_snapshot(&self) -> bool {
        if self.path.is_none() {
            return false;
        }
        let last = self.last_flush.load(AtomicOrdering::Relaxed);
        if now_ts().saturating_sub(last) >= SNAPSHOT_INTERVAL_SECS {
            return true;
        }
        thread_rng().gen_bool(SNAPSHOT_RANDOM_CHANCE)
    }

    fn write_snapshot(&self, snapshot: &Snapshot) {
        let Some(path) = &self.path else {
            return;
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(error = %err, "failed to create page view directory");
                return;
            }
        }
        let mut line = match serde_json::to_vec(snapshot) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to serialize page view snapshot");
                return;
            }
        };
        line.push(b'\n');
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(mut file) => {
                if let Err(err) = file.write_all(&line) {
                    warn!(error = %err, "failed to write page view snapshot");
                    return;
                }
                self.last_flush.store(now_ts(), AtomicOrdering::Release);
            }
            Err(err) => warn!(error = %err, "failed to open page view snapshot file"),
        }
    }
}

fn now_ts() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}
