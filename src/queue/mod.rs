//! # Durable Queue Module
//!
//! Store-and-forward backlog of payloads whose delivery failed.
//!
//! This module handles:
//! - Persisting one payload per file, flushed to stable storage before returning
//! - Minting strictly increasing sequence keys, across restarts
//! - Draining entries in key order with per-entry success/failure
//! - A read path over queued entries for diagnostics
//!
//! ## Layout
//!
//! ```text
//! <dir>/00000001709296205123-0000000000.json
//! <dir>/00000001709296205123-0000000001.json   (same millisecond, next seq)
//! <dir>/00000001709296207400-0000000000.json
//! ```
//!
//! Writes go to `<name>.tmp` first and are hard-linked into place, so a crash
//! never leaves a half-written entry under an entry name and a commit never
//! replaces an entry that is already there.
//!
//! Several handles, in one process or many, may share a directory. Commits
//! and drain passes are serialized through lock files (see [`lock`]).

mod lock;

use std::fmt;
use std::io;
use std::future::Future;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::wire::{decode, Value};
use lock::{DirLock, DRAIN_LOCK, WRITE_LOCK};

/// Extension of committed entries
const ENTRY_SUFFIX: &str = ".json";

/// Extension of in-progress writes
const TMP_SUFFIX: &str = ".tmp";

/// FIFO position of a queue entry
///
/// Ordered by capture millisecond first, then by the tie-breaking counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceKey {
    pub millis: u64,
    pub seq: u32,
}

impl SequenceKey {
    /// Smallest key strictly greater than `self`, preferring `now_millis`
    ///
    /// A clock that stepped backwards keeps the previous millisecond and
    /// bumps the counter instead.
    #[must_use]
    pub fn next(self, now_millis: u64) -> Self {
        if now_millis > self.millis {
            return Self { millis: now_millis, seq: 0 };
        }
        match self.seq.checked_add(1) {
            Some(seq) => Self { millis: self.millis, seq },
            None => Self { millis: self.millis.saturating_add(1), seq: 0 },
        }
    }

    /// Entry file name for this key
    pub fn file_name(&self) -> String {
        format!("{}{}", self, ENTRY_SUFFIX)
    }

    /// Parse an entry file name; `None` for anything else
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(ENTRY_SUFFIX)?;
        let (millis, seq) = stem.split_once('-')?;
        if !millis.bytes().all(|b| b.is_ascii_digit()) || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            millis: millis.parse().ok()?,
            seq: seq.parse().ok()?,
        })
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:020}-{:010}", self.millis, self.seq)
    }
}

/// A persisted delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub sequence_key: SequenceKey,
    pub payload: Bytes,
}

impl QueueEntry {
    /// Decode the stored payload back into its wire value
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Decode` if the payload is not valid wire text.
    pub fn decode(&self) -> Result<Value> {
        Ok(decode(&self.payload)?)
    }
}

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries the callback accepted
    pub delivered: usize,
    /// Entries of this pass still on disk afterwards
    pub remaining: usize,
}

/// Result of one commit attempt
enum Commit {
    Done,
    /// Another handle already holds this key
    Taken,
}

/// File-backed FIFO of undelivered payloads
pub struct DurableQueue {
    dir: PathBuf,
    /// Last minted key; held across the write so files appear in key order
    last_key: Mutex<SequenceKey>,
    /// One drain pass at a time within this handle
    drain_lock: Mutex<()>,
}

impl fmt::Debug for DurableQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableQueue")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

impl DurableQueue {
    /// Open (or create) a queue directory
    ///
    /// Removes temporary files left by interrupted writes and resumes key
    /// minting after the highest existing entry. Both happen under the
    /// directory write lock, so a write in flight elsewhere is left alone.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Io` if the directory cannot be created, locked
    /// or listed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cellprobe::queue::DurableQueue;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let queue = DurableQueue::open("./queue").await?;
    ///     println!("{} entries waiting", queue.len().await?);
    ///     Ok(())
    /// }
    /// ```
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        let _writer = DirLock::acquire(dir.join(WRITE_LOCK)).await?;

        let mut last = SequenceKey::default();
        let mut read_dir = fs::read_dir(&dir).await?;
        while let Some(item) = read_dir.next_entry().await? {
            let name = item.file_name();
            let Some(name) = name.to_str() else { continue };

            if name.ends_with(TMP_SUFFIX) {
                warn!("Removing incomplete queue write {}", name);
                if let Err(e) = fs::remove_file(item.path()).await {
                    warn!("Failed to remove {}: {}", name, e);
                }
            } else if let Some(key) = SequenceKey::from_file_name(name) {
                last = last.max(key);
            }
        }

        info!("Opened queue at {} (last key {})", dir.display(), last);
        Ok(Self {
            dir,
            last_key: Mutex::new(last),
            drain_lock: Mutex::new(()),
        })
    }

    /// Directory backing this queue
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a payload under a fresh key
    ///
    /// The entry is on stable storage when this returns `Ok`. If another
    /// handle on the same directory committed the minted key first, minting
    /// resumes after the highest key on disk; existing entries are never
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Queue` if any step of the lock, write, flush or
    /// commit fails. There is no fallback; the caller must surface it.
    pub async fn enqueue(&self, payload: Bytes) -> Result<QueueEntry> {
        let mut last = self.last_key.lock().await;
        let _writer = DirLock::acquire(self.dir.join(WRITE_LOCK))
            .await
            .map_err(|e| RelayError::Queue(format!("failed to persist entry: cannot lock queue: {}", e)))?;

        let mut key = last.next(now_millis());
        loop {
            // Never hand out a key twice, even if this write fails part-way
            *last = key;

            let final_path = self.dir.join(key.file_name());
            let tmp_path = self.dir.join(format!("{}{}", key.file_name(), TMP_SUFFIX));

            match self.write_durably(&tmp_path, &final_path, &payload).await {
                Ok(Commit::Done) => break,
                Ok(Commit::Taken) => {
                    let highest = self.highest_key().await.map_err(|e| {
                        RelayError::Queue(format!("failed to persist entry {}: {}", key, e))
                    })?;
                    debug!("Key {} already taken, resuming after {}", key, highest);
                    key = key.max(highest).next(now_millis());
                }
                Err(e) => {
                    return Err(RelayError::Queue(format!(
                        "failed to persist entry {}: {}",
                        key, e
                    )));
                }
            }
        }

        debug!("Queued entry {} ({} bytes)", key, payload.len());
        Ok(QueueEntry {
            sequence_key: key,
            payload,
        })
    }

    async fn write_durably(&self, tmp: &Path, dest: &Path, payload: &[u8]) -> io::Result<Commit> {
        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(tmp).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(Commit::Taken),
            Err(e) => return Err(e),
        };

        let linked = async move {
            file.write_all(payload).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            // Unlike rename, fails instead of replacing an existing entry
            fs::hard_link(tmp, dest).await
        }
        .await;

        if let Err(e) = fs::remove_file(tmp).await {
            warn!("Failed to remove {}: {}", tmp.display(), e);
        }

        match linked {
            Ok(()) => {
                sync_dir(&self.dir).await?;
                Ok(Commit::Done)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(Commit::Taken),
            Err(e) => Err(e),
        }
    }

    async fn highest_key(&self) -> Result<SequenceKey> {
        Ok(self
            .scan()
            .await?
            .last()
            .map(|(key, _)| *key)
            .unwrap_or_default())
    }

    /// Committed entries in key order, without payloads
    async fn scan(&self) -> Result<Vec<(SequenceKey, PathBuf)>> {
        let mut found = Vec::new();
        let mut read_dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = read_dir.next_entry().await? {
            if let Some(key) = item.file_name().to_str().and_then(SequenceKey::from_file_name) {
                found.push((key, item.path()));
            }
        }
        found.sort_by_key(|(key, _)| *key);
        Ok(found)
    }

    /// Offer every queued entry to `deliver`, oldest first
    ///
    /// Entries the callback accepts are deleted. Rejected or unreadable
    /// entries stay for a later pass; processing always continues with the
    /// next entry. Entries enqueued while the pass runs are left for the
    /// next one. Waits for any pass already running on this directory,
    /// including one in another process.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Io` only if the directory cannot be locked or
    /// listed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cellprobe::queue::DurableQueue;
    ///
    /// # async fn run(queue: DurableQueue) -> cellprobe::error::Result<()> {
    /// let report = queue.drain(|payload| async move { !payload.is_empty() }).await?;
    /// println!("delivered {}, remaining {}", report.delivered, report.remaining);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn drain<F, Fut>(&self, deliver: F) -> Result<DrainReport>
    where
        F: FnMut(Bytes) -> Fut,
        Fut: Future<Output = bool>,
    {
        let _pass = self.drain_lock.lock().await;
        let _dir_pass = DirLock::acquire(self.dir.join(DRAIN_LOCK)).await?;
        self.drain_pass(deliver).await
    }

    /// Like [`drain`](Self::drain), but returns `Ok(None)` at once if another
    /// pass is already running
    pub async fn try_drain<F, Fut>(&self, deliver: F) -> Result<Option<DrainReport>>
    where
        F: FnMut(Bytes) -> Fut,
        Fut: Future<Output = bool>,
    {
        let Ok(_pass) = self.drain_lock.try_lock() else {
            debug!("Drain pass already in progress, skipping");
            return Ok(None);
        };
        let Some(_dir_pass) = DirLock::try_acquire(self.dir.join(DRAIN_LOCK)).await? else {
            debug!("Another handle is draining {}, skipping", self.dir.display());
            return Ok(None);
        };
        self.drain_pass(deliver).await.map(Some)
    }

    /// Caller holds both drain locks
    async fn drain_pass<F, Fut>(&self, mut deliver: F) -> Result<DrainReport>
    where
        F: FnMut(Bytes) -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut report = DrainReport::default();

        for (key, path) in self.scan().await? {
            let payload = match fs::read(&path).await {
                Ok(bytes) => Bytes::from(bytes),
                Err(e) => {
                    warn!("Skipping unreadable entry {}: {}", key, e);
                    report.remaining += 1;
                    continue;
                }
            };

            if !deliver(payload).await {
                debug!("Entry {} not delivered, keeping it", key);
                report.remaining += 1;
                continue;
            }

            report.delivered += 1;
            if let Err(e) = fs::remove_file(&path).await {
                // Still on disk, so a later pass will offer it again
                warn!("Delivered entry {} but could not remove it: {}", key, e);
                report.remaining += 1;
            }
        }

        if report.delivered > 0 || report.remaining > 0 {
            info!(
                "Drain pass: {} delivered, {} remaining",
                report.delivered, report.remaining
            );
        }
        Ok(report)
    }

    /// All queued entries with payloads, oldest first
    pub async fn entries(&self) -> Result<Vec<QueueEntry>> {
        let mut entries = Vec::new();
        for (key, path) in self.scan().await? {
            match fs::read(&path).await {
                Ok(bytes) => entries.push(QueueEntry {
                    sequence_key: key,
                    payload: Bytes::from(bytes),
                }),
                // Removed by a concurrent drain between listing and reading
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(entries)
    }

    /// Number of queued entries
    pub async fn len(&self) -> Result<usize> {
        Ok(self.scan().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex as StdMutex};
    use tempfile::tempdir;
    use tokio_test::{assert_err, assert_ok};

    fn payload(text: &str) -> Bytes {
        Bytes::from(text.to_string())
    }

    #[test]
    fn test_key_file_name_round_trip() {
        let key = SequenceKey { millis: 1_709_296_205_123, seq: 7 };
        assert_eq!(key.file_name(), "00000001709296205123-0000000007.json");
        assert_eq!(SequenceKey::from_file_name(&key.file_name()), Some(key));
    }

    #[test]
    fn test_key_rejects_foreign_names() {
        assert_eq!(SequenceKey::from_file_name("notes.txt"), None);
        assert_eq!(SequenceKey::from_file_name("123.json"), None);
        assert_eq!(SequenceKey::from_file_name("12-ab.json"), None);
        assert_eq!(SequenceKey::from_file_name("1-2.json.tmp"), None);
        assert_eq!(SequenceKey::from_file_name("+1-2.json"), None);
    }

    #[test]
    fn test_key_next() {
        let key = SequenceKey { millis: 100, seq: 3 };
        assert_eq!(key.next(200), SequenceKey { millis: 200, seq: 0 });
        assert_eq!(key.next(100), SequenceKey { millis: 100, seq: 4 });
        // Clock stepped backwards
        assert_eq!(key.next(50), SequenceKey { millis: 100, seq: 4 });
        assert!(key.next(50) > key);
    }

    #[test]
    fn test_key_next_rolls_over_exhausted_counter() {
        let key = SequenceKey { millis: 100, seq: u32::MAX };
        let next = key.next(100);
        assert_eq!(next, SequenceKey { millis: 101, seq: 0 });
        assert!(next > key);
        assert!(next.to_string() > key.to_string());
    }

    #[test]
    fn test_key_ordering() {
        let a = SequenceKey { millis: 1, seq: 9 };
        let b = SequenceKey { millis: 2, seq: 0 };
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }

    #[tokio::test]
    async fn test_enqueue_persists_exact_bytes() {
        let dir = tempdir().unwrap();
        let queue = DurableQueue::open(dir.path()).await.unwrap();

        let entry = queue.enqueue(payload(r#"{"a":1}"#)).await.unwrap();
        let on_disk = std::fs::read(dir.path().join(entry.sequence_key.file_name())).unwrap();
        assert_eq!(on_disk, br#"{"a":1}"#);
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_drain_is_noop() {
        let dir = tempdir().unwrap();
        let queue = DurableQueue::open(dir.path()).await.unwrap();

        let mut calls = 0;
        let report = queue
            .drain(|_| {
                calls += 1;
                async { true }
            })
            .await
            .unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(calls, 0);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_drain_in_enqueue_order() {
        let dir = tempdir().unwrap();
        let queue = DurableQueue::open(dir.path()).await.unwrap();
        for i in 0..5 {
            queue.enqueue(payload(&format!("e{}", i))).await.unwrap();
        }

        let mut seen = Vec::new();
        let report = queue
            .drain(|p| {
                seen.push(p);
                async { true }
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![payload("e0"), payload("e1"), payload("e2"), payload("e3"), payload("e4")]);
        assert_eq!(report, DrainReport { delivered: 5, remaining: 0 });
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let dir = tempdir().unwrap();
        let queue = DurableQueue::open(dir.path()).await.unwrap();
        queue.enqueue(payload("e1")).await.unwrap();
        queue.enqueue(payload("e2")).await.unwrap();
        queue.enqueue(payload("e3")).await.unwrap();

        let mut attempted = Vec::new();
        let report = queue
            .drain(|p| {
                let ok = p != payload("e2");
                attempted.push(p);
                async move { ok }
            })
            .await
            .unwrap();

        assert_eq!(attempted, vec![payload("e1"), payload("e2"), payload("e3")]);
        assert_eq!(report, DrainReport { delivered: 2, remaining: 1 });

        let left: Vec<Bytes> = queue.entries().await.unwrap().into_iter().map(|e| e.payload).collect();
        assert_eq!(left, vec![payload("e2")]);

        // A later pass retries it
        let report = queue.drain(|_| async { true }).await.unwrap();
        assert_eq!(report, DrainReport { delivered: 1, remaining: 0 });
    }

    #[tokio::test]
    async fn test_try_drain_skips_while_pass_running() {
        let dir = tempdir().unwrap();
        let queue = DurableQueue::open(dir.path()).await.unwrap();
        queue.enqueue(payload("e1")).await.unwrap();

        let _held = queue.drain_lock.lock().await;
        let skipped = queue.try_drain(|_| async { true }).await.unwrap();
        assert_eq!(skipped, None);
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_try_drain_runs_when_idle() {
        let dir = tempdir().unwrap();
        let queue = DurableQueue::open(dir.path()).await.unwrap();
        queue.enqueue(payload("e1")).await.unwrap();

        let report = assert_ok!(queue.try_drain(|_| async { true }).await);
        assert_eq!(report, Some(DrainReport { delivered: 1, remaining: 0 }));
    }

    #[tokio::test]
    async fn test_entry_decodes_payload() {
        let dir = tempdir().unwrap();
        let queue = DurableQueue::open(dir.path()).await.unwrap();
        let entry = queue.enqueue(payload(r#"{"tech":"NR"}"#)).await.unwrap();
        assert_eq!(entry.decode().unwrap().get("tech").and_then(Value::as_str), Some("NR"));

        let bad = queue.enqueue(payload("{oops")).await.unwrap();
        assert_err!(bad.decode());
    }

    #[tokio::test]
    async fn test_failed_entry_keeps_its_place() {
        let dir = tempdir().unwrap();
        let queue = DurableQueue::open(dir.path()).await.unwrap();
        queue.enqueue(payload("old")).await.unwrap();
        queue.drain(|_| async { false }).await.unwrap();
        queue.enqueue(payload("new")).await.unwrap();

        let order: Vec<Bytes> = queue.entries().await.unwrap().into_iter().map(|e| e.payload).collect();
        assert_eq!(order, vec![payload("old"), payload("new")]);
    }

    #[tokio::test]
    async fn test_keys_keep_increasing_across_reopen() {
        let dir = tempdir().unwrap();
        let before = {
            let queue = DurableQueue::open(dir.path()).await.unwrap();
            queue.enqueue(payload("a")).await.unwrap();
            queue.enqueue(payload("b")).await.unwrap().sequence_key
        };

        let queue = DurableQueue::open(dir.path()).await.unwrap();
        let after = queue.enqueue(payload("c")).await.unwrap().sequence_key;
        assert!(after > before);

        let order: Vec<Bytes> = queue.entries().await.unwrap().into_iter().map(|e| e.payload).collect();
        assert_eq!(order, vec![payload("a"), payload("b"), payload("c")]);
    }

    #[tokio::test]
    async fn test_reopen_resumes_after_future_key() {
        let dir = tempdir().unwrap();
        let future = SequenceKey { millis: u64::from(u32::MAX) * 1_000_000, seq: 5 };
        std::fs::write(dir.path().join(future.file_name()), b"x").unwrap();

        let queue = DurableQueue::open(dir.path()).await.unwrap();
        let key = queue.enqueue(payload("y")).await.unwrap().sequence_key;
        assert_eq!(key, SequenceKey { millis: future.millis, seq: 6 });
    }

    #[tokio::test]
    async fn test_open_cleans_temp_files_and_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("00000000000000000001-0000000000.json.tmp"), b"half").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        let queue = DurableQueue::open(dir.path()).await.unwrap();
        assert!(!dir.path().join("00000000000000000001-0000000000.json.tmp").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("queue");
        let queue = DurableQueue::open(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert_eq!(queue.dir(), nested.as_path());
    }

    #[tokio::test]
    async fn test_enqueue_fails_when_storage_is_gone() {
        let dir = tempdir().unwrap();
        let qdir = dir.path().join("queue");
        let queue = DurableQueue::open(&qdir).await.unwrap();

        std::fs::remove_dir_all(&qdir).unwrap();
        std::fs::write(&qdir, b"not a directory").unwrap();

        match queue.enqueue(payload("lost?")).await {
            Err(RelayError::Queue(msg)) => assert!(msg.contains("failed to persist")),
            other => panic!("Expected Queue error, got: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueues_get_distinct_keys() {
        let dir = tempdir().unwrap();
        let queue = Arc::new(DurableQueue::open(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..32 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue.enqueue(payload(&format!("p{}", i))).await.unwrap().sequence_key
            }));
        }

        let mut keys = HashSet::new();
        for handle in handles {
            assert!(keys.insert(handle.await.unwrap()));
        }
        assert_eq!(queue.len().await.unwrap(), 32);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_drains_never_double_deliver() {
        let dir = tempdir().unwrap();
        let queue = Arc::new(DurableQueue::open(dir.path()).await.unwrap());
        for i in 0..10 {
            queue.enqueue(payload(&format!("d{}", i))).await.unwrap();
        }

        let delivered = Arc::new(StdMutex::new(Vec::new()));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let queue = Arc::clone(&queue);
            let delivered = Arc::clone(&delivered);
            handles.push(tokio::spawn(async move {
                queue
                    .drain(|p| {
                        delivered.lock().unwrap().push(p);
                        async {
                            tokio::task::yield_now().await;
                            true
                        }
                    })
                    .await
                    .unwrap()
            }));
        }

        let total: usize = {
            let mut sum = 0;
            for handle in handles {
                sum += handle.await.unwrap().delivered;
            }
            sum
        };
        assert_eq!(total, 10);
        assert_eq!(delivered.lock().unwrap().len(), 10);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_two_handles_on_one_directory_keep_every_entry() {
        let dir = tempdir().unwrap();
        let seed = SequenceKey { millis: u64::from(u32::MAX) * 1_000_000, seq: 0 };
        std::fs::write(dir.path().join(seed.file_name()), b"seed").unwrap();

        let a = DurableQueue::open(dir.path()).await.unwrap();
        let b = DurableQueue::open(dir.path()).await.unwrap();
        let ka = a.enqueue(payload("record-A")).await.unwrap().sequence_key;
        let kb = b.enqueue(payload("record-B")).await.unwrap().sequence_key;

        assert!(ka > seed);
        assert!(kb > ka);
        let order: Vec<Bytes> = a.entries().await.unwrap().into_iter().map(|e| e.payload).collect();
        assert_eq!(order, vec![payload("seed"), payload("record-A"), payload("record-B")]);

        // Neither handle hands out the other's key afterwards
        let kc = a.enqueue(payload("record-C")).await.unwrap().sequence_key;
        assert!(kc > kb);
        assert_eq!(b.len().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_enqueue_skips_leftover_temp_file() {
        let dir = tempdir().unwrap();
        let queue = DurableQueue::open(dir.path()).await.unwrap();

        let seed = SequenceKey { millis: u64::from(u32::MAX) * 1_000_000, seq: 0 };
        *queue.last_key.lock().await = seed;
        let blocked = seed.next(0);
        let tmp = dir.path().join(format!("{}{}", blocked.file_name(), TMP_SUFFIX));
        std::fs::write(&tmp, b"someone else's write").unwrap();

        let key = queue.enqueue(payload("mine")).await.unwrap().sequence_key;
        assert!(key > blocked);
        assert_eq!(std::fs::read(&tmp).unwrap(), b"someone else's write");
        assert_eq!(std::fs::read(dir.path().join(key.file_name())).unwrap(), b"mine");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_handles_get_distinct_keys() {
        let dir = tempdir().unwrap();
        let a = Arc::new(DurableQueue::open(dir.path()).await.unwrap());
        let b = Arc::new(DurableQueue::open(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let queue = Arc::clone(if i % 2 == 0 { &a } else { &b });
            handles.push(tokio::spawn(async move {
                queue.enqueue(payload(&format!("p{}", i))).await.unwrap().sequence_key
            }));
        }

        let mut keys = HashSet::new();
        for handle in handles {
            assert!(keys.insert(handle.await.unwrap()));
        }
        assert_eq!(a.len().await.unwrap(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_drains_from_two_handles_never_double_deliver() {
        let dir = tempdir().unwrap();
        let a = Arc::new(DurableQueue::open(dir.path()).await.unwrap());
        let b = Arc::new(DurableQueue::open(dir.path()).await.unwrap());
        for i in 0..10 {
            a.enqueue(payload(&format!("d{}", i))).await.unwrap();
        }

        let delivered = Arc::new(StdMutex::new(Vec::new()));
        let mut handles = Vec::new();
        for queue in [Arc::clone(&a), Arc::clone(&b)] {
            let delivered = Arc::clone(&delivered);
            handles.push(tokio::spawn(async move {
                queue
                    .drain(|p| {
                        delivered.lock().unwrap().push(p);
                        async {
                            tokio::task::yield_now().await;
                            true
                        }
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap().delivered;
        }
        assert_eq!(total, 10);
        assert_eq!(delivered.lock().unwrap().len(), 10);
        assert!(b.is_empty().await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_try_drain_skips_while_other_handle_drains() {
        let dir = tempdir().unwrap();
        let a = DurableQueue::open(dir.path()).await.unwrap();
        let b = DurableQueue::open(dir.path()).await.unwrap();
        a.enqueue(payload("e1")).await.unwrap();

        let _held = DirLock::acquire(dir.path().join(DRAIN_LOCK)).await.unwrap();
        assert_eq!(b.try_drain(|_| async { true }).await.unwrap(), None);
        assert_eq!(a.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_kept_and_pass_continues() {
        let dir = tempdir().unwrap();
        let broken = SequenceKey { millis: 1, seq: 0 };
        std::fs::create_dir(dir.path().join(broken.file_name())).unwrap();

        let queue = DurableQueue::open(dir.path()).await.unwrap();
        queue.enqueue(payload("fine")).await.unwrap();

        let mut seen = Vec::new();
        let report = queue
            .drain(|p| {
                seen.push(p);
                async { true }
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![payload("fine")]);
        assert_eq!(report, DrainReport { delivered: 1, remaining: 1 });
        assert_eq!(queue.len().await.unwrap(), 1);
        assert!(dir.path().join(broken.file_name()).is_dir());
    }
}
