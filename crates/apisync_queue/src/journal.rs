//! File-backed queue store.
//!
//! The journal is an append-only file:
//!
//! ```text
//! | magic "AQJL" (4) | version (2) | reserved (2) | generation (8) |
//! | len (4) | CBOR record (len) | crc32 (4) |   ... repeated
//! ```
//!
//! Every mutation appends the resulting item state (`Put`) or a removal
//! (`Remove`). Each operation takes an exclusive advisory lock on a sibling
//! `.lock` file, catches up on records written by other processes, applies
//! the mutation, appends it and syncs before unlocking. That makes claims
//! atomic across every process sharing the journal.
//!
//! Compaction writes a fresh file with a bumped generation and renames it
//! over the journal. Readers notice the new generation and replay from the
//! start.

use crate::clock::{Clock, SystemClock};
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::state::{Failed, QueueState};
use crate::store::{ClaimRequest, FailOutcome, QueueStore};
use apisync_protocol::{from_cbor, to_cbor, ItemId, NewItem, QueueItem};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const JOURNAL_MAGIC: [u8; 4] = *b"AQJL";
const JOURNAL_VERSION: u16 = 1;
const HEADER_LEN: u64 = 16;
/// Length prefix plus trailing checksum.
const FRAME_OVERHEAD: usize = 8;
/// Largest payload a frame may declare.
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// The full state of an item after a mutation.
    Put(QueueItem),
    /// An item was removed.
    Remove(ItemId),
}

/// Outcome of [`JournalQueue::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactStats {
    /// Live items written.
    pub items: usize,
    /// File size before.
    pub bytes_before: u64,
    /// File size after.
    pub bytes_after: u64,
}

struct JournalInner {
    state: QueueState,
    generation: u64,
    offset: u64,
}

/// A queue store persisted in an append-only journal file.
///
/// Several `JournalQueue` handles, in one process or many, may open the same
/// path; the lock file serializes their operations.
pub struct JournalQueue {
    path: PathBuf,
    lock_file: File,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<JournalInner>,
}

impl JournalQueue {
    /// Opens or creates a journal on the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be created or the journal is
    /// corrupted before its tail.
    pub fn open(path: impl AsRef<Path>, config: QueueConfig) -> QueueResult<Self> {
        Self::open_with_clock(path, config, Arc::new(SystemClock))
    }

    /// Opens or creates a journal on the given clock.
    ///
    /// # Errors
    ///
    /// See [`JournalQueue::open`].
    pub fn open_with_clock(
        path: impl AsRef<Path>,
        config: QueueConfig,
        clock: Arc<dyn Clock>,
    ) -> QueueResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(&path))?;

        let queue = Self {
            path,
            lock_file,
            config,
            clock,
            inner: Mutex::new(JournalInner {
                state: QueueState::default(),
                generation: 0,
                offset: HEADER_LEN,
            }),
        };

        queue.transact(|_, _| Ok(((), Vec::new())))?;
        info!(path = %queue.path.display(), items = queue.inner.lock().state.len(), "journal queue opened");
        Ok(queue)
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the failure policy.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Reads every record currently in the journal, in file order.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is corrupted.
    pub fn records(&self) -> QueueResult<Vec<JournalRecord>> {
        let _guard = self.inner.lock();
        let _lock = FileLock::exclusive(&self.lock_file)?;
        let mut file = self.open_journal()?;
        read_header(&mut file)?;
        let (records, _) = read_frames(&mut file, HEADER_LEN)?;
        Ok(records)
    }

    /// Rewrites the journal with only the live items.
    ///
    /// # Errors
    ///
    /// Returns an error if the new journal cannot be written or renamed.
    pub fn compact(&self) -> QueueResult<CompactStats> {
        let mut inner = self.inner.lock();
        let _lock = FileLock::exclusive(&self.lock_file)?;
        let mut file = self.open_journal()?;
        self.catch_up(&mut inner, &mut file)?;
        let bytes_before = file.metadata()?.len();

        let generation = inner.generation + 1;
        let mut buf = header_bytes(generation).to_vec();
        let mut items = 0;
        for item in inner.state.items() {
            encode_frame(&JournalRecord::Put(item.clone()), &mut buf)?;
            items += 1;
        }

        let tmp_path = self.path.with_extension("compact");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&buf)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        inner.generation = generation;
        inner.offset = buf.len() as u64;

        let stats = CompactStats {
            items,
            bytes_before,
            bytes_after: buf.len() as u64,
        };
        info!(items, bytes_before, bytes_after = stats.bytes_after, "journal compacted");
        Ok(stats)
    }

    fn open_journal(&self) -> QueueResult<File> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        if file.metadata()?.len() == 0 {
            file.write_all(&header_bytes(1))?;
            file.sync_all()?;
        }
        Ok(file)
    }

    /// Replays whatever other handles appended since our last operation.
    fn catch_up(&self, inner: &mut JournalInner, file: &mut File) -> QueueResult<()> {
        let generation = read_header(file)?;
        if generation != inner.generation {
            if inner.generation != 0 {
                debug!(old = inner.generation, new = generation, "journal generation changed, replaying");
            }
            inner.state = QueueState::default();
            inner.generation = generation;
            inner.offset = HEADER_LEN;
        }

        let (records, good_end) = read_frames(file, inner.offset)?;
        for record in records {
            match record {
                JournalRecord::Put(item) => inner.state.put(item),
                JournalRecord::Remove(id) => {
                    inner.state.delete(id);
                }
            }
        }

        let len = file.metadata()?.len();
        if good_end < len {
            warn!(path = %self.path.display(), discarded = len - good_end, "discarding torn journal tail");
            file.set_len(good_end)?;
        }
        inner.offset = good_end;
        Ok(())
    }

    fn append(&self, inner: &mut JournalInner, file: &mut File, records: &[JournalRecord]) -> QueueResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for record in records {
            encode_frame(record, &mut buf)?;
        }

        file.seek(SeekFrom::Start(inner.offset))?;
        file.write_all(&buf)?;
        file.sync_data()?;
        inner.offset += buf.len() as u64;
        Ok(())
    }

    /// Runs one locked read-modify-append cycle.
    fn transact<R>(
        &self,
        op: impl FnOnce(&mut QueueState, u64) -> QueueResult<(R, Vec<JournalRecord>)>,
    ) -> QueueResult<R> {
        let mut inner = self.inner.lock();
        let _lock = FileLock::exclusive(&self.lock_file)?;
        let mut file = self.open_journal()?;
        self.catch_up(&mut inner, &mut file)?;

        let now = self.clock.now();
        let (result, records) = op(&mut inner.state, now)?;
        self.append(&mut inner, &mut file, &records)?;
        Ok(result)
    }
}

impl QueueStore for JournalQueue {
    fn create_item(&self, item: NewItem) -> QueueResult<ItemId> {
        let stored = self.transact(|state, now| {
            let stored = state.insert(item, now);
            Ok((stored.clone(), vec![JournalRecord::Put(stored)]))
        })?;
        debug!(item_id = %stored.id, mapping = %stored.name, op = %stored.op, "queue item created");
        Ok(stored.id)
    }

    fn merge_item(&self, item: NewItem) -> QueueResult<ItemId> {
        let (stored, created) = self.transact(|state, now| {
            let (stored, created) = state.merge(item, now);
            Ok(((stored.clone(), created), vec![JournalRecord::Put(stored)]))
        })?;
        debug!(item_id = %stored.id, mapping = %stored.name, op = %stored.op, created, "queue item merged");
        Ok(stored.id)
    }

    fn claim(&self, request: &ClaimRequest) -> QueueResult<Vec<QueueItem>> {
        let claimed = self.transact(|state, now| {
            let claimed = state.claim(request, now);
            let records = claimed.iter().cloned().map(JournalRecord::Put).collect();
            Ok((claimed, records))
        })?;
        for item in &claimed {
            debug!(item_id = %item.id, mapping = %item.name, expire = item.expire, "queue item claimed");
        }
        Ok(claimed)
    }

    fn delete_item(&self, id: ItemId) -> QueueResult<()> {
        self.transact(|state, _| match state.delete(id) {
            Some(_) => Ok(((), vec![JournalRecord::Remove(id)])),
            None => {
                debug!(item_id = %id, "delete of missing queue item ignored");
                Ok(((), Vec::new()))
            }
        })
    }

    fn release_item(&self, id: ItemId) -> QueueResult<()> {
        self.transact(|state, now| {
            let item = state.release(id, now)?;
            Ok(((), vec![JournalRecord::Put(item)]))
        })?;
        debug!(item_id = %id, "queue item released");
        Ok(())
    }

    fn fail_item(&self, id: ItemId, error: &str) -> QueueResult<FailOutcome> {
        let failed = self.transact(|state, now| {
            let failed = state.fail(id, now, &self.config)?;
            let record = match &failed {
                Failed::Retry(item) => JournalRecord::Put(item.clone()),
                Failed::Dropped(_) => JournalRecord::Remove(id),
            };
            Ok((failed, vec![record]))
        })?;

        match failed {
            Failed::Retry(item) => {
                debug!(item_id = %id, failures = item.failures, expire = item.expire, error, "queue item failed, will retry");
                Ok(FailOutcome {
                    failures: item.failures,
                    available_at: item.expire,
                })
            }
            Failed::Dropped(item) => {
                warn!(item_id = %id, mapping = %item.name, failures = item.failures, error, "queue item dropped at failure ceiling");
                Err(QueueError::FailureLimitReached {
                    id,
                    failures: item.failures,
                    message: error.to_string(),
                })
            }
        }
    }

    fn get_item(&self, id: ItemId) -> QueueResult<Option<QueueItem>> {
        self.transact(|state, _| Ok((state.get(id).cloned(), Vec::new())))
    }

    fn items(&self) -> QueueResult<Vec<QueueItem>> {
        self.transact(|state, _| Ok((state.items().cloned().collect(), Vec::new())))
    }

    fn number_of_items(&self) -> QueueResult<usize> {
        self.transact(|state, _| Ok((state.len(), Vec::new())))
    }

    fn garbage_collect(&self) -> QueueResult<usize> {
        let removed = self.transact(|state, _| {
            let exhausted = state.exhausted(&self.config);
            for id in &exhausted {
                state.delete(*id);
            }
            let records = exhausted.iter().copied().map(JournalRecord::Remove).collect();
            Ok((exhausted.len(), records))
        })?;
        if removed > 0 {
            warn!(count = removed, "removed queue items past failure ceiling");
        }
        Ok(removed)
    }
}

/// Holds an exclusive advisory lock until dropped.
struct FileLock<'a> {
    file: &'a File,
}

impl<'a> FileLock<'a> {
    fn exclusive(file: &'a File) -> QueueResult<Self> {
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file) {
            warn!(error = %e, "failed to release journal lock");
        }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

fn header_bytes(generation: u64) -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    header[0..4].copy_from_slice(&JOURNAL_MAGIC);
    header[4..6].copy_from_slice(&JOURNAL_VERSION.to_le_bytes());
    header[8..16].copy_from_slice(&generation.to_le_bytes());
    header
}

fn read_header(file: &mut File) -> QueueResult<u64> {
    let mut header = [0u8; HEADER_LEN as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)
        .map_err(|_| QueueError::corrupt(0, "journal header truncated"))?;

    if header[0..4] != JOURNAL_MAGIC {
        return Err(QueueError::corrupt(0, "bad journal magic"));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != JOURNAL_VERSION {
        return Err(QueueError::corrupt(4, format!("unsupported journal version {version}")));
    }

    let mut generation = [0u8; 8];
    generation.copy_from_slice(&header[8..16]);
    Ok(u64::from_le_bytes(generation))
}

fn encode_frame(record: &JournalRecord, buf: &mut Vec<u8>) -> QueueResult<()> {
    let payload = to_cbor(record)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| QueueError::corrupt(0, "journal record larger than 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
    Ok(())
}

/// Decodes frames from `start` to the end of the file.
///
/// Returns the records and the offset just past the last intact frame. An
/// incomplete or failing frame at the very end is a torn write and stops
/// decoding. Damage followed by an intact frame is corruption.
fn read_frames(file: &mut File, start: u64) -> QueueResult<(Vec<JournalRecord>, u64)> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(start))?;
    file.read_to_end(&mut buf)?;

    let mut records = Vec::new();
    let mut pos = 0usize;

    while buf.len() - pos >= FRAME_OVERHEAD {
        let len = frame_len(&buf, pos);
        let frame_end = match pos.checked_add(FRAME_OVERHEAD + len) {
            Some(end) if len <= MAX_RECORD_LEN && end <= buf.len() => end,
            _ => {
                if intact_frame_after(&buf, pos) {
                    return Err(QueueError::corrupt(start + pos as u64, "bad frame length"));
                }
                break;
            }
        };

        let payload = &buf[pos + 4..pos + 4 + len];
        let stored_crc = u32::from_le_bytes([
            buf[frame_end - 4],
            buf[frame_end - 3],
            buf[frame_end - 2],
            buf[frame_end - 1],
        ]);

        if compute_crc32(payload) != stored_crc {
            if frame_end == buf.len() {
                break;
            }
            return Err(QueueError::corrupt(start + pos as u64, "checksum mismatch"));
        }

        let record = from_cbor(payload)
            .map_err(|e| QueueError::corrupt(start + pos as u64, e.to_string()))?;
        records.push(record);
        pos = frame_end;
    }

    Ok((records, start + pos as u64))
}

fn frame_len(buf: &[u8], pos: usize) -> usize {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]) as usize
}

/// Returns true if a decodable frame starts anywhere after `pos`.
fn intact_frame_after(buf: &[u8], pos: usize) -> bool {
    (pos + 1..buf.len().saturating_sub(FRAME_OVERHEAD - 1)).any(|at| {
        let len = frame_len(buf, at);
        if len == 0 || len > MAX_RECORD_LEN || at + FRAME_OVERHEAD + len > buf.len() {
            return false;
        }
        let payload = &buf[at + 4..at + 4 + len];
        let end = at + FRAME_OVERHEAD + len;
        let stored_crc = u32::from_le_bytes([buf[end - 4], buf[end - 3], buf[end - 2], buf[end - 1]]);
        compute_crc32(payload) == stored_crc && from_cbor::<JournalRecord>(payload).is_ok()
    })
}

/// CRC32 (IEEE polynomial).
fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}
