//! File-backed log-structured engine.
//!
//! Every committed batch is appended to `data.log` as one checksummed frame.
//! An in-memory index maps each live key to the location of its latest value
//! in the log, and is rebuilt by scanning the log on open. A frame that is
//! torn or fails its checksum ends the log: it and everything after it are
//! truncated away during recovery.

use super::{Batch, Engine, WriteBatch, WriteOp};
use crate::config::EngineOptions;
use crate::error::{PoolError, Result};
use crate::types::ENGINE_LOGKV;
use fs2::FileExt;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Magic bytes for a log frame.
const FRAME_MAGIC: &[u8; 4] = b"LKV\0";

/// Current frame format version.
const FRAME_VERSION: u8 = 1;

/// Frame header size (magic + version + seq + body length).
const FRAME_HEADER_SIZE: usize = 4 + 1 + 8 + 4;

const OP_PUT: u8 = 0;
const OP_DELETE: u8 = 1;

const LOG_FILE_NAME: &str = "data.log";
const LOCK_FILE_NAME: &str = "LOCK";

/// Where the current value of a key lives in the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ValueLoc {
    offset: u64,
    len: u32,
}

struct LogWriter {
    file: File,
    /// End of the last complete frame.
    size: u64,
    next_seq: u64,
}

struct LogInner {
    _lock_file: File,
    writer: Mutex<LogWriter>,
    reader: Mutex<File>,
    index: RwLock<HashMap<Vec<u8>, ValueLoc>>,
    /// Values keyed by log offset. Offsets are never reused, so entries never go stale.
    cache: Mutex<LruCache<u64, Vec<u8>>>,
    sync_writes: bool,
}

/// Durable key-value store backed by an append-only log file.
pub struct LogEngine {
    path: PathBuf,
    inner: Arc<LogInner>,
}

impl LogEngine {
    /// Open or create a store in directory `path`.
    pub fn open(path: impl AsRef<Path>, options: &EngineOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let lock_file = Self::acquire_lock(&path)?;

        let log_path = path.join(LOG_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&log_path)?;

        let mut index = HashMap::new();
        let (size, next_seq, frames) = Self::recover(&mut file, &mut index)?;

        let file_len = file.metadata()?.len();
        if file_len > size {
            warn!(
                path = %log_path.display(),
                valid = size,
                dropped = file_len - size,
                "truncating torn log tail"
            );
            file.set_len(size)?;
            file.sync_all()?;
        }

        info!(path = %path.display(), frames, keys = index.len(), "opened log engine");

        let reader = File::open(&log_path)?;
        let cache_size = NonZeroUsize::new(options.cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            path,
            inner: Arc::new(LogInner {
                _lock_file: lock_file,
                writer: Mutex::new(LogWriter {
                    file,
                    size,
                    next_seq,
                }),
                reader: Mutex::new(reader),
                index: RwLock::new(index),
                cache: Mutex::new(LruCache::new(cache_size)),
                sync_writes: options.sync_writes,
            }),
        })
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.inner.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.index.read().is_empty()
    }

    /// Force pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.inner.writer.lock().file.sync_all()?;
        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join(LOCK_FILE_NAME))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| PoolError::Locked)?;

        Ok(lock_file)
    }

    /// Scan frames from the start of the log, rebuilding the index.
    ///
    /// Returns the end of the last valid frame, the next sequence number and
    /// the number of frames replayed.
    fn recover(file: &mut File, index: &mut HashMap<Vec<u8>, ValueLoc>) -> Result<(u64, u64, u64)> {
        let file_len = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&*file);

        let mut offset = 0u64;
        let mut next_seq = 1u64;
        let mut frames = 0u64;

        loop {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            if &header[0..4] != FRAME_MAGIC || header[4] != FRAME_VERSION {
                debug!(offset, "invalid frame header");
                break;
            }

            let mut seq_bytes = [0u8; 8];
            seq_bytes.copy_from_slice(&header[5..13]);
            let seq = u64::from_le_bytes(seq_bytes);

            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(&header[13..17]);
            let body_len = u32::from_le_bytes(len_bytes) as usize;

            // A length running past the end of the file can only be a torn frame
            let remaining = file_len.saturating_sub(offset + FRAME_HEADER_SIZE as u64);
            if body_len as u64 + 4 > remaining {
                debug!(offset, seq, body_len, "torn frame");
                break;
            }

            let mut body = vec![0u8; body_len];
            let mut checksum_bytes = [0u8; 4];
            if reader.read_exact(&mut body).is_err() || reader.read_exact(&mut checksum_bytes).is_err() {
                debug!(offset, seq, "torn frame");
                break;
            }

            if u32::from_le_bytes(checksum_bytes) != crc32fast::hash(&body) {
                debug!(offset, seq, "frame checksum mismatch");
                break;
            }

            let body_start = offset + FRAME_HEADER_SIZE as u64;
            if let Err(e) = apply_body(&body, body_start, index) {
                debug!(offset, seq, error = %e, "undecodable frame body");
                break;
            }

            offset = body_start + body_len as u64 + 4;
            next_seq = seq + 1;
            frames += 1;
        }

        Ok((offset, next_seq, frames))
    }

    fn read_value(inner: &LogInner, loc: ValueLoc) -> Result<Vec<u8>> {
        if let Some(value) = inner.cache.lock().get(&loc.offset).cloned() {
            return Ok(value);
        }

        let mut value = vec![0u8; loc.len as usize];
        {
            let mut reader = inner.reader.lock();
            reader.seek(SeekFrom::Start(loc.offset))?;
            reader.read_exact(&mut value)?;
        }

        inner.cache.lock().put(loc.offset, value.clone());
        Ok(value)
    }
}

impl Engine for LogEngine {
    fn kind(&self) -> &'static str {
        ENGINE_LOGKV
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let loc = match self.inner.index.read().get(key) {
            Some(loc) => *loc,
            None => return Ok(None),
        };
        Self::read_value(&self.inner, loc).map(Some)
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(LogBatch {
            inner: Arc::clone(&self.inner),
            ops: WriteBatch::new(),
        })
    }
}

struct LogBatch {
    inner: Arc<LogInner>,
    ops: WriteBatch,
}

impl Batch for LogBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.ops.put(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.ops.delete(key);
    }

    fn dump(&self) -> Result<Vec<u8>> {
        self.ops.dump()
    }

    fn load(&mut self, data: &[u8]) -> Result<()> {
        self.ops.load(data)
    }

    fn write(&self) -> Result<()> {
        if self.ops.is_empty() {
            return Ok(());
        }

        let body = encode_body(self.ops.ops());
        let mut writer = self.inner.writer.lock();
        let seq = writer.next_seq;

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len() + 4);
        frame.extend_from_slice(FRAME_MAGIC);
        frame.push(FRAME_VERSION);
        frame.extend_from_slice(&seq.to_le_bytes());
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());

        let start = writer.size;
        if let Err(e) = write_frame(&mut writer.file, start, &frame, self.inner.sync_writes) {
            // Drop whatever part of the frame made it out
            if let Err(truncate_err) = writer.file.set_len(start) {
                warn!(offset = start, error = %truncate_err, "failed to drop partial frame");
            }
            return Err(e);
        }

        writer.size = start + frame.len() as u64;
        writer.next_seq = seq + 1;

        // Index updates happen under the writer lock so they follow log order
        let mut index = self.inner.index.write();
        apply_body(&body, start + FRAME_HEADER_SIZE as u64, &mut index)?;

        Ok(())
    }

    fn len(&self) -> usize {
        self.ops.len()
    }
}

fn write_frame(file: &mut File, at: u64, frame: &[u8], sync: bool) -> Result<()> {
    file.seek(SeekFrom::Start(at))?;
    file.write_all(frame)?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}

/// Encode ops as: kind (u8), key length (u32), key, then value length (u32)
/// and value for puts.
fn encode_body(ops: &[WriteOp]) -> Vec<u8> {
    let mut body = Vec::new();
    for op in ops {
        match op {
            WriteOp::Put { key, value } => {
                body.push(OP_PUT);
                body.extend_from_slice(&(key.len() as u32).to_le_bytes());
                body.extend_from_slice(key);
                body.extend_from_slice(&(value.len() as u32).to_le_bytes());
                body.extend_from_slice(value);
            }
            WriteOp::Delete { key } => {
                body.push(OP_DELETE);
                body.extend_from_slice(&(key.len() as u32).to_le_bytes());
                body.extend_from_slice(key);
            }
        }
    }
    body
}

/// Replay an encoded body into the index. `body_start` is the body's file offset.
///
/// The body is fully validated before the index is touched.
fn apply_body(body: &[u8], body_start: u64, index: &mut HashMap<Vec<u8>, ValueLoc>) -> Result<()> {
    let mut updates: Vec<(Vec<u8>, Option<ValueLoc>)> = Vec::new();
    let mut pos = 0usize;

    while pos < body.len() {
        let kind = body[pos];
        pos += 1;

        let key_len = read_len(body, &mut pos)?;
        let key = take(body, &mut pos, key_len)?.to_vec();

        match kind {
            OP_PUT => {
                let value_len = read_len(body, &mut pos)?;
                let value_offset = pos;
                take(body, &mut pos, value_len)?;
                updates.push((
                    key,
                    Some(ValueLoc {
                        offset: body_start + value_offset as u64,
                        len: value_len as u32,
                    }),
                ));
            }
            OP_DELETE => updates.push((key, None)),
            other => {
                return Err(PoolError::InvalidFormat(format!("Unknown op kind: {}", other)));
            }
        }
    }

    for (key, loc) in updates {
        match loc {
            Some(loc) => {
                index.insert(key, loc);
            }
            None => {
                index.remove(&key);
            }
        }
    }
    Ok(())
}

fn read_len(body: &[u8], pos: &mut usize) -> Result<usize> {
    let bytes = take(body, pos, 4)?;
    let mut len = [0u8; 4];
    len.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(len) as usize)
}

fn take<'a>(body: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(n)
        .filter(|end| *end <= body.len())
        .ok_or_else(|| PoolError::InvalidFormat("Frame body truncated".into()))?;
    let slice = &body[*pos..end];
    *pos = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(path: &Path) -> LogEngine {
        LogEngine::open(path, &EngineOptions::default()).unwrap()
    }

    #[test]
    fn test_write_and_get() {
        let dir = TempDir::new().unwrap();
        let engine = open(dir.path());

        let mut batch = engine.new_batch();
        batch.put(b"alpha", b"1");
        batch.put(b"beta", b"2");
        batch.write().unwrap();

        assert_eq!(engine.get(b"alpha").unwrap(), Some(b"1".to_vec()));
        assert_eq!(engine.get(b"beta").unwrap(), Some(b"2".to_vec()));
        assert_eq!(engine.get(b"gamma").unwrap(), None);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_overwrite_and_delete() {
        let dir = TempDir::new().unwrap();
        let engine = open(dir.path());

        let mut first = engine.new_batch();
        first.put(b"key", b"old");
        first.put(b"gone", b"soon");
        first.write().unwrap();

        // Warm the cache with the old value
        assert_eq!(engine.get(b"key").unwrap(), Some(b"old".to_vec()));

        let mut second = engine.new_batch();
        second.put(b"key", b"new");
        second.delete(b"gone");
        second.write().unwrap();

        assert_eq!(engine.get(b"key").unwrap(), Some(b"new".to_vec()));
        assert_eq!(engine.get(b"gone").unwrap(), None);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();

        {
            let engine = open(dir.path());
            for i in 0..5u32 {
                let mut batch = engine.new_batch();
                batch.put(format!("key{}", i).as_bytes(), &i.to_le_bytes());
                batch.write().unwrap();
            }
        }

        let engine = open(dir.path());
        assert_eq!(engine.len(), 5);
        assert_eq!(engine.get(b"key3").unwrap(), Some(3u32.to_le_bytes().to_vec()));

        // Sequence continues after reopen
        assert_eq!(engine.inner.writer.lock().next_seq, 6);
    }

    #[test]
    fn test_torn_tail_truncated() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join(LOG_FILE_NAME);

        let good_size = {
            let engine = open(dir.path());
            let mut batch = engine.new_batch();
            batch.put(b"kept", b"yes");
            batch.write().unwrap();

            let mut batch = engine.new_batch();
            batch.put(b"lost", b"no");
            batch.write().unwrap();
            let size = engine.inner.writer.lock().size;
            size
        };

        // Chop the second frame in half
        let full = fs::read(&log_path).unwrap();
        let first_frame_end = first_frame_len(&full);
        let cut = (first_frame_end + good_size) / 2;
        OpenOptions::new().write(true).open(&log_path).unwrap().set_len(cut).unwrap();

        let engine = open(dir.path());
        assert_eq!(engine.get(b"kept").unwrap(), Some(b"yes".to_vec()));
        assert_eq!(engine.get(b"lost").unwrap(), None);
        assert_eq!(fs::metadata(&log_path).unwrap().len(), first_frame_end);

        // Writes after recovery land after the last good frame
        let mut batch = engine.new_batch();
        batch.put(b"after", b"recovery");
        batch.write().unwrap();
        drop(engine);

        let engine = open(dir.path());
        assert_eq!(engine.get(b"after").unwrap(), Some(b"recovery".to_vec()));
        assert_eq!(engine.get(b"kept").unwrap(), Some(b"yes".to_vec()));
    }

    #[test]
    fn test_oversized_length_treated_as_torn() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join(LOG_FILE_NAME);

        {
            let engine = open(dir.path());
            let mut batch = engine.new_batch();
            batch.put(b"kept", b"yes");
            batch.write().unwrap();
        }

        let mut bytes = fs::read(&log_path).unwrap();
        let good_len = bytes.len() as u64;
        bytes.extend_from_slice(FRAME_MAGIC);
        bytes.push(FRAME_VERSION);
        bytes.extend_from_slice(&2u64.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(b"short");
        fs::write(&log_path, &bytes).unwrap();

        let engine = open(dir.path());
        assert_eq!(engine.get(b"kept").unwrap(), Some(b"yes".to_vec()));
        assert_eq!(engine.len(), 1);
        assert_eq!(fs::metadata(&log_path).unwrap().len(), good_len);
        assert_eq!(engine.inner.writer.lock().next_seq, 2);
    }

    fn first_frame_len(log: &[u8]) -> u64 {
        let body_len = u32::from_le_bytes(log[13..17].try_into().unwrap()) as u64;
        FRAME_HEADER_SIZE as u64 + body_len + 4
    }

    #[test]
    fn test_corrupt_frame_dropped() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join(LOG_FILE_NAME);

        {
            let engine = open(dir.path());
            let mut batch = engine.new_batch();
            batch.put(b"key", b"value");
            batch.write().unwrap();
        }

        let mut bytes = fs::read(&log_path).unwrap();
        let last = bytes.len() - 5;
        bytes[last] ^= 0xff;
        fs::write(&log_path, &bytes).unwrap();

        let engine = open(dir.path());
        assert!(engine.is_empty());
        assert_eq!(fs::metadata(&log_path).unwrap().len(), 0);
    }

    #[test]
    fn test_exclusive_lock() {
        let dir = TempDir::new().unwrap();
        let _engine = open(dir.path());

        let second = LogEngine::open(dir.path(), &EngineOptions::default());
        assert!(matches!(second, Err(PoolError::Locked)));
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = open(dir.path());

        engine.new_batch().write().unwrap();
        assert_eq!(engine.inner.writer.lock().size, 0);
    }

    #[test]
    fn test_unsynced_writes_survive_explicit_sync() {
        let dir = TempDir::new().unwrap();
        let options = EngineOptions {
            sync_writes: false,
            ..Default::default()
        };

        {
            let engine = LogEngine::open(dir.path(), &options).unwrap();
            let mut batch = engine.new_batch();
            batch.put(b"lazy", b"write");
            batch.write().unwrap();
            engine.sync().unwrap();
        }

        let engine = LogEngine::open(dir.path(), &options).unwrap();
        assert_eq!(engine.get(b"lazy").unwrap(), Some(b"write".to_vec()));
    }

    #[test]
    fn test_values_beyond_cache_capacity() {
        let dir = TempDir::new().unwrap();
        let options = EngineOptions {
            cache_capacity: 2,
            ..Default::default()
        };
        let engine = LogEngine::open(dir.path(), &options).unwrap();

        let mut batch = engine.new_batch();
        for i in 0..10u8 {
            batch.put(&[i], &[i, i]);
        }
        batch.write().unwrap();

        for i in 0..10u8 {
            assert_eq!(engine.get(&[i]).unwrap(), Some(vec![i, i]));
        }
    }
}
