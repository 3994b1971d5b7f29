//! The dedup engine: orchestrates the chunk store, fingerprint index, and
//! per-file metafiles behind a block-addressable read/write/truncate API.
//!
//! This is the piece the original C implementation never factored out —
//! `bb_write_dedupe_1` in `bbfs.c` inlines chunk store access, fingerprint
//! lookup, and metafile writes into one function with raw globals. Here an
//! `Engine` value owns `Arc<ChunkStore>` and `Arc<FingerprintIndex>` and is
//! constructed once at mount, then passed by reference into every
//! operation — no process-wide statics.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chunk_store::{ChunkIndex, ChunkStore};
use crate::error::{BbfsError, Result};
use crate::fp_index::{FingerprintIndex, LookupStatus};
use crate::hash::digest;
use crate::metafile::{MetaEntry, Metafile};

/// Size/blksize/blocks report for `stat()`-like callers, per `spec.md` §4.5.4.
#[derive(Debug, Clone, Copy)]
pub struct SizeInfo {
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
}

/// An open user file: its metafile plus the per-block locks guarding the
/// read-modify-write window for each logical block index. Locks are
/// created lazily and dropped once uncontended, since the number of
/// blocks touched concurrently is small relative to a file's total size.
pub struct OpenFile {
    path: PathBuf,
    meta: Metafile,
    block_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl OpenFile {
    fn block_lock(&self, k: u64) -> Arc<Mutex<()>> {
        let mut locks = self.block_locks.lock();
        locks.entry(k).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn release_block_lock_if_uncontended(&self, k: u64, lock: Arc<Mutex<()>>) {
        let mut locks = self.block_locks.lock();
        // Our `lock` handle plus the one in the map: if nobody else is
        // waiting, drop the map's copy so the table doesn't grow forever.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&k);
        }
    }
}

/// How `rmw_block` should compute the recorded logical size of the block it
/// just rewrote, given whatever entry previously occupied that slot.
enum BlockSizePolicy {
    /// An interior block (gap-fill, or a range block that isn't the file's
    /// last block): always fully live.
    Full,
    /// The file's last block. `write_end` is how far this write's own range
    /// reaches into the block; the recorded size is that or the block's
    /// prior size, whichever is larger, so a write that lands inside an
    /// already-larger tail doesn't shrink it (`spec.md` §4.5.4, §8 property 4).
    TailAtLeast(u32),
    /// An exact override, irrespective of any prior entry — used by
    /// `truncate`, which is explicitly shrinking the tail.
    Exact(u32),
}

impl BlockSizePolicy {
    fn resolve(&self, block_size: u32, existing: Option<&MetaEntry>) -> u32 {
        match *self {
            BlockSizePolicy::Full => block_size,
            BlockSizePolicy::TailAtLeast(write_end) => {
                let prior_size = existing.map(|e| e.size).unwrap_or(0);
                write_end.max(prior_size)
            }
            BlockSizePolicy::Exact(size) => size,
        }
    }
}

pub struct Engine {
    chunk_store: Arc<ChunkStore>,
    index: Arc<FingerprintIndex>,
    block_size: u64,
    verify_on_read: bool,
}

impl Engine {
    pub fn new(chunk_store: Arc<ChunkStore>, index: Arc<FingerprintIndex>, verify_on_read: bool) -> Self {
        let block_size = chunk_store.block_size() as u64;
        Engine {
            chunk_store,
            index,
            block_size,
            verify_on_read,
        }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Opens (creating if necessary) the metafile at `path`, returning a
    /// handle the adapter holds for the lifetime of the FUSE file handle.
    pub fn open(&self, path: &Path) -> Result<Arc<OpenFile>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let meta = Metafile::from_file(file)?;
        Ok(Arc::new(OpenFile {
            path: path.to_path_buf(),
            meta,
            block_locks: Mutex::new(HashMap::new()),
        }))
    }

    /// Write-through design: every write already hit the metafile and
    /// chunk store synchronously, so close only needs to fsync.
    pub fn close(&self, handle: &OpenFile) -> Result<()> {
        handle.meta.sync()
    }

    /// Decrements every referenced fingerprint's refcount, then removes
    /// the backing metafile.
    pub fn unlink(&self, handle: &OpenFile) -> Result<()> {
        let count = handle.meta.record_count()?;
        for k in 0..count {
            if let Some(entry) = handle.meta.meta_read(k)? {
                self.index.decrement(entry.fingerprint);
            }
        }
        std::fs::remove_file(&handle.path)?;
        Ok(())
    }

    pub fn size(&self, handle: &OpenFile) -> Result<SizeInfo> {
        let size = self.logical_size(&handle.meta)?;
        let count = handle.meta.record_count()?;
        Ok(SizeInfo {
            size,
            blksize: self.block_size,
            blocks: count * (self.block_size / 512),
        })
    }

    /// Stats a metafile by path without creating one, for the adapter's
    /// `getattr`/`lookup` — unlike `open`, a missing file is `NotFound`
    /// rather than silently created.
    pub fn stat_path(&self, path: &Path) -> Result<SizeInfo> {
        let file = std::fs::File::open(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                BbfsError::NotFound(format!("{:?}", path))
            } else {
                BbfsError::Io(err)
            }
        })?;
        let meta = Metafile::from_file(file)?;
        let size = self.logical_size(&meta)?;
        let count = meta.record_count()?;
        Ok(SizeInfo {
            size,
            blksize: self.block_size,
            blocks: count * (self.block_size / 512),
        })
    }

    fn logical_size(&self, meta: &Metafile) -> Result<u64> {
        let count = meta.record_count()?;
        if count == 0 {
            return Ok(0);
        }
        let last = meta.meta_read(count - 1)?.ok_or_else(|| {
            BbfsError::CorruptedStore(format!(
                "metafile reports {} records but record {} is missing",
                count,
                count - 1
            ))
        })?;
        Ok((count - 1) * self.block_size + last.size as u64)
    }

    /// Reuses an existing chunk for `fp` if the index already knows it, or
    /// allocates and writes a new one. Rolls back the index record if the
    /// chunk-store write fails, so a cancelled write never leaves the index
    /// pointing at unwritten bytes (`spec.md` §5, "Cancellation / timeouts").
    fn allocate_or_reuse(&self, fp: crate::hash::Fingerprint, block_buf: &[u8]) -> Result<ChunkIndex> {
        let (record, status) = self.index.lookup_or_insert(fp, &self.chunk_store)?;

        if status == LookupStatus::Added {
            if let Err(err) = self.chunk_store.write_chunk(record.chunk_index, block_buf) {
                self.index.rollback_added(fp);
                return Err(err);
            }
        }

        Ok(record.chunk_index)
    }

    /// Read-modify-write of logical block `k`, shared by `write` (gap-fill
    /// and in-range blocks) and `truncate` (the rewritten tail block).
    ///
    /// `overlay` is applied to a `block_size`-byte buffer seeded from the
    /// block's current contents (or zeros, if none exist yet); the
    /// resulting buffer is hashed, deduplicated, and persisted. `size_policy`
    /// decides the recorded logical size of the block, given whatever entry
    /// already occupied this slot (`spec.md` §4.5.4).
    fn rmw_block<F>(
        &self,
        handle: &OpenFile,
        k: u64,
        size_policy: BlockSizePolicy,
        overlay: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut [u8]),
    {
        let lock = handle.block_lock(k);

        // Scoped so the guard is dropped before `lock` is handed to
        // `release_block_lock_if_uncontended` below — holding both at once
        // would be a self-borrow the compiler can't reconcile with moving
        // the Arc out.
        let result: Result<()> = (|| {
            let _guard = lock.lock();

            let existing = handle.meta.meta_read(k)?;

            let mut block_buf = match &existing {
                Some(entry) => self.chunk_store.read_chunk(entry.chunk_id)?,
                None => vec![0u8; self.block_size as usize],
            };

            overlay(&mut block_buf);

            let fp = digest(&block_buf);

            // Same content as what's already there: reuse the chunk in
            // place without touching its refcount, which already accounts
            // for exactly this metafile slot. Routing this case through
            // `lookup_or_insert` would bump the refcount for a reference
            // that already existed, inflating it past the live entry count
            // (`spec.md` §8 property 3).
            let chunk_id = match &existing {
                Some(old) if old.fingerprint == fp => old.chunk_id,
                Some(old) => {
                    let id = self.allocate_or_reuse(fp, &block_buf)?;
                    self.index.decrement(old.fingerprint);
                    id
                }
                None => self.allocate_or_reuse(fp, &block_buf)?,
            };

            let size_after = size_policy.resolve(self.block_size as u32, existing.as_ref());

            handle.meta.meta_write(
                k,
                MetaEntry {
                    fingerprint: fp,
                    chunk_id,
                    size: size_after,
                },
            )?;

            Ok(())
        })();

        handle.release_block_lock_if_uncontended(k, lock);
        result
    }

    /// See `spec.md` §4.5.1.
    pub fn write(&self, handle: &OpenFile, buf: &[u8], offset: u64) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let size = buf.len() as u64;
        let b = self.block_size;
        let first = offset / b;
        let last = (offset + size - 1) / b;
        let prior_count = handle.meta.record_count()?;

        // No holes: if this write starts past the current end of the
        // file, fill the gap with whole zero blocks first. These
        // deduplicate against each other (and against any other
        // all-zero block in the repository) for free.
        if prior_count < first {
            for k in prior_count..first {
                self.rmw_block(handle, k, BlockSizePolicy::Full, |block| {
                    for byte in block.iter_mut() {
                        *byte = 0;
                    }
                })?;
            }
        }

        let mut written = 0usize;
        let mut consumed = 0usize;

        for k in first..=last {
            let block_start = k * b;
            let write_start_in_block = offset.max(block_start) - block_start;
            let write_end_in_block = (offset + size).min(block_start + b) - block_start;
            let bytes_in_block = (write_end_in_block - write_start_in_block) as usize;
            let write_start_in_block = write_start_in_block as usize;

            // `k` is the file's last block whenever this write reaches it
            // and no block past it already exists — true both for a
            // brand-new tail (`prior_count <= k`) and for a write that only
            // extends or overwrites the existing tail in place
            // (`prior_count == k + 1`).
            let is_last_block = k == last && k + 1 >= prior_count;
            let size_policy = if is_last_block {
                BlockSizePolicy::TailAtLeast((write_start_in_block + bytes_in_block) as u32)
            } else {
                BlockSizePolicy::Full
            };

            let chunk = &buf[consumed..consumed + bytes_in_block];
            let result = self.rmw_block(handle, k, size_policy, |block| {
                block[write_start_in_block..write_start_in_block + bytes_in_block]
                    .copy_from_slice(chunk);
            });

            match result {
                Ok(()) => {
                    written += bytes_in_block;
                    consumed += bytes_in_block;
                }
                Err(err) => {
                    if written == 0 {
                        return Err(err);
                    }
                    return Ok(written);
                }
            }
        }

        Ok(written)
    }

    /// See `spec.md` §4.5.2.
    pub fn read(&self, handle: &OpenFile, size: u64, offset: u64) -> Result<Vec<u8>> {
        let file_size = self.logical_size(&handle.meta)?;
        if size == 0 || offset >= file_size {
            return Ok(Vec::new());
        }

        let b = self.block_size;
        let effective_end = (offset + size).min(file_size);
        let clamped_size = effective_end - offset;

        let first = offset / b;
        let last = (offset + clamped_size - 1) / b;

        let mut out = vec![0u8; ((last - first + 1) * b) as usize];

        for k in first..=last {
            let lock = handle.block_lock(k);

            let result: Result<()> = (|| {
                let _guard = lock.lock();

                let entry = handle.meta.meta_read(k)?;
                let slot_start = ((k - first) * b) as usize;
                let slot_end = slot_start + b as usize;
                let slot = &mut out[slot_start..slot_end];

                if let Some(entry) = entry {
                    let chunk = self.chunk_store.read_chunk(entry.chunk_id)?;

                    if self.verify_on_read {
                        let actual = digest(&chunk);
                        if actual != entry.fingerprint {
                            return Err(BbfsError::CorruptedStore(format!(
                                "block {} fingerprint mismatch on read",
                                k
                            )));
                        }
                    }

                    slot.copy_from_slice(&chunk);
                    if (entry.size as u64) < b {
                        for byte in &mut slot[entry.size as usize..] {
                            *byte = 0;
                        }
                    }
                }
                // absent entry: slot stays zero-filled, already initialized

                Ok(())
            })();

            handle.release_block_lock_if_uncontended(k, lock);
            result?;
        }

        let start_in_first = (offset - first * b) as usize;
        let want = clamped_size as usize;
        Ok(out[start_in_first..start_in_first + want].to_vec())
    }

    /// See `spec.md` §4.5.3. Growing past the current size is handled by
    /// delegating to `write` with a zero-filled extension, which reuses
    /// the same gap-fill and partial-block machinery.
    pub fn truncate(&self, handle: &OpenFile, new_size: u64) -> Result<()> {
        let current = self.logical_size(&handle.meta)?;

        if new_size > current {
            let gap = vec![0u8; (new_size - current) as usize];
            self.write(handle, &gap, current)?;
            return Ok(());
        }

        let b = self.block_size;
        let last_k = new_size / b;
        let last_tail = new_size % b;
        let prior_count = handle.meta.record_count()?;

        if last_tail == 0 {
            for k in last_k..prior_count {
                if let Some(entry) = handle.meta.meta_read(k)? {
                    self.index.decrement(entry.fingerprint);
                }
            }
            handle.meta.meta_del_tail(last_k)?;
            return Ok(());
        }

        self.rmw_block(handle, last_k, BlockSizePolicy::Exact(last_tail as u32), |block| {
            for byte in &mut block[last_tail as usize..] {
                *byte = 0;
            }
        })?;

        for k in (last_k + 1)..prior_count {
            if let Some(entry) = handle.meta.meta_read(k)? {
                self.index.decrement(entry.fingerprint);
            }
        }
        handle.meta.meta_del_tail(last_k + 1)?;

        Ok(())
    }

    /// Rebuilds the in-memory fingerprint index by scanning every
    /// metafile under `backing_root` (`spec.md` §4.3: "the index may be
    /// rebuilt at mount time by scanning all metafiles"). Files that
    /// don't parse as metafiles (wrong length) are skipped with a
    /// warning rather than aborting the mount.
    pub fn rebuild_index_from_dir(&self, backing_root: &Path) -> Result<()> {
        self.rebuild_index_from_dir_inner(backing_root)
    }

    fn rebuild_index_from_dir_inner(&self, dir: &Path) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                self.rebuild_index_from_dir_inner(&path)?;
                continue;
            }

            if !file_type.is_file() {
                continue;
            }

            match self.rebuild_index_from_file(&path) {
                Ok(()) => {}
                Err(err) => {
                    log::warn!("skipping {:?} during index rebuild: {}", path, err);
                }
            }
        }
        Ok(())
    }

    fn rebuild_index_from_file(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new().read(true).open(path)?;
        let meta = Metafile::from_file(file)?;
        let count = meta.record_count()?;
        for k in 0..count {
            if let Some(entry) = meta.meta_read(k)? {
                self.index.note_existing(entry.fingerprint, entry.chunk_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp_index::{DEFAULT_BUCKET_CAPACITY, DEFAULT_BUCKET_COUNT};
    use tempfile::tempdir;

    fn engine(dir: &tempfile::TempDir, block_size: usize) -> Engine {
        let store = Arc::new(ChunkStore::open(&dir.path().join("chunk_store"), block_size).unwrap());
        let index = Arc::new(FingerprintIndex::new(DEFAULT_BUCKET_COUNT, DEFAULT_BUCKET_CAPACITY));
        Engine::new(store, index, false)
    }

    fn chunk_count(engine: &Engine) -> u64 {
        engine.chunk_store.allocated_count()
    }

    #[test]
    fn s1_zero_file_dedup() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let a = engine.open(&dir.path().join("a")).unwrap();

        let zeros = vec![0u8; 8192];
        let written = engine.write(&a, &zeros, 0).unwrap();
        assert_eq!(written, 8192);

        assert_eq!(a.meta.record_count().unwrap(), 2);
        let e0 = a.meta.meta_read(0).unwrap().unwrap();
        let e1 = a.meta.meta_read(1).unwrap().unwrap();
        assert_eq!(e0.chunk_id, e1.chunk_id);

        let rec = engine.index.get(&e0.fingerprint).unwrap();
        assert_eq!(rec.refcount, 2);
        assert_eq!(chunk_count(&engine), 1);
    }

    #[test]
    fn s2_cross_file_dedup() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let a = engine.open(&dir.path().join("a")).unwrap();
        engine.write(&a, &vec![0u8; 8192], 0).unwrap();

        let b = engine.open(&dir.path().join("b")).unwrap();
        engine.write(&b, &vec![0u8; 4096], 0).unwrap();

        assert_eq!(chunk_count(&engine), 1);
        let eb = b.meta.meta_read(0).unwrap().unwrap();
        let ea = a.meta.meta_read(0).unwrap().unwrap();
        assert_eq!(eb.chunk_id, ea.chunk_id);

        let rec = engine.index.get(&eb.fingerprint).unwrap();
        assert_eq!(rec.refcount, 3);
    }

    #[test]
    fn s3_partial_block_rmw() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let c = engine.open(&dir.path().join("c")).unwrap();

        engine.write(&c, &vec![0x41u8; 4096], 0).unwrap();
        let old_entry = c.meta.meta_read(0).unwrap().unwrap();
        let old_refcount_before = engine.index.get(&old_entry.fingerprint).unwrap().refcount;

        engine.write(&c, &[0x42u8; 5], 10).unwrap();

        let new_entry = c.meta.meta_read(0).unwrap().unwrap();
        assert_ne!(new_entry.fingerprint, old_entry.fingerprint);

        let old_refcount_after = engine.index.get(&old_entry.fingerprint).map(|r| r.refcount).unwrap_or(0);
        assert_eq!(old_refcount_after, old_refcount_before - 1);

        let data = engine.read(&c, 4096, 0).unwrap();
        let mut expected = vec![0x41u8; 4096];
        expected[10..15].copy_from_slice(&[0x42u8; 5]);
        assert_eq!(data, expected);
    }

    #[test]
    fn s4_truncate_tail_aligned() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let d = engine.open(&dir.path().join("d")).unwrap();
        engine.write(&d, &vec![0x7u8; 10000], 0).unwrap();

        engine.truncate(&d, 4096).unwrap();

        assert_eq!(d.meta.record_count().unwrap(), 1);
        let info = engine.size(&d).unwrap();
        assert_eq!(info.size, 4096);
    }

    #[test]
    fn s5_truncate_into_block() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let e = engine.open(&dir.path().join("e")).unwrap();

        let mut data = vec![0u8; 5000];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        engine.write(&e, &data, 0).unwrap();

        let tail_bytes = data[4096..4100].to_vec();

        engine.truncate(&e, 4100).unwrap();

        assert_eq!(e.meta.record_count().unwrap(), 2);
        let entry1 = e.meta.meta_read(1).unwrap().unwrap();
        assert_eq!(entry1.size, 4);

        let out = engine.read(&e, 4, 4096).unwrap();
        assert_eq!(out, tail_bytes);
    }

    #[test]
    fn s6_read_past_eof_is_short() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let f = engine.open(&dir.path().join("f")).unwrap();
        engine.write(&f, &vec![9u8; 100], 0).unwrap();

        let out = engine.read(&f, 8192, 0).unwrap();
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn idempotent_overwrite_no_growth() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let f = engine.open(&dir.path().join("f")).unwrap();
        let data = vec![5u8; 4096];

        engine.write(&f, &data, 0).unwrap();
        let after_first = chunk_count(&engine);

        engine.write(&f, &data, 0).unwrap();
        let after_second = chunk_count(&engine);

        assert_eq!(after_first, after_second);

        let entry = f.meta.meta_read(0).unwrap().unwrap();
        let rec = engine.index.get(&entry.fingerprint).unwrap();
        assert_eq!(rec.refcount, 1);
    }

    #[test]
    fn write_extending_partial_tail_does_not_inflate_size() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let f = engine.open(&dir.path().join("f")).unwrap();

        engine.write(&f, &[1u8; 100], 0).unwrap();
        let info = engine.size(&f).unwrap();
        assert_eq!(info.size, 100);

        engine.write(&f, &[2u8; 100], 100).unwrap();

        let info = engine.size(&f).unwrap();
        assert_eq!(info.size, 200);
        assert_eq!(f.meta.record_count().unwrap(), 1);

        let out = engine.read(&f, 200, 0).unwrap();
        let mut expected = vec![1u8; 100];
        expected.extend(vec![2u8; 100]);
        assert_eq!(out, expected);
    }

    #[test]
    fn write_overwriting_middle_of_tail_keeps_tail_size() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let f = engine.open(&dir.path().join("f")).unwrap();

        engine.write(&f, &[1u8; 100], 0).unwrap();
        engine.write(&f, &[9u8; 10], 10).unwrap();

        let info = engine.size(&f).unwrap();
        assert_eq!(info.size, 100);

        let out = engine.read(&f, 100, 0).unwrap();
        let mut expected = vec![1u8; 100];
        expected[10..20].copy_from_slice(&[9u8; 10]);
        assert_eq!(out, expected);
    }

    #[test]
    fn write_gap_fills_with_zero_blocks() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let f = engine.open(&dir.path().join("f")).unwrap();

        engine.write(&f, &[1u8; 4], 4096 * 3).unwrap();

        assert_eq!(f.meta.record_count().unwrap(), 4);
        for k in 0..3 {
            let entry = f.meta.meta_read(k).unwrap().unwrap();
            assert_eq!(entry.size, 4096);
            let data = engine.chunk_store.read_chunk(entry.chunk_id).unwrap();
            assert_eq!(data, vec![0u8; 4096]);
        }
    }

    #[test]
    fn truncate_grow_zero_fills() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let f = engine.open(&dir.path().join("f")).unwrap();
        engine.write(&f, &[1u8; 10], 0).unwrap();

        engine.truncate(&f, 4096 + 10).unwrap();

        let info = engine.size(&f).unwrap();
        assert_eq!(info.size, 4096 + 10);
        let data = engine.read(&f, info.size, 0).unwrap();
        assert_eq!(&data[10..4096], vec![0u8; 4096 - 10].as_slice());
    }

    #[test]
    fn unlink_decrements_refcounts() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096);
        let a = engine.open(&dir.path().join("a")).unwrap();
        engine.write(&a, &vec![0u8; 4096], 0).unwrap();
        let entry = a.meta.meta_read(0).unwrap().unwrap();

        engine.unlink(&a).unwrap();

        assert!(engine.index.get(&entry.fingerprint).is_none());
        assert!(!dir.path().join("a").exists());
    }
}
