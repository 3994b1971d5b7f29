//! In-memory fingerprint index: fingerprint -> (chunk index, refcount).
//!
//! Ported from the original `fp_table.c`, which kept a fixed array of
//! `BUCKET_NUM` buckets, each a capped open-addressed hash table, for lock
//! partitioning. This version keeps the same sharding shape for the same
//! reason (bound the contention of a single global lock to one bucket in
//! `N_B`) but backs each bucket with a `parking_lot::RwLock<HashMap<..>>`
//! instead of a hand-rolled open-addressed table, and treats the
//! per-bucket capacity as a configurable growth-policy cutoff rather than
//! a hard compile-time cap. Bucket identities never leak past this module.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::chunk_store::{ChunkIndex, ChunkStore};
use crate::error::{BbfsError, Result};
use crate::hash::Fingerprint;

pub const DEFAULT_BUCKET_COUNT: usize = 1024;
pub const DEFAULT_BUCKET_CAPACITY: usize = 65536;

#[derive(Clone, Copy, Debug)]
pub struct IndexRecord {
    pub chunk_index: ChunkIndex,
    pub refcount: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LookupStatus {
    Found,
    Added,
}

pub struct FingerprintIndex {
    buckets: Vec<RwLock<HashMap<Fingerprint, IndexRecord>>>,
    bucket_capacity: usize,
}

impl FingerprintIndex {
    pub fn new(bucket_count: usize, bucket_capacity: usize) -> Self {
        let mut buckets = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            buckets.push(RwLock::new(HashMap::new()));
        }
        FingerprintIndex {
            buckets,
            bucket_capacity,
        }
    }

    fn bucket_for(&self, fp: &Fingerprint) -> usize {
        (fp.low_bits() as usize) % self.buckets.len()
    }

    /// Looks up `fp`. If present, bumps its refcount and returns `Found`.
    /// Otherwise allocates a fresh chunk index via `store`, inserts a new
    /// record with `refcount = 1`, and returns `Added` — the caller is
    /// then responsible for writing the bytes to the new chunk index.
    pub fn lookup_or_insert(
        &self,
        fp: Fingerprint,
        store: &ChunkStore,
    ) -> Result<(IndexRecord, LookupStatus)> {
        let bucket_idx = self.bucket_for(&fp);
        let mut bucket = self.buckets[bucket_idx].write();

        if let Some(rec) = bucket.get_mut(&fp) {
            rec.refcount += 1;
            return Ok((*rec, LookupStatus::Found));
        }

        if bucket.len() >= self.bucket_capacity {
            return Err(BbfsError::IndexExhausted);
        }

        let chunk_index = store.allocate();
        let rec = IndexRecord {
            chunk_index,
            refcount: 1,
        };
        bucket.insert(fp, rec);
        Ok((rec, LookupStatus::Added))
    }

    /// Decrements `fp`'s refcount, removing the record once it reaches
    /// zero. Returns `None` if `fp` was not present (a caller bug, not a
    /// corruption the index can detect on its own).
    pub fn decrement(&self, fp: Fingerprint) -> Option<IndexRecord> {
        let bucket_idx = self.bucket_for(&fp);
        let mut bucket = self.buckets[bucket_idx].write();

        let rec = bucket.get_mut(&fp)?;
        rec.refcount = rec.refcount.saturating_sub(1);
        let result = *rec;
        if result.refcount == 0 {
            bucket.remove(&fp);
        }
        Some(result)
    }

    /// Unconditionally removes `fp`, regardless of refcount. Used to roll
    /// back an `Added` record whose chunk write subsequently failed, so a
    /// cancelled write never leaves the index pointing at unwritten bytes.
    pub fn rollback_added(&self, fp: Fingerprint) {
        let bucket_idx = self.bucket_for(&fp);
        self.buckets[bucket_idx].write().remove(&fp);
    }

    /// Registers a fingerprint discovered while rebuilding the index from
    /// existing metafiles at mount time (`spec.md` §4.3: "the index may be
    /// rebuilt at mount time by scanning all metafiles"). Bumps refcount
    /// if already known, otherwise inserts pointing at the given
    /// already-allocated chunk index.
    pub fn note_existing(&self, fp: Fingerprint, chunk_index: ChunkIndex) {
        let bucket_idx = self.bucket_for(&fp);
        let mut bucket = self.buckets[bucket_idx].write();
        match bucket.get_mut(&fp) {
            Some(rec) => rec.refcount += 1,
            None => {
                bucket.insert(
                    fp,
                    IndexRecord {
                        chunk_index,
                        refcount: 1,
                    },
                );
            }
        }
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<IndexRecord> {
        let bucket_idx = self.bucket_for(fp);
        self.buckets[bucket_idx].read().get(fp).copied()
    }

    /// Total number of distinct fingerprints tracked, across all buckets.
    /// Test/diagnostic helper, not on the engine's hot path.
    pub fn record_count(&self) -> usize {
        self.buckets.iter().map(|b| b.read().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, ChunkStore) {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(&dir.path().join("chunk_store"), 4096).unwrap();
        (dir, store)
    }

    #[test]
    fn first_insert_is_added_second_is_found() {
        let (_dir, store) = store();
        let index = FingerprintIndex::new(DEFAULT_BUCKET_COUNT, DEFAULT_BUCKET_CAPACITY);
        let fp = crate::hash::digest(&[0u8; 4096]);

        let (rec1, status1) = index.lookup_or_insert(fp, &store).unwrap();
        assert_eq!(status1, LookupStatus::Added);
        assert_eq!(rec1.refcount, 1);

        let (rec2, status2) = index.lookup_or_insert(fp, &store).unwrap();
        assert_eq!(status2, LookupStatus::Found);
        assert_eq!(rec2.refcount, 2);
        assert_eq!(rec1.chunk_index, rec2.chunk_index);
    }

    #[test]
    fn decrement_to_zero_removes_record() {
        let (_dir, store) = store();
        let index = FingerprintIndex::new(DEFAULT_BUCKET_COUNT, DEFAULT_BUCKET_CAPACITY);
        let fp = crate::hash::digest(&[1u8; 4096]);

        index.lookup_or_insert(fp, &store).unwrap();
        let rec = index.decrement(fp).unwrap();
        assert_eq!(rec.refcount, 0);
        assert!(index.get(&fp).is_none());
    }

    #[test]
    fn bucket_capacity_exhaustion_errors() {
        let (_dir, store) = store();
        let index = FingerprintIndex::new(1, 2);

        for i in 0..2u8 {
            let mut block = [0u8; 4096];
            block[0] = i;
            let fp = crate::hash::digest(&block);
            index.lookup_or_insert(fp, &store).unwrap();
        }

        let mut block = [0u8; 4096];
        block[0] = 2;
        let fp = crate::hash::digest(&block);
        let err = index.lookup_or_insert(fp, &store).unwrap_err();
        assert!(matches!(err, BbfsError::IndexExhausted));
    }

    #[test]
    fn rollback_added_removes_unconditionally() {
        let (_dir, store) = store();
        let index = FingerprintIndex::new(DEFAULT_BUCKET_COUNT, DEFAULT_BUCKET_CAPACITY);
        let fp = crate::hash::digest(&[2u8; 4096]);

        index.lookup_or_insert(fp, &store).unwrap();
        index.rollback_added(fp);
        assert!(index.get(&fp).is_none());
    }
}
