//! Per-user-file sidecar recording, for each logical block, the
//! fingerprint and stored byte count.
//!
//! Ported from `metafile.c`, which did one `lseek` + `read`/`write` of a
//! fixed `struct meta_data` per call. This version uses positioned I/O
//! (`pread`/`pwrite`) so it shares a `std::fs::File` safely across threads
//! without a shared cursor, and replaces the original `meta_del`, which
//! wrote a 4-byte `EOF` sentinel over a 28-byte record slot and corrupted
//! the file, with `meta_del_tail`: a real `ftruncate` to the exact byte
//! boundary of the records being dropped.

use std::fs::File;
use std::os::unix::fs::FileExt;

use crate::chunk_store::ChunkIndex;
use crate::error::{BbfsError, Result};
use crate::hash::{Fingerprint, DIGEST_LEN};

/// `fingerprint[20] || chunk_id: u32 LE || size: u32 LE`
pub const RECORD_SIZE: usize = DIGEST_LEN + 4 + 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetaEntry {
    pub fingerprint: Fingerprint,
    pub chunk_id: ChunkIndex,
    pub size: u32,
}

impl MetaEntry {
    fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[..DIGEST_LEN].copy_from_slice(self.fingerprint.as_bytes());
        buf[DIGEST_LEN..DIGEST_LEN + 4].copy_from_slice(&self.chunk_id.0.to_le_bytes());
        buf[DIGEST_LEN + 4..].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; RECORD_SIZE]) -> Self {
        let mut fp = [0u8; DIGEST_LEN];
        fp.copy_from_slice(&buf[..DIGEST_LEN]);
        let chunk_id = u32::from_le_bytes(buf[DIGEST_LEN..DIGEST_LEN + 4].try_into().unwrap());
        let size = u32::from_le_bytes(buf[DIGEST_LEN + 4..].try_into().unwrap());
        MetaEntry {
            fingerprint: Fingerprint::from_bytes(fp),
            chunk_id: ChunkIndex(chunk_id),
            size,
        }
    }
}

pub struct Metafile {
    file: File,
}

impl Metafile {
    pub fn from_file(file: File) -> Result<Self> {
        let meta = Metafile { file };
        meta.validate_length()?;
        Ok(meta)
    }

    fn validate_length(&self) -> Result<()> {
        let len = self.file.metadata()?.len();
        if len % RECORD_SIZE as u64 != 0 {
            return Err(BbfsError::CorruptedStore(format!(
                "metafile length {} is not a multiple of the record size {}",
                len, RECORD_SIZE
            )));
        }
        Ok(())
    }

    /// Number of block entries currently recorded.
    pub fn record_count(&self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        if len % RECORD_SIZE as u64 != 0 {
            return Err(BbfsError::CorruptedStore(format!(
                "metafile length {} is not a multiple of the record size {}",
                len, RECORD_SIZE
            )));
        }
        Ok(len / RECORD_SIZE as u64)
    }

    /// Reads the record for logical block `k`. Absent when `k` is at or
    /// past the metafile's current length.
    pub fn meta_read(&self, k: u64) -> Result<Option<MetaEntry>> {
        let offset = k * RECORD_SIZE as u64;
        let len = self.file.metadata()?.len();
        if offset >= len {
            return Ok(None);
        }

        let mut buf = [0u8; RECORD_SIZE];
        self.file.read_exact_at(&mut buf, offset).map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                BbfsError::CorruptedStore(format!(
                    "short read of metafile record {} ({})",
                    k, err
                ))
            } else {
                BbfsError::Io(err)
            }
        })?;

        Ok(Some(MetaEntry::decode(&buf)))
    }

    /// Writes the record for logical block `k`, extending the file if
    /// needed. Callers must write blocks in order (or have already filled
    /// any gap) — holes are not a valid metafile state.
    pub fn meta_write(&self, k: u64, entry: MetaEntry) -> Result<()> {
        let offset = k * RECORD_SIZE as u64;
        let buf = entry.encode();
        self.file.write_all_at(&buf, offset)?;
        Ok(())
    }

    /// Truncates the metafile to exactly `k` records, discarding
    /// records `>= k`. Replaces the original `meta_del`'s corrupting
    /// sentinel-overwrite approach.
    pub fn meta_del_tail(&self, k: u64) -> Result<()> {
        self.file.set_len(k * RECORD_SIZE as u64)?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn open_meta(dir: &tempfile::TempDir, name: &str) -> Metafile {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(dir.path().join(name))
            .unwrap();
        Metafile::from_file(file).unwrap()
    }

    #[test]
    fn read_of_empty_metafile_is_absent() {
        let dir = tempdir().unwrap();
        let meta = open_meta(&dir, "a.meta");
        assert!(meta.meta_read(0).unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let meta = open_meta(&dir, "a.meta");
        let entry = MetaEntry {
            fingerprint: digest(&[7u8; 4096]),
            chunk_id: ChunkIndex(3),
            size: 4096,
        };
        meta.meta_write(0, entry).unwrap();
        let read_back = meta.meta_read(0).unwrap().unwrap();
        assert_eq!(read_back, entry);
        assert_eq!(meta.record_count().unwrap(), 1);
    }

    #[test]
    fn del_tail_truncates_exactly() {
        let dir = tempdir().unwrap();
        let meta = open_meta(&dir, "a.meta");
        for k in 0..3u64 {
            meta.meta_write(
                k,
                MetaEntry {
                    fingerprint: digest(&[k as u8; 4096]),
                    chunk_id: ChunkIndex(k as u32),
                    size: 4096,
                },
            )
            .unwrap();
        }
        assert_eq!(meta.record_count().unwrap(), 3);

        meta.meta_del_tail(1).unwrap();
        assert_eq!(meta.record_count().unwrap(), 1);
        assert!(meta.meta_read(1).unwrap().is_none());
        assert!(meta.meta_read(0).unwrap().is_some());
    }

    #[test]
    fn misaligned_length_is_corrupted_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.meta");
        std::fs::write(&path, vec![0u8; RECORD_SIZE + 1]).unwrap();
        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let err = Metafile::from_file(file).unwrap_err();
        assert!(matches!(err, BbfsError::CorruptedStore(_)));
    }
}
