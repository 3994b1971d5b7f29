//! Block fingerprinting.
//!
//! A [`Fingerprint`] is the SHA-1 digest of a full `B`-byte block. It is
//! opaque bytes for equality purposes and is also used as a hash map key by
//! the fingerprint index. SHA-1 gives the minimum 160-bit digest width the
//! design calls for; swapping the hash function breaks existing stores
//! since the digest is persisted verbatim in metafile records, so pick one
//! and stick with it.

use openssl::sha::Sha1;

pub const DIGEST_LEN: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; DIGEST_LEN]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Low 32 bits, used by the fingerprint index for bucket selection.
    pub fn low_bits(&self) -> u32 {
        let b = &self.0;
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Computes the fingerprint of a block. Pure, deterministic, no state.
///
/// `data` need not be exactly `B` bytes long (the dedup engine always
/// passes a full `B`-byte buffer, zero-padded as needed, but the hasher
/// itself has no opinion on block size).
pub fn digest(data: &[u8]) -> Fingerprint {
    let mut hasher = Sha1::new();
    hasher.update(data);
    Fingerprint(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_fingerprint() {
        let a = digest(&[0u8; 4096]);
        let b = digest(&[0u8; 4096]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_input_different_fingerprint() {
        let mut buf = [0u8; 4096];
        let a = digest(&buf);
        buf[10] = 1;
        let b = digest(&buf);
        assert_ne!(a, b);
    }
}
