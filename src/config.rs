//! Mount-time options.
//!
//! The original `bbfs` took exactly two positional arguments (a backing
//! directory and a mountpoint) and left FUSE's own `-o` options to pass
//! through untouched. This keeps that shape but surfaces the dedup
//! engine's own knobs — block size, index sharding, verify-on-read — as
//! proper flags instead of compile-time constants in `params.h`.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::fp_index::{DEFAULT_BUCKET_CAPACITY, DEFAULT_BUCKET_COUNT};

pub const DEFAULT_BLOCK_SIZE: usize = 4096;

#[derive(Parser, Debug)]
#[clap(name = "bbfs", about = "A block-deduplicating FUSE filesystem")]
pub struct Options {
    /// Directory holding the chunk store, fingerprint index snapshot, and
    /// per-file metafiles, mirroring the mounted namespace.
    #[clap(parse(from_os_str))]
    pub backing_root: PathBuf,

    /// Where to mount the deduplicated view.
    #[clap(parse(from_os_str))]
    pub mount_point: PathBuf,

    /// Directory holding the chunk store's single backing file. Defaults
    /// to a hidden sibling of `backing_root` so it never shows up as a
    /// stray entry in the mounted namespace (`backing_root` is mirrored
    /// into the mount 1:1, and directory listings pass straight through).
    #[clap(long, parse(from_os_str))]
    pub store_dir: Option<PathBuf>,

    /// Fixed block size in bytes. Changing this for an existing backing
    /// root is not supported — the chunk store has no record of what
    /// size it was created with.
    #[clap(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Number of fingerprint index buckets (lock/shard count).
    #[clap(long, default_value_t = DEFAULT_BUCKET_COUNT)]
    pub buckets: usize,

    /// Maximum distinct fingerprints tracked per bucket before writes to
    /// that bucket start failing with ENOSPC.
    #[clap(long, default_value_t = DEFAULT_BUCKET_CAPACITY)]
    pub bucket_capacity: usize,

    /// Re-hash every chunk on read and compare against the stored
    /// fingerprint, trading throughput for early corruption detection.
    #[clap(long)]
    pub verify_on_read: bool,

    /// Stay in the foreground instead of daemonizing.
    #[clap(long)]
    pub foreground: bool,

    /// Allow other users to access the mount (maps to FUSE's
    /// `allow_other` option; requires `user_allow_other` in
    /// `/etc/fuse.conf`).
    #[clap(long)]
    pub allow_other: bool,
}

impl Options {
    /// `bbfs.c`'s `main` rejected being run as root outright; this is the
    /// same check via `nix` instead of a raw `getuid()` call.
    pub fn refuse_root() -> Result<(), String> {
        if nix::unistd::Uid::current().is_root() {
            return Err("refusing to run as root".to_string());
        }
        Ok(())
    }

    /// Resolves `store_dir`, defaulting to a hidden sibling directory of
    /// `backing_root`.
    pub fn resolved_store_dir(&self) -> PathBuf {
        if let Some(dir) = &self.store_dir {
            return dir.clone();
        }
        let name = self
            .backing_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        let parent = self.backing_root.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!(".{}.bbfs-store", name))
    }
}
