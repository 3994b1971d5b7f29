//! A block-level, content-deduplicating filesystem.
//!
//! Every regular file is represented on the backing host filesystem not
//! by its own bytes but by a *metafile*: a sequence of fixed-size-block
//! records, each naming a content fingerprint. Identical blocks —
//! whether in one file or shared across many — are written to the
//! [`chunk_store`] exactly once and referenced by index, with the
//! [`fp_index`] tracking how many metafile records point at each
//! fingerprint so a chunk is never reclaimed while still referenced.
//!
//! Directory structure, names, and permissions are not part of this
//! design: the [`fuse_adapter`] delegates those straight through to the
//! backing directory and only routes regular-file data operations
//! through the [`engine`].
//!
//! This replaces the original `bbfs`'s global `store_fd`/fixed bucket
//! arrays with an [`Engine`](engine::Engine) value owning an
//! `Arc<ChunkStore>` and `Arc<FingerprintIndex>`, constructed once at
//! mount and threaded through every request.

pub mod chunk_store;
pub mod config;
pub mod engine;
pub mod error;
pub mod fp_index;
pub mod fuse_adapter;
pub mod hash;
pub mod logging;
pub mod metafile;

pub use engine::Engine;
pub use error::{BbfsError, Result};
