//! Mount entry point. `bbfs.c`'s `main` parsed `argv`, stashed the
//! backing root in a `bb_state` struct handed to `fuse_main` as private
//! data, and refused to run as root. This does the same three things —
//! parse, refuse root, hand off to the FUSE loop — with the dedup
//! engine's own construction and mount-time index rebuild in between.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use fuser::MountOption;

use bbfs::config::Options;
use bbfs::engine::Engine;
use bbfs::fuse_adapter::BbfsAdapter;

fn main() -> ExitCode {
    let opts = Options::parse();

    if let Err(msg) = Options::refuse_root() {
        eprintln!("bbfs: {}", msg);
        return ExitCode::FAILURE;
    }

    if let Err(err) = bbfs::logging::init(opts.foreground) {
        eprintln!("bbfs: failed to initialize logging: {}", err);
        return ExitCode::FAILURE;
    }

    if let Err(err) = run(opts) {
        log::error!("mount failed: {}", err);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(opts: Options) -> anyhow::Result<()> {
    let store_dir = opts.resolved_store_dir();
    std::fs::create_dir_all(&store_dir)?;
    std::fs::create_dir_all(&opts.backing_root)?;

    let chunk_store = Arc::new(bbfs::chunk_store::ChunkStore::open(
        &store_dir.join("chunks"),
        opts.block_size,
    )?);
    let index = Arc::new(bbfs::fp_index::FingerprintIndex::new(
        opts.buckets,
        opts.bucket_capacity,
    ));

    let engine = Arc::new(Engine::new(chunk_store, index, opts.verify_on_read));

    log::info!(
        "rebuilding fingerprint index from {:?}",
        opts.backing_root
    );
    engine.rebuild_index_from_dir(&opts.backing_root)?;

    let adapter = BbfsAdapter::new(opts.backing_root.clone(), engine);

    let mut mount_options = vec![MountOption::FSName("bbfs".to_string())];
    if opts.allow_other {
        mount_options.push(MountOption::AllowOther);
    }

    log::info!("mounting {:?} at {:?}", opts.backing_root, opts.mount_point);
    fuser::mount2(adapter, &opts.mount_point, &mount_options)?;

    Ok(())
}
