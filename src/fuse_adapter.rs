//! Kernel-facing FUSE shell.
//!
//! Mirrors `bbfs.c`'s split: `bb_fullpath` turns every inbound path into a
//! path under the backing root, and everything about names, directories,
//! and permissions is delegated straight through to the host filesystem.
//! Only regular-file data operations (`read`/`write`/`setattr` size
//! changes/`unlink`) are routed into the [`Engine`]. `fuser` replaces the
//! libfuse C API the original bound against, so this works in inode
//! terms instead of raw path strings; an [`InodeTable`] bridges the two.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use parking_lot::Mutex;

use crate::engine::{Engine, OpenFile};
use crate::error::BbfsError;

const TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;

/// Bidirectional map between inode numbers and paths relative to the
/// backing root. `fuser` is inode-addressed; the backing filesystem (and
/// the engine, and the original C code) is path-addressed.
struct InodeTable {
    paths: HashMap<u64, PathBuf>,
    inos: HashMap<PathBuf, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut paths = HashMap::new();
        let mut inos = HashMap::new();
        paths.insert(ROOT_INO, PathBuf::new());
        inos.insert(PathBuf::new(), ROOT_INO);
        InodeTable { paths, inos, next: 2 }
    }

    fn ino_for(&mut self, rel: &Path) -> u64 {
        if let Some(&ino) = self.inos.get(rel) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.inos.insert(rel.to_path_buf(), ino);
        self.paths.insert(ino, rel.to_path_buf());
        ino
    }

    fn path_of(&self, ino: u64) -> Option<PathBuf> {
        self.paths.get(&ino).cloned()
    }

    fn rename(&mut self, old: &Path, new: &Path) {
        if let Some(ino) = self.inos.remove(old) {
            self.inos.insert(new.to_path_buf(), ino);
            self.paths.insert(ino, new.to_path_buf());
        }
    }

    fn forget_path(&mut self, rel: &Path) {
        if let Some(ino) = self.inos.remove(rel) {
            self.paths.remove(&ino);
        }
    }
}

pub struct BbfsAdapter {
    backing_root: PathBuf,
    engine: Arc<Engine>,
    inodes: Mutex<InodeTable>,
    open_files: Mutex<HashMap<u64, Arc<OpenFile>>>,
    next_fh: AtomicU64,
}

impl BbfsAdapter {
    pub fn new(backing_root: PathBuf, engine: Arc<Engine>) -> Self {
        BbfsAdapter {
            backing_root,
            engine,
            inodes: Mutex::new(InodeTable::new()),
            open_files: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }

    fn full_path(&self, rel: &Path) -> PathBuf {
        self.backing_root.join(rel)
    }

    fn child_rel(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        let parent_rel = self.inodes.lock().path_of(parent)?;
        Some(parent_rel.join(name))
    }

    fn attr_for(&self, ino: u64, rel: &Path) -> Result<FileAttr, i32> {
        let full = self.full_path(rel);
        let md = std::fs::symlink_metadata(&full).map_err(io_errno)?;
        let kind = if md.is_dir() {
            FileType::Directory
        } else if md.file_type().is_symlink() {
            FileType::Symlink
        } else {
            FileType::RegularFile
        };

        let size = if kind == FileType::RegularFile {
            self.engine
                .stat_path(&full)
                .map(|info| info.size)
                .unwrap_or(0)
        } else {
            md.len()
        };

        use std::os::unix::fs::MetadataExt;
        Ok(FileAttr {
            ino,
            size,
            blocks: (size + 511) / 512,
            atime: md.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
            mtime: md.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            ctime: md.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            crtime: SystemTime::UNIX_EPOCH,
            kind,
            perm: (md.mode() & 0o7777) as u16,
            nlink: md.nlink() as u32,
            uid: md.uid(),
            gid: md.gid(),
            rdev: 0,
            blksize: self.engine.block_size() as u32,
            flags: 0,
        })
    }

    fn handle_for_fh(&self, fh: u64) -> Option<Arc<OpenFile>> {
        self.open_files.lock().get(&fh).cloned()
    }
}

fn io_errno(err: std::io::Error) -> i32 {
    err.raw_os_error().unwrap_or(libc::EIO)
}

fn bbfs_errno(err: BbfsError) -> i32 {
    -err.errno()
}

impl Filesystem for BbfsAdapter {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let rel = match self.child_rel(parent, name) {
            Some(rel) => rel,
            None => return reply.error(libc::ENOENT),
        };
        let ino = self.inodes.lock().ino_for(&rel);
        match self.attr_for(ino, &rel) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => {
                self.inodes.lock().forget_path(&rel);
                reply.error(errno)
            }
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let rel = match self.inodes.lock().path_of(ino) {
            Some(rel) => rel,
            None => return reply.error(libc::ENOENT),
        };
        match self.attr_for(ino, &rel) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let rel = match self.inodes.lock().path_of(ino) {
            Some(rel) => rel,
            None => return reply.error(libc::ENOENT),
        };
        let full = self.full_path(&rel);

        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            if let Err(err) = std::fs::set_permissions(&full, std::fs::Permissions::from_mode(mode)) {
                return reply.error(io_errno(err));
            }
        }

        if uid.is_some() || gid.is_some() {
            let uid = uid.map(nix::unistd::Uid::from_raw);
            let gid = gid.map(nix::unistd::Gid::from_raw);
            if let Err(err) = nix::unistd::chown(&full, uid, gid) {
                return reply.error(nix_errno(err));
            }
        }

        if let Some(new_size) = size {
            let open_handle = fh.and_then(|fh| self.handle_for_fh(fh));
            let result = match open_handle {
                Some(handle) => self.engine.truncate(&handle, new_size),
                None => match self.engine.open(&full) {
                    Ok(handle) => self.engine.truncate(&handle, new_size),
                    Err(err) => Err(err),
                },
            };
            if let Err(err) = result {
                return reply.error(bbfs_errno(err));
            }
        }

        match self.attr_for(ino, &rel) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let rel = match self.child_rel(parent, name) {
            Some(rel) => rel,
            None => return reply.error(libc::ENOENT),
        };
        let full = self.full_path(&rel);
        if let Err(err) = std::fs::create_dir(&full) {
            return reply.error(io_errno(err));
        }
        let _ = set_mode(&full, mode);
        let ino = self.inodes.lock().ino_for(&rel);
        match self.attr_for(ino, &rel) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let rel = match self.child_rel(parent, name) {
            Some(rel) => rel,
            None => return reply.error(libc::ENOENT),
        };
        let full = self.full_path(&rel);
        match std::fs::remove_dir(&full) {
            Ok(()) => {
                self.inodes.lock().forget_path(&rel);
                reply.ok()
            }
            Err(err) => reply.error(io_errno(err)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let rel = match self.child_rel(parent, name) {
            Some(rel) => rel,
            None => return reply.error(libc::ENOENT),
        };
        let full = self.full_path(&rel);
        let handle = match self.engine.open(&full) {
            Ok(handle) => handle,
            Err(err) => return reply.error(bbfs_errno(err)),
        };
        match self.engine.unlink(&handle) {
            Ok(()) => {
                self.inodes.lock().forget_path(&rel);
                reply.ok()
            }
            Err(err) => reply.error(bbfs_errno(err)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let old_rel = match self.child_rel(parent, name) {
            Some(rel) => rel,
            None => return reply.error(libc::ENOENT),
        };
        let new_rel = match self.child_rel(newparent, newname) {
            Some(rel) => rel,
            None => return reply.error(libc::ENOENT),
        };
        let old_full = self.full_path(&old_rel);
        let new_full = self.full_path(&new_rel);
        match std::fs::rename(&old_full, &new_full) {
            Ok(()) => {
                self.inodes.lock().rename(&old_rel, &new_rel);
                reply.ok()
            }
            Err(err) => reply.error(io_errno(err)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let rel = match self.inodes.lock().path_of(ino) {
            Some(rel) => rel,
            None => return reply.error(libc::ENOENT),
        };
        let full = self.full_path(&rel);
        match self.engine.open(&full) {
            Ok(handle) => {
                let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
                self.open_files.lock().insert(fh, handle);
                reply.opened(fh, 0);
            }
            Err(err) => reply.error(bbfs_errno(err)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let rel = match self.child_rel(parent, name) {
            Some(rel) => rel,
            None => return reply.error(libc::ENOENT),
        };
        let full = self.full_path(&rel);
        let handle = match self.engine.open(&full) {
            Ok(handle) => handle,
            Err(err) => return reply.error(bbfs_errno(err)),
        };
        let _ = set_mode(&full, mode);
        let ino = self.inodes.lock().ino_for(&rel);
        let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
        self.open_files.lock().insert(fh, handle);
        match self.attr_for(ino, &rel) {
            Ok(attr) => reply.created(&TTL, &attr, 0, fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let handle = match self.handle_for_fh(fh) {
            Some(handle) => handle,
            None => return reply.error(libc::EBADF),
        };
        match self.engine.read(&handle, size as u64, offset as u64) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(bbfs_errno(err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let handle = match self.handle_for_fh(fh) {
            Some(handle) => handle,
            None => return reply.error(libc::EBADF),
        };
        match self.engine.write(&handle, data, offset as u64) {
            Ok(written) => reply.written(written as u32),
            Err(err) => reply.error(bbfs_errno(err)),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.handle_for_fh(fh) {
            Some(handle) => match self.engine.close(&handle) {
                Ok(()) => reply.ok(),
                Err(err) => reply.error(bbfs_errno(err)),
            },
            None => reply.error(libc::EBADF),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.open_files.lock().remove(&fh);
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.handle_for_fh(fh) {
            Some(handle) => match self.engine.close(&handle) {
                Ok(()) => reply.ok(),
                Err(err) => reply.error(bbfs_errno(err)),
            },
            None => reply.error(libc::EBADF),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let rel = match self.inodes.lock().path_of(ino) {
            Some(rel) => rel,
            None => return reply.error(libc::ENOENT),
        };
        let full = self.full_path(&rel);

        let mut entries: Vec<(PathBuf, FileType)> = vec![
            (rel.clone(), FileType::Directory),
            (rel.clone(), FileType::Directory),
        ];
        let dir = match std::fs::read_dir(&full) {
            Ok(dir) => dir,
            Err(err) => return reply.error(io_errno(err)),
        };
        for entry in dir.flatten() {
            let child_rel = rel.join(entry.file_name());
            let kind = match entry.file_type() {
                Ok(ft) if ft.is_dir() => FileType::Directory,
                Ok(ft) if ft.is_symlink() => FileType::Symlink,
                _ => FileType::RegularFile,
            };
            entries.push((child_rel, kind));
        }

        for (idx, (child_rel, kind)) in entries.into_iter().enumerate().skip(offset as usize) {
            let name = if idx == 0 {
                ".".into()
            } else if idx == 1 {
                "..".into()
            } else {
                child_rel.file_name().unwrap_or_default().to_os_string()
            };
            let child_ino = if idx < 2 {
                ino
            } else {
                self.inodes.lock().ino_for(&child_rel)
            };
            if reply.add(child_ino, (idx + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        match nix::sys::statvfs::statvfs(&self.backing_root) {
            Ok(stat) => reply.statfs(
                stat.blocks(),
                stat.blocks_free(),
                stat.blocks_available(),
                stat.files(),
                stat.files_free(),
                stat.fragment_size() as u32,
                stat.name_max() as u32,
                stat.fragment_size() as u32,
            ),
            Err(err) => reply.error(nix_errno(err)),
        }
    }
}

fn nix_errno(err: nix::Error) -> i32 {
    err.as_errno().map(|e| e as i32).unwrap_or(libc::EIO)
}

fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}
