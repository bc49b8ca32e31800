//! Unix FUSE implementation using the `fuser` crate.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::os::raw::c_int;
use std::path::Path;
use std::time::SystemTime;

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::adapter::{FsStats, ReadWriteAdapter};
use crate::error::{FsOpError, FsResult};
use crate::inode::{
    child_path, parent_path, InodeAttr, InodeKind, InodeTable, ROOT_INO, UNKNOWN_INO,
};
use crate::options::FuseOptions;

/// Init flag asking the kernel to pass `O_TRUNC` through to `open`.
const FUSE_ATOMIC_O_TRUNC: u32 = 1 << 3;

/// Mount `adapter` at `mount_point` and serve requests until unmounted.
///
/// Blocks for the lifetime of the mount. `on_ready` runs once the kernel
/// mount exists and before the first request is handled; it is never called
/// when mounting fails.
pub fn serve<F>(
    adapter: ReadWriteAdapter,
    mount_point: &Path,
    options: FuseOptions,
    on_ready: F,
) -> io::Result<()>
where
    F: FnOnce(),
{
    let mount_options = options.mount_options.clone();
    let fs = UnixFuse::new(adapter, options);

    info!("Mounting {:?} at {:?}", fs.adapter.root(), mount_point);
    let mut session = fuser::Session::new(fs, mount_point, &mount_options)?;
    on_ready();

    let result = session.run();
    info!("Session for {:?} ended", mount_point);
    result
}

/// Unix FUSE filesystem wrapper around a `ReadWriteAdapter`.
pub struct UnixFuse {
    adapter: ReadWriteAdapter,
    inodes: InodeTable,
    /// Inode each open file handle was opened on.
    handle_inos: Mutex<HashMap<u64, u64>>,
    options: FuseOptions,
}

impl UnixFuse {
    pub fn new(adapter: ReadWriteAdapter, options: FuseOptions) -> Self {
        UnixFuse {
            adapter,
            inodes: InodeTable::new(),
            handle_inos: Mutex::new(HashMap::new()),
            options,
        }
    }

    pub fn adapter(&self) -> &ReadWriteAdapter {
        &self.adapter
    }

    fn trace(&self, args: fmt::Arguments<'_>) {
        if self.options.debug {
            info!("{}", args);
        } else {
            debug!("{}", args);
        }
    }

    fn errno(&self, op: &str, e: &FsOpError) -> i32 {
        match e {
            FsOpError::NotFound | FsOpError::Exists => debug!("{} failed: {}", op, e),
            _ => error!("{} failed: {}", op, e),
        }
        e.to_errno()
    }

    fn path(&self, ino: u64) -> FsResult<String> {
        self.inodes.get_path(ino).ok_or(FsOpError::NotFound)
    }

    fn entry_path(&self, parent: u64, name: &OsStr) -> FsResult<String> {
        let name = name.to_str().ok_or(FsOpError::InvalidArg)?;
        Ok(child_path(&self.path(parent)?, name))
    }

    fn file_attr(&self, ino: u64, meta: &std::fs::Metadata) -> FileAttr {
        let attr = InodeAttr::from_metadata(ino, meta).with_owner(self.options.uid, self.options.gid);
        inode_attr_to_file_attr(&attr)
    }

    fn attr(&self, ino: u64, path: &str) -> FsResult<FileAttr> {
        let meta = self.adapter.getattr(path)?;
        Ok(self.file_attr(ino, &meta))
    }

    /// Attributes for an entry reply; the kernel now holds a lookup on it.
    fn entry_attr(&self, path: &str) -> FsResult<FileAttr> {
        let meta = self.adapter.getattr(path)?;
        let ino = self.inodes.lookup(path);
        Ok(self.file_attr(ino, &meta))
    }

    /// Any file handle still open on `ino`.
    fn open_handle(&self, ino: u64) -> Option<u64> {
        self.handle_inos
            .lock()
            .iter()
            .find(|(_, &open_ino)| open_ino == ino)
            .map(|(&fh, _)| fh)
    }

    fn track_handle(&self, fh: u64, ino: u64) {
        self.handle_inos.lock().insert(fh, ino);
    }

    pub fn do_lookup(&self, parent: u64, name: &OsStr) -> FsResult<FileAttr> {
        let path = self.entry_path(parent, name)?;
        self.entry_attr(&path)
    }

    pub fn do_forget(&self, ino: u64, nlookup: u64) {
        if self.inodes.forget(ino, nlookup) {
            debug!("released inode {}", ino);
        }
    }

    /// Attributes by path, or through an open handle once the entry is gone.
    pub fn do_getattr(&self, ino: u64) -> FsResult<FileAttr> {
        match self.inodes.get_path(ino) {
            Some(path) => self.attr(ino, &path),
            None => {
                let fh = self.open_handle(ino).ok_or(FsOpError::NotFound)?;
                Ok(self.file_attr(ino, &self.adapter.fgetattr(fh)?))
            }
        }
    }

    pub fn do_setattr(
        &self,
        ino: u64,
        mode: Option<u32>,
        size: Option<u64>,
        fh: Option<u64>,
    ) -> FsResult<FileAttr> {
        let (path, fh) = match (self.inodes.get_path(ino), fh) {
            (Some(path), fh) => (path, fh),
            // Unlinked but still open: only a handle reaches the file
            (None, Some(fh)) => (String::new(), Some(fh)),
            (None, None) => (
                String::new(),
                Some(self.open_handle(ino).ok_or(FsOpError::NotFound)?),
            ),
        };

        if let Some(mode) = mode {
            match fh {
                Some(fh) => self.adapter.fchmod(fh, mode)?,
                None => self.adapter.chmod(&path, mode)?,
            }
        }
        if let Some(size) = size {
            self.adapter.truncate(&path, size, fh)?;
        }
        match fh {
            Some(fh) => Ok(self.file_attr(ino, &self.adapter.fgetattr(fh)?)),
            None => self.attr(ino, &path),
        }
    }

    pub fn do_create(
        &self,
        parent: u64,
        name: &OsStr,
        mode: u32,
        flags: i32,
    ) -> FsResult<(FileAttr, u64)> {
        let path = self.entry_path(parent, name)?;
        let fh = self.adapter.create(&path, mode, flags)?;
        let attr = self.entry_attr(&path)?;
        self.track_handle(fh, attr.ino);
        Ok((attr, fh))
    }

    pub fn do_mkdir(&self, parent: u64, name: &OsStr, mode: u32) -> FsResult<FileAttr> {
        let path = self.entry_path(parent, name)?;
        self.adapter.mkdir(&path, mode)?;
        self.entry_attr(&path)
    }

    pub fn do_symlink(&self, parent: u64, name: &OsStr, target: &Path) -> FsResult<FileAttr> {
        let path = self.entry_path(parent, name)?;
        let target = target.to_str().ok_or(FsOpError::InvalidArg)?;
        self.adapter.symlink(target, &path)?;
        self.entry_attr(&path)
    }

    pub fn do_unlink(&self, parent: u64, name: &OsStr) -> FsResult<()> {
        let path = self.entry_path(parent, name)?;
        self.adapter.unlink(&path)?;
        self.inodes.remove_path(&path);
        Ok(())
    }

    pub fn do_rmdir(&self, parent: u64, name: &OsStr) -> FsResult<()> {
        let path = self.entry_path(parent, name)?;
        self.adapter.rmdir(&path)?;
        self.inodes.remove_path(&path);
        Ok(())
    }

    pub fn do_rename(
        &self,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
    ) -> FsResult<()> {
        let from = self.entry_path(parent, name)?;
        let to = self.entry_path(newparent, newname)?;
        self.adapter.rename(&from, &to)?;
        self.inodes.rename_path(&from, &to);
        Ok(())
    }

    pub fn do_readlink(&self, ino: u64) -> FsResult<String> {
        self.adapter.readlink(&self.path(ino)?)
    }

    pub fn do_open(&self, ino: u64, flags: i32) -> FsResult<u64> {
        let fh = self.adapter.open(&self.path(ino)?, flags)?;
        self.track_handle(fh, ino);
        Ok(fh)
    }

    pub fn do_read(&self, ino: u64, fh: u64, offset: i64, size: u32) -> FsResult<Vec<u8>> {
        let offset = u64::try_from(offset).map_err(|_| FsOpError::InvalidArg)?;
        let path = self.inodes.get_path(ino).unwrap_or_default();
        self.adapter.read(&path, fh, offset, size)
    }

    pub fn do_write(&self, ino: u64, fh: u64, offset: i64, data: &[u8]) -> FsResult<u32> {
        let offset = u64::try_from(offset).map_err(|_| FsOpError::InvalidArg)?;
        let path = self.inodes.get_path(ino).unwrap_or_default();
        self.adapter.write(&path, fh, offset, data)
    }

    pub fn do_release(&self, ino: u64, fh: u64) -> FsResult<()> {
        let path = self.inodes.get_path(ino).unwrap_or_default();
        self.handle_inos.lock().remove(&fh);
        self.adapter.release(&path, fh)
    }

    pub fn do_opendir(&self, ino: u64) -> FsResult<u64> {
        self.adapter.opendir(&self.path(ino)?)
    }

    /// Directory listing including `.` and `..`, as (ino, kind, name).
    ///
    /// Entries the kernel has not looked up are reported with
    /// `UNKNOWN_INO` so listing a large tree does not grow the inode table.
    pub fn do_readdir(&self, ino: u64, fh: u64) -> FsResult<Vec<(u64, FileType, String)>> {
        let path = self.path(ino)?;
        let parent_ino = self.inodes.get_ino(parent_path(&path)).unwrap_or(ROOT_INO);

        let mut listing = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for entry in self.adapter.readdir(&path, Some(fh))? {
            let entry_ino = self
                .inodes
                .get_ino(&child_path(&path, &entry.name))
                .unwrap_or(UNKNOWN_INO);
            listing.push((entry_ino, file_type(entry.kind), entry.name));
        }
        Ok(listing)
    }

    pub fn do_releasedir(&self, ino: u64, fh: u64) -> FsResult<()> {
        let path = self.inodes.get_path(ino).unwrap_or_default();
        self.adapter.releasedir(&path, fh)
    }

    pub fn do_statfs(&self) -> FsResult<FsStats> {
        self.adapter.statfs()
    }

    pub fn do_access(&self, ino: u64) -> FsResult<()> {
        self.adapter.getattr(&self.path(ino)?).map(|_| ())
    }
}

impl Filesystem for UnixFuse {
    fn init(&mut self, _req: &Request<'_>, config: &mut KernelConfig) -> Result<(), c_int> {
        if self.options.atomic_o_trunc {
            if let Err(unsupported) = config.add_capabilities(FUSE_ATOMIC_O_TRUNC) {
                warn!("kernel does not support capabilities {:#x}", unsupported);
            }
        }
        info!("Filesystem for {:?} initialized", self.adapter.root());
        Ok(())
    }

    fn destroy(&mut self) {
        let open = self.adapter.open_handle_count();
        if open > 0 {
            warn!("{} handles still open at unmount", open);
        }
        info!("Filesystem for {:?} destroyed", self.adapter.root());
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        self.trace(format_args!("lookup: parent={}, name={:?}", parent, name));

        match self.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&InodeAttr::ttl(), &attr, 0),
            Err(e) => reply.error(self.errno("lookup", &e)),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        self.trace(format_args!("forget: ino={}, nlookup={}", ino, nlookup));
        self.do_forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        self.trace(format_args!("getattr: ino={}", ino));

        match self.do_getattr(ino) {
            Ok(attr) => reply.attr(&InodeAttr::ttl(), &attr),
            Err(e) => reply.error(self.errno("getattr", &e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
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
        self.trace(format_args!("setattr: ino={}, mode={:?}, size={:?}", ino, mode, size));

        match self.do_setattr(ino, mode, size, fh) {
            Ok(attr) => reply.attr(&InodeAttr::ttl(), &attr),
            Err(e) => reply.error(self.errno("setattr", &e)),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        self.trace(format_args!("readlink: ino={}", ino));

        match self.do_readlink(ino) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(self.errno("readlink", &e)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        self.trace(format_args!("mkdir: parent={}, name={:?}", parent, name));

        match self.do_mkdir(parent, name, mode & !umask) {
            Ok(attr) => reply.entry(&InodeAttr::ttl(), &attr, 0),
            Err(e) => reply.error(self.errno("mkdir", &e)),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.trace(format_args!("unlink: parent={}, name={:?}", parent, name));

        match self.do_unlink(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(self.errno("unlink", &e)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.trace(format_args!("rmdir: parent={}, name={:?}", parent, name));

        match self.do_rmdir(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(self.errno("rmdir", &e)),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        self.trace(format_args!(
            "symlink: parent={}, name={:?}, target={:?}",
            parent, link_name, target
        ));

        match self.do_symlink(parent, link_name, target) {
            Ok(attr) => reply.entry(&InodeAttr::ttl(), &attr, 0),
            Err(e) => reply.error(self.errno("symlink", &e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        self.trace(format_args!(
            "rename: parent={}, name={:?}, newparent={}, newname={:?}",
            parent, name, newparent, newname
        ));

        match self.do_rename(parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(self.errno("rename", &e)),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        self.trace(format_args!("open: ino={}, flags={:#x}", ino, flags));

        match self.do_open(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(self.errno("open", &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        self.trace(format_args!("read: ino={}, offset={}, size={}", ino, offset, size));

        match self.do_read(ino, fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(self.errno("read", &e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        self.trace(format_args!("write: ino={}, offset={}, size={}", ino, offset, data.len()));

        match self.do_write(ino, fh, offset, data) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(self.errno("write", &e)),
        }
    }

    fn flush(&mut self, _req: &Request, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        self.trace(format_args!("flush: ino={}, fh={}", ino, fh));

        match self.adapter.flush(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(self.errno("flush", &e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.trace(format_args!("release: ino={}, fh={}", ino, fh));

        match self.do_release(ino, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(self.errno("release", &e)),
        }
    }

    fn fsync(&mut self, _req: &Request, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        self.trace(format_args!("fsync: ino={}, fh={}", ino, fh));

        match self.adapter.fsync(fh, datasync) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(self.errno("fsync", &e)),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        self.trace(format_args!("opendir: ino={}", ino));

        match self.do_opendir(ino) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(self.errno("opendir", &e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        self.trace(format_args!("readdir: ino={}, offset={}", ino, offset));

        match self.do_readdir(ino, fh) {
            Ok(listing) => {
                let skip = usize::try_from(offset).unwrap_or(0);
                for (i, (entry_ino, kind, name)) in listing.into_iter().enumerate().skip(skip) {
                    if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(e) => reply.error(self.errno("readdir", &e)),
        }
    }

    fn releasedir(&mut self, _req: &Request, ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.trace(format_args!("releasedir: ino={}, fh={}", ino, fh));

        match self.do_releasedir(ino, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(self.errno("releasedir", &e)),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        match self.do_statfs() {
            Ok(s) => reply.statfs(
                s.blocks,
                s.blocks_free,
                s.blocks_available,
                s.files,
                s.files_free,
                s.block_size,
                s.name_max,
                s.fragment_size,
            ),
            Err(e) => reply.error(self.errno("statfs", &e)),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, _mask: i32, reply: ReplyEmpty) {
        match self.do_access(ino) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(self.errno("access", &e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        self.trace(format_args!("create: parent={}, name={:?}", parent, name));

        match self.do_create(parent, name, mode & !umask, flags) {
            Ok((attr, fh)) => reply.created(&InodeAttr::ttl(), &attr, 0, fh, 0),
            Err(e) => reply.error(self.errno("create", &e)),
        }
    }
}

fn file_type(kind: InodeKind) -> FileType {
    match kind {
        InodeKind::File => FileType::RegularFile,
        InodeKind::Directory => FileType::Directory,
        InodeKind::Symlink => FileType::Symlink,
    }
}

/// Convert an `InodeAttr` to the `fuser` representation.
pub fn inode_attr_to_file_attr(attr: &InodeAttr) -> FileAttr {
    FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.crtime,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}
