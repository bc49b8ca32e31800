//! Path-addressed read-write adapter over a host directory.
//!
//! Every operation takes an absolute path inside the mounted namespace
//! (a missing leading `/` is tolerated). Open files are tracked by handle so
//! that renames and unlinks of the underlying entry never invalidate them.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{FsOpError, FsResult};
use crate::inode::InodeKind;
use crate::transcoder::{FileNameTranscoder, IdentityTranscoder};

/// Default upper bound for a single file name served through the adapter.
pub const DEFAULT_MAX_FILE_NAME_LENGTH: usize = 254;

/// A single directory entry as seen through the mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: InodeKind,
}

/// Filesystem usage figures reported by `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub block_size: u32,
    pub fragment_size: u32,
    pub name_max: u32,
}

/// Read-write adapter exposing one host directory.
pub struct ReadWriteAdapter {
    root: PathBuf,
    max_file_name_length: usize,
    transcoder: Arc<dyn FileNameTranscoder>,
    open_files: RwLock<HashMap<u64, Arc<File>>>,
    open_dirs: RwLock<HashMap<u64, PathBuf>>,
    next_handle: AtomicU64,
}

impl ReadWriteAdapter {
    /// Create an adapter serving `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        max_file_name_length: usize,
        transcoder: Arc<dyn FileNameTranscoder>,
    ) -> Self {
        ReadWriteAdapter {
            root: root.into(),
            max_file_name_length,
            transcoder,
            open_files: RwLock::new(HashMap::new()),
            open_dirs: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Adapter with the default name limit and no name transcoding.
    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        Self::new(root, DEFAULT_MAX_FILE_NAME_LENGTH, Arc::new(IdentityTranscoder))
    }

    /// Served host directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_name_length(&self) -> usize {
        self.max_file_name_length
    }

    /// Number of file and directory handles currently open.
    pub fn open_handle_count(&self) -> usize {
        self.open_files.read().len() + self.open_dirs.read().len()
    }

    /// Map a mounted path onto the host directory.
    fn resolve(&self, path: &str) -> FsResult<PathBuf> {
        let mut resolved = self.root.clone();
        for component in path.split('/') {
            match component {
                "" | "." => continue,
                ".." => return Err(FsOpError::InvalidArg),
                name => {
                    if name.len() > self.max_file_name_length {
                        return Err(FsOpError::NameTooLong);
                    }
                    resolved.push(self.transcoder.fuse_to_storage(name));
                }
            }
        }
        Ok(resolved)
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn file(&self, fh: u64) -> FsResult<Arc<File>> {
        self.open_files
            .read()
            .get(&fh)
            .cloned()
            .ok_or(FsOpError::BadHandle(fh))
    }

    fn register_file(&self, file: File) -> u64 {
        let fh = self.next_handle();
        self.open_files.write().insert(fh, Arc::new(file));
        fh
    }

    /// Attributes of an entry without following a trailing symlink.
    pub fn getattr(&self, path: &str) -> FsResult<Metadata> {
        let host = self.resolve(path)?;
        Ok(fs::symlink_metadata(host)?)
    }

    /// Create a regular file and open it.
    pub fn create(&self, path: &str, mode: u32, flags: i32) -> FsResult<u64> {
        let host = self.resolve(path)?;
        debug!("create: {} mode={:o}", path, mode);

        let mut options = OpenOptions::new();
        options
            .read(flags & libc::O_ACCMODE != libc::O_WRONLY)
            .write(true)
            .mode(mode & 0o7777);
        if flags & libc::O_EXCL != 0 {
            options.create_new(true);
        } else {
            options.create(true);
        }
        if flags & libc::O_TRUNC != 0 {
            options.truncate(true);
        }

        let file = options.open(host)?;
        Ok(self.register_file(file))
    }

    /// Open an existing file, following symlinks.
    pub fn open(&self, path: &str, flags: i32) -> FsResult<u64> {
        let host = self.resolve(path)?;
        debug!("open: {} flags={:#x}", path, flags);

        if fs::metadata(&host)?.is_dir() {
            return Err(FsOpError::IsDir);
        }

        let mut options = OpenOptions::new();
        match flags & libc::O_ACCMODE {
            libc::O_WRONLY => options.write(true),
            libc::O_RDWR => options.read(true).write(true),
            _ => options.read(true),
        };
        if flags & libc::O_APPEND != 0 {
            options.append(true);
        }
        if flags & libc::O_TRUNC != 0 && flags & libc::O_ACCMODE != libc::O_RDONLY {
            options.truncate(true);
        }

        let file = options.open(host)?;
        Ok(self.register_file(file))
    }

    /// Read up to `size` bytes at `offset` from an open file.
    pub fn read(&self, path: &str, fh: u64, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        debug!("read: {} fh={} offset={} size={}", path, fh, offset, size);
        let file = self.file(fh)?;

        let mut buf = vec![0u8; size as usize];
        let mut filled = 0;
        while filled < buf.len() {
            match file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Write `data` at `offset` into an open file.
    pub fn write(&self, path: &str, fh: u64, offset: u64, data: &[u8]) -> FsResult<u32> {
        debug!("write: {} fh={} offset={} size={}", path, fh, offset, data.len());
        let file = self.file(fh)?;
        file.write_all_at(data, offset)?;
        u32::try_from(data.len()).map_err(|_| FsOpError::InvalidArg)
    }

    /// Nothing is buffered in the adapter; only validates the handle.
    pub fn flush(&self, fh: u64) -> FsResult<()> {
        self.file(fh).map(|_| ())
    }

    pub fn fsync(&self, fh: u64, datasync: bool) -> FsResult<()> {
        let file = self.file(fh)?;
        if datasync {
            file.sync_data()?;
        } else {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Close a file handle. The path is informational: the entry may have
    /// been renamed or unlinked since it was opened.
    pub fn release(&self, path: &str, fh: u64) -> FsResult<()> {
        debug!("release: {} fh={}", path, fh);
        self.open_files
            .write()
            .remove(&fh)
            .map(|_| ())
            .ok_or(FsOpError::BadHandle(fh))
    }

    /// Attributes of an open file, valid even after its entry was unlinked.
    pub fn fgetattr(&self, fh: u64) -> FsResult<Metadata> {
        Ok(self.file(fh)?.metadata()?)
    }

    /// Change the permissions of an open file.
    pub fn fchmod(&self, fh: u64, mode: u32) -> FsResult<()> {
        let file = self.file(fh)?;
        file.set_permissions(fs::Permissions::from_mode(mode & 0o7777))?;
        Ok(())
    }

    /// Change the size of a file, through its handle when one is given.
    pub fn truncate(&self, path: &str, size: u64, fh: Option<u64>) -> FsResult<()> {
        debug!("truncate: {} size={}", path, size);
        if let Some(file) = fh.and_then(|fh| self.open_files.read().get(&fh).cloned()) {
            file.set_len(size)?;
            return Ok(());
        }

        let host = self.resolve(path)?;
        let file = OpenOptions::new().write(true).open(host)?;
        file.set_len(size)?;
        Ok(())
    }

    pub fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let host = self.resolve(path)?;
        fs::set_permissions(host, fs::Permissions::from_mode(mode & 0o7777))?;
        Ok(())
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let host = self.resolve(path)?;
        debug!("mkdir: {} mode={:o}", path, mode);
        fs::create_dir(&host)?;
        fs::set_permissions(host, fs::Permissions::from_mode(mode & 0o7777))?;
        Ok(())
    }

    pub fn rmdir(&self, path: &str) -> FsResult<()> {
        let host = self.resolve(path)?;
        if host == self.root {
            return Err(FsOpError::PermissionDenied);
        }
        debug!("rmdir: {}", path);
        fs::remove_dir(host)?;
        Ok(())
    }

    pub fn unlink(&self, path: &str) -> FsResult<()> {
        let host = self.resolve(path)?;
        debug!("unlink: {}", path);
        fs::remove_file(host)?;
        Ok(())
    }

    /// Atomically move an entry, replacing a compatible destination.
    pub fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        if src == self.root || dst == self.root {
            return Err(FsOpError::PermissionDenied);
        }
        debug!("rename: {} -> {}", from, to);
        fs::rename(src, dst)?;
        Ok(())
    }

    /// Create a symlink at `link` pointing to `target`.
    ///
    /// Relative targets are kept relative, so they resolve against the
    /// directory the link lives in, wherever it is moved to.
    pub fn symlink(&self, target: &str, link: &str) -> FsResult<()> {
        let host = self.resolve(link)?;
        debug!("symlink: {} -> {}", link, target);
        let stored = self.map_link_target(target, |name| self.transcoder.fuse_to_storage(name));
        std::os::unix::fs::symlink(stored, host)?;
        Ok(())
    }

    pub fn readlink(&self, path: &str) -> FsResult<String> {
        let host = self.resolve(path)?;
        let meta = fs::symlink_metadata(&host)?;
        if !meta.file_type().is_symlink() {
            return Err(FsOpError::NotSymlink);
        }
        let stored = fs::read_link(host)?;
        let stored = stored.to_str().ok_or(FsOpError::InvalidArg)?;
        Ok(self.map_link_target(stored, |name| self.transcoder.storage_to_fuse(name)))
    }

    /// Apply a name mapping to the components of a relative link target.
    fn map_link_target(&self, target: &str, map: impl Fn(&str) -> String) -> String {
        if target.starts_with('/') {
            return target.to_string();
        }
        target
            .split('/')
            .map(|component| match component {
                "" | "." | ".." => component.to_string(),
                name => map(name),
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Open a directory for listing, following symlinks.
    pub fn opendir(&self, path: &str) -> FsResult<u64> {
        let host = self.resolve(path)?;
        debug!("opendir: {}", path);
        if !fs::metadata(&host)?.is_dir() {
            return Err(FsOpError::NotDir);
        }
        let fh = self.next_handle();
        self.open_dirs.write().insert(fh, host);
        Ok(fh)
    }

    /// List a directory, through its handle when it is open.
    pub fn readdir(&self, path: &str, fh: Option<u64>) -> FsResult<Vec<DirEntry>> {
        let host = match fh.and_then(|fh| self.open_dirs.read().get(&fh).cloned()) {
            Some(host) => host,
            None => self.resolve(path)?,
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(host)? {
            let entry = entry?;
            let Some(stored) = entry.file_name().to_str().map(str::to_string) else {
                warn!("skipping non-UTF-8 entry {:?} in {}", entry.file_name(), path);
                continue;
            };
            let file_type = entry.file_type()?;
            let kind = if file_type.is_symlink() {
                InodeKind::Symlink
            } else if file_type.is_dir() {
                InodeKind::Directory
            } else {
                InodeKind::File
            };
            entries.push(DirEntry {
                name: self.transcoder.storage_to_fuse(&stored),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub fn releasedir(&self, path: &str, fh: u64) -> FsResult<()> {
        debug!("releasedir: {} fh={}", path, fh);
        self.open_dirs
            .write()
            .remove(&fh)
            .map(|_| ())
            .ok_or(FsOpError::BadHandle(fh))
    }

    /// Usage of the filesystem holding the served directory.
    #[allow(clippy::unnecessary_cast)]
    pub fn statfs(&self) -> FsResult<FsStats> {
        let c_path =
            CString::new(self.root.as_os_str().as_bytes()).map_err(|_| FsOpError::InvalidArg)?;
        // SAFETY: `c_path` is a valid NUL-terminated string and `stat` is a
        // plain-old-data struct the call fully initializes on success.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(FsStats {
            blocks: stat.f_blocks as u64,
            blocks_free: stat.f_bfree as u64,
            blocks_available: stat.f_bavail as u64,
            files: stat.f_files as u64,
            files_free: stat.f_ffree as u64,
            block_size: stat.f_bsize as u32,
            fragment_size: stat.f_frsize as u32,
            name_max: (stat.f_namemax as u64).min(self.max_file_name_length as u64) as u32,
        })
    }
}

impl std::fmt::Debug for ReadWriteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadWriteAdapter")
            .field("root", &self.root)
            .field("max_file_name_length", &self.max_file_name_length)
            .field("transcoder", &self.transcoder)
            .field("open_handles", &self.open_handle_count())
            .finish()
    }
}
