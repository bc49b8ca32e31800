//! Inode management for the FUSE front.
//!
//! The adapter is addressed by path while the kernel talks in inode numbers.
//! `InodeTable` keeps the bidirectional mapping stable across lookups and
//! rewrites it when entries are renamed or removed. Entries handed to the
//! kernel carry a lookup count and are dropped once the kernel forgets them.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;

/// Reserved inode for the root directory.
pub const ROOT_INO: u64 = 1;

/// Inode reported for directory entries the kernel has not looked up yet.
pub const UNKNOWN_INO: u64 = 0xffff_ffff;

/// Type of inode (file, directory, or symlink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    File,
    Directory,
    Symlink,
}

/// Inode attributes matching FUSE requirements.
#[derive(Debug, Clone)]
pub struct InodeAttr {
    /// Inode number.
    pub ino: u64,
    /// Size in bytes.
    pub size: u64,
    /// Number of blocks (512-byte blocks).
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub crtime: SystemTime,
    pub kind: InodeKind,
    /// Permission mode bits.
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
}

impl InodeAttr {
    /// Build attributes from host metadata, renumbered to `ino`.
    #[cfg(unix)]
    pub fn from_metadata(ino: u64, meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        let kind = if meta.file_type().is_symlink() {
            InodeKind::Symlink
        } else if meta.is_dir() {
            InodeKind::Directory
        } else {
            InodeKind::File
        };

        InodeAttr {
            ino,
            size: meta.len(),
            blocks: meta.blocks(),
            atime: unix_time(meta.atime(), meta.atime_nsec()),
            mtime: unix_time(meta.mtime(), meta.mtime_nsec()),
            ctime: unix_time(meta.ctime(), meta.ctime_nsec()),
            crtime: meta.created().unwrap_or(SystemTime::UNIX_EPOCH),
            kind,
            perm: (meta.mode() & 0o7777) as u16,
            nlink: meta.nlink() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }

    /// Replace the reported owner, keeping anything not overridden.
    pub fn with_owner(mut self, uid: Option<u32>, gid: Option<u32>) -> Self {
        if let Some(uid) = uid {
            self.uid = uid;
        }
        if let Some(gid) = gid {
            self.gid = gid;
        }
        self
    }

    /// Default TTL for attributes.
    pub fn ttl() -> Duration {
        Duration::from_secs(1)
    }
}

fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    if secs >= 0 {
        SystemTime::UNIX_EPOCH + Duration::new(secs as u64, nsecs.clamp(0, 999_999_999) as u32)
    } else {
        SystemTime::UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Resolve a child path from a parent path and an entry name.
pub fn child_path(parent_path: &str, name: &str) -> String {
    if parent_path == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent_path, name)
    }
}

/// Parent of a normalized path; the root is its own parent.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

struct Mappings {
    path_to_ino: HashMap<String, u64>,
    ino_to_path: HashMap<u64, String>,
    lookups: HashMap<u64, u64>,
    next_ino: u64,
}

/// Inode table managing path-to-inode and inode-to-path mappings.
pub struct InodeTable {
    inner: RwLock<Mappings>,
}

impl InodeTable {
    /// Create a new inode table with the root directory registered.
    pub fn new() -> Self {
        let mut path_to_ino = HashMap::new();
        let mut ino_to_path = HashMap::new();
        path_to_ino.insert("/".to_string(), ROOT_INO);
        ino_to_path.insert(ROOT_INO, "/".to_string());

        InodeTable {
            inner: RwLock::new(Mappings {
                path_to_ino,
                ino_to_path,
                lookups: HashMap::new(),
                next_ino: ROOT_INO + 1,
            }),
        }
    }

    /// Get or create an inode for a path.
    pub fn get_or_create(&self, path: &str) -> u64 {
        let normalized = Self::normalize_path(path);

        if let Some(&ino) = self.inner.read().path_to_ino.get(&normalized) {
            return ino;
        }

        Self::insert(&mut self.inner.write(), normalized)
    }

    /// Inode for a path handed to the kernel in an entry reply; bumps its
    /// lookup count.
    pub fn lookup(&self, path: &str) -> u64 {
        let normalized = Self::normalize_path(path);
        let mut inner = self.inner.write();
        let ino = Self::insert(&mut inner, normalized);
        *inner.lookups.entry(ino).or_insert(0) += 1;
        ino
    }

    /// Drop `nlookup` references; the inode is released when none remain.
    /// Returns whether the inode was released.
    pub fn forget(&self, ino: u64, nlookup: u64) -> bool {
        if ino == ROOT_INO {
            return false;
        }
        let mut inner = self.inner.write();
        let remaining = match inner.lookups.get_mut(&ino) {
            Some(count) => {
                *count = count.saturating_sub(nlookup);
                *count
            }
            None => 0,
        };
        if remaining > 0 {
            return false;
        }
        inner.lookups.remove(&ino);
        match inner.ino_to_path.remove(&ino) {
            Some(path) => {
                if inner.path_to_ino.get(&path) == Some(&ino) {
                    inner.path_to_ino.remove(&path);
                }
                true
            }
            None => false,
        }
    }

    /// Outstanding kernel references to an inode.
    pub fn lookup_count(&self, ino: u64) -> u64 {
        self.inner.read().lookups.get(&ino).copied().unwrap_or(0)
    }

    /// Get inode for a path (if known).
    pub fn get_ino(&self, path: &str) -> Option<u64> {
        let normalized = Self::normalize_path(path);
        self.inner.read().path_to_ino.get(&normalized).copied()
    }

    /// Get path for an inode (if known).
    pub fn get_path(&self, ino: u64) -> Option<String> {
        self.inner.read().ino_to_path.get(&ino).cloned()
    }

    /// Forget a path and everything below it.
    pub fn remove_path(&self, path: &str) {
        let normalized = Self::normalize_path(path);
        if normalized == "/" {
            return;
        }

        let mut inner = self.inner.write();
        let prefix = format!("{}/", normalized);
        let doomed: Vec<String> = inner
            .path_to_ino
            .keys()
            .filter(|p| **p == normalized || p.starts_with(&prefix))
            .cloned()
            .collect();

        for p in doomed {
            if let Some(ino) = inner.path_to_ino.remove(&p) {
                inner.ino_to_path.remove(&ino);
                inner.lookups.remove(&ino);
            }
        }
    }

    /// Move a path (and everything below it) to a new location, keeping
    /// inode numbers. Whatever was mapped at the destination is dropped.
    pub fn rename_path(&self, from: &str, to: &str) {
        let from = Self::normalize_path(from);
        let to = Self::normalize_path(to);
        if from == to || from == "/" {
            return;
        }

        self.remove_path(&to);

        let mut inner = self.inner.write();
        let prefix = format!("{}/", from);
        let moved: Vec<(String, u64)> = inner
            .path_to_ino
            .iter()
            .filter(|(p, _)| **p == from || p.starts_with(&prefix))
            .map(|(p, ino)| (p.clone(), *ino))
            .collect();

        for (old_path, ino) in moved {
            let new_path = format!("{}{}", to, &old_path[from.len()..]);
            inner.path_to_ino.remove(&old_path);
            inner.path_to_ino.insert(new_path.clone(), ino);
            inner.ino_to_path.insert(ino, new_path);
        }
    }

    /// Number of tracked inodes, root included.
    pub fn len(&self) -> usize {
        self.inner.read().ino_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mapped inode for `normalized`, allocating one if it is new.
    fn insert(inner: &mut Mappings, normalized: String) -> u64 {
        // Possibly mapped by a racing lookup since the read lock was dropped.
        if let Some(&ino) = inner.path_to_ino.get(&normalized) {
            return ino;
        }
        let ino = inner.next_ino;
        inner.next_ino += 1;
        inner.path_to_ino.insert(normalized.clone(), ino);
        inner.ino_to_path.insert(ino, normalized);
        ino
    }

    /// Normalize a path for consistent lookup.
    fn normalize_path(path: &str) -> String {
        let mut normalized = path.to_string();

        if !normalized.starts_with('/') {
            normalized = format!("/{}", normalized);
        }

        while normalized.len() > 1 && normalized.ends_with('/') {
            normalized.pop();
        }

        normalized
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
