//! Read-write FUSE adapter for fusebridge.
//!
//! Exposes one host directory through the kernel's FUSE interface:
//! - `adapter`: `ReadWriteAdapter`, path-addressed operations on the host directory
//! - `unix_fuse`: `fuser::Filesystem` impl mapping inode requests onto the adapter
//! - `options`: translation of libfuse-style `-o` flags for `fuser`
//!
//! # Example
//!
//! ```ignore
//! use fusebridge_fuse::{serve, FuseOptions, ReadWriteAdapter};
//!
//! let adapter = ReadWriteAdapter::with_defaults("/home/me/vault");
//! let options = FuseOptions::parse(&["-oauto_unmount", "-ofsname=CryptoFs"])?;
//! serve(adapter, Path::new("/home/me/mnt"), options, || println!("mounted"))?;
//! ```

#[cfg(unix)]
mod adapter;
mod error;
mod inode;
#[cfg(unix)]
mod options;
mod transcoder;
#[cfg(unix)]
mod unix_fuse;

#[cfg(unix)]
pub use adapter::{DirEntry, FsStats, ReadWriteAdapter, DEFAULT_MAX_FILE_NAME_LENGTH};
pub use error::{FsOpError, FsResult};
pub use inode::{InodeAttr, InodeKind, InodeTable, ROOT_INO, UNKNOWN_INO};
#[cfg(unix)]
pub use options::FuseOptions;
pub use transcoder::{FileNameTranscoder, IdentityTranscoder};
#[cfg(unix)]
pub use unix_fuse::{inode_attr_to_file_attr, serve, UnixFuse};
