//! File name transcoding between the names seen through the mount and the
//! names stored in the served directory.

use std::fmt;

/// Converts single path components between their mounted and stored forms.
///
/// Implementations must be bijective on the names they accept: a name
/// written through the mount has to list back unchanged.
pub trait FileNameTranscoder: Send + Sync + fmt::Debug {
    /// Name as it should be stored in the served directory.
    fn fuse_to_storage(&self, name: &str) -> String;

    /// Name as it should appear inside the mount.
    fn storage_to_fuse(&self, name: &str) -> String;
}

/// Stores names exactly as they are presented by the kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranscoder;

impl FileNameTranscoder for IdentityTranscoder {
    fn fuse_to_storage(&self, name: &str) -> String {
        name.to_string()
    }

    fn storage_to_fuse(&self, name: &str) -> String {
        name.to_string()
    }
}
