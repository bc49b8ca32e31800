//! The blocking native mount call.

use std::io;
use std::path::Path;

use fusebridge_fuse::{FuseOptions, ReadWriteAdapter};

use crate::session::ReadySignal;

/// A native mount facility.
///
/// `mount` blocks for the whole lifetime of the mount and returns once it is
/// unmounted. Implementations call [`ReadySignal::notify`] as soon as the
/// mount is established; an error returned before that counts as a failed
/// mount.
pub trait NativeMount: Send + Sync + 'static {
    fn mount(
        &self,
        adapter: ReadWriteAdapter,
        mount_point: &Path,
        options: FuseOptions,
        ready: ReadySignal,
    ) -> io::Result<()>;
}

/// Kernel FUSE mount through `fuser`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuserMount;

impl NativeMount for FuserMount {
    fn mount(
        &self,
        adapter: ReadWriteAdapter,
        mount_point: &Path,
        options: FuseOptions,
        ready: ReadySignal,
    ) -> io::Result<()> {
        fusebridge_fuse::serve(adapter, mount_point, options, move || ready.notify())
    }
}
