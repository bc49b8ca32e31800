//! Errors raised while mounting and while running mount commands.

use std::io;
use std::path::PathBuf;

use fusebridge_config::HostPlatform;

use crate::handle::MountHandle;

/// Errors raised by the mount coordinator and platform mounters.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    /// The native mount call failed before the mount was established.
    #[error("Mounting failed")]
    MountFailed(#[source] io::Error),

    /// The native mount call returned without an error but also without
    /// establishing a mount.
    #[error("Mounting failed for unknown reason: {0}")]
    MountFailedUnknown(String),

    #[error("No mounter available for platform '{0}'")]
    UnsupportedPlatform(HostPlatform),

    #[error("Failed to read user identity from {}", .path.display())]
    Identity {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid mount point {}: {reason}", .path.display())]
    InvalidMountPoint { path: PathBuf, reason: String },

    #[error("Invalid reveal command: {0}")]
    InvalidRevealCommand(String),
}

/// A mount command could not be launched or exited unsuccessfully.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Failed to launch `{command}`")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with status {}: {output}", .code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    Exit {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

impl CommandError {
    /// Exit code of the command, if it ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Launch { .. } => None,
            CommandError::Exit { code, .. } => *code,
        }
    }

    /// Rendered command line that failed.
    pub fn command(&self) -> &str {
        match self {
            CommandError::Launch { command, .. } | CommandError::Exit { command, .. } => command,
        }
    }
}

/// Unmounting failed; the mount is still considered active.
///
/// Carries the handle back so the caller can retry, typically with
/// [`MountHandle::unmount_forced`].
#[derive(Debug, thiserror::Error)]
#[error("Failed to unmount {}", .handle.mount_point().display())]
pub struct UnmountError {
    handle: MountHandle,
    #[source]
    source: CommandError,
}

impl UnmountError {
    pub(crate) fn new(handle: MountHandle, source: CommandError) -> Self {
        UnmountError { handle, source }
    }

    pub fn command_error(&self) -> &CommandError {
        &self.source
    }

    /// Take the still-active handle back.
    pub fn into_handle(self) -> MountHandle {
        self.handle
    }

    /// Split into the handle and the command failure.
    pub fn into_parts(self) -> (MountHandle, CommandError) {
        (self.handle, self.source)
    }
}

/// Taking a mount down failed, after the forced fallback where it applies.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error(transparent)]
    Unmount(#[from] UnmountError),

    #[error("Mount thread did not finish cleanly")]
    Thread(#[source] io::Error),
}
