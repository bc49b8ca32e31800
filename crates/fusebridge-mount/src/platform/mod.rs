//! Per-OS mount strategies.
//!
//! A `PlatformMounter` knows the default mount flags of its OS and the
//! commands used to reveal and unmount a mount point. It never performs the
//! mount itself; that is the coordinator's job.

mod linux;
mod macos;

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use fusebridge_config::HostPlatform;

use crate::command::CommandSpec;
use crate::environment::MountEnvironment;
use crate::error::MountError;
use crate::handle::MountHandle;
use crate::session::MountSession;

pub use linux::LinuxMounter;
pub use macos::MacMounter;

/// File system name reported for every mount.
pub const FS_NAME: &str = "CryptoFs";

/// Owner reported for files inside a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl UserIdentity {
    /// Owner of the current user's home directory.
    pub fn from_home() -> Result<Self, MountError> {
        let home = dirs_next::home_dir().ok_or_else(|| MountError::Identity {
            path: PathBuf::from("~"),
            source: io::Error::new(io::ErrorKind::NotFound, "home directory not found"),
        })?;
        Self::from_path(&home)
    }

    /// Owner of `path`.
    #[cfg(unix)]
    pub fn from_path(path: &Path) -> Result<Self, MountError> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::metadata(path).map_err(|source| MountError::Identity {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(UserIdentity {
            uid: meta.uid(),
            gid: meta.gid(),
        })
    }

    #[cfg(not(unix))]
    pub fn from_path(path: &Path) -> Result<Self, MountError> {
        Err(MountError::Identity {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Unsupported, "no unix ownership on this platform"),
        })
    }
}

/// The three commands bound to a mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountCommands {
    pub reveal: CommandSpec,
    pub unmount: CommandSpec,
    pub unmount_forced: CommandSpec,
}

/// Mount strategy for one host platform.
#[derive(Debug, Clone)]
pub enum PlatformMounter {
    Linux(LinuxMounter),
    MacOs(MacMounter),
}

impl PlatformMounter {
    /// Every known mounter, built for `identity`.
    pub fn all(identity: UserIdentity) -> Vec<PlatformMounter> {
        vec![
            PlatformMounter::Linux(LinuxMounter::new(identity)),
            PlatformMounter::MacOs(MacMounter::new(identity)),
        ]
    }

    /// Select the mounter applicable to `host`, reading the user identity
    /// from the home directory.
    pub fn for_host(host: HostPlatform) -> Result<Self, MountError> {
        if !Self::supports(host) {
            return Err(MountError::UnsupportedPlatform(host));
        }
        Self::with_identity(host, UserIdentity::from_home()?)
    }

    /// Select the mounter applicable to `host` for a known identity.
    pub fn with_identity(host: HostPlatform, identity: UserIdentity) -> Result<Self, MountError> {
        Self::all(identity)
            .into_iter()
            .find(|m| m.is_applicable(host))
            .ok_or(MountError::UnsupportedPlatform(host))
    }

    fn supports(host: HostPlatform) -> bool {
        LinuxMounter::is_applicable(host) || MacMounter::is_applicable(host)
    }

    pub fn is_applicable(&self, host: HostPlatform) -> bool {
        match self {
            PlatformMounter::Linux(_) => LinuxMounter::is_applicable(host),
            PlatformMounter::MacOs(_) => MacMounter::is_applicable(host),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlatformMounter::Linux(_) => "linux",
            PlatformMounter::MacOs(_) => "macos",
        }
    }

    /// Flags used when the environment does not override them.
    pub fn default_mount_flags(&self) -> Vec<String> {
        match self {
            PlatformMounter::Linux(m) => m.default_mount_flags(),
            PlatformMounter::MacOs(m) => m.default_mount_flags(),
        }
    }

    /// Reveal, unmount and forced unmount commands for a mount point.
    pub fn mount_commands(&self, env: &MountEnvironment) -> Result<MountCommands, MountError> {
        match self {
            PlatformMounter::Linux(m) => m.mount_commands(env),
            PlatformMounter::MacOs(m) => m.mount_commands(env),
        }
    }

    /// Bind commands to a running session.
    pub fn create_mount_handle(
        &self,
        mount_point: PathBuf,
        commands: MountCommands,
        session: MountSession,
    ) -> MountHandle {
        MountHandle::new(mount_point, commands, session)
    }
}

/// Split a mount point into its parent directory and final component.
pub(crate) fn split_mount_point(mount_point: &Path) -> Result<(&Path, &OsStr), MountError> {
    let invalid = |reason: &str| MountError::InvalidMountPoint {
        path: mount_point.to_path_buf(),
        reason: reason.to_string(),
    };

    let name = mount_point
        .file_name()
        .ok_or_else(|| invalid("has no final path component"))?;
    let parent = mount_point
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| invalid("has no parent directory"))?;
    Ok((parent, name))
}

/// Tokenize a configured reveal command, or fall back to `default`, and
/// append the mount point.
pub(crate) fn reveal_command(
    configured: Option<&str>,
    default: &str,
    mount_point: &Path,
) -> Result<CommandSpec, MountError> {
    let tokens = match configured {
        Some(line) => shlex::split(line)
            .ok_or_else(|| MountError::InvalidRevealCommand(line.to_string()))?,
        None => vec![default.to_string()],
    };
    let command = CommandSpec::from_tokens(tokens).ok_or_else(|| {
        MountError::InvalidRevealCommand(configured.unwrap_or_default().to_string())
    })?;
    Ok(command.arg(mount_point.to_string_lossy()))
}

/// `<program> <flags...> <basename>` run from the mount point's parent.
pub(crate) fn unmount_command(
    program: &str,
    flags: &[&str],
    mount_point: &Path,
) -> Result<CommandSpec, MountError> {
    let (parent, name) = split_mount_point(mount_point)?;
    let command = flags
        .iter()
        .fold(CommandSpec::new(program), |cmd, flag| cmd.arg(*flag));
    Ok(command.arg(name.to_string_lossy()).current_dir(parent))
}
