use fusebridge_config::HostPlatform;

use super::{reveal_command, unmount_command, MountCommands, UserIdentity, FS_NAME};
use crate::environment::MountEnvironment;
use crate::error::MountError;

const DEFAULT_REVEAL_COMMAND: &str = "open";

/// Mounts through macFUSE, unmounts with `umount`.
#[derive(Debug, Clone)]
pub struct MacMounter {
    identity: UserIdentity,
}

impl MacMounter {
    pub fn new(identity: UserIdentity) -> Self {
        MacMounter { identity }
    }

    pub fn is_applicable(host: HostPlatform) -> bool {
        host == HostPlatform::MacOs
    }

    pub fn default_mount_flags(&self) -> Vec<String> {
        vec![
            format!("-ovolname={}", FS_NAME),
            "-oauto_xattr".to_string(),
            "-onoappledouble".to_string(),
            "-oatomic_o_trunc".to_string(),
            format!("-ouid={}", self.identity.uid),
            format!("-ogid={}", self.identity.gid),
            format!("-ofsname={}", FS_NAME),
        ]
    }

    pub fn mount_commands(&self, env: &MountEnvironment) -> Result<MountCommands, MountError> {
        let mount_point = env.mount_point();
        Ok(MountCommands {
            reveal: reveal_command(env.reveal_command(), DEFAULT_REVEAL_COMMAND, mount_point)?,
            unmount: unmount_command("umount", &[], mount_point)?,
            unmount_forced: unmount_command("umount", &["-f"], mount_point)?,
        })
    }
}
