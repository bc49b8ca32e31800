use fusebridge_config::HostPlatform;

use super::{reveal_command, unmount_command, MountCommands, UserIdentity, FS_NAME};
use crate::environment::MountEnvironment;
use crate::error::MountError;

const DEFAULT_REVEAL_COMMAND: &str = "xdg-open";

/// Mounts through the kernel FUSE module, unmounts with `fusermount`.
#[derive(Debug, Clone)]
pub struct LinuxMounter {
    identity: UserIdentity,
}

impl LinuxMounter {
    pub fn new(identity: UserIdentity) -> Self {
        LinuxMounter { identity }
    }

    pub fn is_applicable(host: HostPlatform) -> bool {
        host == HostPlatform::Linux
    }

    pub fn default_mount_flags(&self) -> Vec<String> {
        vec![
            "-oatomic_o_trunc".to_string(),
            format!("-ouid={}", self.identity.uid),
            format!("-ogid={}", self.identity.gid),
            "-oauto_unmount".to_string(),
            format!("-ofsname={}", FS_NAME),
        ]
    }

    pub fn mount_commands(&self, env: &MountEnvironment) -> Result<MountCommands, MountError> {
        let mount_point = env.mount_point();
        Ok(MountCommands {
            reveal: reveal_command(env.reveal_command(), DEFAULT_REVEAL_COMMAND, mount_point)?,
            unmount: unmount_command("fusermount", &["-u"], mount_point)?,
            unmount_forced: unmount_command("fusermount", &["-u", "-z"], mount_point)?,
        })
    }
}
