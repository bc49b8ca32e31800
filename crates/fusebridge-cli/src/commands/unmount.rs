//! Unmount command for fusebridge mounts.

use std::path::PathBuf;

use fusebridge_config::BridgeConfig;
use fusebridge_mount::MountEnvironment;

use super::host_mounter;
use super::reveal::absolute;

/// Unmount arguments.
pub struct UnmountArgs {
    /// Mount point path to unmount.
    pub mountpoint: PathBuf,
    /// Force unmount even if busy.
    pub force: bool,
}

/// Run the platform unmount command for a mount owned by another process.
pub fn run(config: Option<&BridgeConfig>, args: UnmountArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mounter = host_mounter(config)?;
    let mountpoint = absolute(args.mountpoint);

    let commands = mounter.mount_commands(&MountEnvironment::new(&mountpoint))?;
    if args.force {
        commands.unmount_forced.run()?;
    } else {
        commands.unmount.run()?;
    }

    println!("Unmounted {}", mountpoint.display());
    Ok(())
}
