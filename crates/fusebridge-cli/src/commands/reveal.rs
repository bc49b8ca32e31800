use std::path::PathBuf;

use fusebridge_config::BridgeConfig;
use fusebridge_mount::MountEnvironment;

use super::host_mounter;

/// Open `mountpoint` with the configured reveal command, or the platform default.
pub fn run(config: Option<&BridgeConfig>, mountpoint: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mounter = host_mounter(config)?;

    let mut env = MountEnvironment::new(absolute(mountpoint));
    if let Some(command) = config.and_then(|c| configured_reveal_command(c, env.mount_point())) {
        env = env.with_reveal_command(command);
    }

    let commands = mounter.mount_commands(&env)?;
    commands.reveal.run()?;
    Ok(())
}

/// Reveal command of the mount at `mountpoint`, else the global default.
fn configured_reveal_command(config: &BridgeConfig, mountpoint: &std::path::Path) -> Option<String> {
    config
        .mounts
        .values()
        .find(|m| m.mount_point == mountpoint)
        .and_then(|m| m.reveal_command.clone())
        .or_else(|| config.defaults.as_ref().and_then(|d| d.reveal_command.clone()))
}

pub(crate) fn absolute(path: PathBuf) -> PathBuf {
    path.canonicalize().unwrap_or(path)
}
