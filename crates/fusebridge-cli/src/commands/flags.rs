use fusebridge_config::BridgeConfig;

use super::host_mounter;

/// Print the flags a mount uses when its configuration does not override them.
pub fn run(config: Option<&BridgeConfig>) -> Result<(), Box<dyn std::error::Error>> {
    let mounter = host_mounter(config)?;
    for flag in mounter.default_mount_flags() {
        println!("{}", flag);
    }
    Ok(())
}
