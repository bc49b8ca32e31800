pub mod config;
pub mod flags;
pub mod mount;
pub mod reveal;
pub mod unmount;
pub mod validate;

use fusebridge_config::{BridgeConfig, HostPlatform};
use fusebridge_mount::PlatformMounter;

/// Mounter for the configured (or detected) host platform.
pub fn host_mounter(config: Option<&BridgeConfig>) -> Result<PlatformMounter, Box<dyn std::error::Error>> {
    let host = config
        .map(BridgeConfig::host_platform)
        .unwrap_or_else(HostPlatform::detect);
    Ok(PlatformMounter::for_host(host)?)
}
