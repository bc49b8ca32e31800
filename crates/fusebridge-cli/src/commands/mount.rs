//! Mount command: serve a configured directory until interrupted.

use std::path::Path;
#[cfg(unix)]
use std::time::Duration;

#[cfg(unix)]
use fusebridge_config::BridgeConfig;
#[cfg(unix)]
use fusebridge_mount::{MountCoordinator, MountHandle, MountRequest};
#[cfg(unix)]
use tracing::{info, warn};

/// Mount arguments.
pub struct MountArgs {
    /// Name of the mount in the configuration.
    pub name: String,
    /// Reveal the mount point once mounted.
    pub reveal: bool,
}

/// Run the mount command.
///
/// Blocks until Ctrl-C or until the mount is taken down from outside, then
/// unmounts, falling back to a forced unmount.
#[cfg(unix)]
pub async fn run(config_path: &Path, args: MountArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::from_file(config_path)?.effective();
    config.validate_or_err()?;
    let mount = config.require_mount(&args.name)?;

    // Ensure mount point exists
    if !mount.mount_point.exists() {
        std::fs::create_dir_all(&mount.mount_point)?;
    }

    let coordinator = MountCoordinator::from_config(&config)?;
    let handle = coordinator.mount(MountRequest::from_config(mount)).await?;
    println!(
        "Mounted {} at {}",
        mount.directory.display(),
        handle.mount_point().display()
    );

    if args.reveal {
        if let Err(e) = tokio::task::block_in_place(|| handle.reveal()) {
            warn!("Could not reveal {}: {}", handle.mount_point().display(), e);
        }
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted, unmounting");
        }
        _ = wait_while_serving(&handle) => {
            info!("Mount at {} ended", handle.mount_point().display());
        }
    }

    unmount(handle).await
}

#[cfg(not(unix))]
pub async fn run(_config_path: &Path, args: MountArgs) -> Result<(), Box<dyn std::error::Error>> {
    Err(format!("Cannot mount '{}': FUSE mounts are not supported on this platform", args.name).into())
}

#[cfg(unix)]
async fn wait_while_serving(handle: &MountHandle) {
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    while handle.is_serving() {
        ticker.tick().await;
    }
}

#[cfg(unix)]
async fn unmount(handle: MountHandle) -> Result<(), Box<dyn std::error::Error>> {
    let mount_point = handle.mount_point().to_path_buf();

    if handle.is_serving() {
        handle.shut_down().await?;
    }

    println!("Unmounted {}", mount_point.display());
    Ok(())
}
