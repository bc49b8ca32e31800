//! Handle to one active mount.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::command::CommandSpec;
use crate::error::{CommandError, ShutdownError, UnmountError};
use crate::platform::MountCommands;
use crate::session::MountSession;

/// One live mount, exclusively owned by whoever mounted it.
///
/// Only created once the native mount call is running. Unmounting consumes
/// the handle; a failed unmount hands it back through [`UnmountError`].
#[derive(Debug)]
pub struct MountHandle {
    mount_point: PathBuf,
    commands: MountCommands,
    session: MountSession,
}

impl MountHandle {
    pub(crate) fn new(mount_point: PathBuf, commands: MountCommands, session: MountSession) -> Self {
        MountHandle {
            mount_point,
            commands,
            session,
        }
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn reveal_command(&self) -> &CommandSpec {
        &self.commands.reveal
    }

    pub fn unmount_command(&self) -> &CommandSpec {
        &self.commands.unmount
    }

    pub fn unmount_forced_command(&self) -> &CommandSpec {
        &self.commands.unmount_forced
    }

    /// Whether the filesystem is still being served.
    pub fn is_serving(&self) -> bool {
        self.session.is_serving()
    }

    /// Show the mount point in the user's file manager.
    pub fn reveal(&self) -> Result<(), CommandError> {
        info!("Revealing {}", self.mount_point.display());
        self.commands.reveal.run()
    }

    /// Unmount gracefully. Fails while files inside the mount are in use.
    pub fn unmount(self) -> Result<Unmounted, UnmountError> {
        let command = self.commands.unmount.clone();
        self.unmount_with(&command)
    }

    /// Unmount even if the filesystem is busy.
    pub fn unmount_forced(self) -> Result<Unmounted, UnmountError> {
        let command = self.commands.unmount_forced.clone();
        self.unmount_with(&command)
    }

    /// Unmount gracefully, forcing it if the graceful unmount fails.
    pub fn unmount_or_force(self) -> Result<Unmounted, UnmountError> {
        match self.unmount() {
            Ok(unmounted) => Ok(unmounted),
            Err(e) => {
                warn!("{}: {}; forcing", e, e.command_error());
                e.into_handle().unmount_forced()
            }
        }
    }

    /// Take the mount down and wait for its thread, from async code.
    ///
    /// The unmount commands and the join block, so both run on tokio's
    /// blocking pool.
    pub async fn shut_down(self) -> Result<(), ShutdownError> {
        let unmounted = tokio::task::spawn_blocking(move || self.unmount_or_force())
            .await
            .map_err(|e| ShutdownError::Thread(io::Error::other(e)))??;
        tokio::task::spawn_blocking(move || unmounted.join())
            .await
            .map_err(|e| ShutdownError::Thread(io::Error::other(e)))?
            .map_err(ShutdownError::Thread)
    }

    fn unmount_with(self, command: &CommandSpec) -> Result<Unmounted, UnmountError> {
        match command.run() {
            Ok(()) => {
                info!("Unmounted {}", self.mount_point.display());
                Ok(Unmounted {
                    mount_point: self.mount_point,
                    session: self.session,
                })
            }
            Err(e) => {
                warn!("Unmounting {} failed: {}", self.mount_point.display(), e);
                Err(UnmountError::new(self, e))
            }
        }
    }
}

/// Proof that a mount was taken down.
#[derive(Debug)]
pub struct Unmounted {
    mount_point: PathBuf,
    session: MountSession,
}

impl Unmounted {
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Wait for the background mount thread to finish.
    pub fn join(self) -> io::Result<()> {
        self.session.join()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::session::MountEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn handle_with(unmount: CommandSpec, unmount_forced: CommandSpec) -> MountHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = std::thread::spawn(move || {
            let _ = tx.send(MountEvent::Exited(Ok(())));
        });
        let commands = MountCommands {
            reveal: CommandSpec::new("true"),
            unmount,
            unmount_forced,
        };
        MountHandle::new(PathBuf::from("/mnt/vault"), commands, MountSession::new(thread, rx))
    }

    #[test]
    fn test_unmount_success() {
        let handle = handle_with(CommandSpec::new("true"), CommandSpec::new("false"));
        handle.reveal().unwrap();

        let unmounted = handle.unmount().unwrap();
        assert_eq!(unmounted.mount_point(), Path::new("/mnt/vault"));
        unmounted.join().unwrap();
    }

    #[test]
    fn test_failed_unmount_returns_handle_for_forced_retry() {
        let handle = handle_with(
            CommandSpec::new("sh").arg("-c").arg("exit 3"),
            CommandSpec::new("true"),
        );

        let err = handle.unmount().unwrap_err();
        assert_eq!(err.command_error().exit_code(), Some(3));
        assert!(err.to_string().contains("/mnt/vault"));

        let unmounted = err.into_handle().unmount_forced().unwrap();
        unmounted.join().unwrap();
    }

    #[test]
    fn test_forced_unmount_failure_is_distinguishable() {
        let handle = handle_with(CommandSpec::new("true"), CommandSpec::new("false"));
        let (handle, err) = handle.unmount_forced().unwrap_err().into_parts();
        assert_eq!(err.exit_code(), Some(1));
        assert!(handle.unmount().is_ok());
    }

    #[test]
    fn test_unmount_or_force_falls_back() {
        let handle = handle_with(CommandSpec::new("false"), CommandSpec::new("true"));
        handle.unmount_or_force().unwrap().join().unwrap();

        let handle = handle_with(CommandSpec::new("false"), CommandSpec::new("false"));
        let err = handle.unmount_or_force().unwrap_err();
        assert_eq!(err.command_error().exit_code(), Some(1));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_shut_down_keeps_runtime_responsive() {
        let handle = handle_with(
            CommandSpec::new("sh").arg("-c").arg("sleep 0.3; exit 1"),
            CommandSpec::new("true"),
        );

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        handle.shut_down().await.unwrap();
        ticker.abort();

        // The single runtime thread kept polling while the unmount command ran
        assert!(ticks.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test]
    async fn test_shut_down_reports_failed_forced_unmount() {
        let handle = handle_with(CommandSpec::new("false"), CommandSpec::new("false"));
        let err = handle.shut_down().await.unwrap_err();
        assert!(matches!(err, ShutdownError::Unmount(_)));
    }

    #[test]
    fn test_reveal_failure() {
        let (tx, rx) = mpsc::unbounded_channel::<MountEvent>();
        drop(tx);
        let commands = MountCommands {
            reveal: CommandSpec::new("fusebridge-no-such-file-manager"),
            unmount: CommandSpec::new("true"),
            unmount_forced: CommandSpec::new("true"),
        };
        let handle = MountHandle::new(
            PathBuf::from("/mnt/vault"),
            commands,
            MountSession::new(std::thread::spawn(|| {}), rx),
        );

        assert!(matches!(handle.reveal(), Err(CommandError::Launch { .. })));
    }
}
