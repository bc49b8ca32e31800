//! Mount lifecycle coordination.
//!
//! The native mount call blocks for as long as the filesystem is mounted,
//! so it runs on a dedicated thread. The coordinator waits for that thread
//! to either report readiness, fail, or stay silent for the detection window,
//! and classifies the attempt accordingly:
//!
//! | observed within the window     | outcome                |
//! |--------------------------------|------------------------|
//! | readiness signal               | mounted                |
//! | native call returned an error  | `MountFailed(cause)`   |
//! | native call returned `Ok`      | `MountFailedUnknown`   |
//! | thread died without reporting  | `MountFailedUnknown`   |
//! | nothing                        | mounted (heuristic)    |

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fusebridge_config::{BridgeConfig, HostPlatform, DEFAULT_DETECTION_WINDOW};
use fusebridge_fuse::{FuseOptions, ReadWriteAdapter, DEFAULT_MAX_FILE_NAME_LENGTH};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::environment::MountRequest;
use crate::error::MountError;
use crate::handle::MountHandle;
use crate::native::{FuserMount, NativeMount};
use crate::platform::PlatformMounter;
use crate::session::{MountEvent, MountSession, ReadySignal};

/// How a mount attempt ended within the detection window.
#[derive(Debug)]
enum Outcome {
    Ready,
    Settled,
    Failed(std::io::Error),
    Returned,
    Vanished,
}

impl From<MountEvent> for Outcome {
    fn from(event: MountEvent) -> Self {
        match event {
            MountEvent::Ready => Outcome::Ready,
            MountEvent::Exited(Ok(())) => Outcome::Returned,
            MountEvent::Exited(Err(e)) => Outcome::Failed(e),
        }
    }
}

/// Logs when a mount attempt is dropped before it was classified.
struct AbandonGuard<'a> {
    mount_point: &'a Path,
    armed: bool,
}

impl<'a> AbandonGuard<'a> {
    fn new(mount_point: &'a Path) -> Self {
        AbandonGuard {
            mount_point,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "Mount attempt at {} abandoned; the background mount keeps running",
                self.mount_point.display()
            );
        }
    }
}

/// Runs mount attempts one at a time for a single platform.
#[derive(Debug)]
pub struct MountCoordinator<N: NativeMount = FuserMount> {
    mounter: PlatformMounter,
    native: Arc<N>,
    detection_window: Duration,
    max_file_name_length: usize,
    attempts: AtomicU64,
    lock: Mutex<()>,
}

impl MountCoordinator<FuserMount> {
    /// Coordinator mounting through `fuser` on `host`.
    pub fn for_host(host: HostPlatform) -> Result<Self, MountError> {
        Ok(Self::new(PlatformMounter::for_host(host)?, FuserMount))
    }

    /// Coordinator honoring the platform, window and name limit of `config`.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, MountError> {
        Ok(Self::for_host(config.host_platform())?
            .with_detection_window(config.detection_window.as_duration())
            .with_max_file_name_length(config.max_file_name_length))
    }
}

impl<N: NativeMount> MountCoordinator<N> {
    pub fn new(mounter: PlatformMounter, native: N) -> Self {
        MountCoordinator {
            mounter,
            native: Arc::new(native),
            detection_window: DEFAULT_DETECTION_WINDOW,
            max_file_name_length: DEFAULT_MAX_FILE_NAME_LENGTH,
            attempts: AtomicU64::new(0),
            lock: Mutex::new(()),
        }
    }

    pub fn with_detection_window(mut self, window: Duration) -> Self {
        self.detection_window = window;
        self
    }

    pub fn with_max_file_name_length(mut self, max: usize) -> Self {
        self.max_file_name_length = max;
        self
    }

    pub fn mounter(&self) -> &PlatformMounter {
        &self.mounter
    }

    pub fn detection_window(&self) -> Duration {
        self.detection_window
    }

    /// Mount `request.directory` and return a handle once the mount is up.
    ///
    /// Concurrent calls are served one after another. Dropping the returned
    /// future does not stop a mount that was already launched.
    pub async fn mount(&self, request: MountRequest) -> Result<MountHandle, MountError> {
        let _attempt = self.lock.lock().await;

        let MountRequest {
            directory,
            environment,
            debug,
        } = request;
        let mount_point = environment.mount_point().to_path_buf();

        let commands = self.mounter.mount_commands(&environment)?;
        let flags = match environment.fuse_flags() {
            Some(flags) => flags.to_vec(),
            None => self.mounter.default_mount_flags(),
        };
        let mut options = FuseOptions::parse(&flags).map_err(MountError::MountFailed)?;
        options.debug |= debug;

        let adapter = ReadWriteAdapter::new(
            directory.clone(),
            self.max_file_name_length,
            environment.transcoder(),
        );

        info!(
            "Mounting {} at {} ({} mounter)",
            directory.display(),
            mount_point.display(),
            self.mounter.name()
        );
        debug!("Mount flags: {:?}", flags);

        let (events, mut rx) = mpsc::unbounded_channel();
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
        let native = Arc::clone(&self.native);
        let thread_mount_point = mount_point.clone();
        let thread = std::thread::Builder::new()
            .name(format!("fusebridge-mount-{}", attempt))
            .spawn(move || {
                let ready = ReadySignal::new(events.clone());
                let result = native.mount(adapter, &thread_mount_point, options, ready);
                match &result {
                    Ok(()) => info!("Mount at {} ended", thread_mount_point.display()),
                    Err(e) => warn!("Mount at {} failed: {}", thread_mount_point.display(), e),
                }
                let _ = events.send(MountEvent::Exited(result));
            })
            .map_err(MountError::MountFailed)?;

        let guard = AbandonGuard::new(&mount_point);
        let started = Instant::now();
        let outcome = self.await_outcome(&mut rx, &mount_point).await;
        guard.disarm();

        match outcome {
            Outcome::Ready | Outcome::Settled => {
                info!(
                    "Mounted {} after {:?}",
                    mount_point.display(),
                    started.elapsed()
                );
                let session = MountSession::new(thread, rx);
                Ok(self
                    .mounter
                    .create_mount_handle(mount_point, commands, session))
            }
            Outcome::Failed(cause) => Err(MountError::MountFailed(cause)),
            Outcome::Returned => Err(MountError::MountFailedUnknown(
                "the mount call returned before the mount was established".to_string(),
            )),
            Outcome::Vanished => Err(MountError::MountFailedUnknown(
                "the mount thread ended without reporting a result".to_string(),
            )),
        }
    }

    async fn await_outcome(
        &self,
        rx: &mut UnboundedReceiver<MountEvent>,
        mount_point: &Path,
    ) -> Outcome {
        match tokio::time::timeout(self.detection_window, rx.recv()).await {
            Ok(Some(event)) => event.into(),
            Ok(None) => Outcome::Vanished,
            Err(_elapsed) => match rx.try_recv() {
                Ok(event) => event.into(),
                Err(TryRecvError::Disconnected) => Outcome::Vanished,
                Err(TryRecvError::Empty) => {
                    warn!(
                        "No readiness signal for {} within {:?}; assuming it is mounted",
                        mount_point.display(),
                        self.detection_window
                    );
                    Outcome::Settled
                }
            },
        }
    }
}
