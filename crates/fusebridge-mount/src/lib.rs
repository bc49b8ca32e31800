//! Mount lifecycle for fusebridge.
//!
//! - `coordinator`: `MountCoordinator`, turns the blocking native mount call
//!   into an awaitable "mounted" result
//! - `platform`: per-OS mounters (default flags, reveal and unmount commands)
//! - `handle`: `MountHandle`, reveal and unmount an active mount
//!
//! # Example
//!
//! ```ignore
//! use fusebridge_mount::{MountCoordinator, MountEnvironment, MountRequest};
//!
//! let coordinator = MountCoordinator::for_host(HostPlatform::detect())?;
//! let request = MountRequest::new("/home/me/vault", MountEnvironment::new("/home/me/mnt"));
//! let handle = coordinator.mount(request).await?;
//! handle.reveal()?;
//! handle.shut_down().await?;
//! ```

mod command;
#[cfg(unix)]
mod coordinator;
mod environment;
mod error;
mod handle;
#[cfg(unix)]
mod native;
pub mod platform;
mod session;

pub use command::CommandSpec;
#[cfg(unix)]
pub use coordinator::MountCoordinator;
pub use environment::{MountEnvironment, MountRequest};
pub use error::{CommandError, MountError, ShutdownError, UnmountError};
pub use handle::{MountHandle, Unmounted};
#[cfg(unix)]
pub use native::{FuserMount, NativeMount};
pub use platform::{MountCommands, PlatformMounter, UserIdentity};
pub use session::{MountEvent, MountSession, ReadySignal};
