//! The background thread serving one mount, and the events it reports.

use std::io;
use std::thread::JoinHandle;

use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Progress reported by the thread running the native mount call.
#[derive(Debug)]
pub enum MountEvent {
    /// The kernel mount exists and requests are about to be served.
    Ready,
    /// The native mount call returned.
    Exited(io::Result<()>),
}

/// One-shot signal handed to the native mount call.
///
/// Calling [`ReadySignal::notify`] tells the coordinator the mount is
/// established, so it does not have to wait for the detection window.
#[derive(Debug)]
pub struct ReadySignal {
    events: UnboundedSender<MountEvent>,
}

impl ReadySignal {
    pub(crate) fn new(events: UnboundedSender<MountEvent>) -> Self {
        ReadySignal { events }
    }

    pub fn notify(self) {
        // The coordinator may have stopped listening; the mount goes on.
        let _ = self.events.send(MountEvent::Ready);
    }
}

/// Ownership of a running mount's background thread.
#[derive(Debug)]
pub struct MountSession {
    thread: JoinHandle<()>,
    events: UnboundedReceiver<MountEvent>,
}

impl MountSession {
    pub(crate) fn new(thread: JoinHandle<()>, events: UnboundedReceiver<MountEvent>) -> Self {
        MountSession { thread, events }
    }

    /// Whether the native mount call is still running.
    pub fn is_serving(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Block until the mount thread ends and return the native call's result.
    pub fn join(mut self) -> io::Result<()> {
        if self.thread.join().is_err() {
            return Err(io::Error::other("mount thread panicked"));
        }

        loop {
            match self.events.try_recv() {
                Ok(MountEvent::Exited(result)) => return result,
                Ok(MountEvent::Ready) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    debug!("Mount thread ended without reporting a result");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn session_with(result: io::Result<()>) -> MountSession {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = std::thread::spawn(move || {
            ReadySignal::new(tx.clone()).notify();
            let _ = tx.send(MountEvent::Exited(result));
        });
        MountSession::new(thread, rx)
    }

    #[test]
    fn test_join_returns_native_result() {
        assert!(session_with(Ok(())).join().is_ok());

        let err = session_with(Err(io::Error::from_raw_os_error(19)))
            .join()
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(19));
    }

    #[test]
    fn test_join_reports_panics() {
        let (_tx, rx) = mpsc::unbounded_channel::<MountEvent>();
        let thread = std::thread::spawn(|| panic!("native mount blew up"));
        let err = MountSession::new(thread, rx).join().unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }

    #[test]
    fn test_is_serving_tracks_thread() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (_tx, rx) = mpsc::unbounded_channel();
        let thread = std::thread::spawn(move || {
            let _ = release_rx.recv();
        });
        let session = MountSession::new(thread, rx);
        assert!(session.is_serving());

        release_tx.send(()).unwrap();
        session.join().unwrap();
    }
}
