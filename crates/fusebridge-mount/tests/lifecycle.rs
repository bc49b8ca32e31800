#![cfg(unix)]
//! Mount lifecycle tests against scripted native mount backends.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fusebridge_config::{BridgeConfig, HostPlatform};
use fusebridge_fuse::{FuseOptions, ReadWriteAdapter};
use fusebridge_mount::{
    MountCoordinator, MountEnvironment, MountError, MountRequest, NativeMount, PlatformMounter,
    ReadySignal, UserIdentity,
};
use tempfile::TempDir;

// ============== Test Helpers ==============

#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Signal readiness, then serve until released.
    ReadyThenServe,
    /// Serve until released without ever signalling readiness.
    ServeSilently,
    /// Fail the way a missing FUSE device does.
    Fail,
    /// Return successfully without mounting.
    ReturnEarly,
    Panic,
}

#[derive(Clone)]
struct FakeMount {
    behavior: Behavior,
    release: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    last_options: Arc<Mutex<Option<FuseOptions>>>,
}

impl FakeMount {
    fn new(behavior: Behavior) -> Self {
        FakeMount {
            behavior,
            release: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
            last_options: Arc::new(Mutex::new(None)),
        }
    }

    fn serve(&self) -> io::Result<()> {
        while !self.release.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }
}

impl NativeMount for FakeMount {
    fn mount(
        &self,
        _adapter: ReadWriteAdapter,
        _mount_point: &Path,
        options: FuseOptions,
        ready: ReadySignal,
    ) -> io::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options);

        match self.behavior {
            Behavior::ReadyThenServe => {
                ready.notify();
                self.serve()
            }
            Behavior::ServeSilently => self.serve(),
            Behavior::Fail => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "fuse: device not found",
            )),
            Behavior::ReturnEarly => Ok(()),
            Behavior::Panic => panic!("native mount crashed"),
        }
    }
}

fn linux_mounter() -> PlatformMounter {
    PlatformMounter::with_identity(HostPlatform::Linux, UserIdentity { uid: 1000, gid: 100 })
        .unwrap()
}

fn coordinator(fake: &FakeMount, window: Duration) -> MountCoordinator<FakeMount> {
    MountCoordinator::new(linux_mounter(), fake.clone()).with_detection_window(window)
}

fn request(dir: &TempDir, name: &str) -> MountRequest {
    let mount_point = dir.path().join(name);
    MountRequest::new(dir.path().join("data"), MountEnvironment::new(mount_point))
}

async fn wait_until_stopped(handle: &fusebridge_mount::MountHandle) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.is_serving() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============== Outcomes ==============

#[tokio::test]
async fn test_readiness_signal_returns_before_window() {
    let dir = TempDir::new().unwrap();
    let fake = FakeMount::new(Behavior::ReadyThenServe);
    let coordinator = coordinator(&fake, Duration::from_secs(5));

    let started = Instant::now();
    let handle = coordinator.mount(request(&dir, "mnt")).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(handle.is_serving());
    assert_eq!(handle.mount_point(), dir.path().join("mnt"));
    assert_eq!(handle.unmount_command().program(), "fusermount");
    assert_eq!(handle.unmount_command().cwd(), Some(dir.path()));

    fake.release.store(true, Ordering::SeqCst);
    wait_until_stopped(&handle).await;
    assert!(!handle.is_serving());
}

#[tokio::test]
async fn test_silent_mount_succeeds_after_window() {
    let dir = TempDir::new().unwrap();
    let fake = FakeMount::new(Behavior::ServeSilently);
    let window = Duration::from_millis(300);
    let coordinator = coordinator(&fake, window);

    let started = Instant::now();
    let handle = coordinator.mount(request(&dir, "mnt")).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= window, "returned after {:?}", elapsed);
    assert!(elapsed < window + Duration::from_secs(2));
    assert!(handle.is_serving());

    fake.release.store(true, Ordering::SeqCst);
}

#[tokio::test]
async fn test_native_failure_is_reported_with_cause() {
    let dir = TempDir::new().unwrap();
    let fake = FakeMount::new(Behavior::Fail);
    let coordinator = coordinator(&fake, Duration::from_secs(5));

    let started = Instant::now();
    let err = coordinator.mount(request(&dir, "mnt")).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));

    match err {
        MountError::MountFailed(cause) => {
            assert_eq!(cause.kind(), io::ErrorKind::NotFound);
            assert_eq!(cause.to_string(), "fuse: device not found");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_early_return_is_unknown_failure() {
    let dir = TempDir::new().unwrap();
    let fake = FakeMount::new(Behavior::ReturnEarly);
    let coordinator = coordinator(&fake, Duration::from_secs(5));

    let err = coordinator.mount(request(&dir, "mnt")).await.unwrap_err();
    assert!(matches!(err, MountError::MountFailedUnknown(_)));
}

#[tokio::test]
async fn test_panicking_mount_is_unknown_failure() {
    let dir = TempDir::new().unwrap();
    let fake = FakeMount::new(Behavior::Panic);
    let coordinator = coordinator(&fake, Duration::from_secs(5));

    let err = coordinator.mount(request(&dir, "mnt")).await.unwrap_err();
    assert!(matches!(err, MountError::MountFailedUnknown(_)));
}

// ============== Coordination ==============

#[tokio::test]
async fn test_attempts_are_serialized() {
    let dir = TempDir::new().unwrap();
    let fake = FakeMount::new(Behavior::ServeSilently);
    let window = Duration::from_millis(300);
    let coordinator = coordinator(&fake, window);

    let started = Instant::now();
    let (first, second) = tokio::join!(
        coordinator.mount(request(&dir, "one")),
        coordinator.mount(request(&dir, "two")),
    );
    let elapsed = started.elapsed();

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert!(elapsed >= window * 2, "returned after {:?}", elapsed);
    assert_eq!(fake.calls.load(Ordering::SeqCst), 2);

    fake.release.store(true, Ordering::SeqCst);
}

#[tokio::test]
async fn test_abandoned_attempt_keeps_running_and_releases_lock() {
    let dir = TempDir::new().unwrap();
    let fake = FakeMount::new(Behavior::ServeSilently);
    let coordinator = coordinator(&fake, Duration::from_millis(500));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), coordinator.mount(request(&dir, "a")))
            .await;
    assert!(abandoned.is_err());

    let handle = coordinator.mount(request(&dir, "b")).await.unwrap();
    assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
    assert!(handle.is_serving());

    fake.release.store(true, Ordering::SeqCst);
}

#[tokio::test]
async fn test_default_flags_and_debug_reach_native_mount() {
    let dir = TempDir::new().unwrap();
    let fake = FakeMount::new(Behavior::ReadyThenServe);
    let coordinator = coordinator(&fake, Duration::from_secs(5));

    let _handle = coordinator
        .mount(request(&dir, "mnt").with_debug(true))
        .await
        .unwrap();

    let options = fake.last_options.lock().unwrap().clone().unwrap();
    assert_eq!(options.uid, Some(1000));
    assert_eq!(options.gid, Some(100));
    assert!(options.atomic_o_trunc);
    assert!(options.auto_unmount());
    assert!(options.debug);

    fake.release.store(true, Ordering::SeqCst);
}

#[tokio::test]
async fn test_flag_override_replaces_defaults() {
    let dir = TempDir::new().unwrap();
    let fake = FakeMount::new(Behavior::ReadyThenServe);
    let coordinator = coordinator(&fake, Duration::from_secs(5));

    let env = MountEnvironment::new(dir.path().join("mnt")).with_fuse_flags(["-oro"]);
    let _handle = coordinator
        .mount(MountRequest::new(dir.path(), env))
        .await
        .unwrap();

    let options = fake.last_options.lock().unwrap().clone().unwrap();
    assert_eq!(options.uid, None);
    assert!(!options.atomic_o_trunc);
    assert!(!options.auto_unmount());

    fake.release.store(true, Ordering::SeqCst);
}

#[tokio::test]
async fn test_invalid_requests_fail_before_launch() {
    let dir = TempDir::new().unwrap();
    let fake = FakeMount::new(Behavior::ReadyThenServe);
    let coordinator = coordinator(&fake, Duration::from_secs(5));

    let env = MountEnvironment::new(dir.path().join("mnt")).with_fuse_flags(["-ouid=alice"]);
    let err = coordinator
        .mount(MountRequest::new(dir.path(), env))
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::MountFailed(_)));

    let err = coordinator
        .mount(MountRequest::new(dir.path(), MountEnvironment::new("/")))
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::InvalidMountPoint { .. }));

    let env = MountEnvironment::new(dir.path().join("mnt")).with_reveal_command("open 'oops");
    let err = coordinator
        .mount(MountRequest::new(dir.path(), env))
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::InvalidRevealCommand(_)));

    assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_relative_config_paths_validate_and_mount() {
    let config = BridgeConfig::from_yaml(
        r#"
mounts:
  vault:
    directory: data
    mount_point: mnt
"#,
    )
    .unwrap()
    .effective();
    config.validate_or_err().unwrap();

    let fake = FakeMount::new(Behavior::ReadyThenServe);
    let coordinator = coordinator(&fake, Duration::from_secs(5));
    let mount = config.require_mount("vault").unwrap();
    let handle = coordinator
        .mount(MountRequest::from_config(mount))
        .await
        .unwrap();

    let cwd = std::env::current_dir().unwrap();
    assert_eq!(handle.mount_point(), cwd.join("mnt"));
    assert_eq!(handle.unmount_command().cwd(), Some(cwd.as_path()));
    assert_eq!(handle.unmount_command().args(), ["-u".to_string(), "mnt".to_string()]);

    fake.release.store(true, Ordering::SeqCst);
}

// ============== Real FUSE ==============

/// Needs `/dev/fuse` and `fusermount`.
#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn test_real_fuse_mount_roundtrip() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let mount_point = dir.path().join("mnt");
    std::fs::create_dir(&data).unwrap();
    std::fs::create_dir(&mount_point).unwrap();

    let coordinator = MountCoordinator::for_host(HostPlatform::Linux).unwrap();
    let handle = coordinator
        .mount(MountRequest::new(&data, MountEnvironment::new(&mount_point)))
        .await
        .unwrap();

    std::fs::write(mount_point.join("hello.txt"), b"through fuse").unwrap();
    assert_eq!(std::fs::read(data.join("hello.txt")).unwrap(), b"through fuse");

    handle.shut_down().await.unwrap();
}
