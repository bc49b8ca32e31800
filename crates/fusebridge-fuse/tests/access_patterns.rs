#![cfg(unix)]
//! Access patterns of real applications, replayed against the adapter.

use std::sync::Arc;
use std::thread;

use fusebridge_fuse::{FsOpError, IdentityTranscoder, ReadWriteAdapter};
use tempfile::TempDir;

// ============== Test Helpers ==============

fn make_adapter() -> (TempDir, ReadWriteAdapter) {
    let dir = TempDir::new().unwrap();
    let adapter = ReadWriteAdapter::with_defaults(dir.path());
    (dir, adapter)
}

fn assert_symlink_target_exists(adapter: &ReadWriteAdapter, link: &str, is_dir: bool) {
    if is_dir {
        let fh = adapter
            .opendir(link)
            .unwrap_or_else(|e| panic!("opendir {} failed: {}", link, e));
        adapter.releasedir(link, fh).unwrap();
    } else {
        let fh = adapter
            .open(link, libc::O_RDONLY)
            .unwrap_or_else(|e| panic!("open {} failed: {}", link, e));
        adapter.release(link, fh).unwrap();
    }
}

// ============== Scenarios ==============

/// Safe-save sequence used by document editors: write a temp copy, swap
/// names, then clean up while the original handles are still open.
#[test]
fn test_autosave_access_pattern() {
    let (_dir, adapter) = make_adapter();

    // echo "asd" > foo.txt
    let fi1 = adapter.create("/foo.txt", 0o644, libc::O_RDWR).unwrap();
    assert_eq!(adapter.write("/foo.txt", fi1, 0, b"asd").unwrap(), 3);

    // mkdir foo.txt-temp3000
    adapter.mkdir("foo.txt-temp3000", 0o755).unwrap();

    // echo "asdasd" > foo.txt-temp3000/foo.txt
    let fi2 = adapter
        .create("/foo.txt-temp3000/foo.txt", 0o644, libc::O_RDWR)
        .unwrap();
    adapter
        .write("/foo.txt-temp3000/foo.txt", fi2, 0, b"asdasd")
        .unwrap();

    // mv foo.txt foo.txt-temp3001
    adapter.rename("/foo.txt", "/foo.txt-temp3001").unwrap();

    // mv foo.txt-temp3000/foo.txt foo.txt
    adapter.rename("/foo.txt-temp3000/foo.txt", "/foo.txt").unwrap();
    adapter.release("/foo.txt-temp3000/foo.txt", fi2).unwrap();

    // rm -r foo.txt-temp3000
    adapter.rmdir("/foo.txt-temp3000").unwrap();

    // rm foo.txt-temp3001
    adapter.release("/foo.txt", fi1).unwrap();
    adapter.unlink("/foo.txt-temp3001").unwrap();

    // cat foo.txt
    let fi3 = adapter.open("/foo.txt", libc::O_RDONLY).unwrap();
    let data = adapter.read("/foo.txt", fi3, 0, 7).unwrap();
    adapter.release("/foo.txt", fi3).unwrap();

    assert_eq!(data.len(), 6);
    assert_eq!(data, b"asdasd");
    assert_eq!(adapter.open_handle_count(), 0);
}

#[test]
fn test_create_move_and_delete_symlinks() {
    let (_dir, adapter) = make_adapter();

    // touch foo.txt
    let fi1 = adapter.create("/foo.txt", 0o644, libc::O_RDWR).unwrap();
    adapter.release("/foo.txt", fi1).unwrap();

    // ln -s foo.txt bar.txt
    adapter.symlink("foo.txt", "/bar.txt").unwrap();
    assert_symlink_target_exists(&adapter, "/bar.txt", false);

    // mkdir test
    adapter.mkdir("test", 0o755).unwrap();

    // ln -s test test2
    adapter.symlink("test", "/test2").unwrap();
    assert_symlink_target_exists(&adapter, "/test2", true);

    // ln -sr ../foo.txt test/baz.txt
    adapter.symlink("../foo.txt", "test/baz.txt").unwrap();
    assert_symlink_target_exists(&adapter, "/test/baz.txt", false);
    assert_symlink_target_exists(&adapter, "/bar.txt", false);

    // move both into the subdirectory
    adapter.rename("/foo.txt", "/test/foo.txt").unwrap();
    adapter.rename("/bar.txt", "/test/bar.txt").unwrap();
    assert_symlink_target_exists(&adapter, "/test/bar.txt", false);

    // delete all
    adapter.unlink("/test2").unwrap();
    adapter.unlink("/test/foo.txt").unwrap();
    adapter.unlink("/test/bar.txt").unwrap();
    adapter.unlink("/test/baz.txt").unwrap();
    adapter.rmdir("/test").unwrap();

    assert!(adapter.readdir("/", None).unwrap().is_empty());
}

#[test]
fn test_missing_targets_fail_open() {
    let (_dir, adapter) = make_adapter();

    assert!(matches!(adapter.open("/nope", libc::O_RDONLY), Err(FsOpError::NotFound)));
    assert!(matches!(adapter.opendir("/nope"), Err(FsOpError::NotFound)));

    adapter.symlink("nowhere", "/dangling").unwrap();
    assert!(adapter.open("/dangling", libc::O_RDONLY).is_err());
    assert_eq!(adapter.open_handle_count(), 0);
}

#[test]
fn test_name_limits_and_parent_components() {
    let dir = TempDir::new().unwrap();
    let adapter = ReadWriteAdapter::new(dir.path(), 16, Arc::new(IdentityTranscoder));

    let long = "x".repeat(17);
    let err = adapter.mkdir(&format!("/{}", long), 0o755).unwrap_err();
    assert_eq!(err.to_errno(), libc::ENAMETOOLONG);

    let err = adapter.getattr("/../outside").unwrap_err();
    assert_eq!(err.to_errno(), libc::EINVAL);
    assert!(!dir.path().join(&long).exists());
}

#[test]
fn test_concurrent_writers_on_distinct_files() {
    let (_dir, adapter) = make_adapter();
    let adapter = Arc::new(adapter);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let adapter = Arc::clone(&adapter);
            thread::spawn(move || {
                let path = format!("/file-{}", i);
                let fh = adapter.create(&path, 0o644, libc::O_RDWR).unwrap();
                let payload = format!("payload {}", i);
                adapter.write(&path, fh, 0, payload.as_bytes()).unwrap();
                adapter.release(&path, fh).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(adapter.readdir("/", None).unwrap().len(), 8);
    assert_eq!(adapter.open_handle_count(), 0);
    let fh = adapter.open("/file-3", libc::O_RDONLY).unwrap();
    assert_eq!(adapter.read("/file-3", fh, 0, 64).unwrap(), b"payload 3");
    adapter.release("/file-3", fh).unwrap();
}
