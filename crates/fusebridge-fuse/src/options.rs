//! Translation of libfuse-style mount flags into `fuser` options.
//!
//! Mount flags are written the way the `fuse` command line tools accept them
//! (`-oauto_unmount`, `-o uid=501,gid=20`). The kernel mount done by `fuser`
//! only understands a subset of them, so high-level options are pulled out and
//! applied by the filesystem front instead.

use std::io;

use fuser::MountOption;
use tracing::warn;

/// Options a filesystem front is mounted with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuseOptions {
    /// Options handed to the kernel mount.
    pub mount_options: Vec<MountOption>,
    /// Reported owner of every entry, overriding the host owner.
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Request `FUSE_ATOMIC_O_TRUNC` during `init`.
    pub atomic_o_trunc: bool,
    /// Log every request at info level.
    pub debug: bool,
}

impl FuseOptions {
    /// Parse a list of mount flags.
    pub fn parse<S: AsRef<str>>(flags: &[S]) -> io::Result<Self> {
        let mut options = FuseOptions::default();
        let mut iter = flags.iter().map(AsRef::as_ref);

        while let Some(flag) = iter.next() {
            if flag == "-o" {
                let list = iter.next().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "-o requires an argument")
                })?;
                options.apply_list(list)?;
            } else if let Some(list) = flag.strip_prefix("-o") {
                options.apply_list(list)?;
            } else if flag == "-d" || flag == "--debug" {
                options.debug = true;
            } else {
                warn!("ignoring unsupported mount flag {}", flag);
            }
        }

        Ok(options)
    }

    fn apply_list(&mut self, list: &str) -> io::Result<()> {
        for option in list.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            self.apply(option)?;
        }
        Ok(())
    }

    fn apply(&mut self, option: &str) -> io::Result<()> {
        let (key, value) = match option.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (option, None),
        };

        let mount_option = match (key, value) {
            ("uid", Some(value)) => {
                self.uid = Some(parse_id(key, value)?);
                return Ok(());
            }
            ("gid", Some(value)) => {
                self.gid = Some(parse_id(key, value)?);
                return Ok(());
            }
            ("atomic_o_trunc", None) => {
                self.atomic_o_trunc = true;
                return Ok(());
            }
            ("debug", None) => {
                self.debug = true;
                return Ok(());
            }
            ("fsname", Some(value)) => MountOption::FSName(value.to_string()),
            ("subtype", Some(value)) => MountOption::Subtype(value.to_string()),
            ("auto_unmount", None) => MountOption::AutoUnmount,
            ("allow_other", None) => MountOption::AllowOther,
            ("allow_root", None) => MountOption::AllowRoot,
            ("default_permissions", None) => MountOption::DefaultPermissions,
            ("ro", None) => MountOption::RO,
            ("rw", None) => MountOption::RW,
            ("dev", None) => MountOption::Dev,
            ("nodev", None) => MountOption::NoDev,
            ("suid", None) => MountOption::Suid,
            ("nosuid", None) => MountOption::NoSuid,
            ("exec", None) => MountOption::Exec,
            ("noexec", None) => MountOption::NoExec,
            ("atime", None) => MountOption::Atime,
            ("noatime", None) => MountOption::NoAtime,
            ("sync", None) => MountOption::Sync,
            ("async", None) => MountOption::Async,
            ("dirsync", None) => MountOption::DirSync,
            _ => MountOption::CUSTOM(option.to_string()),
        };

        if !self.mount_options.contains(&mount_option) {
            self.mount_options.push(mount_option);
        }
        Ok(())
    }

    /// Whether the kernel unmounts the filesystem when the session ends.
    pub fn auto_unmount(&self) -> bool {
        self.mount_options.contains(&MountOption::AutoUnmount)
    }
}

fn parse_id(key: &str, value: &str) -> io::Result<u32> {
    value.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid {} in mount options: {}", key, value),
        )
    })
}
