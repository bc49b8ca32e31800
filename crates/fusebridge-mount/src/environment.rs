//! Mount requests and the environment they are mounted into.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fusebridge_config::MountConfig;
use fusebridge_fuse::{FileNameTranscoder, IdentityTranscoder};
use tracing::warn;

/// Where and how a directory is mounted.
#[derive(Debug, Clone)]
pub struct MountEnvironment {
    mount_point: PathBuf,
    reveal_command: Option<String>,
    fuse_flags: Option<Vec<String>>,
    transcoder: Arc<dyn FileNameTranscoder>,
}

impl MountEnvironment {
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        MountEnvironment {
            mount_point: mount_point.into(),
            reveal_command: None,
            fuse_flags: None,
            transcoder: Arc::new(IdentityTranscoder),
        }
    }

    /// Command line used instead of the platform's default file manager.
    pub fn with_reveal_command(mut self, command: impl Into<String>) -> Self {
        self.reveal_command = Some(command.into());
        self
    }

    /// Mount flags replacing the platform defaults.
    pub fn with_fuse_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fuse_flags = Some(flags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_transcoder(mut self, transcoder: Arc<dyn FileNameTranscoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn reveal_command(&self) -> Option<&str> {
        self.reveal_command.as_deref()
    }

    pub fn fuse_flags(&self) -> Option<&[String]> {
        self.fuse_flags.as_deref()
    }

    pub fn transcoder(&self) -> Arc<dyn FileNameTranscoder> {
        Arc::clone(&self.transcoder)
    }
}

/// A request to mount one directory. Consumed by a single mount attempt.
#[derive(Debug, Clone)]
pub struct MountRequest {
    pub directory: PathBuf,
    pub environment: MountEnvironment,
    pub debug: bool,
}

impl MountRequest {
    pub fn new(directory: impl Into<PathBuf>, environment: MountEnvironment) -> Self {
        MountRequest {
            directory: directory.into(),
            environment,
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Build a request from a configured mount (after defaults were applied).
    ///
    /// Relative directories and mount points are taken relative to the
    /// current working directory.
    pub fn from_config(mount: &MountConfig) -> Self {
        let mut environment = MountEnvironment::new(absolute(&mount.mount_point));
        if let Some(command) = &mount.reveal_command {
            environment = environment.with_reveal_command(command.clone());
        }
        if let Some(flags) = &mount.fuse_flags {
            environment = environment.with_fuse_flags(flags.iter().cloned());
        }
        MountRequest::new(absolute(&mount.directory), environment).with_debug(mount.debug)
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(e) => {
            warn!("Cannot resolve {} against the working directory: {}", path.display(), e);
            path.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_defaults() {
        let env = MountEnvironment::new("/mnt/vault");
        assert_eq!(env.mount_point(), Path::new("/mnt/vault"));
        assert!(env.reveal_command().is_none());
        assert!(env.fuse_flags().is_none());
        assert_eq!(env.transcoder().fuse_to_storage("a"), "a");
    }

    #[test]
    fn test_request_from_config() {
        let mount = MountConfig {
            directory: PathBuf::from("/data/vault"),
            mount_point: PathBuf::from("/mnt/vault"),
            reveal_command: Some("nautilus".to_string()),
            fuse_flags: Some(vec!["-oro".to_string()]),
            debug: true,
        };

        let request = MountRequest::from_config(&mount);
        assert_eq!(request.directory, PathBuf::from("/data/vault"));
        assert!(request.debug);
        assert_eq!(request.environment.reveal_command(), Some("nautilus"));
        assert_eq!(request.environment.fuse_flags(), Some(&["-oro".to_string()][..]));
    }

    #[test]
    fn test_request_from_config_resolves_relative_paths() {
        let mount = MountConfig {
            directory: PathBuf::from("data"),
            mount_point: PathBuf::from("mnt"),
            reveal_command: None,
            fuse_flags: None,
            debug: false,
        };

        let cwd = std::env::current_dir().unwrap();
        let request = MountRequest::from_config(&mount);
        assert_eq!(request.directory, cwd.join("data"));
        assert_eq!(request.environment.mount_point(), cwd.join("mnt"));
    }
}
