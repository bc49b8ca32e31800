use std::collections::HashSet;
use std::path::{Component, Path};

use crate::types::BridgeConfig;
use crate::ConfigError;

/// File names above this length are rejected by every common host filesystem.
const HOST_NAME_MAX: usize = 255;

impl BridgeConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.detection_window.as_duration().is_zero() {
            errors.push(ConfigError::InvalidConfig(
                "detection_window must be greater than zero".to_string(),
            ));
        }

        if self.max_file_name_length == 0 || self.max_file_name_length > HOST_NAME_MAX {
            errors.push(ConfigError::InvalidConfig(format!(
                "max_file_name_length must be between 1 and {}, got {}",
                HOST_NAME_MAX, self.max_file_name_length
            )));
        }

        let mut seen_mount_points = HashSet::new();
        for (name, mount) in &self.mounts {
            if mount.directory.as_os_str().is_empty() {
                errors.push(ConfigError::InvalidConfig(format!(
                    "Mount '{}' has an empty directory",
                    name
                )));
            }

            if let Err(reason) = check_mount_point(&mount.mount_point) {
                errors.push(ConfigError::InvalidMountPoint(
                    mount.mount_point.display().to_string(),
                    reason,
                ));
            }

            if !seen_mount_points.insert(&mount.mount_point) {
                errors.push(ConfigError::DuplicateMountPoint(
                    mount.mount_point.display().to_string(),
                ));
            }

            // Serving a directory onto itself (or a child) recurses through FUSE.
            if !mount.directory.as_os_str().is_empty()
                && mount.mount_point.starts_with(&mount.directory)
            {
                errors.push(ConfigError::InvalidMountPoint(
                    mount.mount_point.display().to_string(),
                    format!("must not be inside the served directory of mount '{}'", name),
                ));
            }

            if let Some(flags) = &mount.fuse_flags {
                for flag in flags {
                    if !flag.starts_with('-') {
                        errors.push(ConfigError::InvalidConfig(format!(
                            "Mount '{}' has malformed fuse flag '{}'; flags start with '-'",
                            name, flag
                        )));
                    }
                }
            }
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }
}

/// A mount point needs a final name and a parent: the unmount utilities run
/// from the parent and address the mount by its name.
fn check_mount_point(path: &Path) -> Result<(), String> {
    if path.as_os_str().is_empty() {
        return Err("Mount point must not be empty".to_string());
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err("Mount point must not contain '..'".to_string());
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(_)) if !parent.as_os_str().is_empty() || path.is_relative() => Ok(()),
        _ => Err("Mount point needs a parent directory and a final name".to_string()),
    }
}
