use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default time the coordinator waits for a mount to either fail or settle.
pub const DEFAULT_DETECTION_WINDOW: Duration = Duration::from_millis(1000);

/// Default upper bound for a single file name inside a mount.
pub const DEFAULT_MAX_FILE_NAME_LENGTH: usize = 254;

/// Host operating system a mount is performed on.
///
/// Detected once at process start (or pinned in the config file) and passed
/// down explicitly instead of being queried wherever it is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPlatform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl HostPlatform {
    /// Determine the platform this binary was built for.
    pub fn detect() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map an OS name as reported by `std::env::consts::OS`.
    pub fn from_os_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "linux" => HostPlatform::Linux,
            "macos" | "darwin" => HostPlatform::MacOs,
            "windows" => HostPlatform::Windows,
            _ => HostPlatform::Other,
        }
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostPlatform::Linux => "linux",
            HostPlatform::MacOs => "macos",
            HostPlatform::Windows => "windows",
            HostPlatform::Other => "other",
        };
        f.write_str(name)
    }
}

/// Human-readable duration (e.g., "200ms", "2s", "1m").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl Default for HumanDuration {
    fn default() -> Self {
        HumanDuration(DEFAULT_DETECTION_WINDOW)
    }
}

impl HumanDuration {
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
            (num, "ms")
        } else if let Some(num) = s.strip_suffix('s') {
            (num, "s")
        } else if let Some(num) = s.strip_suffix('m') {
            (num, "m")
        } else {
            // Bare numbers are milliseconds
            (s.as_str(), "ms")
        };

        let num: u64 = num_str
            .trim()
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", s))?;

        let duration = match unit {
            "ms" => Duration::from_millis(num),
            "s" => Duration::from_secs(num),
            _ => Duration::from_secs(
                num.checked_mul(60)
                    .ok_or_else(|| format!("Duration out of range: {}", s))?,
            ),
        };

        Ok(HumanDuration(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();

        if millis % 60_000 == 0 && millis > 0 {
            write!(f, "{}m", millis / 60_000)
        } else if millis % 1000 == 0 && millis > 0 {
            write!(f, "{}s", millis / 1000)
        } else {
            write!(f, "{}ms", millis)
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(HumanDuration(Duration::from_millis(ms))),
            Raw::Text(s) => HumanDuration::from_str(&s).map_err(serde::de::Error::custom),
        }
    }
}

/// Settings shared by every mount unless the mount overrides them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MountDefaults {
    /// Command used to reveal a mount point, e.g. `nautilus` or `dolphin --select`.
    #[serde(default)]
    pub reveal_command: Option<String>,
    /// Native mount flags, replacing the platform defaults.
    #[serde(default)]
    pub fuse_flags: Option<Vec<String>>,
}

/// One directory to expose through a FUSE mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Directory whose contents are served.
    pub directory: PathBuf,
    /// Where the filesystem appears.
    pub mount_point: PathBuf,
    #[serde(default)]
    pub reveal_command: Option<String>,
    #[serde(default)]
    pub fuse_flags: Option<Vec<String>>,
    #[serde(default)]
    pub debug: bool,
}

/// Top-level fusebridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Pin the host platform instead of detecting it.
    #[serde(default)]
    pub platform: Option<HostPlatform>,
    #[serde(default)]
    pub detection_window: HumanDuration,
    #[serde(default = "default_max_file_name_length")]
    pub max_file_name_length: usize,
    #[serde(default)]
    pub defaults: Option<MountDefaults>,
    #[serde(default)]
    pub mounts: IndexMap<String, MountConfig>,
}

fn default_max_file_name_length() -> usize {
    DEFAULT_MAX_FILE_NAME_LENGTH
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            name: None,
            platform: None,
            detection_window: HumanDuration::default(),
            max_file_name_length: default_max_file_name_length(),
            defaults: None,
            mounts: IndexMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Host platform to mount on: the pinned value, or the detected one.
    pub fn host_platform(&self) -> HostPlatform {
        self.platform.unwrap_or_else(HostPlatform::detect)
    }

    /// Look up a mount by name.
    pub fn mount(&self, name: &str) -> Option<&MountConfig> {
        self.mounts.get(name)
    }
}
