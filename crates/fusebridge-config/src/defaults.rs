use crate::types::BridgeConfig;

impl BridgeConfig {
    /// Apply default inference rules to the configuration.
    /// This mutates the config in place.
    pub fn apply_defaults(&mut self) {
        let Some(defaults) = self.defaults.clone() else {
            return;
        };

        for mount in self.mounts.values_mut() {
            if mount.reveal_command.is_none() {
                mount.reveal_command = defaults.reveal_command.clone();
            }
            if mount.fuse_flags.is_none() {
                mount.fuse_flags = defaults.fuse_flags.clone();
            }
        }
    }

    /// Returns a new config with all defaults applied.
    pub fn effective(&self) -> BridgeConfig {
        let mut config = self.clone();
        config.apply_defaults();
        config
    }
}
