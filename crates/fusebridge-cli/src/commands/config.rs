use std::path::Path;

use fusebridge_config::BridgeConfig;

pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = BridgeConfig::from_file(config_path)?.effective();
    config.platform = Some(config.host_platform());

    // Print as YAML for readability
    let yaml = serde_yaml::to_string(&config)?;
    println!("{}", yaml);

    Ok(())
}
