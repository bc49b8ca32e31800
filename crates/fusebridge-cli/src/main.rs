use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fusebridge_config::BridgeConfig;

mod commands;
mod errors;
mod logging;

#[derive(Parser)]
#[command(name = "fusebridge", version, about = "fusebridge - serve a directory through FUSE")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a configured directory and serve it until interrupted
    Mount {
        /// Name of the mount in the configuration
        name: String,
        /// Open the mount point in the file manager once mounted
        #[arg(long)]
        reveal: bool,
    },
    /// Unmount a mount point
    Unmount {
        /// Mount point to unmount
        mountpoint: PathBuf,
        /// Force unmount even if busy
        #[arg(short, long)]
        force: bool,
    },
    /// Open a mount point in the file manager
    Reveal {
        /// Mount point to reveal
        mountpoint: PathBuf,
    },
    /// Print the default mount flags of this platform
    Flags,
    /// Validate configuration file
    Validate,
    /// Show effective configuration
    Config,
}

fn find_config() -> Option<PathBuf> {
    // 1. FUSEBRIDGE_CONFIG environment variable
    if let Ok(path) = std::env::var("FUSEBRIDGE_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. fusebridge.yaml in current directory
    let cwd_config = PathBuf::from("fusebridge.yaml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. ~/.config/fusebridge/config.yaml
    if let Some(home) = dirs_next::home_dir() {
        let home_config = home.join(".config/fusebridge/config.yaml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Load the configuration if one can be found; an explicit `--config` must load.
fn load_optional_config(explicit: Option<PathBuf>) -> Result<Option<BridgeConfig>, Box<dyn std::error::Error>> {
    match explicit.or_else(find_config) {
        Some(path) => Ok(Some(BridgeConfig::from_file(&path)?.effective())),
        None => Ok(None),
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Commands that work without a configuration file
    match cli.command {
        Commands::Unmount { mountpoint, force } => {
            let config = load_optional_config(cli.config)?;
            let args = commands::unmount::UnmountArgs { mountpoint, force };
            return commands::unmount::run(config.as_ref(), args);
        }
        Commands::Reveal { mountpoint } => {
            let config = load_optional_config(cli.config)?;
            return commands::reveal::run(config.as_ref(), mountpoint);
        }
        Commands::Flags => {
            let config = load_optional_config(cli.config)?;
            return commands::flags::run(config.as_ref());
        }
        _ => {}
    }

    let config_path = cli.config.or_else(find_config).ok_or(
        "No configuration file found. Use --config, set FUSEBRIDGE_CONFIG, or create fusebridge.yaml",
    )?;

    match cli.command {
        Commands::Validate => commands::validate::run(&config_path),
        Commands::Config => commands::config::run(&config_path),
        Commands::Mount { name, reveal } => {
            let args = commands::mount::MountArgs { name, reveal };
            commands::mount::run(&config_path, args).await
        }
        Commands::Unmount { .. } | Commands::Reveal { .. } | Commands::Flags => {
            Err("Internal error: command should have been handled earlier".into())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = err.exit_code().clamp(0, 255) as u8;
            return ExitCode::from(code);
        }
    };

    logging::set_up_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        errors::print_error(e.as_ref());
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
