//! hipk CLI application
//!
//! Launches precompiled HIP kernels with a marshalled argument buffer, times
//! them, and validates the output against a host reference.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use hipk_cli::commands::{InfoCommand, RunCommand};
use hipk_cli::exit::{EXIT_SUCCESS, device_status_for, exit_code_for};
use hipk_cli::logging;
use hipk_harness::config::DEFAULT_CONFIG_FILE;
use hipk_harness::{HarnessConfig, LogFormat};
use tracing::error;

/// hipk - precompiled HIP kernel launch and validation harness
#[derive(Parser, Debug)]
#[command(name = "hipk")]
#[command(about = "Launch, time and validate precompiled HIP kernels")]
#[command(long_about = r#"
hipk launches a precompiled code object with a packed argument buffer, times
the launch with device events, and validates the output against a host
reference computation.

Examples:
  # Validate the AMax kernel with the default 256x4 problem
  hipk run --artifact A_S_S_256_4_gfx942.co

  # Run without a GPU, using the host emulator
  hipk run --backend emulated --artifact amax.co

  # Random input, pre-scaled reference, 100 timed runs
  hipk run --seed 7 --convention pre-scaled --runs 100

  # List devices
  hipk info

Exit codes: 0 success, 1 failure, 2 validation mismatch, 3 device error.
"#)]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ./hipk.toml if present)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch the kernel once and validate its output
    Run(RunCommand),

    /// Show runtime, device and kernel information
    Info(InfoCommand),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print which configuration file would be loaded
    Path,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            logging::ensure_fallback();
            error!("Command failed: {}", e);
            let mut source = e.source();
            while let Some(err) = source {
                error!("  Caused by: {}", err);
                source = err.source();
            }
            if let Some(status) = device_status_for(&e) {
                error!("  HIP status: {}", status);
            }
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let mut config = HarnessConfig::load_with_precedence(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(Commands::Run(cmd)) = &cli.command {
        cmd.apply(&mut config);
        config.validate().context("Invalid command-line arguments")?;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    logging::setup_logging(&config.logging)?;

    match cli.command {
        Some(Commands::Run(cmd)) => cmd.execute(&config),
        Some(Commands::Info(cmd)) => cmd.execute(&config),
        Some(Commands::Config { action }) => {
            handle_config_command(action, &config, cli.config.as_deref())
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

fn handle_config_command(
    action: ConfigAction,
    config: &HarnessConfig,
    explicit: Option<&Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let text = config.to_toml_string().context("Failed to serialize configuration")?;
            print!("{text}");
        }
        ConfigAction::Path => match explicit {
            Some(path) => println!("{}", path.display()),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => println!("{DEFAULT_CONFIG_FILE}"),
            None => println!("(built-in defaults)"),
        },
    }
    Ok(())
}
