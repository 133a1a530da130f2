/*!
 * Warden CLI
 */

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use warden::{
    error::{EXIT_FATAL, EXIT_SUCCESS},
    logging, run_demo, ControlPlane, LogFormat, WardenConfig, WardenError,
};

#[derive(Parser)]
#[command(name = "warden")]
#[command(version, about = "In-process control plane: command center, message bus and Sentinel", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format (overrides the configuration file)
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a configuration file, then print the effective configuration
    CheckConfig {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Run a scripted scenario and print the resulting diagnostics as JSON
    Demo {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<WardenError>()
                .map(WardenError::exit_code)
                .unwrap_or(EXIT_FATAL)
        }
    };
    std::process::exit(code);
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { file } => {
            let config = WardenConfig::from_file(&file)?;
            init_logging(cli.verbose, cli.log_format, &config)?;
            tracing::info!("Configuration {} is valid", file.display());
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Commands::Demo { config } => {
            let config = match config {
                Some(path) => WardenConfig::from_file(&path)?,
                None => WardenConfig::default(),
            };
            init_logging(cli.verbose, cli.log_format, &config)?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start the tokio runtime")?;
            runtime.block_on(demo(config))
        }
    }
}

fn init_logging(
    verbose: bool,
    format: Option<LogFormatArg>,
    config: &WardenConfig,
) -> anyhow::Result<()> {
    let mut logging_config = config.logging.clone();
    if let Some(format) = format {
        logging_config.format = format.into();
    }
    logging::init_logging(&logging_config, verbose)?;
    Ok(())
}

async fn demo(config: WardenConfig) -> anyhow::Result<()> {
    let plane = ControlPlane::new(config)?;
    let report = run_demo(&plane).await?;
    plane.shutdown();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
