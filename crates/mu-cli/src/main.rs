//! mu CLI tool.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{Options, OutputFormat};

#[derive(Parser)]
#[command(name = "mu")]
#[command(about = "Resolve and validate mu configuration", long_about = None)]
struct Cli {
    /// JSON Schema to validate against (defaults to the bundled schema)
    #[arg(long, global = true, env = "MU_SCHEMA")]
    schema: Option<PathBuf>,

    /// Timeout in seconds for each cmd() call in a template
    #[arg(long, global = true, env = "MU_CMD_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Template variable, may be repeated
    #[arg(long = "var", global = true, value_name = "KEY=VALUE")]
    vars: Vec<String>,

    /// Log progress at info level
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration
    Resolve {
        /// Path to the configuration file, or - for stdin
        #[arg(default_value = "mu.yml")]
        path: String,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,
    },
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file, or - for stdin
        #[arg(default_value = "mu.yml")]
        path: String,
    },
    /// Print the rendered template without parsing or validating it
    Render {
        /// Path to the configuration file, or - for stdin
        #[arg(default_value = "mu.yml")]
        path: String,
    },
    /// Print the resolved configuration as KEY=VALUE lines
    Env {
        /// Path to the configuration file, or - for stdin
        #[arg(default_value = "mu.yml")]
        path: String,
        /// Prefix for every variable name
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let options = Options {
        vars: cli.vars,
        schema: cli.schema,
        timeout: Duration::from_secs(cli.timeout_secs),
    };

    match cli.command {
        Commands::Resolve { path, output } => {
            commands::resolve(&options, &path, output).await?;
        }
        Commands::Validate { path } => {
            if !commands::validate(&options, &path).await? {
                std::process::exit(1);
            }
        }
        Commands::Render { path } => {
            commands::render(&options, &path).await?;
        }
        Commands::Env { path, prefix } => {
            commands::env(&options, &path, &prefix).await?;
        }
    }

    Ok(())
}
