use std::{collections::HashMap, error::Error, path::PathBuf, str::FromStr};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod local_exec;

/// Kiln CLI for running build and release recipes
#[derive(Debug, Parser)]
#[command(name = "kiln", version, about, long_about = None)]
struct Args {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "KILN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, env = "KILN_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the jobs of a recipe in parallel
    Run {
        /// Path to the recipe file
        #[arg(short, long, default_value = "kiln.toml")]
        file: PathBuf,

        /// k=v list of parameters to pass to the recipe
        /// e.g. kiln run -f kiln.toml -p version=1.2.0 -p out=dist
        #[arg(short, long, value_parser = parse_key_val::<String, String>)]
        params: Option<Vec<(String, String)>>,

        /// Only run the named job, can be repeated
        #[arg(short, long = "job")]
        jobs: Vec<String>,
    },

    /// Validate a recipe and the dependencies of its jobs without running anything
    Check {
        /// Path to the recipe file
        #[arg(short, long, default_value = "kiln.toml")]
        file: PathBuf,

        /// k=v list of parameters to pass to the recipe
        #[arg(short, long, value_parser = parse_key_val::<String, String>)]
        params: Option<Vec<(String, String)>>,

        /// Only check the named job, can be repeated
        #[arg(short, long = "job")]
        jobs: Vec<String>,
    },

    /// List the jobs declared in a recipe
    List {
        /// Path to the recipe file
        #[arg(short, long, default_value = "kiln.toml")]
        file: PathBuf,

        /// k=v list of parameters to pass to the recipe
        #[arg(short, long, value_parser = parse_key_val::<String, String>)]
        params: Option<Vec<(String, String)>>,
    },
}

fn parse_key_val<T, U>(s: &str) -> Result<(T, U), Box<dyn Error + Send + Sync + 'static>>
where
    T: std::str::FromStr,
    T::Err: Error + Send + Sync + 'static,
    U: std::str::FromStr,
    U::Err: Error + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}

fn init_tracing(log_level: &str, log_format: LogFormat) {
    let log_level = Level::from_str(log_level.to_lowercase().as_str()).unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    match log_format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).without_time())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .with(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level, args.log_format);

    match args.command {
        Commands::Run { file, params, jobs } => {
            let params = HashMap::from_iter(params.unwrap_or_default());
            local_exec::run_local(file, params, jobs).await?;
        }
        Commands::Check { file, params, jobs } => {
            let params = HashMap::from_iter(params.unwrap_or_default());
            for line in local_exec::check(&file, params, &jobs)? {
                println!("{line}");
            }
        }
        Commands::List { file, params } => {
            let params = HashMap::from_iter(params.unwrap_or_default());
            for line in local_exec::list(&file, params)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}
