//! prodforge CLI — the main entry point.
//!
//! Commands:
//! - `fcl`        — Materialise the configuration of one job
//! - `inputs`     — List the input files of one job
//! - `outputs`    — List the output files of one job
//! - `describe`   — Summarise a job definition
//! - `template`   — Materialise a template for one input file
//! - `run-index`  — Locate a global index in a job map and materialise it
//! - `usage`      — Auxiliary file usage over a full sweep
//! - `recovery`   — Jobs whose outputs are missing
//! - `config`     — Tool settings

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::{DefinitionArgs, JobSelector, LocationArgs};

#[derive(Parser)]
#[command(
    name = "prodforge",
    about = "prodforge — per-job configuration for batch production campaigns",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the configuration of one job
    Fcl {
        #[command(flatten)]
        definition: DefinitionArgs,

        #[command(flatten)]
        job: JobSelector,

        #[command(flatten)]
        location: LocationArgs,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the input files of one job
    Inputs {
        #[command(flatten)]
        definition: DefinitionArgs,

        #[command(flatten)]
        job: JobSelector,

        #[command(flatten)]
        location: LocationArgs,
    },

    /// List the output files of one job
    Outputs {
        #[command(flatten)]
        definition: DefinitionArgs,

        #[command(flatten)]
        job: JobSelector,
    },

    /// Summarise a job definition
    Describe {
        #[command(flatten)]
        definition: DefinitionArgs,

        /// Print the resolved definition as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fill a template's output names from one input file
    Template {
        /// Template text file
        #[arg(short = 'f', long)]
        template: PathBuf,

        /// Input data file the job reads
        #[arg(short, long)]
        input: String,

        /// Placeholder override, as name=value (repeatable)
        #[arg(long = "set", value_parser = commands::template::parse_override)]
        overrides: Vec<(String, String)>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Materialise the job a global index points to in a job map
    RunIndex {
        /// Job map (JSON list of definitions and job counts)
        #[arg(short, long)]
        map: PathBuf,

        /// Index token; read from the `fname` environment variable if absent
        #[arg(short, long)]
        token: Option<String>,

        /// Input access protocol
        #[arg(short, long)]
        protocol: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Auxiliary file usage over every job
    Usage {
        #[command(flatten)]
        definition: DefinitionArgs,

        /// Override the configured number of sweep workers
        #[arg(short, long)]
        workers: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// List jobs whose output is missing from a list of present files
    Recovery {
        #[command(flatten)]
        definition: DefinitionArgs,

        /// File listing the outputs that exist, one per line
        #[arg(long)]
        present: PathBuf,

        /// Output key to check (defaults to the first declared output)
        #[arg(short, long)]
        key: Option<String>,

        /// Owner field of the generated index tokens
        #[arg(long, default_value = "mu2e")]
        owner: String,
    },

    /// Manage tool settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Print the settings file path
    Path,
    /// Validate the settings
    Validate,
    /// Write a default settings file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fcl {
            definition,
            job,
            location,
            output,
        } => commands::job::fcl(&definition, &job, &location, output).await?,
        Commands::Inputs {
            definition,
            job,
            location,
        } => commands::job::inputs(&definition, &job, &location).await?,
        Commands::Outputs { definition, job } => commands::job::outputs(&definition, &job).await?,
        Commands::Describe { definition, json } => commands::describe::run(&definition, json).await?,
        Commands::Template {
            template,
            input,
            overrides,
            output,
        } => commands::template::run(&template, &input, overrides, output).await?,
        Commands::RunIndex {
            map,
            token,
            protocol,
            output,
        } => commands::run_index::run(&map, token, protocol, output).await?,
        Commands::Usage {
            definition,
            workers,
            json,
        } => commands::usage::run(&definition, workers, json).await?,
        Commands::Recovery {
            definition,
            present,
            key,
            owner,
        } => commands::recovery::run(&definition, &present, key, &owner).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}
