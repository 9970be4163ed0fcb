//! wanted-etl command-line entry point.

mod commands;
mod progress_bar;
mod report;

use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use commands::{OutputMode, PipelineArgs};

#[derive(Parser)]
#[command(
    name = "wanted-etl",
    about = "Fetch, clean and store records from a paginated wanted-persons API",
    version
)]
struct Cli {
    /// Print machine-readable JSON on stdout instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Hide the progress bar.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and write a CSV file.
    Fetch {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Output CSV path.
        #[arg(short, long, default_value = "wanted.csv")]
        output: String,
    },

    /// Run the pipeline and write a SQLite table.
    Load {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// SQLite database file.
        #[arg(short, long)]
        database: String,

        /// Destination table.
        #[arg(long, default_value = "wanted")]
        table: String,

        /// Drop the table before writing instead of appending.
        #[arg(long)]
        replace: bool,
    },

    /// Run the pipeline and print the first rows.
    Preview {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Number of rows to print.
        #[arg(short, long, default_value_t = 5)]
        rows: usize,
    },

    /// Report row, column and missing-value counts of a written CSV.
    Inspect {
        /// CSV file to read.
        path: String,

        /// Source config whose column types apply when reading.
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   wanted-etl completions bash > ~/.local/share/bash-completion/completions/wanted-etl
    ///   wanted-etl completions zsh > ~/.zfunc/_wanted-etl
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode {
        json: cli.json,
        progress: !cli.quiet && !cli.json,
    };

    match run(cli.command, mode).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if mode.json {
                println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, mode: OutputMode) -> anyhow::Result<()> {
    match command {
        Commands::Fetch { pipeline, output } => commands::fetch(&pipeline, &output, mode).await,

        Commands::Load {
            pipeline,
            database,
            table,
            replace,
        } => commands::load(&pipeline, &database, &table, replace, mode).await,

        Commands::Preview { pipeline, rows } => commands::preview(&pipeline, rows, mode).await,

        Commands::Inspect { path, source } => commands::inspect(&path, source.as_deref(), mode),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "wanted-etl", &mut std::io::stdout());
            Ok(())
        }
    }
}
