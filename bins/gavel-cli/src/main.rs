mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gavel_common::Config;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "gavel-cli")]
#[command(about = "Gavel CLI - Judge code locally, submit to workers, manage languages", long_about = None)]
struct Cli {
    /// Languages file (defaults to GAVEL_LANGUAGES or config/languages.json)
    #[arg(long, global = true)]
    languages: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Judge a source file against a problem JSON file
    Judge {
        /// Problem file (title, limits, ordered test cases)
        #[arg(short, long)]
        problem: PathBuf,

        /// Language tag (e.g., python, javascript)
        #[arg(short, long)]
        language: String,

        /// Source file
        #[arg(short, long)]
        source: PathBuf,
    },

    /// Run a source file once under resource limits
    Run {
        #[arg(short, long)]
        language: String,

        #[arg(short, long)]
        source: PathBuf,

        /// File fed to the program's stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(long, default_value = "1000")]
        time_limit_ms: u64,

        #[arg(long, default_value = "128")]
        memory_limit_mb: u64,
    },

    /// Queue a submission for the workers
    Submit {
        #[arg(short, long)]
        problem_id: u64,

        #[arg(short, long)]
        language: String,

        #[arg(short, long)]
        source: PathBuf,
    },

    /// Show the verdict of a queued submission
    Status {
        #[arg(short = 'i', long)]
        submission_id: Uuid,
    },

    /// Add a new language to the languages file
    AddLang {
        /// Language tag (e.g., ruby, lua)
        #[arg(short, long)]
        name: String,

        /// Interpreter or launcher (e.g., ruby)
        #[arg(short, long)]
        command: String,

        /// Launcher argument, repeatable; `{file}` is replaced with the source path
        #[arg(short, long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,

        /// File name the source is written under (e.g., main.rb)
        #[arg(short, long)]
        file_name: String,
    },

    /// List registered languages
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries JSON output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let languages = cli.languages.unwrap_or_else(|| config.languages_path.clone());

    match cli.command {
        Commands::Judge {
            problem,
            language,
            source,
        } => {
            let verdict = commands::judge_local(&problem, &language, &source, &languages, &config).await?;
            commands::print_json(&verdict)?;
        }
        Commands::Run {
            language,
            source,
            input,
            time_limit_ms,
            memory_limit_mb,
        } => {
            let result = commands::run_local(
                &language,
                &source,
                input.as_deref(),
                time_limit_ms,
                memory_limit_mb,
                &languages,
                &config,
            )
            .await?;
            commands::print_json(&result)?;
        }
        Commands::Submit {
            problem_id,
            language,
            source,
        } => {
            let id = commands::submit(problem_id, &language, &source, &config).await?;
            println!("{}", id);
        }
        Commands::Status { submission_id } => {
            match commands::status(&submission_id, &config).await? {
                Some(record) => commands::print_json(&record)?,
                None => println!("pending"),
            }
        }
        Commands::AddLang {
            name,
            command,
            args,
            file_name,
        } => {
            let spec = commands::add_language(&languages, &name, &command, &args, &file_name)?;
            println!("✅ Language '{}' added to {}", spec.name, languages.display());
        }
        Commands::Languages => {
            let specs = commands::list_languages(&languages)?;
            println!("{:<12} {:<12} {:<12} {}", "Name", "File", "Command", "Args");
            println!("{}", "─".repeat(60));
            for spec in &specs {
                println!(
                    "{:<12} {:<12} {:<12} {}",
                    spec.name,
                    spec.file_name,
                    spec.command,
                    spec.args.join(" ")
                );
            }
            println!("\nTotal: {} language(s)", specs.len());
        }
    }

    Ok(())
}
