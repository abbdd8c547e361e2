mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use codelab_common::config;
use codelab_grader::Pipeline;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "codelab-cli")]
#[command(about = "Codelab CLI - Grade submissions and manage executor languages", long_about = None)]
struct Cli {
    /// Language table (defaults to $LANGUAGES_CONFIG or config/languages.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a source file against test cases
    Grade {
        /// Language id or alias (e.g., python, js, c++)
        #[arg(short, long)]
        language: String,

        /// Source file to submit
        #[arg(short, long)]
        source: PathBuf,

        /// JSON file of {input, expected_output} pairs
        #[arg(short, long)]
        tests: Option<PathBuf>,

        /// Lesson the submission belongs to
        #[arg(long)]
        lesson: Option<String>,

        /// Print the submission record as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run a source file once without grading
    Run {
        #[arg(short, long)]
        language: String,

        #[arg(short, long)]
        source: PathBuf,

        /// File whose contents are fed to the program as input
        #[arg(long)]
        stdin: Option<PathBuf>,

        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Add a language to the language table
    AddLang {
        /// Language id (e.g., lua, swift)
        #[arg(short, long)]
        name: String,

        /// Display name (defaults to the id)
        #[arg(short, long)]
        display_name: Option<String>,

        /// Executor runtime id
        #[arg(short, long)]
        runtime_id: u32,

        /// File extension (e.g., lua, swift)
        #[arg(short, long)]
        ext: String,

        /// Register the language without enabling it
        #[arg(long, default_value = "false")]
        inactive: bool,
    },

    /// Remove a language from the language table
    RemoveLang {
        #[arg(short, long)]
        name: String,

        /// Skip confirmation prompt
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },

    /// List configured languages
    ListLangs {
        /// Include inactive languages
        #[arg(long, default_value = "false")]
        all: bool,
    },
}

fn init_tracing() {
    // reports go to stdout; logs stay on stderr and default to warnings only
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn build_pipeline(config_path: &Path) -> Result<Pipeline> {
    Pipeline::from_configs(
        &config::ExecutorConfig::from_env(),
        config::GradingConfig::from_env(),
        config_path,
    )
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(config::languages_config_path()));

    match cli.command {
        Commands::Grade {
            language,
            source,
            tests,
            lesson,
            json,
        } => {
            let pipeline = build_pipeline(&config_path)?;
            let passed = commands::grade(
                &pipeline,
                &language,
                &source,
                tests.as_deref(),
                lesson.as_deref(),
                json,
            )
            .await?;
            return Ok(exit_code(passed));
        }
        Commands::Run {
            language,
            source,
            stdin,
            json,
        } => {
            let pipeline = build_pipeline(&config_path)?;
            let accepted =
                commands::run(&pipeline, &language, &source, stdin.as_deref(), json).await?;
            return Ok(exit_code(accepted));
        }
        Commands::AddLang {
            name,
            display_name,
            runtime_id,
            ext,
            inactive,
        } => {
            commands::add_language(
                &config_path,
                &name,
                display_name.as_deref(),
                runtime_id,
                &ext,
                inactive,
            )?;
        }
        Commands::RemoveLang { name, yes } => {
            commands::remove_language(&config_path, &name, yes)?;
        }
        Commands::ListLangs { all } => {
            commands::list_languages(&config_path, all)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
