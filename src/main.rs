// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::app_config::Config;
use app_controller::Controller;

mod aggregator;
mod app_config;
mod app_controller;
mod batching;
mod dataset;
mod errors;
mod file_utils;
mod jobs;
mod providers;
mod tag_codec;
mod tokens;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a CSV dataset using the batch inference API (default command)
    #[command(alias = "translate")]
    Translate(TranslateArgs),

    /// List translation jobs currently known to the remote service
    Jobs {
        /// Configuration file path
        #[arg(short, long, default_value = "conf.json")]
        config_path: String,

        /// API key (falls back to the config file)
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Generate shell completions for tabtrans
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Input CSV file to translate
    #[arg(value_name = "INPUT_CSV")]
    input_path: PathBuf,

    /// Output CSV file path
    #[arg(short, long, default_value = "translated_output.csv")]
    output: PathBuf,

    /// Working directory for batch and result artifacts
    #[arg(short, long, default_value = "output_jsonl")]
    workdir: PathBuf,

    /// Target language to translate into (e.g. 'German')
    #[arg(short = 'l', long)]
    target_language: Option<String>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// API key for the batch service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Partition and write batch files without submitting anything
    #[arg(long)]
    dry_run: bool,
}

/// tabtrans - CSV dataset translation via asynchronous batch inference
///
/// Shields markup behind placeholders, packs rows into batch jobs under
/// token limits, drives the remote jobs to completion, and reassembles the
/// translated dataset in the original row order.
#[derive(Parser, Debug)]
#[command(name = "tabtrans")]
#[command(version)]
#[command(about = "AI-powered CSV dataset translation over a batch API")]
#[command(long_about = "tabtrans translates large CSV datasets with an asynchronous batch inference API.

EXAMPLES:
    tabtrans data.csv -l German                 # Translate using default config
    tabtrans data.csv -o out.csv -w work/       # Choose output and work directory
    tabtrans data.csv -m gpt-4o --dry-run       # Write batch files, submit nothing
    tabtrans jobs                               # List active remote jobs
    tabtrans --log-level debug data.csv         # Verbose logging
    tabtrans completions bash > tabtrans.bash   # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default
    one will be created automatically. The API key is read from the OPENAI_API_KEY
    environment variable unless set in the config file or passed with --api-key.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input CSV file to translate
    #[arg(value_name = "INPUT_CSV")]
    input_path: Option<PathBuf>,

    /// Output CSV file path
    #[arg(short, long, default_value = "translated_output.csv")]
    output: PathBuf,

    /// Working directory for batch and result artifacts
    #[arg(short, long, default_value = "output_jsonl")]
    workdir: PathBuf,

    /// Target language to translate into (e.g. 'German')
    #[arg(short = 'l', long)]
    target_language: Option<String>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// API key for the batch service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Partition and write batch files without submitting anything
    #[arg(long)]
    dry_run: bool,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color code for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:5} {}\x1B[0m",
                color,
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    // Parse command line arguments using clap
    let cli = CommandLineOptions::parse();

    // Handle subcommands
    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "tabtrans", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Jobs {
            config_path,
            api_key,
        }) => run_jobs(&config_path, api_key).await,
        Some(Commands::Translate(args)) => run_translate(args).await,
        None => {
            // Default behavior - use top-level args for backwards compatibility
            let input_path = cli
                .input_path
                .ok_or_else(|| anyhow!("INPUT_CSV is required when no subcommand is specified"))?;

            let translate_args = TranslateArgs {
                input_path,
                output: cli.output,
                workdir: cli.workdir,
                target_language: cli.target_language,
                model: cli.model,
                api_key: cli.api_key,
                config_path: cli.config_path,
                log_level: cli.log_level,
                dry_run: cli.dry_run,
            };
            run_translate(translate_args).await
        }
    }
}

/// Load the configuration file, creating a default one when missing, and
/// apply CLI overrides on top
fn load_config(
    config_path: &str,
    target_language: Option<&str>,
    model: Option<&str>,
    api_key: Option<&str>,
    log_level: Option<&CliLogLevel>,
) -> Result<Config> {
    let mut config = if Path::new(config_path).exists() {
        Config::from_file(config_path)?
    } else {
        warn!(
            "Config file not found at '{}', creating default config.",
            config_path
        );
        let config = Config::default();
        config
            .save_to_file(config_path)
            .with_context(|| format!("Failed to write default config to file: {}", config_path))?;
        config
    };

    if let Some(language) = target_language {
        config.target_language = language.to_string();
    }
    if let Some(model) = model {
        config.api.model = model.to_string();
    }
    if let Some(key) = api_key {
        config.api.api_key = key.to_string();
    }
    if let Some(level) = log_level {
        config.log_level = level.clone().into();
    }

    Ok(config)
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &options.log_level {
        log::set_max_level(level_filter(&cmd_log_level.clone().into()));
    }

    let config = load_config(
        &options.config_path,
        options.target_language.as_deref(),
        options.model.as_deref(),
        options.api_key.as_deref(),
        options.log_level.as_ref(),
    )?;

    // Validate the configuration after loading and overriding
    config
        .validate()
        .context("Configuration validation failed")?;

    // If log level was not set via command line, update it from config now
    if options.log_level.is_none() {
        log::set_max_level(level_filter(&config.log_level));
    }

    if !options.dry_run && !config.has_api_key() {
        return Err(anyhow!(
            "An API key is required to submit jobs; set OPENAI_API_KEY, use --api-key, or put it in the config file"
        ));
    }

    let controller = Controller::with_config(config)?;

    if options.dry_run {
        let prepared = controller.prepare(&options.input_path, &options.workdir)?;
        controller.write_batch_files(&prepared, &options.workdir)?;
        println!(
            "Dry run: {} rows prepared into {} batch files in {:?} (~{} estimated tokens)",
            prepared.rows.len(),
            prepared.batches.len(),
            options.workdir,
            prepared.total_estimated_tokens
        );
        return Ok(());
    }

    tokio::select! {
        result = controller.run(options.input_path, options.output, options.workdir) => {
            result.map(|_| ())
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupt received, cancelling in-flight remote jobs");
            controller.cancel_active().await;
            Err(anyhow!("Run aborted by user"))
        }
    }
}

async fn run_jobs(config_path: &str, api_key: Option<String>) -> Result<()> {
    let config = load_config(config_path, None, None, api_key.as_deref(), None)?;

    if !config.has_api_key() {
        return Err(anyhow!(
            "An API key is required to list jobs; set OPENAI_API_KEY, use --api-key, or put it in the config file"
        ));
    }

    let controller = Controller::with_config(config)?;
    let jobs = controller.list_remote_jobs().await?;

    if jobs.is_empty() {
        println!("No remote jobs found.");
    } else {
        for job in jobs {
            println!("{}  {}", job.id, job.status);
        }
    }

    Ok(())
}
