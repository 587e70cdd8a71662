//! `guardian` -- CLI for the Guardian output validation pipeline.
//!
//! - `guardian validate` -- Validate one request and print the response JSON.
//! - `guardian screen` -- Screen a prompt for injection and PII before it reaches a model.
//! - `guardian toon` -- Decode or encode TOON text.
//! - `guardian settings` -- Print resolved service settings.
//!
//! Logs go to stderr; stdout carries only command output.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::process::ExitCode;
use std::time::Duration;

use guardian_core::{
    Codec, GuardianSettings, Sentinel, SentinelConfig, SentinelFlags, ToonCodec, ValidationRequest,
};
use guardian_runtime::{CancellationToken, Guardian};

/// Exit code for a response or prompt that was blocked.
const EXIT_BLOCKED: u8 = 2;

/// Guardian output validation CLI.
#[derive(Parser)]
#[command(name = "guardian", about = "Validate LLM responses before they reach users", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a request read from a JSON file (or `-` for stdin).
    ///
    /// Exits 0 when the response passed, 2 when it was blocked, 1 on error.
    Validate {
        /// Request JSON file, or `-` for stdin.
        #[arg(short, long)]
        request: String,

        /// Settings file (YAML, or JSON by extension).
        #[arg(short, long)]
        settings: Option<String>,

        /// Override the judge deadline, e.g. `500ms` or `2s`.
        #[arg(long, value_parser = humantime::parse_duration)]
        deadline: Option<Duration>,

        /// Pretty-print the response.
        #[arg(long)]
        pretty: bool,
    },

    /// Screen a prompt read from a file (or `-` for stdin).
    ///
    /// Exits 0 when the prompt may be forwarded, 2 when it was blocked, 1 on error.
    Screen {
        /// Prompt file, or `-` for stdin.
        input: String,

        /// Settings file (YAML, or JSON by extension).
        #[arg(short, long)]
        settings: Option<String>,

        /// Request-level switches as JSON, e.g. `{"enable_xss_protection":true}`.
        #[arg(long, conflicts_with = "all")]
        config: Option<String>,

        /// Enable every input check.
        #[arg(long)]
        all: bool,

        /// Pretty-print the report.
        #[arg(long)]
        pretty: bool,
    },

    /// Convert between TOON and JSON.
    Toon {
        #[command(subcommand)]
        action: ToonAction,
    },

    /// Print resolved settings as YAML.
    Settings {
        /// Settings file (YAML, or JSON by extension).
        #[arg(short, long)]
        settings: Option<String>,
    },
}

#[derive(Subcommand)]
enum ToonAction {
    /// TOON in, canonical JSON out.
    Decode {
        /// Input file, or `-` for stdin.
        input: String,
    },

    /// JSON in, TOON out.
    Encode {
        /// Input file, or `-` for stdin.
        input: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Validate {
            request,
            settings,
            deadline,
            pretty,
        } => validate(&request, settings.as_deref(), deadline, pretty).await,
        Commands::Screen {
            input,
            settings,
            config,
            all,
            pretty,
        } => screen(&input, settings.as_deref(), config.as_deref(), all, pretty),
        Commands::Toon { action } => {
            let codec = ToonCodec::new();
            let output = match action {
                ToonAction::Decode { input } => codec.decode(&read_input(&input)?)?,
                ToonAction::Encode { input } => codec.encode(&read_input(&input)?)?,
            };
            println!("{}", output);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Settings { settings } => {
            let settings = load_settings(settings.as_deref())?;
            print!("{}", settings.to_yaml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn validate(
    request_path: &str,
    settings_path: Option<&str>,
    deadline: Option<Duration>,
    pretty: bool,
) -> Result<ExitCode> {
    let mut settings = load_settings(settings_path)?;
    if let Some(deadline) = deadline {
        settings.judge_deadline = deadline;
    }

    let raw = read_input(request_path)?;
    let request: ValidationRequest =
        serde_json::from_str(&raw).context("request is not a valid validation request")?;

    let guardian = Guardian::builder().settings(settings).build()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling validation");
            on_interrupt.cancel();
        }
    });

    let response = guardian.validate_with_cancellation(&request, cancel).await?;
    let json = if pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", json);

    Ok(if response.validation_passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_BLOCKED)
    })
}

fn screen(
    input_path: &str,
    settings_path: Option<&str>,
    config: Option<&str>,
    all: bool,
    pretty: bool,
) -> Result<ExitCode> {
    let settings = load_settings(settings_path)?;
    let sentinel = if all {
        Sentinel::new(SentinelFlags::all())
    } else {
        let overrides: Option<SentinelConfig> = config
            .map(serde_json::from_str)
            .transpose()
            .context("--config is not a valid sentinel config")?;
        Sentinel::for_request(&settings, overrides.as_ref())
    };

    let prompt = read_input(input_path)?;
    let report = sentinel.inspect(&prompt)?;
    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", json);

    Ok(if report.is_blocked {
        ExitCode::from(EXIT_BLOCKED)
    } else {
        ExitCode::SUCCESS
    })
}

fn load_settings(path: Option<&str>) -> Result<GuardianSettings> {
    match path {
        Some(path) => GuardianSettings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path)),
        None => Ok(GuardianSettings::default()),
    }
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))
    }
}
