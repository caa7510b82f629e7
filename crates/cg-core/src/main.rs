//! Confession-geo command line.
//!
//! The stages run one at a time, each reading the previous stage's files:
//! - `prepare`: canonical headers and the old-district flag
//! - `features`: grouping, covariates, and the tax register
//! - `train`: prior, posterior, and posterior-predictive sampling per variant
//! - `summarize`: posterior summaries and predictive checks

use std::path::{Path, PathBuf};

use cg_common::{Error, OutputFormat, RunId, StructuredError, SCHEMA_VERSION};
use cg_config::{
    get_preset, list_presets, load_config, validate_config, LoadedConfig, ModelVariant, PresetName,
};
use cg_core::exit_codes::ExitCode;
use cg_core::log_event;
use cg_core::logging::{event_names, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage};
use cg_core::pipeline::{self, FeatureInputs, TrainDirs};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

/// Confessional geography of the 1880 parcel census
#[derive(Parser)]
#[command(name = "cg-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Configuration file (JSON or TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Start from a preset instead of the built-in defaults
    #[arg(long, global = true)]
    preset: Option<PresetName>,

    /// Fit only these variants (repeatable)
    #[arg(long = "variant", global = true)]
    variants: Vec<ModelVariant>,

    /// Override the configured seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Payload format on stdout
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Canonicalise a raw census table and flag parcels in the old districts
    Prepare(PrepareArgs),
    /// Assign groups and derive covariates
    Features(FeaturesArgs),
    /// Sample every configured model variant and persist the traces
    Train(TrainArgs),
    /// Write posterior summaries and predictive checks from persisted traces
    Summarize(SummarizeArgs),
    /// Inspect and validate configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct PrepareArgs {
    /// Raw parcel CSV
    #[arg(long)]
    input: PathBuf,

    /// Old-district polygons (JSON)
    #[arg(long)]
    old_districts: Option<PathBuf>,

    #[arg(long, default_value = "data/interim/parcels.csv")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct FeaturesArgs {
    #[arg(long, default_value = "data/interim/parcels.csv")]
    input: PathBuf,

    /// Church locations CSV (`x,y`)
    #[arg(long)]
    churches: Option<PathBuf>,

    /// Income-tax register CSV
    #[arg(long)]
    tax: Option<PathBuf>,

    #[arg(long, default_value = "data/processed/tax.csv")]
    tax_output: PathBuf,

    #[arg(long, default_value = "data/processed/parcels.csv")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[arg(long, default_value = "data/processed/parcels.csv")]
    input: PathBuf,

    #[arg(long, default_value = "models")]
    models: PathBuf,

    #[arg(long, default_value = "reports")]
    reports: PathBuf,
}

#[derive(Args, Debug)]
struct SummarizeArgs {
    #[arg(long, default_value = "models")]
    models: PathBuf,

    #[arg(long, default_value = "reports")]
    reports: PathBuf,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Load and validate a configuration file
    Validate {
        /// File to validate (defaults to the resolved configuration)
        path: Option<PathBuf>,
    },
    /// List the available presets
    Presets,
}

fn main() -> std::process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::ArgsError.into()
            } else {
                ExitCode::Ok.into()
            };
        }
    };

    init_logging(&LogConfig::from_env(cli.global.log_level, cli.global.log_format));
    let ctx = LogContext::new(RunId::new().to_string());

    let exit = match &cli.command {
        Commands::Prepare(args) => run_prepare(&cli.global, args, &ctx),
        Commands::Features(args) => run_features(&cli.global, args, &ctx),
        Commands::Train(args) => run_train(&cli.global, args, &ctx),
        Commands::Summarize(args) => run_summarize(&cli.global, args, &ctx),
        Commands::Config(args) => run_config(&cli.global, args),
    };
    exit.into()
}

/// Load the configuration and apply the command-line overrides.
fn load(global: &GlobalOpts, ctx: &LogContext) -> Result<LoadedConfig, Error> {
    let mut loaded = load_config(global.config.as_deref(), global.preset.map(get_preset))?;
    if !global.variants.is_empty() {
        loaded.config.variants = global.variants.clone();
    }
    if let Some(seed) = global.seed {
        loaded.config.seed = seed;
    }
    validate_config(&loaded.config)?;
    loaded.snapshot.config = loaded.config.clone();

    log_event!(
        ctx,
        INFO,
        event_names::CONFIG_LOADED,
        Stage::Init,
        "configuration loaded",
        source = loaded.source.to_string().as_str(),
        sha256 = loaded.snapshot.sha256.as_str()
    );
    Ok(loaded)
}

/// Print a command payload to stdout.
fn emit<T: Serialize>(global: &GlobalOpts, ctx: &LogContext, command: &str, payload: &T, summary: &str) {
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": ctx.run_id,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "command": command,
                "status": "ok",
                "result": payload,
            });
            match serde_json::to_string_pretty(&response) {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("failed to encode output: {}", e),
            }
        }
        OutputFormat::Md => {
            println!("# {}", command);
            println!();
            println!("{}", summary);
        }
        OutputFormat::Summary => println!("[{}] {}: {}", ctx.run_id, command, summary),
    }
}

/// Report an error on stderr and pick the exit code.
fn fail(global: &GlobalOpts, ctx: &LogContext, command: &str, err: &Error) -> ExitCode {
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": ctx.run_id,
                "command": command,
                "status": "error",
                "error": StructuredError::from(err),
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&response)
                    .unwrap_or_else(|_| StructuredError::from(err).to_json())
            );
        }
        OutputFormat::Md | OutputFormat::Summary => eprintln!("{}", err.format_human()),
    }
    ExitCode::for_error(err)
}

fn run_prepare(global: &GlobalOpts, args: &PrepareArgs, ctx: &LogContext) -> ExitCode {
    log_event!(ctx, INFO, event_names::PIPELINE_STARTED, Stage::Prepare, "prepare started");
    match pipeline::prepare(&args.input, args.old_districts.as_deref(), &args.output, ctx) {
        Ok(summary) => {
            let line = format!(
                "{} parcels, {} in the old districts -> {}",
                summary.rows,
                summary.old,
                summary.output.display()
            );
            emit(global, ctx, "prepare", &summary, &line);
            ExitCode::Ok
        }
        Err(e) => fail(global, ctx, "prepare", &e),
    }
}

fn run_features(global: &GlobalOpts, args: &FeaturesArgs, ctx: &LogContext) -> ExitCode {
    let loaded = match load(global, ctx) {
        Ok(l) => l,
        Err(e) => return fail(global, ctx, "features", &e),
    };
    let inputs = FeatureInputs {
        churches: args.churches.clone(),
        tax: args.tax.clone().map(|t| (t, args.tax_output.clone())),
    };
    log_event!(ctx, INFO, event_names::PIPELINE_STARTED, Stage::Features, "features started");
    match pipeline::build_features(&args.input, &inputs, &args.output, &loaded.config, ctx) {
        Ok(summary) => {
            let line = format!(
                "{} parcels in {} groups -> {}",
                summary.rows,
                summary.groups,
                summary.output.display()
            );
            emit(global, ctx, "features", &summary, &line);
            ExitCode::Ok
        }
        Err(e) => fail(global, ctx, "features", &e),
    }
}

fn run_train(global: &GlobalOpts, args: &TrainArgs, ctx: &LogContext) -> ExitCode {
    let loaded = match load(global, ctx) {
        Ok(l) => l,
        Err(e) => return fail(global, ctx, "train", &e),
    };
    let dirs = TrainDirs {
        models: args.models.clone(),
        reports: args.reports.clone(),
    };
    log_event!(
        ctx,
        INFO,
        event_names::PIPELINE_STARTED,
        Stage::Model,
        "training started",
        variants = loaded.config.variants.len()
    );
    let outcomes = match pipeline::train(&args.input, &dirs, &loaded.config, &loaded.snapshot, ctx) {
        Ok(o) => o,
        Err(e) => return fail(global, ctx, "train", &e),
    };

    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| !o.is_ok())
        .map(|o| o.variant.as_str())
        .collect();
    log_event!(
        ctx,
        INFO,
        event_names::PIPELINE_FINISHED,
        Stage::Persist,
        "training finished",
        fitted = outcomes.len() - failed.len(),
        failed = failed.len()
    );
    let line = if failed.is_empty() {
        format!("{} variants fitted", outcomes.len())
    } else {
        format!(
            "{} of {} variants failed: {}",
            failed.len(),
            outcomes.len(),
            failed.join(", ")
        )
    };
    emit(global, ctx, "train", &outcomes, &line);

    // The first failure decides the exit code.
    outcomes
        .iter()
        .find_map(|o| o.failure.as_deref())
        .map_or(ExitCode::Ok, ExitCode::for_error)
}

fn run_summarize(global: &GlobalOpts, args: &SummarizeArgs, ctx: &LogContext) -> ExitCode {
    let loaded = match load(global, ctx) {
        Ok(l) => l,
        Err(e) => return fail(global, ctx, "summarize", &e),
    };
    match pipeline::summarize(&args.models, &args.reports, &loaded.config, ctx) {
        Ok(written) => {
            let payload: Vec<_> = written
                .iter()
                .map(|(variant, paths)| {
                    serde_json::json!({
                        "variant": variant,
                        "summary": paths.summary,
                        "ppc": paths.ppc,
                    })
                })
                .collect();
            let line = format!("{} variants summarised into {}", written.len(), args.reports.display());
            emit(global, ctx, "summarize", &payload, &line);
            ExitCode::Ok
        }
        Err(e) => fail(global, ctx, "summarize", &e),
    }
}

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    let ctx = LogContext::new(RunId::new().to_string());
    match &args.command {
        ConfigCommands::Show => match load(global, &ctx) {
            Ok(loaded) => {
                let line = format!(
                    "source: {}; variants: {}",
                    loaded.source,
                    variant_list(&loaded.config.variants)
                );
                emit(global, &ctx, "config show", &loaded.snapshot, &line);
                ExitCode::Ok
            }
            Err(e) => fail(global, &ctx, "config show", &e),
        },
        ConfigCommands::Validate { path } => {
            let target = path.as_deref().or(global.config.as_deref());
            match validate_file(target) {
                Ok(loaded) => {
                    let payload = serde_json::json!({
                        "valid": true,
                        "path": loaded.path,
                        "sha256": loaded.snapshot.sha256,
                    });
                    emit(global, &ctx, "config validate", &payload, "OK");
                    ExitCode::Ok
                }
                Err(e) => fail(global, &ctx, "config validate", &e),
            }
        }
        ConfigCommands::Presets => {
            let presets = list_presets();
            let line = presets
                .iter()
                .map(|p| format!("{}: {}", p.name, p.description))
                .collect::<Vec<_>>()
                .join("\n");
            emit(global, &ctx, "config presets", &presets, &line);
            ExitCode::Ok
        }
    }
}

fn validate_file(path: Option<&Path>) -> Result<LoadedConfig, Error> {
    Ok(load_config(path, None)?)
}

fn variant_list(variants: &[ModelVariant]) -> String {
    variants
        .iter()
        .map(ModelVariant::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
