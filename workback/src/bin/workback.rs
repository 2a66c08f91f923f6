//! Workback CLI - unified entry point for the pipeline.
//!
//! ```bash
//! # Generate one plan from a brief
//! workback plan --brief briefs/qbr.txt --out plan.json
//!
//! # Build preference pairs for every tier-1 persona
//! workback pairs --tier 1 --count 3 --output-dir data/pairs --format jsonl
//!
//! # Generate four-week labeled calendars
//! workback calendar --persona personas/sales_manager.json --weeks 4 \
//!     --output-dir data/calendars
//! ```
//!
//! Exit code 0 on success (including zero units produced), 1 on
//! configuration errors.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use workback::dataset::{DatasetOrchestrator, OutputFormat, QualityLevel};
use workback::persona::{load_personas, Persona};
use workback::plan::PlanGenerator;
use workback::preference::DEFAULT_TAU;
use workback::{Config, PipelineError};

#[derive(Parser)]
#[command(name = "workback")]
#[command(version)]
#[command(about = "Workback planning and training-data pipeline", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a workback plan from a brief
    Plan(PlanArgs),

    /// Build preference pairs over personas
    Pairs(PairsArgs),

    /// Generate labeled synthetic calendars over personas
    Calendar(CalendarArgs),
}

#[derive(Args)]
struct PlanArgs {
    /// Path to the brief text file
    #[arg(long, value_name = "PATH")]
    brief: PathBuf,

    /// Where to write the structured plan JSON (stdout when omitted)
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Stop after the analysis stage
    #[arg(long)]
    analysis_only: bool,
}

#[derive(Args)]
struct PersonaSelection {
    /// Path to a single persona JSON file
    #[arg(long, value_name = "PATH", conflicts_with = "tier")]
    persona: Option<PathBuf>,

    /// Select every persona of this tier from the personas directory
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
    tier: Option<u8>,

    /// Directory holding persona JSON files (used with --tier)
    #[arg(long, value_name = "DIR", default_value = "personas")]
    personas_dir: PathBuf,
}

impl PersonaSelection {
    fn load(&self) -> workback::Result<Vec<Persona>> {
        let personas = match (&self.persona, self.tier) {
            (Some(path), _) => vec![Persona::from_file(path)?],
            (None, tier) => load_personas(&self.personas_dir, tier)?,
        };
        if personas.is_empty() {
            return Err(PipelineError::Config(format!(
                "no personas loaded from {}",
                self.personas_dir.display()
            )));
        }
        Ok(personas)
    }
}

#[derive(Args)]
struct PairsArgs {
    #[command(flatten)]
    selection: PersonaSelection,

    /// Scenarios per persona
    #[arg(long, default_value_t = 1)]
    count: usize,

    /// Temperature ladder to sample with
    #[arg(long, value_enum, default_value_t = QualityLevel::Standard)]
    quality: QualityLevel,

    /// Minimum score gap between the emitted pair
    #[arg(long, default_value_t = DEFAULT_TAU)]
    tau: f64,

    #[arg(long, value_name = "DIR")]
    output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Jsonl)]
    format: OutputFormat,
}

#[derive(Args)]
struct CalendarArgs {
    #[command(flatten)]
    selection: PersonaSelection,

    /// Weeks of calendar to generate per persona
    #[arg(long, default_value_t = 4)]
    weeks: u32,

    #[arg(long, value_name = "DIR")]
    output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "workback=debug"
    } else {
        "workback=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let gateway = config.build_gateway()?;

    match cli.command {
        Commands::Plan(args) => {
            let brief = std::fs::read_to_string(&args.brief)?;
            let generator = PlanGenerator::new(
                &gateway,
                config.models.analysis.clone(),
                config.models.structure.clone(),
            );
            let generation = generator.generate_plan(&brief, !args.analysis_only).await?;

            if let Some(plan) = &generation.structured {
                let violations = plan.violations();
                for violation in &violations {
                    tracing::warn!(%violation, "plan invariant violated");
                }
                let rendered = serde_json::to_string_pretty(plan)?;
                match &args.out {
                    Some(path) => {
                        workback::dataset::storage::write_atomic(path, &rendered)?;
                        tracing::info!(out = %path.display(), "plan written");
                    }
                    None => println!("{}", rendered),
                }
            } else {
                println!("{}", generation.analysis);
            }
        }
        Commands::Pairs(args) => {
            let personas = args.selection.load()?;
            let orchestrator = DatasetOrchestrator::new(
                &gateway,
                config.models.clone(),
                config.labeling.clone(),
                args.output_dir,
                args.format,
            );
            let summary = orchestrator
                .run_pairs(&personas, args.count, args.quality, args.tau)
                .await?;
            tracing::info!(
                produced = summary.produced,
                gated = summary.gated,
                skipped = summary.skipped_existing,
                failed = summary.failed.len(),
                "pairs run complete"
            );
        }
        Commands::Calendar(args) => {
            let personas = args.selection.load()?;
            let orchestrator = DatasetOrchestrator::new(
                &gateway,
                config.models.clone(),
                config.labeling.clone(),
                args.output_dir,
                args.format,
            );
            let summary = orchestrator.run_calendars(&personas, args.weeks).await?;
            tracing::info!(
                produced = summary.produced,
                skipped = summary.skipped_existing,
                failed = summary.failed.len(),
                "calendar run complete"
            );
        }
    }
    Ok(())
}
