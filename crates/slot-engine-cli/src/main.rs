//! slotctl - offline expansion and conflict checks for slot schedules

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;

use slot_engine::recurrence::{parse_iso_date, ScheduleSpec};
use slot_engine::{
    expand_for_offering, find_conflicts, Candidate, Clock, EngineConfig, GuideId, Interval,
    LocalTimeRange, Mode, Offering, Slot, SystemClock,
};

#[derive(Parser)]
#[command(
    name = "slotctl",
    version,
    about = "Expand recurring slot schedules and check them for conflicts"
)]
struct Cli {
    /// Engine configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the candidate slots a schedule spec expands to
    Expand(SpecArgs),
    /// Check a schedule spec against existing slots; exits 2 on conflict
    Check {
        #[command(flatten)]
        spec: SpecArgs,
        /// JSON array of existing slots: {"mode", "date", "start", "end"}
        #[arg(long)]
        existing: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct SpecArgs {
    /// JSON schedule spec: {"timezone", "modes": {"remote": {...}, "in_person": {...}}}
    #[arg(long)]
    spec: PathBuf,
    /// Capacity applied to every candidate
    #[arg(long, default_value_t = 1)]
    capacity: u32,
    /// Price in minor units applied to every candidate
    #[arg(long, default_value_t = 0)]
    price: u64,
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

/// One already-published slot, in the spec's timezone.
#[derive(Deserialize)]
struct ExistingSlot {
    mode: Mode,
    date: String,
    start: String,
    end: String,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Expand(args) => {
            let (_, candidates) = expand_spec(&args, &config)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
            } else {
                print_candidates(&candidates);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Check { spec, existing } => {
            let (offering, candidates) = expand_spec(&spec, &config)?;
            let published = match existing {
                Some(path) => load_existing(&path, &offering)?,
                None => Vec::new(),
            };
            debug!(
                candidates = candidates.len(),
                existing = published.len(),
                "checking for conflicts"
            );

            let conflicts = find_conflicts(&candidates, &published);
            if spec.json {
                println!("{}", serde_json::to_string_pretty(&conflicts)?);
            } else if conflicts.is_empty() {
                println!("No conflicts ({} candidate slot(s))", candidates.len());
            } else {
                println!(
                    "{:<12} {:<12} {:<10} {:>7}  CONFLICTS WITH",
                    "DATE", "TIME", "MODE", "MINUTES"
                );
                for c in &conflicts {
                    println!(
                        "{:<12} {:<12} {:<10} {:>7}  {}",
                        c.calendar_date.to_string(),
                        c.time_range,
                        c.mode.to_string(),
                        c.overlap_minutes,
                        c.conflicting_with
                    );
                }
            }

            Ok(if conflicts.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Read and expand a spec file against a throwaway offering with every named mode enabled.
fn expand_spec(args: &SpecArgs, config: &EngineConfig) -> Result<(Offering, Vec<Candidate>)> {
    let spec: ScheduleSpec = read_json(&args.spec)?;

    let mut offering = Offering::new(GuideId::new(), "slotctl", spec.timezone);
    for mode in spec.modes.keys() {
        offering = offering.with_mode(*mode, args.capacity, args.price)?;
    }

    let candidates = expand_for_offering(&offering, &spec.modes, config.max_candidates)
        .with_context(|| format!("expanding {}", args.spec.display()))?;
    Ok((offering, candidates))
}

fn load_existing(path: &Path, offering: &Offering) -> Result<Vec<Slot>> {
    let entries: Vec<ExistingSlot> = read_json(path)?;
    let now = SystemClock.now();

    entries
        .into_iter()
        .map(|e| -> Result<Slot> {
            let interval = Interval::localize(
                e.mode,
                parse_iso_date(&e.date)?,
                LocalTimeRange::parse(&e.start, &e.end)?,
                offering.timezone,
            )?;
            let candidate = Candidate {
                interval,
                capacity: 1,
                price: 0,
            };
            Ok(Slot::from_candidate(candidate, offering.id, offering.guide_id, now))
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("reading existing slots from {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_candidates(candidates: &[Candidate]) {
    if candidates.is_empty() {
        println!("No slots");
        return;
    }
    println!(
        "{:<12} {:<4} {:<12} {:<10} UTC",
        "DATE", "DAY", "TIME", "MODE"
    );
    for c in candidates {
        let i = &c.interval;
        println!(
            "{:<12} {:<4} {:<12} {:<10} {} - {}",
            i.calendar_date.to_string(),
            i.day_of_week().to_string(),
            i.local_time.to_string(),
            i.mode.to_string(),
            i.utc_start.format("%Y-%m-%dT%H:%MZ"),
            i.utc_end.format("%H:%MZ")
        );
    }
}
