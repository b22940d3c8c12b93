//! Command line entry point.
//!
//! `run_with_args` parses `BaseArgs` from the command line, loads parameters, and
//! runs one or more replicates. Each replicate owns its own `Context`, seeded
//! with `seed + replicate`, and runs on its own thread; replicates share nothing
//! but the read-only parameters.
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use clap::{ArgAction, Args, Command, FromArgMatches as _};

use crate::context::Context;
use crate::error::BranchingError;
use crate::execution_stats::{
    log_execution_statistics, print_execution_statistics, ExecutionProfilingCollector,
    ExecutionStatistics,
};
use crate::log::{info, set_log_level, set_module_filters, LevelFilter};
use crate::parameters::{ContextParametersExt, Params};
use crate::report::ContextReportExt;
use crate::reports::add_model_reports;
use crate::simulation::{self, ContextSimulationExt, RunSummary};

/// How often the main thread checks on worker threads.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default cli arguments for the branching runner
#[derive(Args, Debug, Clone)]
pub struct BaseArgs {
    /// Random seed. Defaults to the `seed` parameter
    #[arg(short, long)]
    pub random_seed: Option<u64>,

    /// Optional path to a JSON parameter file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Optional path for report output
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Prefix for report file names
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Overwrite existing report files
    #[arg(short, long)]
    pub force_overwrite: bool,

    /// Log level (`info`), or comma separated `module=level` filters
    #[arg(long)]
    pub log_level: Option<String>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Number of independent replicates, seeded consecutively
    #[arg(short = 'n', long, default_value_t = 1)]
    pub replicates: usize,

    /// Do not print execution statistics
    #[arg(long)]
    pub no_stats: bool,

    /// Also write one row per recovered case
    #[arg(long)]
    pub cases_report: bool,
}

impl Default for BaseArgs {
    fn default() -> Self {
        BaseArgs {
            random_seed: None,
            config: None,
            output_dir: None,
            prefix: String::new(),
            force_overwrite: false,
            log_level: None,
            verbose: 0,
            replicates: 1,
            no_stats: false,
            cases_report: false,
        }
    }
}

/// The outcome of one replicate.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicateOutcome {
    pub replicate: usize,
    pub seed: u64,
    pub population: u64,
    pub summary: RunSummary,
}

fn create_cli() -> Command {
    let cli = Command::new("branching")
        .about("Branching-process epidemic simulation across a network of locales");
    BaseArgs::augment_args(cli)
}

/// Runs the model with arguments taken from the command line.
///
/// # Errors
/// Returns an error if argument parsing, parameter loading, or any replicate fails
pub fn run_with_args() -> Result<Vec<ReplicateOutcome>, Box<dyn std::error::Error>> {
    let matches = create_cli().get_matches();
    let args = BaseArgs::from_arg_matches(&matches)?;
    Ok(run_replicates(&args, |_, _| Ok(()))?)
}

/// Applies `--log-level` and `-v`. A bare level sets the global level; `module=level`
/// pairs set module filters.
///
/// # Errors
/// Returns `ConfigError` for an unknown level name
pub fn configure_logging(args: &BaseArgs) -> Result<(), BranchingError> {
    let parse = |level: &str| {
        LevelFilter::from_str(level.trim())
            .map_err(|_| BranchingError::ConfigError(format!("unknown log level {level}")))
    };
    match args.verbose {
        0 => {}
        1 => set_log_level(LevelFilter::Info),
        2 => set_log_level(LevelFilter::Debug),
        _ => set_log_level(LevelFilter::Trace),
    }
    let Some(spec) = &args.log_level else {
        return Ok(());
    };
    let mut filters = Vec::new();
    for part in spec.split(',').filter(|part| !part.trim().is_empty()) {
        match part.split_once('=') {
            Some((module, level)) => filters.push((module.trim(), parse(level)?)),
            None => set_log_level(parse(part)?),
        }
    }
    set_module_filters(&filters);
    for (module, level) in filters {
        println!("Logging enabled for {module} at level {level}");
    }
    Ok(())
}

/// Loads the parameters named by `--config`, or the defaults.
///
/// # Errors
/// Returns a `BranchingError` if the file cannot be read or is invalid
pub fn load_params(args: &BaseArgs) -> Result<Params, BranchingError> {
    match &args.config {
        Some(path) => {
            info!("loading parameters from {}", path.display());
            Params::from_json_file(path)
        }
        None => Ok(Params::default()),
    }
}

/// Sets up and runs a single replicate. `setup_fn` runs after the model is
/// initialized and before execution.
fn run_replicate<F>(
    params: &Params,
    args: &BaseArgs,
    replicate: usize,
    seed: u64,
    setup_fn: &F,
) -> Result<ReplicateOutcome, BranchingError>
where
    F: Fn(&mut Context, usize) -> Result<(), BranchingError>,
{
    let mut context = Context::new();
    context.set_parameters(params.clone())?;

    let prefix = if args.replicates > 1 {
        format!("{}{replicate}_", args.prefix)
    } else {
        args.prefix.clone()
    };
    let report_config = context.report_options();
    report_config
        .file_prefix(prefix)
        .overwrite(args.force_overwrite);
    if let Some(output_dir) = &args.output_dir {
        report_config.directory(output_dir.clone());
    }
    add_model_reports(&mut context, seed, args.cases_report)?;

    simulation::init(&mut context, seed)?;
    setup_fn(&mut context, replicate)?;

    #[cfg(feature = "progress_bar")]
    if args.replicates == 1 && std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        crate::progress::init_timeline_progress_bar(params.max_time);
    }

    context.execute();
    let population = context.network().total_population();
    Ok(ReplicateOutcome {
        replicate,
        seed,
        population,
        summary: context.run_summary(),
    })
}

/// Runs `args.replicates` independent replicates and prints one summary line
/// for each, followed by execution statistics unless `--no-stats` is given.
///
/// # Errors
/// Returns the first error from loading parameters or setting up a replicate
pub fn run_replicates<F>(
    args: &BaseArgs,
    setup_fn: F,
) -> Result<Vec<ReplicateOutcome>, BranchingError>
where
    F: Fn(&mut Context, usize) -> Result<(), BranchingError> + Sync,
{
    configure_logging(args)?;
    if args.replicates == 0 {
        return Err("at least one replicate is required".into());
    }
    let params = load_params(args)?;
    let base_seed = args.random_seed.unwrap_or(params.seed);
    let mut collector = (!args.no_stats).then(ExecutionProfilingCollector::new);

    let outcomes = if args.replicates == 1 {
        vec![run_replicate(&params, args, 0, base_seed, &setup_fn)?]
    } else {
        thread::scope(|scope| {
            let handles: Vec<_> = (0..args.replicates)
                .map(|replicate| {
                    let seed = base_seed.wrapping_add(replicate as u64);
                    let (params, setup_fn) = (&params, &setup_fn);
                    scope.spawn(move || run_replicate(params, args, replicate, seed, setup_fn))
                })
                .collect();
            while !handles.iter().all(thread::ScopedJoinHandle::is_finished) {
                if let Some(collector) = collector.as_mut() {
                    collector.refresh();
                }
                thread::sleep(POLL_INTERVAL);
            }
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect::<Result<Vec<_>, _>>()
        })?
    };

    for outcome in &outcomes {
        let summary = &outcome.summary;
        println!(
            "replicate {} (seed {}): {} after {} days, {} infected, {} clinical cases, peak alert level {}",
            outcome.replicate,
            outcome.seed,
            summary.status,
            summary.days,
            summary.total_infected,
            summary.total_cases,
            summary.peak_alert_level
        );
    }

    if let Some(collector) = collector.as_mut() {
        let stats = final_statistics(collector, &outcomes);
        print_execution_statistics(&stats);
        log_execution_statistics(&stats);
    }
    Ok(outcomes)
}

fn final_statistics(
    collector: &mut ExecutionProfilingCollector,
    outcomes: &[ReplicateOutcome],
) -> ExecutionStatistics {
    let days = outcomes.iter().map(|outcome| outcome.summary.days).sum();
    let population = outcomes.first().map_or(0, |outcome| outcome.population);
    collector.compute_final_statistics(outcomes.len(), days, population)
}
