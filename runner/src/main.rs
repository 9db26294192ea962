use benchlog_analysis::CompareConfig;
use benchlog_ingest::Tool;
use benchlog_runner::{
    commands,
    config::{RunnerConfig, StoreConfig, StoreFormat},
    database::{query::RunFilter, session::Session, StoreAdapter},
    error_chain,
    ingest::BenchOutput,
    RunnerError,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::{io, path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "benchlog", version, about = "Record and query the history of benchmark runs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (can be repeated), overridden by RUST_LOG
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse bench output files (or stdin) and append them as one run
    Append {
        /// Suite the run is appended to
        #[arg(short, long, default_value = "Benchmark")]
        suite: String,
        #[arg(short, long, default_value = "cargo")]
        tool: Tool,
        #[command(flatten)]
        run: RunArgs,
        /// Bench output files, stdin if none are given
        inputs: Vec<PathBuf>,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Collect, ingest and append every suite of a config file
    Record {
        #[arg(short, long, default_value = "benchlog.yaml")]
        config: PathBuf,
        #[command(flatten)]
        run: RunArgs,
        /// Only record these suites
        suites: Vec<String>,
    },
    /// Print the runs of a suite as a JSON array
    Query {
        suite: String,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Compare two runs of a suite, the latest with its predecessor by default
    Compare {
        suite: String,
        /// Commit of the baseline run
        #[arg(long)]
        base: Option<String>,
        /// Commit of the compared run
        #[arg(long)]
        head: Option<String>,
        #[arg(long, default_value_t = CompareConfig::default().alert_threshold)]
        threshold: f64,
        /// Exit with an error if any bench regressed
        #[arg(long)]
        fail_on_alert: bool,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Print the time series of one bench
    History {
        suite: String,
        bench: String,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Copy a store into another file, possibly of another format
    Convert {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long)]
        to: PathBuf,
        /// Inferred from the extension of --to if missing
        #[arg(long)]
        to_format: Option<StoreFormat>,
    },
}

#[derive(Args)]
struct StoreArgs {
    #[arg(long, default_value = "dev/bench/data.js")]
    store: PathBuf,
    /// json, script or sqlite, inferred from the extension of --store if missing
    #[arg(long)]
    format: Option<StoreFormat>,
    #[arg(long, default_value = "")]
    repo_url: String,
}

impl StoreArgs {
    fn config(self) -> StoreConfig {
        StoreConfig::new(self.store, self.format, self.repo_url)
    }
}

#[derive(Args)]
struct RunArgs {
    /// YAML/JSON file holding the commit or a push event with `head_commit`
    #[arg(long)]
    commit: PathBuf,
    /// Epoch milliseconds of the run, now if missing
    #[arg(long)]
    date: Option<u64>,
}

#[derive(Args)]
struct FilterArgs {
    /// Runs of a single (possibly abbreviated) commit
    #[arg(long, conflicts_with_all = ["from", "to", "since", "until"])]
    commit: Option<String>,
    /// First commit of a range
    #[arg(long, conflicts_with_all = ["since", "until"])]
    from: Option<String>,
    /// Last commit of a range
    #[arg(long, conflicts_with_all = ["since", "until"])]
    to: Option<String>,
    /// Earliest date, epoch milliseconds
    #[arg(long)]
    since: Option<u64>,
    /// Latest date, epoch milliseconds
    #[arg(long)]
    until: Option<u64>,
}

impl FilterArgs {
    fn filter(self) -> RunFilter {
        match self {
            Self {
                commit: Some(commit),
                ..
            } => RunFilter::Commit(commit),
            Self {
                from: None,
                to: None,
                since: None,
                until: None,
                ..
            } => RunFilter::All,
            Self {
                from: None,
                to: None,
                since,
                until,
                ..
            } => RunFilter::Dates { since, until },
            Self { from, to, .. } => RunFilter::CommitRange { from, to },
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), RunnerError> {
    println!("{}", serde_json::to_string_pretty(value)?);

    Ok(())
}

fn run(cli: Cli) -> Result<(), RunnerError> {
    match cli.command {
        Commands::Append {
            suite,
            tool,
            run,
            inputs,
            store,
        } => {
            let commit = commands::load_commit(&run.commit)?;
            let outputs = if inputs.is_empty() {
                vec![BenchOutput::from_reader(io::stdin().lock())?]
            } else {
                inputs
                    .iter()
                    .map(|path| BenchOutput::read(path))
                    .collect::<Result<Vec<_>, _>>()?
            };

            let store = store.config();
            let mut session = Session::open(StoreAdapter::load(&store)?, &store.repo_url)?;
            let appended = commands::append(
                &mut session,
                &suite,
                commit,
                run.date.unwrap_or_else(commands::now),
                tool,
                &outputs,
            )?;
            info!(suite = %suite, commit = %appended.commit.id, benches = appended.benches.len(), "Appended run");

            session.close()?;
        }
        Commands::Record { config, run, suites } => {
            let commit = commands::load_commit(&run.commit)?;
            let outcome = commands::record(
                RunnerConfig::load(&config)?,
                commit,
                run.date.unwrap_or_else(commands::now),
                &suites,
            )?;

            print_json(&outcome.reports)?;
            outcome.check()?;
        }
        Commands::Query {
            suite,
            filter,
            store,
        } => {
            let store = commands::load_store(StoreAdapter::load(&store.config())?)?;

            print_json(&commands::query(&store, &suite, filter.filter()))?;
        }
        Commands::Compare {
            suite,
            base,
            head,
            threshold,
            fail_on_alert,
            store,
        } => {
            let store = commands::load_store(StoreAdapter::load(&store.config())?)?;
            let report = commands::compare(
                &store,
                &suite,
                base.as_deref(),
                head.as_deref(),
                &CompareConfig {
                    alert_threshold: threshold,
                },
            )?;

            print_json(&report)?;

            let alerts = report.regressions().count();
            if fail_on_alert && alerts > 0 {
                return Err(RunnerError::Alert(alerts));
            }
        }
        Commands::History {
            suite,
            bench,
            filter,
            store,
        } => {
            let store = commands::load_store(StoreAdapter::load(&store.config())?)?;

            print_json(&commands::history(&store, &suite, &bench, filter.filter()))?;
        }
        Commands::Convert {
            store,
            to,
            to_format,
        } => {
            let target = StoreConfig::new(to, to_format, String::new());

            commands::convert(
                StoreAdapter::load(&store.config())?,
                &StoreAdapter::load(&target)?,
            )?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{}", error_chain(&error));

            ExitCode::FAILURE
        }
    }
}
