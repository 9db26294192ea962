use crate::{
    collector::Collector,
    config::{ConfigErrors, RunnerConfig},
    database::{query::RunFilter, session::Session, BenchmarkStore, StoreAdapter},
    ingest::{ingest_all, BenchOutput, Ingestors},
    RunnerError,
};
use benchlog_analysis::{compare_runs, compare_with_previous, CompareConfig, CompareReport, History};
use benchlog_ingest::{Bench, BenchmarkRun, Commit, Tool};
use itertools::Itertools;
use serde::Deserialize;
use std::{
    fs,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{info, warn};

/// A commit file holds either the commit itself or a push event carrying it as `head_commit`
#[derive(Deserialize)]
#[serde(untagged)]
enum CommitSource {
    Event { head_commit: Commit },
    Commit(Commit),
}

pub fn parse_commit(content: &str) -> Result<Commit, RunnerError> {
    let commit = match serde_yaml::from_str(content)? {
        CommitSource::Event { head_commit } => head_commit,
        CommitSource::Commit(commit) => commit,
    };
    commit.validate()?;

    Ok(commit)
}

pub fn load_commit(path: &Path) -> Result<Commit, RunnerError> {
    let content = fs::read_to_string(path).map_err(|source| RunnerError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_commit(&content)
}

/// current time in epoch milliseconds
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Read a store, an absent file reads as an empty store
pub fn load_store(adapter: StoreAdapter) -> Result<BenchmarkStore, RunnerError> {
    Ok(Session::open(adapter, "")?.close()?)
}

/// Parse every output with the tool's parser and append the benches as one run
pub fn append<'a>(
    session: &'a mut Session,
    suite: &str,
    commit: Commit,
    date: u64,
    tool: Tool,
    outputs: &[BenchOutput],
) -> Result<&'a BenchmarkRun, RunnerError> {
    let benches = outputs
        .iter()
        .map(|output| Ingestors::Builtin.ingest(tool, output))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .collect::<Vec<Bench>>();

    session.append_run(
        suite,
        BenchmarkRun {
            commit,
            date,
            tool: tool.to_string(),
            benches,
        },
    )?;

    session
        .store()
        .latest(suite)
        .ok_or_else(|| RunnerError::EmptySuite(suite.to_owned()))
}

#[derive(Debug)]
pub struct RecordOutcome {
    pub store: BenchmarkStore,
    /// suite -> comparison against the suite's previous run
    pub reports: Vec<(String, CompareReport)>,
    pub fail_on_alert: bool,
}

impl RecordOutcome {
    pub fn alerts(&self) -> usize {
        self.reports
            .iter()
            .map(|(_, report)| report.regressions().count())
            .sum()
    }

    /// Fails if regressions were found and the config asks to fail on them
    pub fn check(&self) -> Result<(), RunnerError> {
        match self.alerts() {
            alerts if alerts > 0 && self.fail_on_alert => Err(RunnerError::Alert(alerts)),
            _ => Ok(()),
        }
    }
}

/// Collect, ingest and append one run per selected suite (all suites if `only` is empty),
/// then compare each new run with its predecessor.
///
/// Nothing is written unless every selected suite was ingested successfully.
pub fn record(
    mut config: RunnerConfig,
    commit: Commit,
    date: u64,
    only: &[String],
) -> Result<RecordOutcome, RunnerError> {
    if config.preflight_checks() {
        return Err(ConfigErrors::Preflight.into());
    }

    let ingestors = config.load_ingestors()?;
    let selected: Vec<String> = if only.is_empty() {
        config.suites.keys().cloned().collect()
    } else {
        only.iter().unique().cloned().collect()
    };

    let mut session = Session::open(StoreAdapter::load(&config.store)?, &config.store.repo_url)?;
    let compare_config = config.analysis.compare_config();
    let mut reports = Vec::new();

    for name in selected.iter() {
        let suite = config.suite(name)?;
        let collector = Collector::load(suite)?;
        let ingestor = Ingestors::resolve(&ingestors, suite)?;

        if collector.size_hint().0 == 0 {
            warn!(suite = %name, "No bench output found");
        }

        let benches = ingest_all(&ingestor, suite.tool, collector)?;
        info!(suite = %name, benches = benches.len(), "Ingested bench output");

        session.append_run(
            name,
            BenchmarkRun {
                commit: commit.clone(),
                date,
                tool: suite.tool.to_string(),
                benches,
            },
        )?;

        // the run is kept even if it cannot be compared, e.g. after the suite's tool changed
        match compare_with_previous(session.store().runs(name), &compare_config) {
            Ok(Some(report)) => reports.push((name.clone(), report)),
            Ok(None) => {}
            Err(error) => warn!(suite = %name, "Skipping comparison with the previous run: {error}"),
        }
    }

    Ok(RecordOutcome {
        store: session.close()?,
        reports,
        fail_on_alert: config.analysis.fail_on_alert,
    })
}

pub fn query<'a>(store: &'a BenchmarkStore, suite: &str, filter: RunFilter) -> Vec<&'a BenchmarkRun> {
    store.query(suite, filter).collect()
}

/// Compare `head` (default: the latest run) with `base` (default: the run before `head`).
/// Abbreviated ids select the last run of a matching commit.
pub fn compare(
    store: &BenchmarkStore,
    suite: &str,
    base: Option<&str>,
    head: Option<&str>,
    config: &CompareConfig,
) -> Result<CompareReport, RunnerError> {
    let runs = store.runs(suite);

    if runs.is_empty() {
        return Err(RunnerError::EmptySuite(suite.to_owned()));
    }

    let unknown = |commit: &str| RunnerError::UnknownCommit {
        suite: suite.to_owned(),
        commit: commit.to_owned(),
    };

    let head_index = match head {
        Some(id) => runs
            .iter()
            .rposition(|run| run.commit.matches(id))
            .ok_or_else(|| unknown(id))?,
        None => runs.len() - 1,
    };
    let current = &runs[head_index];

    let previous = match base {
        Some(id) => runs[..head_index]
            .iter()
            .rev()
            .find(|run| run.commit.matches(id))
            .ok_or_else(|| unknown(id))?,
        None => head_index
            .checked_sub(1)
            .map(|index| &runs[index])
            .ok_or_else(|| RunnerError::NoBaseline {
                suite: suite.to_owned(),
                commit: current.commit.id.clone(),
            })?,
    };

    Ok(compare_runs(previous, current, config)?)
}

pub fn history(store: &BenchmarkStore, suite: &str, bench: &str, filter: RunFilter) -> History {
    benchlog_analysis::history(store.query(suite, filter), bench)
}

/// Copy the whole store from one adapter to another
pub fn convert(from: StoreAdapter, to: &StoreAdapter) -> Result<BenchmarkStore, RunnerError> {
    let store = from.read()?;
    to.write(&store)?;

    info!(suites = store.entries().len(), "Converted store");

    Ok(store)
}
