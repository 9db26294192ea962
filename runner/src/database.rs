pub mod json;
pub mod query;
pub mod session;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "sqlite")]
mod util;

use crate::config::{StoreConfig, StoreFormat};
use benchlog_ingest::{BenchmarkRun, ValidationError};
use indexmap::IndexMap;
use query::{RunFilter, Runs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid record")]
    Invalid(#[from] ValidationError),
    #[error("Failed to access store file")]
    Io(#[from] std::io::Error),
    #[error("Failed to (de)serialize store")]
    Json(#[from] serde_json::Error),
    #[error("Data file does not start with `{}`", json::SCRIPT_PREFIX.trim_end())]
    MissingPrefix,
    #[error("Store format {0:?} is not available in this build")]
    UnsupportedFormat(StoreFormat),
    #[cfg(feature = "sqlite")]
    #[error("SQLite Error")]
    SQLite(rusqlite::Error),
    #[error("Database holds {stored} runs of suite {suite} but the store only has {expected}")]
    Diverged {
        suite: String,
        stored: usize,
        expected: usize,
    },
}

/// suite label -> runs, both in insertion order
pub type Entries = IndexMap<String, Vec<BenchmarkRun>>;

/// Append-only history of benchmark runs, serialized as
/// `{"lastUpdate": .., "repoUrl": .., "entries": {..}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkStore {
    last_update: u64,
    repo_url: String,
    entries: Entries,
}

impl BenchmarkStore {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            last_update: 0,
            repo_url: repo_url.into(),
            entries: Entries::new(),
        }
    }

    /// rebuild a store from persisted parts, every run is validated
    pub(crate) fn from_parts(
        repo_url: String,
        last_update: u64,
        entries: Entries,
    ) -> Result<Self, StoreError> {
        let store = Self {
            last_update,
            repo_url,
            entries,
        };
        store.validate()?;

        Ok(store)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (suite, runs) in self.entries.iter() {
            if suite.trim().is_empty() {
                return Err(ValidationError::EmptySuite);
            }

            runs.iter().try_for_each(BenchmarkRun::validate)?;
        }

        Ok(())
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    pub fn set_repo_url(&mut self, repo_url: impl Into<String>) {
        self.repo_url = repo_url.into();
    }

    /// epoch milliseconds of the newest appended run
    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    pub fn entries(&self) -> &Entries {
        &self.entries
    }

    pub fn suites(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// all runs of a suite, empty for unknown suites
    pub fn runs(&self, suite: &str) -> &[BenchmarkRun] {
        self.entries.get(suite).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self, suite: &str) -> usize {
        self.runs(suite).len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    pub fn latest(&self, suite: &str) -> Option<&BenchmarkRun> {
        self.runs(suite).last()
    }

    /// Append `run` to `suite`. An invalid run is rejected and leaves the store untouched.
    pub fn append_run(&mut self, suite: &str, run: BenchmarkRun) -> Result<(), ValidationError> {
        if suite.trim().is_empty() {
            return Err(ValidationError::EmptySuite);
        }
        run.validate()?;

        if let Some(latest) = self.latest(suite) {
            if latest.date > run.date {
                warn!(
                    suite = suite,
                    commit = %run.commit.id,
                    "Run is older than the latest run of the suite ({} < {})",
                    run.date,
                    latest.date
                );
            }
        }

        self.last_update = self.last_update.max(run.date);
        debug!(suite = suite, commit = %run.commit.id, benches = run.benches.len(), "Appended run");

        self.entries.entry(suite.to_owned()).or_default().push(run);

        Ok(())
    }

    /// Lazily iterate the runs of `suite` accepted by `filter`, in insertion order
    pub fn query(&self, suite: &str, filter: RunFilter) -> Runs<'_> {
        Runs::new(self.runs(suite), filter)
    }
}

#[derive(Debug, Clone)]
/// All supported ways of persisting a store
/// (kept as an enum to avoid dynamic dispatch)
pub enum StoreAdapter {
    Json(json::JsonFile),
    #[cfg(feature = "sqlite")]
    SQLite(sqlite::SQLiteFile),
}

impl StoreAdapter {
    pub fn load(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open(config.path.clone(), config.format())
    }

    pub fn open(path: PathBuf, format: StoreFormat) -> Result<Self, StoreError> {
        match format {
            StoreFormat::Json => Ok(Self::Json(json::JsonFile::new(path, false))),
            StoreFormat::Script => Ok(Self::Json(json::JsonFile::new(path, true))),
            #[cfg(feature = "sqlite")]
            StoreFormat::SQLite => Ok(Self::SQLite(sqlite::SQLiteFile::new(path))),
            #[cfg(not(feature = "sqlite"))]
            StoreFormat::SQLite => Err(StoreError::UnsupportedFormat(format)),
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            Self::Json(file) => file.path().is_file(),
            #[cfg(feature = "sqlite")]
            Self::SQLite(file) => file.path().is_file(),
        }
    }

    pub fn read(&self) -> Result<BenchmarkStore, StoreError> {
        match self {
            Self::Json(file) => file.read(),
            #[cfg(feature = "sqlite")]
            Self::SQLite(file) => file.read(),
        }
    }

    pub fn write(&self, store: &BenchmarkStore) -> Result<(), StoreError> {
        match self {
            Self::Json(file) => file.write(store),
            #[cfg(feature = "sqlite")]
            Self::SQLite(file) => file.write(store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::run;
    use pretty_assertions::assert_eq;

    #[test]
    fn append_keeps_insertion_order() {
        let mut store = BenchmarkStore::new("https://github.com/AlessioZanga/grathe");

        for (index, id) in ["aaa", "bbb", "ccc"].iter().enumerate() {
            store
                .append_run("Benchmark", run(id, 1_000 + index as u64))
                .unwrap();
        }

        let ids: Vec<_> = store
            .query("Benchmark", RunFilter::All)
            .map(|run| run.commit.id.as_str())
            .collect();

        assert_eq!(ids, vec!["aaa", "bbb", "ccc"]);
        assert_eq!(store.len("Benchmark"), 3);
        assert_eq!(store.latest("Benchmark").unwrap().commit.id, "ccc");
    }

    #[test]
    fn last_update_is_the_maximum_date() {
        let mut store = BenchmarkStore::default();

        store.append_run("Benchmark", run("aaa", 1640381821350)).unwrap();
        store.append_run("Other", run("bbb", 1640381163151)).unwrap();
        assert_eq!(store.last_update(), 1640381821350);

        store.append_run("Benchmark", run("ccc", 1640381163151)).unwrap();
        assert_eq!(store.last_update(), 1640381821350);
    }

    #[test]
    fn invalid_runs_leave_the_store_unchanged() {
        let mut store = BenchmarkStore::default();
        store.append_run("Benchmark", run("aaa", 10)).unwrap();
        let before = store.clone();

        let mut invalid = run("bbb", 20);
        invalid.commit.id.clear();
        assert_eq!(
            store.append_run("Benchmark", invalid),
            Err(ValidationError::MissingField {
                record: "commit",
                field: "id"
            })
        );
        assert_eq!(
            store.append_run("", run("ccc", 30)),
            Err(ValidationError::EmptySuite)
        );

        assert_eq!(store, before);
    }

    #[test]
    fn unknown_suites_are_empty() {
        let store = BenchmarkStore::default();

        assert_eq!(store.query("Missing", RunFilter::All).count(), 0);
        assert!(store.runs("Missing").is_empty());
        assert!(store.latest("Missing").is_none());
    }

    #[test]
    fn suites_keep_their_insertion_order() {
        let mut store = BenchmarkStore::default();
        store.append_run("Zeta", run("aaa", 1)).unwrap();
        store.append_run("Alpha", run("bbb", 2)).unwrap();

        assert_eq!(store.suites().collect::<Vec<_>>(), vec!["Zeta", "Alpha"]);
    }
}
