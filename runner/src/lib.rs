//! Recording, storing and querying the history of benchmark runs.

pub mod collector;
pub mod commands;
pub mod config;
pub mod database;
pub mod ingest;

use benchlog_analysis::AnalysisError;
use benchlog_ingest::{IngestError, ValidationError};
use config::ConfigErrors;
use database::StoreError;
use ingest::IngestorError;
use itertools::Itertools;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ingestor(#[from] IngestorError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("Invalid run")]
    Invalid(#[from] ValidationError),
    #[error("Failed to read {path:?}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse commit")]
    Commit(#[from] serde_yaml::Error),
    #[error("Failed to serialize output")]
    Json(#[from] serde_json::Error),
    #[error("Commit {commit} has no run in suite {suite}")]
    UnknownCommit { suite: String, commit: String },
    #[error("Suite {0} has no runs")]
    EmptySuite(String),
    #[error("Suite {suite} has no run before {commit} to compare against")]
    NoBaseline { suite: String, commit: String },
    #[error("{0} benches regressed beyond the alert threshold")]
    Alert(usize),
}

/// `error` followed by all of its causes, `: ` separated
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    std::iter::successors(Some(error), |error| error.source())
        .map(ToString::to_string)
        .join(": ")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use benchlog_ingest::{Bench, BenchmarkRun, Commit, Person};
    use std::io;

    #[test]
    fn error_chain_lists_every_cause() {
        let error = RunnerError::Read {
            path: PathBuf::from("commit.json"),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        };
        assert_eq!(
            error_chain(&error),
            "Failed to read \"commit.json\": No such file or directory"
        );

        let error = RunnerError::from(StoreError::from(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "Permission denied",
        )));
        assert_eq!(
            error_chain(&error),
            "Failed to access store file: Permission denied"
        );
    }

    pub fn run(id: &str, date: u64) -> BenchmarkRun {
        let person = Person {
            email: "alessio.zanga@outlook.it".to_owned(),
            name: "Alessio Zanga".to_owned(),
            username: Some("AlessioZanga".to_owned()),
        };

        BenchmarkRun {
            commit: Commit {
                author: person.clone(),
                committer: person,
                distinct: true,
                id: id.to_owned(),
                message: "Bench".to_owned(),
                timestamp: "2021-12-24T22:16:37+01:00".to_owned(),
                tree_id: "6fd2a3d3ab3e3ab6a7c1e1e9fd0e0f8d6b1e2c3a".to_owned(),
                url: format!("https://github.com/AlessioZanga/grathe/commit/{id}"),
            },
            date,
            tool: "cargo".to_owned(),
            benches: vec![Bench::new(
                "adjacencylist_i32/new/new",
                5.0,
                "± 0",
                "ns/iter",
            )],
        }
    }
}
