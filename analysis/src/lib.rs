//! Run-to-run comparison and per-bench history over recorded benchmark runs.

pub mod compare;
pub mod history;

pub use compare::{compare_runs, compare_with_previous, CompareConfig, CompareReport, Comparison, Verdict};
pub use history::{history, History, Point, Summary};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Alert threshold must be greater than 1.0, got {0}")]
    InvalidThreshold(f64),
    #[error("Cannot compare runs of different tools ({previous} vs {current})")]
    ToolMismatch { previous: String, current: String },
}

#[cfg(test)]
pub(crate) mod tests {
    use benchlog_ingest::{Bench, BenchmarkRun, Commit, Person};

    pub fn run(id: &str, date: u64, benches: &[(&str, f64)]) -> BenchmarkRun {
        let person = Person {
            email: "dev@example.org".to_owned(),
            name: "dev".to_owned(),
            username: None,
        };

        BenchmarkRun {
            commit: Commit {
                author: person.clone(),
                committer: person,
                distinct: true,
                id: id.to_owned(),
                message: "bench".to_owned(),
                timestamp: "2021-12-24T21:17:42+01:00".to_owned(),
                tree_id: "0000".to_owned(),
                url: format!("https://example.org/commit/{id}"),
            },
            date,
            tool: "cargo".to_owned(),
            benches: benches
                .iter()
                .map(|(name, value)| Bench::new(*name, *value, "± 0", "ns/iter"))
                .collect(),
        }
    }
}
