pub mod exec;

use crate::config::{ConfigErrors, IngestorConfig, SuiteConfig};
use benchlog_ingest::{Bench, IngestError, Tool};
use itertools::Itertools;
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    io::Read,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum IngestorError {
    #[error("Failed to spawn ingestor")]
    SpawnIngestor(std::io::Error),
    #[error("Failed to deserialize ingestor output")]
    DeserializeIngestor(#[from] serde_yaml::Error),
    #[error("Failed to wait for a child proccess")]
    ChildError(#[from] std::io::Error),
    #[error("Ingestor timeout")]
    ChildTimeout,
    #[error("Failed to read bench output {path:?}")]
    ReadOutput {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Ingestor {0} is not defined")]
    UnknownIngestor(String),
    #[error(transparent)]
    Parse(#[from] IngestError),
}

#[derive(Debug, Clone)]
/// raw output of a benchmarking job, supposed to be interpreted by ingestors
pub struct BenchOutput {
    pub source: PathBuf,
    pub text: String,
}

impl BenchOutput {
    pub fn new(source: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }

    pub fn read(path: &Path) -> Result<Self, IngestorError> {
        std::fs::read_to_string(path)
            .map(|text| Self::new(path, text))
            .map_err(|source| IngestorError::ReadOutput {
                path: path.to_path_buf(),
                source,
            })
    }

    /// read everything from `reader`, labelled as `-`
    pub fn from_reader(mut reader: impl Read) -> Result<Self, IngestorError> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|source| IngestorError::ReadOutput {
                path: PathBuf::from("-"),
                source,
            })?;

        Ok(Self::new("-", text))
    }
}

pub type IngestorMap = BTreeMap<String, Ingestors>;

#[derive(Clone, Debug)]
pub enum Ingestors {
    /// the parser of the suite's tool
    Builtin,
    Exec(exec::ExecIngestor),
    /// output already is a YAML/JSON list of benches
    Null,
}

impl Ingestors {
    pub fn load(config: &IngestorConfig) -> Result<Self, ConfigErrors> {
        match config.name.to_lowercase().as_str() {
            "builtin" => Ok(Self::Builtin),
            "null" => Ok(Self::Null),
            "exec" => exec::ExecIngestor::load(config).map(Self::Exec),
            other => Err(ConfigErrors::UnsupportedIngestor(other.to_owned())),
        }
    }

    /// ingestor configured for `suite`, the builtin parser if none is named
    pub fn resolve(ingestors: &IngestorMap, suite: &SuiteConfig) -> Result<Self, IngestorError> {
        match &suite.ingest {
            None => Ok(Self::Builtin),
            Some(name) => ingestors
                .get(name)
                .cloned()
                .ok_or_else(|| IngestorError::UnknownIngestor(name.clone())),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, output), fields(source = ?output.source))]
    pub fn ingest(&self, tool: Tool, output: &BenchOutput) -> Result<Vec<Bench>, IngestorError> {
        match self {
            Self::Builtin => Ok(benchlog_ingest::parse(tool, &output.text)?),
            Self::Exec(ingestor) => checked(ingestor.ingest(output)?),
            Self::Null => match serde_yaml::from_str(&output.text) {
                Ok(benches) => checked(benches),
                Err(error) => {
                    error!(error = ?error, "Failed to deserialize benches for null ingestor");

                    Err(IngestorError::DeserializeIngestor(error))
                }
            },
        }
    }
}

fn checked(benches: Vec<Bench>) -> Result<Vec<Bench>, IngestorError> {
    if benches.is_empty() {
        return Err(IngestError::NoBenches.into());
    }

    benches
        .iter()
        .try_for_each(Bench::validate)
        .map_err(IngestError::from)?;

    Ok(benches)
}

/// Ingest all files in parallel, benches are concatenated in file order
pub fn ingest_all<I>(ingestor: &Ingestors, tool: Tool, paths: I) -> Result<Vec<Bench>, IngestorError>
where
    I: IntoIterator<Item = PathBuf>,
{
    let paths = paths.into_iter().collect_vec();

    if paths.is_empty() {
        return Err(IngestError::NoBenches.into());
    }

    info!("Ingesting {} bench output files", paths.len());

    let benches = paths
        .par_iter()
        .map(|path| ingestor.ingest(tool, &BenchOutput::read(path)?))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(benches.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn null_ingestor_reads_bench_lists() {
        let output = BenchOutput::new(
            "-",
            "- name: adjacencylist_i32/new/new\n  value: 5\n  range: ± 0\n  unit: ns/iter\n",
        );
        let benches = Ingestors::Null.ingest(Tool::Cargo, &output).unwrap();

        assert_eq!(
            benches,
            vec![Bench::new("adjacencylist_i32/new/new", 5.0, "± 0", "ns/iter")]
        );

        let json = BenchOutput::new("-", r#"[{"name": "x", "value": 1, "unit": "ms"}]"#);
        assert_eq!(Ingestors::Null.ingest(Tool::Cargo, &json).unwrap().len(), 1);

        let empty = BenchOutput::new("-", "[]");
        assert!(matches!(
            Ingestors::Null.ingest(Tool::Cargo, &empty),
            Err(IngestorError::Parse(IngestError::NoBenches))
        ));
    }

    #[test]
    fn ingests_files_in_order() {
        let directory = tempfile::tempdir().unwrap();
        let first = directory.path().join("a.txt");
        let second = directory.path().join("b.txt");
        fs::write(
            &first,
            "test adjacencylist_i32/new/new ... bench:           5 ns/iter (+/- 0)\n",
        )
        .unwrap();
        fs::write(
            &second,
            "test adjacencylist_i32/reserve/0 ... bench:           7 ns/iter (+/- 1)\n",
        )
        .unwrap();

        let benches =
            ingest_all(&Ingestors::Builtin, Tool::Cargo, vec![first, second.clone()]).unwrap();
        assert_eq!(
            benches.iter().map(|bench| bench.name.as_str()).collect_vec(),
            vec!["adjacencylist_i32/new/new", "adjacencylist_i32/reserve/0"]
        );

        let missing = directory.path().join("missing.txt");
        assert!(matches!(
            ingest_all(&Ingestors::Builtin, Tool::Cargo, vec![second, missing]),
            Err(IngestorError::ReadOutput { .. })
        ));
        assert!(matches!(
            ingest_all(&Ingestors::Builtin, Tool::Cargo, Vec::new()),
            Err(IngestorError::Parse(IngestError::NoBenches))
        ));
    }

    #[test]
    fn resolves_configured_ingestors() {
        let suite: SuiteConfig =
            serde_yaml::from_str("tool: cargo\ningest: passthrough\npath: out\n").unwrap();
        let mut ingestors = IngestorMap::new();

        assert!(matches!(
            Ingestors::resolve(&ingestors, &suite),
            Err(IngestorError::UnknownIngestor(name)) if name == "passthrough"
        ));

        ingestors.insert("passthrough".to_owned(), Ingestors::Null);
        assert!(matches!(
            Ingestors::resolve(&ingestors, &suite),
            Ok(Ingestors::Null)
        ));
    }
}
