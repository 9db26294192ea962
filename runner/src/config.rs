use crate::ingest::{IngestorMap, Ingestors};
use benchlog_analysis::CompareConfig;
use benchlog_ingest::Tool;
use globset::{GlobBuilder, GlobMatcher};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::Error,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::{error, warn};

/// Names accepted in `ingest.<name>.name`
pub const INGESTOR_NAMES: [&str; 3] = ["builtin", "exec", "null"];

// check if a file is executable
#[cfg(unix)]
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    use std::os::unix::fs::MetadataExt;

    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[cfg(not(unix))]
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        File::open(path)
            .map(|_| true)
            .map_err(ConfigErrors::MetadataNotFound)
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Globs were invalid")]
    InvalidGlobs(#[from] globset::Error),
    #[error("Ingestor not supported: {0}")]
    UnsupportedIngestor(String),
    #[error("Ingestor failed to load")]
    FailedLoadIngestor,
    #[error("Store format not supported: {0}, please use one of json, script, sqlite")]
    UnsupportedFormat(String),
    #[error("Suite {0} is not defined")]
    UnknownSuite(String),
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(Error),
    #[error("Failed to read config")]
    Read(#[from] Error),
    #[error("Failed to parse config")]
    Parse(#[from] serde_yaml::Error),
    #[error("Config failed the preflight checks")]
    Preflight,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    // where and how the history is persisted
    pub store: StoreConfig,
    // Suites as named groups of bench output files, each becomes one run per invocation
    #[serde(default)]
    pub suites: BTreeMap<String, SuiteConfig>,
    // Config for all ingestor related setups
    #[serde(default)]
    pub ingest: BTreeMap<String, IngestorConfig>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    Json,
    Script,
    #[serde(rename = "sqlite")]
    SQLite,
}

impl StoreFormat {
    /// `.js` -> script, `.db`/`.sqlite` -> SQLite, anything else -> JSON
    pub fn infer(path: &Path) -> Self {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some("js") => Self::Script,
            Some("db" | "sqlite" | "sqlite3") => Self::SQLite,
            _ => Self::Json,
        }
    }
}

impl FromStr for StoreFormat {
    type Err = ConfigErrors;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "script" | "js" => Ok(Self::Script),
            "sqlite" | "db" => Ok(Self::SQLite),
            other => Err(ConfigErrors::UnsupportedFormat(other.to_owned())),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    // inferred from the extension of `path` if missing
    pub format: Option<StoreFormat>,
    #[serde(default, alias = "repoUrl")]
    pub repo_url: String,
}

impl StoreConfig {
    pub fn new(path: PathBuf, format: Option<StoreFormat>, repo_url: String) -> Self {
        Self {
            path,
            format,
            repo_url,
        }
    }

    pub fn format(&self) -> StoreFormat {
        self.format.unwrap_or_else(|| StoreFormat::infer(&self.path))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    pub tool: Tool,
    // key into `ingest`, the tool's own parser if missing
    pub ingest: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    pub path: Option<String>,
    #[serde(default = "default_glob")]
    pub glob: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct IngestorConfig {
    // Name of the selected ingestor type
    pub name: String,

    // parameters for the ingestor, e.g. `exec`, `params` and `timeout` for `exec`
    #[serde(default)]
    pub parameter: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    #[serde(default)]
    pub fail_on_alert: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold(),
            fail_on_alert: false,
        }
    }
}

impl AnalysisConfig {
    pub fn compare_config(&self) -> CompareConfig {
        CompareConfig {
            alert_threshold: self.alert_threshold,
        }
    }
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content = fs::read_to_string(path)?;

        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn suite(&self, name: &str) -> Result<&SuiteConfig, ConfigErrors> {
        self.suites
            .get(name)
            .ok_or_else(|| ConfigErrors::UnknownSuite(name.to_owned()))
    }

    /// load, if possible, all ingestors
    pub fn load_ingestors(&self) -> Result<IngestorMap, ConfigErrors> {
        let mut ingestors = IngestorMap::new();
        let mut contains_error = false;

        for (name, config) in self.ingest.iter() {
            match Ingestors::load(config) {
                Ok(ingestor) => {
                    ingestors.insert(name.clone(), ingestor);
                }
                Err(e) => {
                    error!("ingestor {name} failed to load: {e}");
                    contains_error = true;
                }
            };
        }

        if contains_error {
            Err(ConfigErrors::FailedLoadIngestor)
        } else {
            Ok(ingestors)
        }
    }

    /// Compile all globs for the suites
    pub fn compile_globs(&self) -> Result<BTreeMap<String, GlobMatcher>, Vec<(String, globset::Error)>> {
        let mut errors = Vec::new();
        let mut globs = BTreeMap::new();

        self.suites.iter().for_each(|(name, suite)| {
            match GlobBuilder::new(&suite.glob)
                .build()
                .map(|glob| glob.compile_matcher())
            {
                Ok(matcher) => {
                    globs.insert(name.clone(), matcher);
                }
                Err(error) => {
                    errors.push((name.clone(), error));
                }
            }
        });

        if errors.is_empty() {
            Ok(globs)
        } else {
            Err(errors)
        }
    }

    /// Report every problem of the config at once, returns true if any was an error
    pub fn preflight_checks(&mut self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.store.repo_url.is_empty() {
            warn!("store.repo_url is empty, the charting page will not link commits");
        }

        if self.store.format() == StoreFormat::SQLite && cfg!(not(feature = "sqlite")) {
            error!("store.format is sqlite but this build has no SQLite support");
            contains_error = true;
        }

        if self.analysis.alert_threshold.is_nan() || self.analysis.alert_threshold <= 1.0 {
            error!(
                "analysis.alert_threshold must be greater than 1.0, got {}",
                self.analysis.alert_threshold
            );
            contains_error = true;
        }

        for (name, config) in self.ingest.iter_mut() {
            config.name = config.name.to_lowercase();

            match config.name.as_str() {
                "exec" => match config.parameter.get("exec").and_then(|value| value.as_str()) {
                    Some(exec) => match check_executable(Path::new(exec)) {
                        Ok(true) => {}
                        Ok(false) => {
                            error!("ingest.{name}.parameter.exec ({exec}) is not executable");
                            contains_error = true;
                        }
                        Err(e) => {
                            error!("ingest.{name}.parameter.exec ({exec}) is unusable: {e}");
                            contains_error = true;
                        }
                    },
                    None => {
                        error!("ingest.{name}.parameter.exec must be a valid path to an executable file");
                        contains_error = true;
                    }
                },
                "builtin" | "null" => {}
                ingestor_name => {
                    error!(
                        "ingest.{name}.name ({ingestor_name}) is not supported, please use one of {}",
                        INGESTOR_NAMES.join(", ")
                    );
                    contains_error = true;
                }
            }
        }
        let defined_ingestors = self.ingest.keys().sorted().cloned().collect_vec();

        for (suite, value) in self.suites.iter_mut() {
            if suite.trim().is_empty() {
                error!("Suite labels must not be empty");
                contains_error = true;
            }

            if let Some(ref ingest) = value.ingest {
                if defined_ingestors.binary_search(ingest).is_err() {
                    error!("suites.{suite}.ingest '{ingest}' is not defined in ingest");
                    contains_error = true;
                }
            }

            if value.path.is_none() && value.paths.is_empty() {
                error!("Suite {suite} contains neither 'path' nor 'paths', there is nothing to record");
                contains_error = true;
            } else if let Some(ref path) = value.path {
                if !value.paths.is_empty() {
                    warn!("Suite {suite} contains both 'path' and 'paths'. This will be treated as if 'path' is a member of 'paths'");
                }
                // merge path into paths if neccessary
                if !value.paths.contains(path) {
                    value.paths.push(path.clone());
                }
            }
        }

        if let Err(compile_errors) = self.compile_globs() {
            for (name, err) in compile_errors {
                error!("Failed to compile glob for suites.{name}: {err}");
            }
            contains_error = true;
        }

        contains_error
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("dev/bench/data.js")
}

fn default_glob() -> String {
    "*".to_owned()
}

fn default_alert_threshold() -> f64 {
    CompareConfig::default().alert_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"
store:
  path: dev/bench/data.js
  repo_url: https://github.com/AlessioZanga/grathe
suites:
  Benchmark:
    tool: cargo
    path: target/bench
    glob: "*.txt"
  Throughput:
    tool: customBiggerIsBetter
    ingest: passthrough
    paths: [out]
ingest:
  passthrough:
    name: "Null"
analysis:
  alert_threshold: 1.5
"#;

    #[test]
    fn parses_and_passes_preflight() {
        let mut config: RunnerConfig = serde_yaml::from_str(CONFIG).unwrap();

        assert!(!config.preflight_checks());
        assert_eq!(config.store.format(), StoreFormat::Script);
        assert_eq!(config.ingest["passthrough"].name, "null");
        assert_eq!(config.suites["Benchmark"].paths, vec!["target/bench".to_owned()]);
        assert_eq!(config.suites["Throughput"].tool, Tool::CustomBiggerIsBetter);
        assert_eq!(config.suites["Throughput"].glob, "*");
        assert_eq!(config.analysis.compare_config().alert_threshold, 1.5);
        assert!(!config.analysis.fail_on_alert);
        assert_eq!(config.compile_globs().unwrap().len(), 2);
    }

    #[test]
    fn preflight_reports_problems() {
        let mut config: RunnerConfig = serde_yaml::from_str(CONFIG).unwrap();
        config.suites.get_mut("Throughput").unwrap().ingest = Some("missing".to_owned());
        assert!(config.preflight_checks());

        let mut config: RunnerConfig = serde_yaml::from_str(CONFIG).unwrap();
        config.analysis.alert_threshold = 0.5;
        assert!(config.preflight_checks());

        let mut config: RunnerConfig = serde_yaml::from_str(CONFIG).unwrap();
        config.suites.get_mut("Benchmark").unwrap().glob = "[".to_owned();
        assert!(config.preflight_checks());
    }

    #[test]
    fn rejects_unknown_fields() {
        let config = CONFIG.replace("glob: \"*.txt\"", "globs: \"*.txt\"");

        assert!(serde_yaml::from_str::<RunnerConfig>(&config).is_err());
    }

    #[test]
    fn infers_store_format() {
        assert_eq!(StoreFormat::infer(Path::new("dev/bench/data.js")), StoreFormat::Script);
        assert_eq!(StoreFormat::infer(Path::new("bench.db")), StoreFormat::SQLite);
        assert_eq!(StoreFormat::infer(Path::new("bench.json")), StoreFormat::Json);
        assert_eq!(StoreFormat::infer(Path::new("bench")), StoreFormat::Json);
        assert_eq!("SQLite".parse::<StoreFormat>().unwrap(), StoreFormat::SQLite);
        assert!("csv".parse::<StoreFormat>().is_err());
    }
}
