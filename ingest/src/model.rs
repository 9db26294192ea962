use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{record}.{field} is required")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },
    #[error("bench '{name}' has a non-finite value")]
    NonFiniteValue { name: String },
    #[error("run for commit {commit} contains no benches")]
    NoBenches { commit: String },
    #[error("suite label must not be empty")]
    EmptySuite,
}

fn require(value: &str, record: &'static str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField { record, field })
    } else {
        Ok(())
    }
}

/// Author or committer of a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Person {
    fn validate(&self, record: &'static str) -> Result<(), ValidationError> {
        require(&self.name, record, "name")?;
        require(&self.email, record, "email")
    }
}

/// Source-control revision a run was measured against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub author: Person,
    pub committer: Person,
    pub distinct: bool,
    pub id: String,
    pub message: String,
    /// ISO-8601, kept verbatim
    pub timestamp: String,
    pub tree_id: String,
    pub url: String,
}

impl Commit {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.author.validate("commit.author")?;
        self.committer.validate("commit.committer")?;
        require(&self.id, "commit", "id")?;
        require(&self.timestamp, "commit", "timestamp")?;
        require(&self.url, "commit", "url")
    }

    /// true if `id` is the full commit id or an abbreviation of it
    pub fn matches(&self, id: &str) -> bool {
        !id.is_empty() && self.id.starts_with(id)
    }
}

/// A single named measurement, e.g. `adjacencylist_i32/new/new = 5 ns/iter (± 0)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bench {
    pub name: String,
    #[serde(serialize_with = "serialize_value")]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl Bench {
    pub fn new(name: impl Into<String>, value: f64, range: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            range: Some(range.into()),
            unit: unit.into(),
            extra: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "bench", "name")?;
        require(&self.unit, "bench", "unit")?;

        if self.value.is_finite() {
            Ok(())
        } else {
            Err(ValidationError::NonFiniteValue {
                name: self.name.clone(),
            })
        }
    }
}

// The charting page writes integral measurements without a fraction (`5`, not `5.0`)
fn serialize_value<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// Results of one benchmarking job against one commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub commit: Commit,
    /// epoch milliseconds
    pub date: u64,
    pub tool: String,
    pub benches: Vec<Bench>,
}

impl BenchmarkRun {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.commit.validate()?;
        require(&self.tool, "run", "tool")?;

        if self.date == 0 {
            return Err(ValidationError::MissingField {
                record: "run",
                field: "date",
            });
        }

        if self.benches.is_empty() {
            return Err(ValidationError::NoBenches {
                commit: self.commit.id.clone(),
            });
        }

        self.benches.iter().try_for_each(Bench::validate)
    }

    /// first bench with the given name
    pub fn bench(&self, name: &str) -> Option<&Bench> {
        self.benches.iter().find(|bench| bench.name == name)
    }
}
