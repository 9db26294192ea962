use crate::AnalysisError;
use benchlog_ingest::{BenchmarkRun, Tool};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use tracing::{debug, warn};

#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Clone, Copy)]
#[repr(i8)]
pub enum Verdict {
    Regressed = -1,
    Unchanged = 0,
    Improved = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompareConfig {
    /// ratio (worse / better) at which a bench counts as regressed, 2.0 means "twice as slow"
    pub alert_threshold: f64,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub name: String,
    pub unit: String,
    pub previous: f64,
    pub current: f64,
    /// `None` if the previous measurement was zero and the current one is not
    pub ratio: Option<f64>,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareReport {
    pub previous_commit: String,
    pub current_commit: String,
    pub tool: String,
    pub comparisons: Vec<Comparison>,
    /// benches only present in the current run
    pub added: Vec<String>,
    /// benches only present in the previous run
    pub removed: Vec<String>,
}

impl CompareReport {
    pub fn regressions(&self) -> impl Iterator<Item = &Comparison> {
        self.comparisons
            .iter()
            .filter(|comparison| comparison.verdict == Verdict::Regressed)
    }

    pub fn has_regressions(&self) -> bool {
        self.regressions().next().is_some()
    }
}

fn ratio(previous: f64, current: f64, bigger_is_better: bool) -> Option<f64> {
    let (worse, better) = if bigger_is_better {
        (previous, current)
    } else {
        (current, previous)
    };

    if better == 0.0 {
        (worse == 0.0).then_some(1.0)
    } else {
        Some(worse / better)
    }
}

fn verdict(ratio: Option<f64>, threshold: f64) -> Verdict {
    match ratio {
        None => Verdict::Regressed,
        Some(ratio) if ratio >= threshold => Verdict::Regressed,
        Some(ratio) if ratio <= 1.0 / threshold => Verdict::Improved,
        Some(_) => Verdict::Unchanged,
    }
}

/// Compare every bench of `current` against the bench of the same name in `previous`
pub fn compare_runs(
    previous: &BenchmarkRun,
    current: &BenchmarkRun,
    config: &CompareConfig,
) -> Result<CompareReport, AnalysisError> {
    if config.alert_threshold.is_nan() || config.alert_threshold <= 1.0 {
        return Err(AnalysisError::InvalidThreshold(config.alert_threshold));
    }

    if previous.tool != current.tool {
        return Err(AnalysisError::ToolMismatch {
            previous: previous.tool.clone(),
            current: current.tool.clone(),
        });
    }

    let bigger_is_better = match current.tool.parse::<Tool>() {
        Ok(tool) => tool.bigger_is_better(),
        Err(_) => {
            debug!(tool = %current.tool, "Unknown tool, assuming smaller is better");
            false
        }
    };

    let mut comparisons = Vec::new();
    let mut added = Vec::new();

    for bench in current.benches.iter().unique_by(|bench| bench.name.clone()) {
        let Some(before) = previous.bench(&bench.name) else {
            added.push(bench.name.clone());
            continue;
        };

        if before.unit != bench.unit {
            warn!(
                name = %bench.name,
                "Unit changed from {} to {}, skipping comparison",
                before.unit,
                bench.unit
            );
            continue;
        }

        let ratio = ratio(before.value, bench.value, bigger_is_better);

        comparisons.push(Comparison {
            name: bench.name.clone(),
            unit: bench.unit.clone(),
            previous: before.value,
            current: bench.value,
            ratio,
            verdict: verdict(ratio, config.alert_threshold),
        });
    }

    let removed = previous
        .benches
        .iter()
        .filter(|bench| current.bench(&bench.name).is_none())
        .map(|bench| bench.name.clone())
        .unique()
        .collect_vec();

    let report = CompareReport {
        previous_commit: previous.commit.id.clone(),
        current_commit: current.commit.id.clone(),
        tool: current.tool.clone(),
        comparisons,
        added,
        removed,
    };

    for regression in report.regressions() {
        warn!(
            name = %regression.name,
            previous = regression.previous,
            current = regression.current,
            "Performance alert: {} regressed beyond {}x",
            regression.name,
            config.alert_threshold
        );
    }

    Ok(report)
}

/// Compare the last two runs of a sequence, `None` if there are fewer than two
pub fn compare_with_previous<'a, I>(
    runs: I,
    config: &CompareConfig,
) -> Result<Option<CompareReport>, AnalysisError>
where
    I: IntoIterator<Item = &'a BenchmarkRun>,
{
    let (previous, current) = runs
        .into_iter()
        .fold((None, None), |(_, last), run| (last, Some(run)));

    match (previous, current) {
        (Some(previous), Some(current)) => compare_runs(previous, current, config).map(Some),
        _ => Ok(None),
    }
}
