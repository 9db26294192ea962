use benchlog_ingest::BenchmarkRun;
use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub commit: String,
    pub date: u64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub latest: f64,
}

/// Every recorded value of a single bench, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub name: String,
    pub unit: Option<String>,
    pub points: Vec<Point>,
    pub summary: Option<Summary>,
}

pub fn history<'a, I>(runs: I, name: &str) -> History
where
    I: IntoIterator<Item = &'a BenchmarkRun>,
{
    let mut unit: Option<String> = None;
    let mut points = Vec::new();

    for run in runs {
        let Some(bench) = run.bench(name) else {
            continue;
        };

        match &unit {
            None => unit = Some(bench.unit.clone()),
            Some(first) if *first != bench.unit => {
                warn!(
                    name = name,
                    commit = %run.commit.id,
                    "Unit changed from {first} to {}, values are not comparable",
                    bench.unit
                );
            }
            Some(_) => {}
        }

        points.push(Point {
            commit: run.commit.id.clone(),
            date: run.date,
            value: bench.value,
        });
    }

    let summary = summarize(&points);

    History {
        name: name.to_owned(),
        unit,
        points,
        summary,
    }
}

fn summarize(points: &[Point]) -> Option<Summary> {
    let latest = points.last()?.value;
    let (min, max) = match points.iter().map(|point| point.value).minmax() {
        MinMaxResult::NoElements => return None,
        MinMaxResult::OneElement(value) => (value, value),
        MinMaxResult::MinMax(min, max) => (min, max),
    };
    let mean = points.iter().map(|point| point.value).sum::<f64>() / points.len() as f64;

    Some(Summary {
        count: points.len(),
        min,
        max,
        mean,
        latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::run;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_values_in_run_order() {
        let runs = vec![
            run("aaa", 10, &[("new", 5.0), ("reserve/10", 7.0)]),
            run("bbb", 20, &[("reserve/10", 9.0)]),
            run("ccc", 30, &[("new", 3.0)]),
            run("ddd", 40, &[("new", 4.0)]),
        ];

        let history = history(&runs, "new");

        assert_eq!(history.unit.as_deref(), Some("ns/iter"));
        assert_eq!(
            history
                .points
                .iter()
                .map(|point| (point.commit.as_str(), point.date, point.value))
                .collect_vec(),
            vec![("aaa", 10, 5.0), ("ccc", 30, 3.0), ("ddd", 40, 4.0)]
        );
        assert_eq!(
            history.summary,
            Some(Summary {
                count: 3,
                min: 3.0,
                max: 5.0,
                mean: 4.0,
                latest: 4.0,
            })
        );
    }

    #[test]
    fn unknown_bench_has_no_summary() {
        let runs = vec![run("aaa", 10, &[("new", 5.0)])];
        let history = history(&runs, "missing");

        assert!(history.points.is_empty());
        assert_eq!(history.unit, None);
        assert_eq!(history.summary, None);
    }
}
