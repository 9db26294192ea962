use crate::{model::Bench, IngestError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::{debug, trace};

/// `test <name> ... bench:   <value> <unit> (+/- <dev>)`, as printed by libtest and
/// criterion's `--output-format bencher`
static BENCHER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^test\s+(.+?)\s+\.\.\.\s+bench:\s+([0-9,.]+)\s+(\S+)\s+\(\+/-\s+([0-9,.]+)\)")
        .expect("bencher line pattern")
});

/// `[<name>] time: [<lo> <unit> <mid> <unit> <hi> <unit>]`, criterion's default output
static CRITERION_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(.*?)\s*time:\s+\[([0-9.]+)\s+(\S+)\s+([0-9.]+)\s+(\S+)\s+([0-9.]+)\s+(\S+)\]",
    )
    .expect("criterion time pattern")
});

/// Tool that produced a bench output, using the names stored in the `tool` field of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    #[serde(rename = "cargo")]
    Cargo,
    #[serde(rename = "customBiggerIsBetter")]
    CustomBiggerIsBetter,
    #[serde(rename = "customSmallerIsBetter")]
    CustomSmallerIsBetter,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cargo => "cargo",
            Self::CustomBiggerIsBetter => "customBiggerIsBetter",
            Self::CustomSmallerIsBetter => "customSmallerIsBetter",
        }
    }

    pub fn bigger_is_better(&self) -> bool {
        matches!(self, Self::CustomBiggerIsBetter)
    }
}

impl FromStr for Tool {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "cargo" => Ok(Self::Cargo),
            "customBiggerIsBetter" => Ok(Self::CustomBiggerIsBetter),
            "customSmallerIsBetter" => Ok(Self::CustomSmallerIsBetter),
            other => Err(IngestError::UnsupportedTool(other.to_owned())),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse raw bench output of `tool` into benches, in output order
#[tracing::instrument(level = "debug", skip(output))]
pub fn parse(tool: Tool, output: &str) -> Result<Vec<Bench>, IngestError> {
    let benches = match tool {
        Tool::Cargo => parse_cargo(output),
        Tool::CustomBiggerIsBetter | Tool::CustomSmallerIsBetter => parse_custom(output)?,
    };

    if benches.is_empty() {
        return Err(IngestError::NoBenches);
    }

    benches.iter().try_for_each(Bench::validate)?;
    debug!(tool = %tool, count = benches.len(), "Parsed bench output");

    Ok(benches)
}

/// Collects benches from both the bencher format and criterion's default format
pub fn parse_cargo(output: &str) -> Vec<Bench> {
    let mut benches = Vec::new();
    let mut last_line = "";

    for line in output.lines() {
        let line = line.trim();

        if let Some(captures) = BENCHER_LINE.captures(line) {
            let value = strip_separators(&captures[2]);
            let deviation = strip_separators(&captures[4]);

            match value.parse::<f64>() {
                Ok(value) => benches.push(Bench::new(
                    &captures[1],
                    value,
                    format!("± {deviation}"),
                    &captures[3],
                )),
                Err(error) => trace!(line = line, "Skipped unparsable bench value: {error}"),
            }
        } else if let Some(captures) = CRITERION_TIME.captures(line) {
            let name = match captures[1].trim() {
                "" => last_line,
                inline => inline,
            };

            match criterion_bench(name, &captures) {
                Some(bench) => benches.push(bench),
                None => trace!(line = line, "Skipped criterion line with unknown unit"),
            }
        }

        if !line.is_empty() {
            last_line = line;
        }
    }

    benches
}

fn criterion_bench(name: &str, captures: &regex::Captures) -> Option<Bench> {
    if name.is_empty() {
        return None;
    }

    let low = captures[2].parse::<f64>().ok()? * nanos_per(&captures[3])?;
    let mid = captures[4].parse::<f64>().ok()? * nanos_per(&captures[5])?;
    let high = captures[6].parse::<f64>().ok()? * nanos_per(&captures[7])?;
    let deviation = ((high - low) / 2.0 * 1000.0).round() / 1000.0;

    Some(Bench::new(
        name,
        (mid * 1000.0).round() / 1000.0,
        format!("± {deviation}"),
        "ns/iter",
    ))
}

fn nanos_per(unit: &str) -> Option<f64> {
    match unit {
        "ps" => Some(1e-3),
        "ns" => Some(1.0),
        "µs" | "us" => Some(1e3),
        "ms" => Some(1e6),
        "s" => Some(1e9),
        _ => None,
    }
}

fn strip_separators(value: &str) -> String {
    value.chars().filter(|c| *c != ',').collect()
}

/// JSON array of `{name, unit, value, range?, extra?}`
pub fn parse_custom(output: &str) -> Result<Vec<Bench>, IngestError> {
    Ok(serde_json::from_str(output)?)
}
