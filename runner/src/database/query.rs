use benchlog_ingest::BenchmarkRun;
use std::ops::Range;

/// Selects runs of a suite, all bounds are inclusive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunFilter {
    #[default]
    All,
    /// runs of a single commit, the id may be abbreviated
    Commit(String),
    /// from the first run of `from` through the last run of `to`
    CommitRange {
        from: Option<String>,
        to: Option<String>,
    },
    /// runs whose `date` (epoch ms) lies between `since` and `until`
    Dates {
        since: Option<u64>,
        until: Option<u64>,
    },
}

impl RunFilter {
    fn accepts(&self, run: &BenchmarkRun) -> bool {
        match self {
            Self::All | Self::CommitRange { .. } => true,
            Self::Commit(id) => run.commit.matches(id),
            Self::Dates { since, until } => {
                since.map_or(true, |since| run.date >= since)
                    && until.map_or(true, |until| run.date <= until)
            }
        }
    }

    /// index window a range filter covers, `None` if a bound matches no run
    fn window(&self, runs: &[BenchmarkRun]) -> Option<Range<usize>> {
        match self {
            Self::CommitRange { from, to } => {
                let start = match from {
                    Some(from) => runs.iter().position(|run| run.commit.matches(from))?,
                    None => 0,
                };
                let end = match to {
                    Some(to) => runs.iter().rposition(|run| run.commit.matches(to))? + 1,
                    None => runs.len(),
                };

                Some(start..end.max(start))
            }
            _ => Some(0..runs.len()),
        }
    }
}

/// Lazy, restartable iterator over the runs of a suite.
///
/// Range bounds are resolved on the first call to `next`; cloning or calling
/// [`Runs::rewind`] starts the sequence over.
#[derive(Debug, Clone)]
pub struct Runs<'a> {
    runs: &'a [BenchmarkRun],
    filter: RunFilter,
    window: Option<Range<usize>>,
    position: usize,
}

impl<'a> Runs<'a> {
    pub(crate) fn new(runs: &'a [BenchmarkRun], filter: RunFilter) -> Self {
        Self {
            runs,
            filter,
            window: None,
            position: 0,
        }
    }

    pub fn rewind(&mut self) {
        self.window = None;
        self.position = 0;
    }

    fn resolve(&mut self) -> Range<usize> {
        if let Some(window) = &self.window {
            return window.clone();
        }

        let window = self.filter.window(self.runs).unwrap_or(0..0);
        self.position = window.start;
        self.window = Some(window.clone());

        window
    }
}

impl<'a> Iterator for Runs<'a> {
    type Item = &'a BenchmarkRun;

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.resolve();

        while self.position < window.end {
            let run = &self.runs[self.position];
            self.position += 1;

            if self.filter.accepts(run) {
                return Some(run);
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let end = self
            .window
            .as_ref()
            .map_or(self.runs.len(), |window| window.end);

        (0, Some(end.saturating_sub(self.position)))
    }
}
