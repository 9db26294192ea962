use crate::config::{ConfigErrors, SuiteConfig};
use globset::{GlobBuilder, GlobMatcher};
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

#[derive(Debug)]
/// All possible collector variants
/// These should be initialized from `Collector::load`
pub enum Collector {
    Glob { paths: VecDeque<PathBuf> },
    Grouped { collectors: Vec<Collector> },
}

impl Collector {
    /// Walk every configured root of the suite and collect the files matching its glob.
    ///
    /// Each root becomes its own collector, so output files are yielded root by root and
    /// sorted by path within a root.
    pub fn load(config: &SuiteConfig) -> Result<Self, ConfigErrors> {
        let glob = GlobBuilder::new(config.glob.as_str())
            .literal_separator(false)
            .build()?
            .compile_matcher();
        debug!("Filtering with glob: {glob:?}");

        let roots = config
            .paths
            .iter()
            .chain(config.path.iter())
            .unique()
            .collect_vec();

        if roots.is_empty() {
            warn!("Suite has no paths to collect bench output from");
        }

        Ok(roots
            .into_iter()
            .map(|root| Self::walk(Path::new(root), &glob))
            .fold(Self::grouped(), Self::join))
    }

    fn walk(root: &Path, glob: &GlobMatcher) -> Self {
        // a single file given as root is taken as is
        if root.is_file() {
            return Self::from_paths([root.to_path_buf()]);
        }

        let paths = WalkBuilder::new(root)
            .standard_filters(false)
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    warn!(root = ?root, "Failed to walk bench output: {error}");
                    None
                }
            })
            .filter(|entry| entry.file_type().map_or(false, |kind| kind.is_file()))
            .map(DirEntry::into_path)
            .filter(|path| {
                path.strip_prefix(root)
                    .map_or(false, |relative| glob.is_match(relative))
            })
            .sorted()
            .collect_vec();

        debug!(root = ?root, files = paths.len(), "Collected bench output");

        Self::from_paths(paths)
    }

    pub fn from_paths<I: IntoIterator<Item = PathBuf>>(paths: I) -> Self {
        Self::Glob {
            paths: paths.into_iter().collect(),
        }
    }

    /// create an empty grouped collector
    pub fn grouped() -> Self {
        Self::Grouped {
            collectors: Vec::new(),
        }
    }

    /// join multiple collectors into a single grouped collector
    /// this will if possible reuse existing grouped collectors
    pub fn join(self, other: Self) -> Self {
        match self {
            Self::Grouped { mut collectors } => {
                match other {
                    Self::Grouped {
                        collectors: other_collectors,
                    } => {
                        collectors.extend(other_collectors);
                    }
                    non_grouped => {
                        collectors.push(non_grouped);
                    }
                };

                Self::Grouped { collectors }
            }
            non_grouped => match other {
                Self::Grouped { mut collectors } => {
                    collectors.insert(0, non_grouped);

                    Self::Grouped { collectors }
                }
                other_non_grouped => Self::Grouped {
                    collectors: vec![non_grouped, other_non_grouped],
                },
            },
        }
    }
}

impl Iterator for Collector {
    type Item = PathBuf;

    /// return accurate size for underlying iterator
    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Glob { paths } => (paths.len(), Some(paths.len())),
            Self::Grouped { collectors } => {
                let len = collectors
                    .iter()
                    .fold(0, |acc, collector| acc + collector.size_hint().0);

                (len, Some(len))
            }
        }
    }

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Glob { paths } => paths.pop_front(),
            Self::Grouped { collectors } => collectors.iter_mut().find_map(Iterator::next),
        }
    }
}
