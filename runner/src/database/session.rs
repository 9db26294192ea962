use super::{BenchmarkStore, StoreAdapter, StoreError};
use benchlog_ingest::BenchmarkRun;
use tracing::{info, warn};

/// An opened store: loaded (or initialized empty) on `open`, appended to in memory and
/// written back once on `close`
#[derive(Debug)]
pub struct Session {
    adapter: StoreAdapter,
    store: BenchmarkStore,
    appended: usize,
}

impl Session {
    pub fn open(adapter: StoreAdapter, repo_url: &str) -> Result<Self, StoreError> {
        let mut store = if adapter.exists() {
            adapter.read()?
        } else {
            info!("No store found, starting with an empty one");
            BenchmarkStore::new(repo_url)
        };

        if !repo_url.is_empty() && store.repo_url() != repo_url {
            if !store.repo_url().is_empty() {
                warn!(
                    "Store was recorded for {} but is now used for {repo_url}",
                    store.repo_url()
                );
            }
            store.set_repo_url(repo_url);
        }

        Ok(Self {
            adapter,
            store,
            appended: 0,
        })
    }

    pub fn store(&self) -> &BenchmarkStore {
        &self.store
    }

    pub fn append_run(&mut self, suite: &str, run: BenchmarkRun) -> Result<(), StoreError> {
        self.store.append_run(suite, run)?;
        self.appended += 1;

        Ok(())
    }

    /// number of runs appended since `open`
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Persist the store if anything was appended and hand it back
    pub fn close(self) -> Result<BenchmarkStore, StoreError> {
        if self.appended > 0 {
            self.adapter.write(&self.store)?;
            info!("Stored {} new runs", self.appended);
        }

        Ok(self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::StoreFormat, tests::run};
    use pretty_assertions::assert_eq;

    #[test]
    fn lifecycle_persists_appended_runs() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("data.js");
        let adapter = || StoreAdapter::open(path.clone(), StoreFormat::Script).unwrap();

        let mut session = Session::open(adapter(), "https://example.org/repo").unwrap();
        assert!(session.store().is_empty());
        session.append_run("Benchmark", run("aaa", 10)).unwrap();
        session.append_run("Benchmark", run("bbb", 20)).unwrap();
        assert_eq!(session.appended(), 2);
        let written = session.close().unwrap();

        let session = Session::open(adapter(), "").unwrap();
        assert_eq!(session.store(), &written);
        assert_eq!(session.store().repo_url(), "https://example.org/repo");
        assert_eq!(session.store().len("Benchmark"), 2);
    }

    #[test]
    fn untouched_sessions_do_not_write() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("data.json");

        let session =
            Session::open(StoreAdapter::open(path.clone(), StoreFormat::Json).unwrap(), "").unwrap();
        session.close().unwrap();

        assert!(!path.exists());
    }
}
