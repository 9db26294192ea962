use super::{util::retrieve_counts, BenchmarkStore, Entries, StoreError};
use benchlog_ingest::{Bench, BenchmarkRun, Commit};
use rusqlite::{params, Connection};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info};

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::SQLite(error)
    }
}

/// Store kept in a SQLite database, mainly for ad-hoc SQL over the bench history
#[derive(Debug, Clone)]
pub struct SQLiteFile {
    path: PathBuf,
}

impl SQLiteFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(&self.path)?;

        for (counter, table) in SQL_SCHEMA.iter().enumerate() {
            match connection.execute(table, []) {
                Ok(_) => debug!("Applied SQL schema ({}/{SQL_SCHEMA_NUMBER})", counter + 1),
                Err(error) => {
                    error!(error = ?error, table = table, "Failed to apply SQL schema ({}/{SQL_SCHEMA_NUMBER}): {error}", counter + 1);

                    return Err(StoreError::SQLite(error));
                }
            }
        }

        Ok(connection)
    }

    pub fn read(&self) -> Result<BenchmarkStore, StoreError> {
        let connection = self.connect()?;

        let (repo_url, last_update) = connection
            .prepare_cached("select repo_url, last_update from store where id = 0")?
            .query_map(params![], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .next()
            .transpose()?
            .unwrap_or_default();

        let mut entries = Entries::new();
        let mut runs = connection.prepare_cached(
            "select id, suite, commit_data, date, tool from runs order by id",
        )?;
        let mut benches = connection.prepare_cached(
            "select name, value, error_range, unit, extra from benches
             where run = ? order by id",
        )?;

        let rows = runs.query_map(params![], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        for row in rows {
            let (id, suite, commit, date, tool) = row?;
            let commit: Commit = serde_json::from_str(&commit)?;
            let benches = benches
                .query_map(params![id], |row| {
                    Ok(Bench {
                        name: row.get(0)?,
                        value: row.get(1)?,
                        range: row.get(2)?,
                        unit: row.get(3)?,
                        extra: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            entries.entry(suite).or_default().push(BenchmarkRun {
                commit,
                date: date as u64,
                tool,
                benches,
            });
        }

        debug!(path = ?self.path, suites = entries.len(), "Loaded store from SQLite");

        BenchmarkStore::from_parts(repo_url, last_update as u64, entries)
    }

    /// Insert every run the database does not hold yet, in a single transaction
    pub fn write(&self, store: &BenchmarkStore) -> Result<(), StoreError> {
        let mut connection = self.connect()?;
        let tx = connection.transaction()?;

        tx.execute(
            "insert or replace into store (id, repo_url, last_update) values (0, ?, ?)",
            params![store.repo_url(), store.last_update() as i64],
        )?;

        let counts = retrieve_counts(&tx)?;

        if let Some((suite, stored)) = counts
            .iter()
            .find(|(suite, _)| !store.entries().contains_key(suite.as_str()))
        {
            return Err(StoreError::Diverged {
                suite: suite.clone(),
                stored: *stored,
                expected: 0,
            });
        }

        let mut counter = 0;

        for (suite, runs) in store.entries() {
            let stored = counts.get(suite).copied().unwrap_or(0);

            if stored > runs.len() {
                error!(suite = %suite, "Database is ahead of the store, refusing to write");

                return Err(StoreError::Diverged {
                    suite: suite.clone(),
                    stored,
                    expected: runs.len(),
                });
            }

            for run in runs.iter().skip(stored) {
                let id: i64 = tx
                    .prepare_cached(
                        "insert into runs
                         (suite, commit_id, commit_data, date, tool)
                         values (?, ?, ?, ?, ?) returning id",
                    )?
                    .query_row(
                        params![
                            suite,
                            run.commit.id,
                            serde_json::to_string(&run.commit)?,
                            run.date as i64,
                            run.tool
                        ],
                        |row| row.get(0),
                    )?;

                for bench in run.benches.iter() {
                    tx.prepare_cached(
                        "insert into benches
                         (run, name, value, error_range, unit, extra)
                         values (?, ?, ?, ?, ?, ?)",
                    )?
                    .execute(params![
                        id,
                        bench.name,
                        bench.value,
                        bench.range,
                        bench.unit,
                        bench.extra
                    ])?;
                }

                debug!(id = id, suite = %suite, commit = %run.commit.id, "Inserted run");
                counter += 1;
            }
        }

        tx.commit()?;
        info!("Stored {counter} runs in SQLite");

        close(connection)
    }
}

fn close(mut connection: Connection) -> Result<(), StoreError> {
    let mut counter = 0;
    while let Err((returned, error)) = connection.close() {
        counter += 1;
        connection = returned;
        error!(error = ?error, "Failed to close SQLite connection: {error}, trying again {counter}/3");

        if counter == 3 {
            return Err(StoreError::SQLite(error));
        }
    }

    Ok(())
}

pub const SQL_SCHEMA: [&str; 3] = [
    "create table if not exists store (
    id integer primary key check (id = 0),
    repo_url text not null,
    last_update integer not null
);",
    "create table if not exists runs (
    id integer primary key,
    suite text not null,
    commit_id text not null,
    commit_data text not null,
    date integer not null,
    tool text not null
);",
    "create table if not exists benches (
    id integer primary key,
    run integer not null references runs (id),
    name text not null,
    value real not null,
    error_range text,
    unit text not null,
    extra text
);",
];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::run;
    use pretty_assertions::assert_eq;

    #[test]
    fn appends_only_new_runs() {
        let directory = tempfile::tempdir().unwrap();
        let file = SQLiteFile::new(directory.path().join("bench.db"));

        let mut store = BenchmarkStore::new("https://github.com/AlessioZanga/grathe");
        store.append_run("Benchmark", run("aaa", 10)).unwrap();
        file.write(&store).unwrap();

        store.append_run("Benchmark", run("bbb", 20)).unwrap();
        store.append_run("Other", run("ccc", 15)).unwrap();
        file.write(&store).unwrap();

        assert_eq!(file.read().unwrap(), store);
    }

    #[test]
    fn refuses_a_store_behind_the_database() {
        let directory = tempfile::tempdir().unwrap();
        let file = SQLiteFile::new(directory.path().join("bench.db"));

        let mut ahead = BenchmarkStore::default();
        ahead.append_run("Benchmark", run("aaa", 10)).unwrap();
        ahead.append_run("Benchmark", run("bbb", 20)).unwrap();
        file.write(&ahead).unwrap();

        let mut behind = BenchmarkStore::default();
        behind.append_run("Benchmark", run("aaa", 10)).unwrap();

        assert!(matches!(
            file.write(&behind),
            Err(StoreError::Diverged {
                stored: 2,
                expected: 1,
                ..
            })
        ));
        assert_eq!(file.read().unwrap(), ahead);
    }
}
