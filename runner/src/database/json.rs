use super::{BenchmarkStore, StoreError};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Global the charting page reads the store from
const SCRIPT_VARIABLE: &str = "window.BENCHMARK_DATA";
/// Prefix of the data file loaded by the charting page
pub const SCRIPT_PREFIX: &str = "window.BENCHMARK_DATA = ";

/// Store kept in a single file, either as bare JSON or as the charting page's data script
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
    script: bool,
}

impl JsonFile {
    pub fn new(path: PathBuf, script: bool) -> Self {
        Self { path, script }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<BenchmarkStore, StoreError> {
        let content = fs::read_to_string(&self.path)?;
        debug!(path = ?self.path, bytes = content.len(), "Read store file");

        if self.script {
            from_script(&content)
        } else {
            from_json(&content)
        }
    }

    /// Replace the file contents through a rename so readers never see a partial file
    pub fn write(&self, store: &BenchmarkStore) -> Result<(), StoreError> {
        let content = if self.script {
            to_script(store)?
        } else {
            to_json(store)?
        };

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut temporary_name = OsString::from(".");
        temporary_name.push(self.path.file_name().unwrap_or_default());
        temporary_name.push(".tmp");
        let temporary = self.path.with_file_name(temporary_name);

        fs::write(&temporary, content)?;
        fs::rename(&temporary, &self.path)?;

        info!(path = ?self.path, "Wrote store");

        Ok(())
    }
}

pub fn to_json(store: &BenchmarkStore) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(store)?)
}

pub fn to_script(store: &BenchmarkStore) -> Result<String, StoreError> {
    Ok(format!("{SCRIPT_PREFIX}{}", to_json(store)?))
}

pub fn from_json(content: &str) -> Result<BenchmarkStore, StoreError> {
    let store: BenchmarkStore = serde_json::from_str(content)?;
    store.validate()?;

    Ok(store)
}

/// Accepts `window.BENCHMARK_DATA = {...}` with optional surrounding whitespace and trailing `;`
pub fn from_script(content: &str) -> Result<BenchmarkStore, StoreError> {
    let body = content
        .trim()
        .strip_prefix(SCRIPT_VARIABLE)
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or(StoreError::MissingPrefix)?;

    from_json(body.trim().trim_end_matches(';'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::run;
    use pretty_assertions::assert_eq;

    const DATA_SCRIPT: &str = r#"window.BENCHMARK_DATA = {
  "lastUpdate": 1640381163988,
  "repoUrl": "https://github.com/AlessioZanga/grathe",
  "entries": {
    "Benchmark": [
      {
        "commit": {
          "author": {
            "email": "alessio.zanga@outlook.it",
            "name": "AlessioZanga",
            "username": "AlessioZanga"
          },
          "committer": {
            "email": "alessio.zanga@outlook.it",
            "name": "AlessioZanga",
            "username": "AlessioZanga"
          },
          "distinct": true,
          "id": "33071d233e735cb4ecb2b157523ea5ea53b4bb07",
          "message": "Update benchmark workflow",
          "timestamp": "2021-12-24T21:17:42+01:00",
          "tree_id": "e5b269ba2878b43640e16f9fc168ef0ab956506e",
          "url": "https://github.com/AlessioZanga/grathe/commit/33071d233e735cb4ecb2b157523ea5ea53b4bb07"
        },
        "date": 1640381163151,
        "tool": "cargo",
        "benches": [
          {
            "name": "adjacencylist_i32/new/new",
            "value": 5,
            "range": "± 0",
            "unit": "ns/iter"
          },
          {
            "name": "adjacencylist_i32/edges_iter/1000000",
            "value": 50741294,
            "range": "± 2830207",
            "unit": "ns/iter"
          }
        ]
      }
    ]
  }
}"#;

    #[test]
    fn data_script_is_reproduced_byte_for_byte() {
        let store = from_script(DATA_SCRIPT).unwrap();

        assert_eq!(store.last_update(), 1640381163988);
        assert_eq!(store.repo_url(), "https://github.com/AlessioZanga/grathe");
        assert_eq!(store.runs("Benchmark")[0].benches.len(), 2);
        assert_eq!(to_script(&store).unwrap(), DATA_SCRIPT);
    }

    #[test]
    fn tolerates_whitespace_and_semicolon() {
        let content = format!("\n  {};\n", DATA_SCRIPT.replacen(" = ", "=", 1));

        assert_eq!(
            from_script(&content).unwrap(),
            from_script(DATA_SCRIPT).unwrap()
        );
    }

    #[test]
    fn script_requires_prefix() {
        let json = DATA_SCRIPT.trim_start_matches(SCRIPT_PREFIX);

        assert!(matches!(from_script(json), Err(StoreError::MissingPrefix)));
        assert!(from_json(json).is_ok());
    }

    #[test]
    fn rejects_records_with_missing_fields() {
        let content = DATA_SCRIPT.replace(r#""tool": "cargo""#, r#""tool": """#);

        assert!(matches!(
            from_script(&content),
            Err(StoreError::Invalid(_))
        ));

        let content = DATA_SCRIPT.replace(r#""date": 1640381163151,"#, "");
        assert!(matches!(from_script(&content), Err(StoreError::Json(_))));
    }

    #[test]
    fn files_round_trip() {
        let directory = tempfile::tempdir().unwrap();
        let mut store = BenchmarkStore::new("https://github.com/AlessioZanga/grathe");
        store.append_run("Benchmark", run("aaa", 10)).unwrap();

        for (name, script) in [("data.js", true), ("nested/data.json", false)] {
            let file = JsonFile::new(directory.path().join(name), script);
            file.write(&store).unwrap();

            assert_eq!(file.read().unwrap(), store);
        }

        let written = fs::read_to_string(directory.path().join("data.js")).unwrap();
        assert!(written.starts_with(SCRIPT_PREFIX));
    }
}
