use super::{BenchOutput, IngestorError};
use crate::config::{ConfigErrors, IngestorConfig};
use benchlog_ingest::Bench;
use std::{
    io::{self, ErrorKind, Read, Write},
    path::PathBuf,
    process::{Child, Command, Stdio},
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, error, warn};
use tracing_unwrap::ResultExt;
use wait_timeout::ChildExt;

/// Pipes the raw bench output into an external executable and reads a YAML/JSON
/// list of benches from its stdout
#[derive(Debug, Clone)]
pub struct ExecIngestor {
    pub ingestor: PathBuf,
    pub params: Vec<String>,
    pub timeout: Duration,
}

impl ExecIngestor {
    pub fn load(config: &IngestorConfig) -> Result<Self, ConfigErrors> {
        let Some(exec) = config.parameter.get("exec").and_then(|exec| exec.as_str()) else {
            error!("The exec ingestor requires ingest.parameter.exec to be a str pointing to the path of the ingestor");

            return Err(ConfigErrors::FailedLoadIngestor);
        };

        let timeout = Duration::from_millis(match config.parameter.get("timeout") {
            Some(timeout_value) => match timeout_value.as_u64() {
                Some(value) => value,
                None => {
                    warn!("Ingestor timeout must be a natural number");
                    return Err(ConfigErrors::FailedLoadIngestor);
                }
            },
            None => 2000,
        });

        let params = match config.parameter.get("params") {
            None => Vec::new(),
            Some(serde_yaml::Value::String(params)) => {
                params.split_whitespace().map(str::to_owned).collect()
            }
            Some(serde_yaml::Value::Sequence(params)) => {
                match params
                    .iter()
                    .map(|param| param.as_str().map(str::to_owned))
                    .collect::<Option<Vec<_>>>()
                {
                    Some(params) => params,
                    None => {
                        warn!("Ingestor params must be strings");
                        return Err(ConfigErrors::FailedLoadIngestor);
                    }
                }
            }
            Some(_) => {
                warn!("Ingestor params must be a string or a list of strings");
                return Err(ConfigErrors::FailedLoadIngestor);
            }
        };

        Ok(Self {
            ingestor: PathBuf::from(exec),
            params,
            timeout,
        })
    }

    #[tracing::instrument(level = "debug", skip(output), fields(source = ?output.source))]
    pub fn ingest(&self, output: &BenchOutput) -> Result<Vec<Bench>, IngestorError> {
        let mut handle = Command::new(&self.ingestor)
            .args(&self.params)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::piped())
            .spawn()
            .map_err(IngestorError::SpawnIngestor)?;

        // all pipes are served on their own threads, a child blocked on a full pipe
        // would otherwise only ever end in a timeout
        let stdout = drain(handle.stdout.take());
        let stderr = drain(handle.stderr.take());
        let writer = handle.stdin.take().map(|mut stdin| {
            let text = output.text.clone();

            // stdin is dropped at the end of the thread, which closes the descriptor and
            // gives ingestors a clear end of input
            thread::spawn(move || match stdin.write_all(text.as_bytes()) {
                Err(error) if error.kind() == ErrorKind::BrokenPipe => {
                    debug!("Ingestor closed stdin before reading all input");
                    Ok(())
                }
                result => result,
            })
        });

        debug!("Ingestor waiting on {}", handle.id());
        let status = match handle.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                debug!("Ingestor ran into timeout, killing it");
                reap(&mut handle);

                return Err(IngestorError::ChildTimeout);
            }
            Err(error) => {
                reap(&mut handle);

                return Err(error.into());
            }
        };
        debug!("Ingestor exit status: {status:?}");

        if let Some(writer) = writer {
            writer.join().unwrap_or_log()?;
        }
        let buffer = String::from_utf8_lossy(&stdout.join().unwrap_or_log()?).into_owned();
        let stderr_buffer = String::from_utf8_lossy(&stderr.join().unwrap_or_log()?).into_owned();

        if !status.success() {
            warn!(
                stderr = stderr_buffer,
                "Ingestor failed to ingest input, attempting to continue"
            );
        } else if !stderr_buffer.is_empty() {
            debug!(stderr = stderr_buffer, "Ingestor wrote to stderr");
        }

        debug!("Output from ingestor: {buffer}");

        match serde_yaml::from_str::<Vec<Bench>>(&buffer) {
            Ok(benches) => Ok(benches),
            Err(e) => {
                error!("Ingestor failed to produce benches: {e}");

                Err(e.into())
            }
        }
    }
}

/// read a child's pipe to the end on a separate thread
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }

        Ok(buffer)
    })
}

/// kill the child and collect its exit status, the child may already be gone
fn reap(handle: &mut Child) {
    if let Err(error) = handle.kill() {
        debug!("Failed to kill ingestor: {error}");
    }
    if let Err(error) = handle.wait() {
        warn!("Failed to reap ingestor {}: {error}", handle.id());
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    fn shell(script: &str, timeout: u64) -> ExecIngestor {
        let config: IngestorConfig = serde_yaml::from_str(&format!(
            "name: exec\nparameter:\n  exec: /bin/sh\n  timeout: {timeout}\n  params: [\"-c\", {script:?}]\n"
        ))
        .unwrap();

        ExecIngestor::load(&config).unwrap()
    }

    #[test]
    fn passes_output_through_the_executable() {
        let ingestor = shell("cat", 5_000);
        let output = BenchOutput::new(
            "bench.txt",
            r#"[{"name": "adjacencylist_i32/new/new", "value": 5, "range": "± 0", "unit": "ns/iter"}]"#,
        );

        assert_eq!(
            ingestor.ingest(&output).unwrap(),
            vec![Bench::new("adjacencylist_i32/new/new", 5.0, "± 0", "ns/iter")]
        );
    }

    #[test]
    fn slow_ingestors_time_out() {
        let ingestor = shell("sleep 5", 100);

        assert!(matches!(
            ingestor.ingest(&BenchOutput::new("-", "")),
            Err(IngestorError::ChildTimeout)
        ));
    }

    fn large_input() -> BenchOutput {
        BenchOutput::new("bench.txt", "x".repeat(1 << 20))
    }

    #[test]
    fn timeout_holds_while_stdin_is_not_read() {
        let ingestor = shell("sleep 3", 100);
        let started = Instant::now();

        assert!(matches!(
            ingestor.ingest(&large_input()),
            Err(IngestorError::ChildTimeout)
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn ingestors_may_ignore_their_input() {
        let ingestor = shell(r#"echo '[{"name": "x", "value": 1, "unit": "ms"}]'"#, 5_000);

        assert_eq!(
            ingestor.ingest(&large_input()).unwrap(),
            vec![Bench {
                name: "x".to_owned(),
                value: 1.0,
                range: None,
                unit: "ms".to_owned(),
                extra: None,
            }]
        );
    }

    #[test]
    fn large_stderr_does_not_block() {
        let ingestor = shell(
            r#"head -c 200000 /dev/zero >&2; echo '[{"name": "x", "value": 1, "unit": "ms"}]'"#,
            5_000,
        );
        let started = Instant::now();

        assert_eq!(ingestor.ingest(&BenchOutput::new("-", "")).unwrap().len(), 1);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn load_requires_exec() {
        let config: IngestorConfig = serde_yaml::from_str("name: exec\n").unwrap();
        assert!(matches!(
            ExecIngestor::load(&config),
            Err(ConfigErrors::FailedLoadIngestor)
        ));

        let config: IngestorConfig =
            serde_yaml::from_str("name: exec\nparameter:\n  exec: ./ingest.py\n  params: --fast -v\n")
                .unwrap();
        let ingestor = ExecIngestor::load(&config).unwrap();
        assert_eq!(ingestor.params, vec!["--fast".to_owned(), "-v".to_owned()]);
        assert_eq!(ingestor.timeout, Duration::from_millis(2000));
    }
}
