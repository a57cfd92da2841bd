//! Extraction dispatch.
//!
//! The shortest-path domain extraction runs in an external program; this
//! module only starts it and reports whether it succeeded. The core never
//! retries a failed dispatch: the missing artifact lets a later message for
//! the same site try again.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use hydro_common::ExtractionJob;

use crate::config::ExtractionConfig;

/// Arguments used when the configuration lists none.
const DEFAULT_ARGS: [&str; 8] = [
    "--start-id",
    "{start_id}",
    "--end-id",
    "{end_id}",
    "--gpkg",
    "{gpkg}",
    "--filename",
    "{filename}",
];

/// Bytes of stderr kept in a failure report.
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("extraction exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// Boundary to the extraction service.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Run one extraction to completion.
    async fn dispatch(&self, job: &ExtractionJob) -> Result<(), DispatchError>;
}

/// Runs the extraction as a child process.
///
/// Argument templates may use `{start_id}`, `{end_id}`, `{gpkg}` (source
/// dataset), `{filename}` (output name) and `{output}` (full artifact path).
/// The child runs in the artifact output directory.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl CommandDispatcher {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        let args = if args.is_empty() {
            DEFAULT_ARGS.iter().map(|a| a.to_string()).collect()
        } else {
            args
        };

        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.output_dir.clone(),
        )
    }

    fn render_args(&self, job: &ExtractionJob) -> Vec<String> {
        let start_id = job.start_node_id.to_string();
        let end_id = job.end_node_id.to_string();
        let gpkg = job.source_dataset.display().to_string();
        let output = job.output_path.display().to_string();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{start_id}", &start_id)
                    .replace("{end_id}", &end_id)
                    .replace("{gpkg}", &gpkg)
                    .replace("{filename}", job.job_name())
                    .replace("{output}", &output)
            })
            .collect()
    }
}

#[async_trait]
impl Dispatcher for CommandDispatcher {
    async fn dispatch(&self, job: &ExtractionJob) -> Result<(), DispatchError> {
        let args = self.render_args(job);

        info!(
            lid = %job.lid,
            start_id = job.start_node_id,
            end_id = job.end_node_id,
            program = %self.program,
            "Starting domain extraction"
        );

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DispatchError::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        if !output.stdout.is_empty() {
            debug!(
                lid = %job.lid,
                stdout = %String::from_utf8_lossy(&output.stdout),
                "Extraction output"
            );
        }

        if !output.status.success() {
            return Err(DispatchError::Failed {
                code: output.status.code(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_BYTES),
            });
        }

        if !tokio::fs::try_exists(&job.output_path).await.unwrap_or(false) {
            warn!(
                lid = %job.lid,
                path = %job.output_path.display(),
                "Extraction succeeded but produced no artifact"
            );
        }

        Ok(())
    }
}

fn tail(text: &str, max_bytes: usize) -> String {
    let text = text.trim_end();
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(dir: &std::path::Path) -> ExtractionJob {
        ExtractionJob {
            lid: "BRRW3".to_string(),
            start_node_id: 4699143,
            end_node_id: 4700053,
            source_dataset: PathBuf::from("/data/conus_nextgen.gpkg"),
            output_path: dir.join("BRRW3.gpkg"),
        }
    }

    #[test]
    fn test_default_args() {
        let dispatcher = CommandDispatcher::new("extract", Vec::new(), "/tmp");
        let args = dispatcher.render_args(&job(std::path::Path::new("/out")));

        assert_eq!(
            args,
            vec![
                "--start-id",
                "4699143",
                "--end-id",
                "4700053",
                "--gpkg",
                "/data/conus_nextgen.gpkg",
                "--filename",
                "BRRW3"
            ]
        );
    }

    #[test]
    fn test_template_args() {
        let dispatcher = CommandDispatcher::new(
            "Rscript",
            vec![
                "-e".to_string(),
                "get_shortest_path(start_id={start_id}, end_id={end_id}, filename='{filename}')".to_string(),
                "{output}".to_string(),
            ],
            "/tmp",
        );
        let args = dispatcher.render_args(&job(std::path::Path::new("/out")));

        assert_eq!(
            args[1],
            "get_shortest_path(start_id=4699143, end_id=4700053, filename='BRRW3')"
        );
        assert_eq!(args[2], "/out/BRRW3.gpkg");
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("short\n", 100), "short");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("aé", 1), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dispatch_runs_program_in_output_dir() {
        let dir = test_utils::artifact_dir();
        let dispatcher = CommandDispatcher::new(
            "sh",
            vec!["-c".to_string(), "echo {start_id}-{end_id} > {filename}.gpkg".to_string()],
            dir.path(),
        );

        dispatcher.dispatch(&job(dir.path())).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("BRRW3.gpkg")).unwrap();
        assert_eq!(content.trim(), "4699143-4700053");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dispatch_reports_exit_status() {
        let dir = test_utils::artifact_dir();
        let dispatcher = CommandDispatcher::new(
            "sh",
            vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
            dir.path(),
        );

        let err = dispatcher.dispatch(&job(dir.path())).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::Failed {
                code: Some(3),
                stderr: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_missing_program() {
        let dir = test_utils::artifact_dir();
        let dispatcher =
            CommandDispatcher::new("/nonexistent/extract-domain", Vec::new(), dir.path());

        assert!(matches!(
            dispatcher.dispatch(&job(dir.path())).await,
            Err(DispatchError::Spawn { .. })
        ));
    }
}
