//! Detached script execution with per-run log files

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use repostore::{Repository, encode_component};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Log file name for one invocation: `<script>-<epoch-ms>.txt`
pub fn log_file_name(script_name: &str, epoch_ms: i64) -> String {
    format!("{}-{}.txt", encode_component(script_name), epoch_ms)
}

/// A launched script
///
/// Dropping the handle does not stop the process; the exit code still lands
/// in the log trailer.
#[derive(Debug)]
pub struct ScriptHandle {
    script_name: String,
    log_path: PathBuf,
    pid: Option<u32>,
    task: JoinHandle<Option<i32>>,
}

impl ScriptHandle {
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has exited and its trailer was written
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the process to exit; `None` when no exit code is available
    pub async fn wait(self) -> Option<i32> {
        self.task.await.ok().flatten()
    }
}

/// Spawns side-effect scripts
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    branch_path_env: String,
    interpreter: String,
}

impl ScriptExecutor {
    pub fn new(branch_path_env: impl Into<String>) -> Self {
        let interpreter = if cfg!(windows) { "cmd" } else { "bash" };
        Self {
            branch_path_env: branch_path_env.into(),
            interpreter: interpreter.to_string(),
        }
    }

    /// Use a different interpreter program
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Launch `script_name` for the freshly materialized `updated_branch`
    ///
    /// Returns as soon as the process is spawned; its stdout and stderr go to
    /// a new file under `logs/`, followed by an exit-code trailer. `None`
    /// means nothing was launched. Must be called from a Tokio runtime.
    pub fn execute(&self, repo: &Repository, script_name: &str, updated_branch: &str) -> Option<ScriptHandle> {
        debug!(slug = %repo.slug(), %script_name, %updated_branch, "ScriptExecutor::execute: called");

        let script_path = repo.script_path(script_name);
        if !script_path.is_file() {
            warn!(slug = %repo.slug(), %script_name, "Script file does not exist");
            return None;
        }

        let (log_path, log) = match create_log(&repo.logs_dir(), script_name, chrono::Utc::now().timestamp_millis()) {
            Ok(created) => created,
            Err(e) => {
                warn!(slug = %repo.slug(), %script_name, error = %e, "Could not create script log");
                return None;
            }
        };

        match self.spawn(repo, &script_path, &log_path, log, updated_branch) {
            Ok((pid, task)) => {
                info!(slug = %repo.slug(), %script_name, ?pid, log = ?log_path, "Launched script");
                Some(ScriptHandle {
                    script_name: script_name.to_string(),
                    log_path,
                    pid,
                    task,
                })
            }
            Err(e) => {
                warn!(slug = %repo.slug(), %script_name, error = %e, "Failed to launch script");
                append_line(&log_path, &format!("failed to start script: {}", e));
                None
            }
        }
    }

    fn spawn(
        &self,
        repo: &Repository,
        script_path: &Path,
        log_path: &Path,
        log: File,
        updated_branch: &str,
    ) -> std::io::Result<(Option<u32>, JoinHandle<Option<i32>>)> {
        let log_err = log.try_clone()?;
        let branch_path = std::path::absolute(repo.branch_path(updated_branch))?;
        let scripts_dir = std::path::absolute(repo.scripts_dir())?;
        let script_path = std::path::absolute(script_path)?;

        let mut command = Command::new(&self.interpreter);
        if cfg!(windows) {
            command.arg("/C");
        }
        command
            .arg(&script_path)
            .current_dir(&scripts_dir)
            .env(&self.branch_path_env, &branch_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        let mut child = command.spawn()?;
        let pid = child.id();
        debug!(?pid, "ScriptExecutor::spawn: process started");

        let trailer_path = log_path.to_path_buf();
        let task = tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(error = %e, "Failed waiting for script");
                    None
                }
            };
            let code_text = code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string());
            append_line(&trailer_path, &format!("script exited with code {}", code_text));
            debug!(?code, log = ?trailer_path, "ScriptExecutor: script finished");
            code
        });

        Ok((pid, task))
    }
}

/// Create a fresh log file, moving to the next millisecond while the name is taken
fn create_log(logs_dir: &Path, script_name: &str, epoch_ms: i64) -> std::io::Result<(PathBuf, File)> {
    fs::create_dir_all(logs_dir)?;
    let mut ms = epoch_ms;
    loop {
        let path = logs_dir.join(log_file_name(script_name, ms));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => ms += 1,
            Err(e) => return Err(e),
        }
    }
}

fn append_line(path: &Path, line: &str) {
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "{}", line));
    if let Err(e) = result {
        warn!(log = ?path, error = %e, "Could not write script log");
    }
}
