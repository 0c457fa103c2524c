//! Clone operation behind a trait so the cache can be tested without a remote

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use reqwest::Url;
use tokio::process::Command;
use tracing::debug;

/// Result of a finished clone process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

/// Populates a destination directory with a single-branch working tree
#[async_trait]
pub trait Cloner: Send + Sync {
    /// Clone `branch` from `url` into `dest` and wait for the process to exit
    ///
    /// `Err` means the process could not be started at all.
    async fn clone_branch(&self, branch: &str, url: &str, dest: &Path) -> std::io::Result<CloneOutput>;
}

/// Runs `git clone --single-branch`
#[derive(Debug, Clone)]
pub struct GitCloner {
    program: String,
}

impl GitCloner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitCloner {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl Cloner for GitCloner {
    async fn clone_branch(&self, branch: &str, url: &str, dest: &Path) -> std::io::Result<CloneOutput> {
        debug!(%branch, url = %redact_url(url), ?dest, "GitCloner::clone_branch: called");

        let output = Command::new(&self.program)
            .args(["clone", "--quiet", "--single-branch", "--branch", branch, "--", url])
            .arg(dest)
            // Never block on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let stderr = redact_credentials(&String::from_utf8_lossy(&output.stderr));
        debug!(status = ?output.status, "GitCloner::clone_branch: process exited");

        Ok(CloneOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stderr,
        })
    }
}

/// Mask the user and password of a single clone URL
fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if !url.username().is_empty() {
                let _ = url.set_username("***");
            }
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => redact_credentials(raw),
    }
}

/// Replace `user:secret@` in every URL of `text` with `***@`
pub fn redact_credentials(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(scheme_end) = rest.find("://") {
        let authority_start = scheme_end + 3;
        out.push_str(&rest[..authority_start]);
        let after = &rest[authority_start..];

        let authority_len = after
            .find(|c: char| c == '/' || c.is_whitespace() || c == '\'' || c == '"')
            .unwrap_or(after.len());
        let authority = &after[..authority_len];

        match authority.rfind('@') {
            Some(at) => {
                out.push_str("***");
                out.push_str(&authority[at..]);
            }
            None => out.push_str(authority),
        }
        rest = &after[authority_len..];
    }

    out.push_str(rest);
    out
}
