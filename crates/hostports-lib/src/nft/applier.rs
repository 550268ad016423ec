//! Rule application through the `nft` executable

use crate::error::ApplyError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

/// Sink for rendered rulesets
#[async_trait]
pub trait RuleApplier: Send + Sync {
    /// Apply a complete ruleset; an error leaves host state unknown
    async fn apply(&self, ruleset: &str) -> Result<(), ApplyError>;
}

/// Applies rulesets by piping them into `nft -f -`
#[derive(Debug, Clone)]
pub struct NftApplier {
    binary: PathBuf,
}

impl NftApplier {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command_line(&self) -> String {
        format!("{} -f -", self.binary.display())
    }
}

impl Default for NftApplier {
    fn default() -> Self {
        Self::new("nft")
    }
}

#[async_trait]
impl RuleApplier for NftApplier {
    async fn apply(&self, ruleset: &str) -> Result<(), ApplyError> {
        let command = self.command_line();

        let mut child = Command::new(&self.binary)
            .arg("-f")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ApplyError::Spawn {
                command: command.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(ruleset.as_bytes())
                .await
                .map_err(|source| ApplyError::Io {
                    command: command.clone(),
                    source,
                })?;
            // Dropping stdin closes the pipe so nft sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ApplyError::Io {
                command: command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(command = %command, stdout = %stdout.trim(), "nft output");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(
                command = %command,
                status = %output.status,
                stderr = %stderr,
                "nft rejected ruleset"
            );
            return Err(ApplyError::Rejected {
                command,
                status: output.status,
                stderr,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    /// Write an executable shell script standing in for nft
    fn fake_nft(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("nft");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn captured(dir: &Path) -> String {
        std::fs::read_to_string(dir.join("input")).unwrap()
    }

    #[tokio::test]
    async fn test_apply_pipes_ruleset_to_stdin() {
        let dir = TempDir::new().unwrap();
        let script = format!(
            "[ \"$1\" = \"-f\" ] && [ \"$2\" = \"-\" ] || exit 64\ncat > '{}/input'",
            dir.path().display()
        );
        let applier = NftApplier::new(fake_nft(&dir, &script));

        let ruleset = "table container-hostports {}\ndelete table container-hostports;\n";
        tokio_test::assert_ok!(applier.apply(ruleset).await);

        assert_eq!(captured(dir.path()), ruleset);
    }

    #[tokio::test]
    async fn test_apply_reports_rejection() {
        let dir = TempDir::new().unwrap();
        let applier = NftApplier::new(fake_nft(
            &dir,
            "cat > /dev/null\necho 'Error: syntax error' >&2\nexit 1",
        ));

        let err = applier.apply("garbage").await.unwrap_err();

        match err {
            ApplyError::Rejected { status, stderr, .. } => {
                assert_eq!(status.code(), Some(1));
                assert_eq!(stderr, "Error: syntax error");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_apply_missing_binary() {
        let dir = TempDir::new().unwrap();
        let applier = NftApplier::new(dir.path().join("does-not-exist"));

        let err = applier.apply("").await.unwrap_err();
        assert!(matches!(err, ApplyError::Spawn { .. }));
    }
}
