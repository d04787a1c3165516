//! Local program execution for tools shipped as command-line binaries

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::ToolError;

#[derive(Debug, Clone)]
pub struct CommandRunner {
    tool: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(tool: impl Into<String>, program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from a full argv such as `["RNAfold", "--noPS"]`
    pub fn from_argv(tool: &str, argv: &[String], timeout: Duration) -> Self {
        let program = argv.first().cloned().unwrap_or_else(|| tool.to_string());
        let args = argv.iter().skip(1).cloned().collect();
        Self::new(tool, program, args, timeout)
    }

    /// Run the program with `input` on stdin and return its stdout
    pub async fn run(&self, input: &str) -> Result<String, ToolError> {
        info!(tool = %self.tool, program = %self.program, "Running local tool");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.command_error(format!("failed to start {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| self.command_error(format!("failed to write stdin: {}", e)))?;
            // closing stdin signals end of input
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout {
                tool: self.tool.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| self.command_error(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.command_error(format!("{} exited with {}: {}", self.program, output.status, stderr.trim())));
        }

        debug!(tool = %self.tool, bytes = output.stdout.len(), "Local tool finished");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn command_error(&self, message: String) -> ToolError {
        ToolError::Command {
            tool: self.tool.clone(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandRunner {
        CommandRunner::new("test", "sh", vec!["-c".to_string(), script.to_string()], Duration::from_secs(5))
    }

    #[test]
    fn test_from_argv() {
        let runner = CommandRunner::from_argv(
            "rnafold",
            &["RNAfold".to_string(), "--noPS".to_string()],
            Duration::from_secs(1),
        );
        assert_eq!(runner.program, "RNAfold");
        assert_eq!(runner.args, vec!["--noPS"]);

        let runner = CommandRunner::from_argv("lineardesign", &[], Duration::from_secs(1));
        assert_eq!(runner.program, "lineardesign");
    }

    #[tokio::test]
    async fn test_run_pipes_stdin_to_stdout() {
        let out = sh("tr a-z A-Z").run("augc\n").await.unwrap();
        assert_eq!(out, "AUGC\n");
    }

    #[tokio::test]
    async fn test_run_reports_failure() {
        let err = sh("echo bad input >&2; exit 3").run("").await.unwrap_err();
        match err {
            ToolError::Command { message, .. } => assert!(message.contains("bad input")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let runner = CommandRunner::new(
            "slow",
            "sh",
            vec!["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        );
        let err = runner.run("").await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let runner = CommandRunner::new("ghost", "definitely-not-installed-xyz", vec![], Duration::from_secs(1));
        assert!(matches!(runner.run("").await, Err(ToolError::Command { .. })));
    }
}
