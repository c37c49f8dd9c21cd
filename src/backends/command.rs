// Process invocation seam
//
// Every backend shells out through a `CommandRunner` so the parsers can be
// driven from canned tool output.

use crate::{DriveError, DriveResult};
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Promote a non-zero exit into `DriveError::CommandFailed`.
    pub fn checked(self, program: &str) -> DriveResult<Self> {
        if self.success {
            return Ok(self);
        }

        let detail = if self.stderr.trim().is_empty() {
            last_line(&self.stdout)
        } else {
            last_line(&self.stderr)
        };

        Err(DriveError::CommandFailed {
            program: program.to_string(),
            code: self.code,
            detail,
        })
    }
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> DriveResult<CommandOutput>;
}

/// Runs real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> DriveResult<CommandOutput> {
        tracing::debug!(program, args = %args.join(" "), "Running command");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| DriveError::Spawn {
                program: program.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
