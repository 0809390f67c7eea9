//! External process execution
//!
//! Build steps describe what to run as [`CommandSpec`] values and hand them to a
//! [`CommandRunner`]. The runner blocks until the child exits; there is no
//! timeout and no retry.

mod recording;
mod system;

pub use recording::RecordingRunner;
pub use system::SystemRunner;

use crate::error::CommandError;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// `Some` sets the variable for the child, `None` removes it.
    pub env: BTreeMap<String, Option<String>>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), Some(value.into()));
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env.insert(key.into(), None);
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// The command line without environment overrides, e.g. `npm ci`.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@+,%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            if let Some(value) = value {
                write!(f, "{}={} ", key, quote(value))?;
            }
        }
        write!(f, "{}", self.command_line())
    }
}

/// Executes external commands.
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion and returns its exit code.
    fn status(&self, command: &CommandSpec) -> Result<i32>;

    /// Whether `program` resolves to an executable on `PATH`.
    fn on_path(&self, program: &str) -> bool;

    /// Runs the command, failing with [`CommandError::Failed`] on a non-zero exit.
    fn run(&self, command: &CommandSpec) -> Result<()> {
        let code = self.status(command)?;
        if code != 0 {
            return Err(CommandError::Failed {
                command: command.command_line(),
                code,
            }
            .into());
        }
        Ok(())
    }

    /// Runs each command in order, stopping at the first failure.
    fn run_all(&self, commands: &[CommandSpec]) -> Result<()> {
        for command in commands {
            self.run(command)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_only_when_needed() {
        let cmd = CommandSpec::new("bundle")
            .args(["exec", "ruby", "-e"])
            .arg("puts 'hi'");
        assert_eq!(cmd.command_line(), r"bundle exec ruby -e 'puts '\''hi'\'''");
    }

    #[test]
    fn test_display_includes_set_env_only() {
        let cmd = CommandSpec::new("bundle")
            .arg("install")
            .env("BUNDLE_FROZEN", "true")
            .env_remove("BUNDLE_ONLY");
        assert_eq!(cmd.to_string(), "BUNDLE_FROZEN=true bundle install");
    }

    #[test]
    fn test_run_maps_nonzero_exit_to_command_error() {
        let runner = RecordingRunner::new().with_exit_code("npm", 2);
        let err = runner.run(&CommandSpec::new("npm").arg("ci")).unwrap_err();

        let failed = err.downcast_ref::<CommandError>().unwrap();
        assert_eq!(failed.exit_code(), 2);
        assert_eq!(failed.to_string(), "`npm ci` exited with status 2");
    }

    #[test]
    fn test_run_all_stops_at_first_failure() {
        let runner = RecordingRunner::new().with_exit_code("apt-get", 100);
        let commands = vec![
            CommandSpec::new("apt-get").arg("update"),
            CommandSpec::new("apt-get").arg("install"),
        ];

        assert!(runner.run_all(&commands).is_err());
        assert_eq!(runner.command_lines(), vec!["apt-get update"]);
    }
}
