use super::{CommandRunner, CommandSpec};
use crate::env::EnvSnapshot;
use crate::error::CommandError;
use anyhow::Result;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};

/// Runs commands as child processes with inherited stdio.
///
/// Programs are looked up on the `PATH` of the snapshot the runner was built
/// from, relative entries resolving against `cwd`.
pub struct SystemRunner {
    search_path: Option<String>,
    cwd: PathBuf,
}

impl SystemRunner {
    pub fn new(env: &EnvSnapshot, cwd: impl Into<PathBuf>) -> Self {
        Self {
            search_path: env.get("PATH").map(str::to_string),
            cwd: cwd.into(),
        }
    }

    /// Replaces the current process with `spec`.
    ///
    /// Only returns if the program could not be started.
    pub fn exec(&self, spec: &CommandSpec) -> CommandError {
        info!("Executing: {}", spec);
        let source = build_command(spec).exec();
        CommandError::Spawn {
            command: spec.command_line(),
            source,
        }
    }
}

fn build_command(spec: &CommandSpec) -> Command {
    let mut command = Command::new(&spec.program);
    command.args(&spec.args);
    for (key, value) in &spec.env {
        match value {
            Some(value) => command.env(key, value),
            None => command.env_remove(key),
        };
    }
    if let Some(dir) = &spec.cwd {
        command.current_dir(dir);
    }
    command
}

impl CommandRunner for SystemRunner {
    fn status(&self, spec: &CommandSpec) -> Result<i32> {
        info!("Running: {}", spec);

        let status = build_command(spec)
            .status()
            .map_err(|source| CommandError::Spawn {
                command: spec.command_line(),
                source,
            })?;

        let code = status
            .code()
            .or_else(|| status.signal().map(|signal| 128 + signal))
            .unwrap_or(1);
        debug!("`{}` exited with {}", spec.command_line(), code);
        Ok(code)
    }

    fn on_path(&self, program: &str) -> bool {
        which::which_in(program, self.search_path.as_deref(), &self.cwd).is_ok()
    }
}
