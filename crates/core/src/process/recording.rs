use super::{CommandRunner, CommandSpec};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Test double that records invocations instead of running them.
///
/// Exit codes are scripted per program name; unscripted programs succeed.
#[derive(Default)]
pub struct RecordingRunner {
    calls: RwLock<Vec<CommandSpec>>,
    exit_codes: HashMap<String, i32>,
    path: HashSet<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exit_code(mut self, program: &str, code: i32) -> Self {
        self.exit_codes.insert(program.to_string(), code);
        self
    }

    pub fn with_on_path(mut self, program: &str) -> Self {
        self.path.insert(program.to_string());
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.read().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn status(&self, command: &CommandSpec) -> Result<i32> {
        self.calls.write().unwrap().push(command.clone());
        Ok(self.exit_codes.get(&command.program).copied().unwrap_or(0))
    }

    fn on_path(&self, program: &str) -> bool {
        self.path.contains(program)
    }
}
