//! Mock command execution infrastructure for testing
//!
//! Responses are keyed by the full command line ("program arg arg ...").
//! Every invocation is recorded, registered or not; unregistered commands
//! fail with exit status 1.

use hddstation::backends::{CommandOutput, CommandRunner};
use hddstation::DriveResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockCommandRegistry {
    commands: Arc<Mutex<HashMap<String, CommandOutput>>>,
    invocations: Arc<Mutex<Vec<String>>>,
}

impl MockCommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mock command response
    pub fn register(&self, command_line: &str, output: CommandOutput) {
        self.commands
            .lock()
            .unwrap()
            .insert(command_line.to_string(), output);
    }

    pub fn register_ok(&self, command_line: &str, stdout: &str) {
        self.register(command_line, CommandOutput::ok(stdout));
    }

    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn was_invoked(&self, command_line: &str) -> bool {
        self.invocations().iter().any(|c| c == command_line)
    }

    pub fn invocations_containing(&self, needle: &str) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|c| c.contains(needle))
            .collect()
    }

    pub fn clear_invocations(&self) {
        self.invocations.lock().unwrap().clear();
    }
}

impl CommandRunner for MockCommandRegistry {
    fn run(&self, program: &str, args: &[&str]) -> DriveResult<CommandOutput> {
        let mut command_line = program.to_string();
        for arg in args {
            command_line.push(' ');
            command_line.push_str(arg);
        }

        self.invocations.lock().unwrap().push(command_line.clone());

        Ok(self
            .commands
            .lock()
            .unwrap()
            .get(&command_line)
            .cloned()
            .unwrap_or_else(|| {
                CommandOutput::failed(1, "", format!("unregistered command: {}", command_line))
            }))
    }
}
