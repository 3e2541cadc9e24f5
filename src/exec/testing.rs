//! Scripted [`CommandRunner`] for unit tests
//!
//! Records every command it is asked to run and answers from a queue of
//! canned responses keyed by program name. Unscripted programs exit 0 with no
//! output.

use super::command_executor::{
    CapturedOutput, CommandError, CommandRunner, CommandSpec, GrepOutput, OutputStream,
    match_line,
};
use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct Response {
    program: String,
    exit_code: i32,
    lines: Vec<String>,
    launch_fails: bool,
}

#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<Response>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next call to `program`
    pub fn respond(self, program: &str, exit_code: i32, lines: &[&str]) -> Self {
        self.responses.lock().unwrap().push_back(Response {
            program: program.to_string(),
            exit_code,
            lines: lines.iter().map(|l| l.to_string()).collect(),
            launch_fails: false,
        });
        self
    }

    /// Make the next call to `program` fail to launch
    pub fn missing(self, program: &str) -> Self {
        self.responses.lock().unwrap().push_back(Response {
            program: program.to_string(),
            exit_code: 0,
            lines: Vec::new(),
            launch_fails: true,
        });
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }

    fn answer(&self, cmd: &CommandSpec) -> Result<Response, CommandError> {
        self.calls.lock().unwrap().push(cmd.clone());

        let mut responses = self.responses.lock().unwrap();
        let response = match responses.iter().position(|r| r.program == cmd.program) {
            Some(index) => responses.remove(index).unwrap(),
            None => Response {
                program: cmd.program.clone(),
                exit_code: 0,
                lines: Vec::new(),
                launch_fails: false,
            },
        };

        if response.launch_fails {
            return Err(CommandError::Launch {
                program: cmd.program.clone(),
                message: "No such file or directory (os error 2)".to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run_and_grep(
        &self,
        cmd: &CommandSpec,
        _stream: OutputStream,
        patterns: &[Regex],
    ) -> Result<GrepOutput, CommandError> {
        let response = self.answer(cmd)?;
        Ok(GrepOutput {
            exit_code: response.exit_code,
            matched_lines: response
                .lines
                .iter()
                .filter_map(|line| match_line(line, patterns))
                .collect(),
        })
    }

    async fn run(&self, cmd: &CommandSpec) -> Result<i32, CommandError> {
        Ok(self.answer(cmd)?.exit_code)
    }

    async fn capture(&self, cmd: &CommandSpec) -> Result<CapturedOutput, CommandError> {
        let response = self.answer(cmd)?;
        let mut stdout = response.lines.join("\n");
        if !stdout.is_empty() {
            stdout.push('\n');
        }
        Ok(CapturedOutput {
            exit_code: response.exit_code,
            stdout,
        })
    }
}
