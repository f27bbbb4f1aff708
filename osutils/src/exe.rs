use std::{
    io,
    os::unix::process::ExitStatusExt,
    process::{Command, Output},
};

use anyhow::{anyhow, Error};
use log::trace;

use crate::crate_private::Sealed;

/// Everything observed while running one external command: how it ended and
/// what it printed. Failures carry this report so callers can surface the
/// diagnostic output of the tool.
#[derive(Debug)]
pub struct Execution {
    command: String,
    result: io::Result<Output>,
}

impl Execution {
    /// Runs the command to completion, capturing stdout and stderr.
    pub fn of(command: &mut Command) -> Self {
        let rendered = command.render_command();
        trace!("Executing '{rendered}'");
        let execution = Self {
            result: command.output(),
            command: rendered,
        };
        trace!(
            "Executed '{}': {}. Report:\n{}",
            execution.command,
            execution.explain_exit(),
            execution.report(),
        );
        execution
    }

    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(output) if output.status.success())
    }

    pub fn stdout(&self) -> String {
        match &self.result {
            Ok(output) => String::from_utf8_lossy(&output.stdout).into(),
            Err(_) => String::new(),
        }
    }

    pub fn stderr(&self) -> String {
        match &self.result {
            Ok(output) => String::from_utf8_lossy(&output.stderr).into(),
            Err(_) => String::new(),
        }
    }

    /// How the process ended, in one line.
    pub fn explain_exit(&self) -> String {
        match &self.result {
            Err(e) => format!("Failed to execute process: {e}"),
            Ok(output) => match (output.status.code(), output.status.signal()) {
                (Some(code), _) => format!("process exited with status: {code}"),
                (None, Some(signal)) => format!("process was terminated by signal: {signal}"),
                (None, None) => "process exited with unknown status".into(),
            },
        }
    }

    /// Captured stdout and stderr, labelled; empty when nothing was printed.
    pub fn report(&self) -> String {
        let stdout = self.stdout();
        let stderr = self.stderr();

        let mut res = String::with_capacity(stdout.len() + stderr.len() + 20);
        if !stdout.is_empty() {
            res += &format!("stdout:\n{stdout}\n");
        }
        if !stderr.is_empty() {
            if !res.is_empty() {
                res += "\n";
            }
            res += &format!("stderr:\n{stderr}\n");
        }
        res
    }

    /// Returns stdout on success, otherwise an error naming the command,
    /// how it ended, and everything it printed.
    pub fn into_output(self) -> Result<String, Error> {
        if self.succeeded() {
            return Ok(self.stdout());
        }

        let cause = match self.report() {
            report if !report.is_empty() => anyhow!("Process output:\n{report}"),
            _ => anyhow!("(No output was captured)"),
        };
        Err(cause
            .context(self.explain_exit())
            .context(format!("Error when running: {}", self.command)))
    }
}

pub trait RunAndCheck: Sealed {
    /// Runs the command and fails unless it exits successfully.
    fn run_and_check(&mut self) -> Result<(), Error>;

    /// Runs the command and returns its stdout if it exits successfully.
    fn output_and_check(&mut self) -> Result<String, Error>;

    /// Renders the command line for logs and error messages.
    fn render_command(&self) -> String;
}

impl Sealed for Command {}

impl RunAndCheck for Command {
    fn run_and_check(&mut self) -> Result<(), Error> {
        Execution::of(self).into_output().map(|_| ())
    }

    fn output_and_check(&mut self) -> Result<String, Error> {
        Execution::of(self).into_output()
    }

    fn render_command(&self) -> String {
        let program = self.get_program().to_string_lossy();
        let args = self
            .get_args()
            .map(|arg| arg.to_string_lossy())
            .map(|arg| {
                if arg.contains(' ') {
                    format!("'{arg}'")
                } else {
                    arg.into()
                }
            })
            .collect::<Vec<_>>();

        if args.is_empty() {
            program.into()
        } else {
            format!("{program} {}", args.join(" "))
        }
    }
}
