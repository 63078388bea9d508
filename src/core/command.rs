// External command execution for the FC passthrough tool
//
// Every process the tool starts (lspci, virsh) goes through the
// CommandRunner trait so the workflow can be driven without touching
// the host.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{PassthroughError, Result};

/// A command line: program plus arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Converts the output into an error when the command exited non-zero
    /// or wrote anything to standard error. virsh reports some failures
    /// with a zero exit code, so stderr alone is enough to fail.
    pub fn check(self, command: &CommandLine) -> Result<Self> {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return Err(PassthroughError::CommandFailed {
                command: command.to_string(),
                reason: stderr.to_string(),
            });
        }
        if !self.success() {
            return Err(PassthroughError::CommandFailed {
                command: command.to_string(),
                reason: match self.exit_code {
                    Some(code) => format!("exit code {}", code),
                    None => "terminated by signal".to_string(),
                },
            });
        }
        Ok(self)
    }
}

/// Runs external commands and captures their output
pub trait CommandRunner {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput>;
}

/// Runs commands on the host with `std::process::Command`
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    timeout: Option<Duration>,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill and fail commands that run longer than `timeout`
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn wait_bounded(
        &self,
        command: &CommandLine,
        mut child: Child,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        // Drain pipes on helper threads so a chatty child cannot block on a full pipe
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(PassthroughError::CommandTimedOut {
                        command: command.to_string(),
                        timeout,
                    });
                }
                Ok(None) => thread::sleep(Duration::from_millis(50)),
                Err(source) => {
                    return Err(PassthroughError::CommandSpawn {
                        command: command.to_string(),
                        source,
                    })
                }
            }
        };

        Ok(CommandOutput {
            exit_code: status.code(),
            stdout: stdout.map(join_reader).unwrap_or_default(),
            stderr: stderr.map(join_reader).unwrap_or_default(),
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        debug!(command = %command, "executing");

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawn_err = |source| PassthroughError::CommandSpawn {
            command: command.to_string(),
            source,
        };

        let output = match self.timeout {
            None => {
                let output = process.output().map_err(spawn_err)?;
                CommandOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }
            }
            Some(timeout) => {
                let child = process.spawn().map_err(spawn_err)?;
                self.wait_bounded(command, child, timeout)?
            }
        };

        debug!(command = %command, exit_code = ?output.exit_code, "finished");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn display_joins_arguments() {
        let cmd = CommandLine::new("virsh", ["nodedev-detach", "pci_0000_05_00_2"]);
        assert_eq!(cmd.to_string(), "virsh nodedev-detach pci_0000_05_00_2");
    }

    #[test]
    fn stderr_fails_even_with_zero_exit() {
        let cmd = CommandLine::new("virsh", ["attach-device"]);
        let err = output(0, "error: domain not found\n").check(&cmd).unwrap_err();
        match err {
            PassthroughError::CommandFailed { reason, .. } => {
                assert_eq!(reason, "error: domain not found")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_zero_exit_fails_without_stderr() {
        let cmd = CommandLine::new("virsh", ["attach-device"]);
        assert!(output(1, "").check(&cmd).is_err());
        assert!(output(0, "  \n").check(&cmd).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn bounded_wait_kills_slow_commands() {
        let runner = SystemCommandRunner::with_timeout(Some(Duration::from_millis(200)));
        let err = runner.run(&CommandLine::new("sleep", ["5"])).unwrap_err();
        assert!(matches!(err, PassthroughError::CommandTimedOut { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn bounded_wait_captures_output() {
        let runner = SystemCommandRunner::with_timeout(Some(Duration::from_secs(5)));
        let out = runner.run(&CommandLine::new("echo", ["hello"])).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let runner = SystemCommandRunner::new();
        let err = runner
            .run(&CommandLine::new("definitely-not-a-real-program-xyz", Vec::<String>::new()))
            .unwrap_err();
        assert!(matches!(err, PassthroughError::CommandSpawn { .. }));
    }
}
