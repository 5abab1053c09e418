//! CLI executor for running prompts through backends.
//!
//! Executes prompts via CLI tools with real-time streaming output.
//! Supports optional execution timeout with graceful SIGTERM termination.

use crate::cli_backend::CliBackend;
#[cfg(test)]
use crate::cli_backend::PromptMode;
use std::io::Write;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Result of a CLI execution.
#[derive(Debug)]
pub struct ExecutionResult {
    /// The full output from the CLI.
    pub output: String,
    /// Whether the execution succeeded (exit code 0).
    pub success: bool,
    /// The exit code.
    pub exit_code: Option<i32>,
    /// Whether the execution was terminated due to timeout.
    pub timed_out: bool,
}

/// Executor for running prompts through CLI backends.
#[derive(Debug)]
pub struct CliExecutor {
    backend: CliBackend,
}

impl CliExecutor {
    /// Creates a new executor with the given backend.
    pub fn new(backend: CliBackend) -> Self {
        Self { backend }
    }

    /// Executes a prompt and streams output to the provided writer.
    ///
    /// Output is streamed line-by-line to the writer while being accumulated
    /// for the return value. If `timeout` is provided and the execution exceeds
    /// it, the process receives SIGTERM and the result indicates timeout.
    pub async fn execute<W: Write + Send>(
        &self,
        prompt: &str,
        mut output_writer: W,
        timeout: Option<Duration>,
    ) -> std::io::Result<ExecutionResult> {
        let (cmd, args, stdin_input) = self.backend.build_command(prompt);

        let mut command = Command::new(&cmd);
        command.args(&args);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        if stdin_input.is_some() {
            command.stdin(Stdio::piped());
        }

        let mut child = command.spawn()?;

        // Write to stdin if needed
        if let Some(input) = stdin_input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                drop(stdin); // Close stdin to signal EOF
            }
        }

        let mut accumulated_output = String::new();
        let mut timed_out = false;

        // Wrap the streaming in a timeout if configured
        let stream_result = async {
            // Stream stdout
            if let Some(stdout) = child.stdout.take() {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();

                while let Some(line) = lines.next_line().await? {
                    // Write to output writer (real-time streaming)
                    writeln!(output_writer, "{line}")?;
                    output_writer.flush()?;

                    // Accumulate for return value
                    accumulated_output.push_str(&line);
                    accumulated_output.push('\n');
                }
            }

            // Also capture stderr (append to output)
            if let Some(stderr) = child.stderr.take() {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();

                while let Some(line) = lines.next_line().await? {
                    writeln!(output_writer, "[stderr] {line}")?;
                    output_writer.flush()?;

                    accumulated_output.push_str("[stderr] ");
                    accumulated_output.push_str(&line);
                    accumulated_output.push('\n');
                }
            }

            Ok::<_, std::io::Error>(())
        };

        match timeout {
            Some(duration) => {
                debug!(timeout_secs = duration.as_secs(), "Executing with timeout");
                match tokio::time::timeout(duration, stream_result).await {
                    Ok(result) => result?,
                    Err(_) => {
                        // Timeout elapsed - send SIGTERM to the child process
                        warn!(
                            timeout_secs = duration.as_secs(),
                            "Execution timeout reached, sending SIGTERM"
                        );
                        timed_out = true;
                        Self::terminate_child(&mut child)?;
                    }
                }
            }
            None => {
                stream_result.await?;
            }
        }

        let status = child.wait().await?;

        Ok(ExecutionResult {
            output: accumulated_output,
            success: status.success() && !timed_out,
            exit_code: status.code(),
            timed_out,
        })
    }

    /// Terminates the child process. `start_kill` requests the platform's
    /// forceful termination (SIGKILL on Unix, `TerminateProcess` on
    /// Windows); there's no portable graceful-SIGTERM equivalent in tokio.
    fn terminate_child(child: &mut tokio::process::Child) -> std::io::Result<()> {
        debug!(pid = ?child.id(), "Terminating child process after timeout");
        child.start_kill()
    }

    /// Executes a prompt without streaming (captures all output).
    ///
    /// Uses no timeout by default. For timed execution, use `execute_capture_with_timeout`.
    pub async fn execute_capture(&self, prompt: &str) -> std::io::Result<ExecutionResult> {
        self.execute_capture_with_timeout(prompt, None).await
    }

    /// Executes a prompt without streaming, with optional timeout.
    pub async fn execute_capture_with_timeout(
        &self,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> std::io::Result<ExecutionResult> {
        // Use a sink that discards output for non-streaming execution
        let sink = std::io::sink();
        self.execute(prompt, sink, timeout).await
    }
}
