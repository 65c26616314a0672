use std::fmt::Display;
use std::fmt::Formatter;

use tokio::process::Command;
use tracing::Instrument;
use tracing::debug;
use tracing::debug_span;

use crate::exception::Exception;
use crate::exception::error_code;

// env values are passed to the child process only, they never appear in Display or logs
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    secret_env: Vec<(String, String)>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        ShellCommand {
            program: program.into(),
            args: Vec::new(),
            secret_env: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn secret_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secret_env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl Display for ShellCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

pub struct CommandOutput {
    // None when the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs the command to completion. Only a failure to start the process is an error,
/// the exit status is left to the caller.
pub async fn output(command: &ShellCommand) -> Result<CommandOutput, Exception> {
    let span = debug_span!("shell", command = %command);

    async {
        let mut process = Command::new(&command.program);
        process.args(&command.args);
        for (key, value) in &command.secret_env {
            process.env(key, value);
        }
        let output = process.output().await.map_err(|err| {
            exception!(
                code = error_code::TRANSFER_ERROR,
                message = format!("failed to start command, program={}", command.program),
                source = err
            )
        })?;
        let output = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(status = output.status, stdout = %output.stdout, stderr = %output.stderr);
        Ok(output)
    }
    .instrument(span)
    .await
}

pub async fn run(command: &ShellCommand) -> Result<String, Exception> {
    let output = output(command).await?;
    if output.success() {
        Ok(output.stdout)
    } else {
        Err(exception!(
            code = error_code::TRANSFER_ERROR,
            message = format!(
                "command failed, status={}, stderr={}",
                output.status.unwrap_or(-1),
                output.stderr.trim()
            )
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::ShellCommand;

    #[test]
    fn display_hides_secret_env() {
        let command = ShellCommand::new("sshpass")
            .args(["-e", "ssh", "kcwi1@kcwiserver", "/bin/rm /sdata1401/kcwi1/2021jan16/kb.fits"])
            .secret_env("SSHPASS", "hunter2");
        let text = command.to_string();
        assert_eq!(
            text,
            "sshpass -e ssh kcwi1@kcwiserver /bin/rm /sdata1401/kcwi1/2021jan16/kb.fits"
        );
        assert!(!text.contains("hunter2"));
    }

    #[tokio::test]
    async fn run() {
        let output = super::run(&ShellCommand::new("echo").arg("hello")).await.unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    async fn run_failed() {
        let result = super::run(&ShellCommand::new("false")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn output_keeps_exit_status() {
        let output = super::output(&ShellCommand::new("sh").args(["-c", "echo missing >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(output.status, Some(3));
        assert!(!output.success());
        assert_eq!(output.stderr.trim(), "missing");

        let result = super::output(&ShellCommand::new("no-such-program-on-path")).await;
        assert!(result.is_err());
    }
}
