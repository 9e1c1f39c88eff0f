//! Runs external tools (kubectl, az, docker) and captures their output

use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::error::{CommandSnafu, Result, SpawnSnafu};

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program args...` on the blocking pool.
///
/// `env` is layered over the inherited environment and `stdin`, when given,
/// is written to the child's standard input. A non-zero exit becomes
/// [`crate::Error::Command`] carrying the command line and stderr.
pub async fn run_command(
    program: &str,
    args: &[String],
    env: &[(String, String)],
    stdin: Option<String>,
) -> Result<CommandOutput> {
    let command_line = format!("{} {}", program, args.join(" "));

    let mut expression = duct::cmd(program, args)
        .stdout_capture()
        .stderr_capture()
        .unchecked();
    for (key, value) in env {
        expression = expression.env(key, value);
    }
    if let Some(input) = stdin {
        expression = expression.stdin_bytes(input.into_bytes());
    }

    debug!(command = %command_line, "running command");
    let output = tokio::task::spawn_blocking(move || expression.run())
        .await
        .map_err(std::io::Error::other)
        .and_then(|result| result)
        .context(SpawnSnafu {
            command: command_line.clone(),
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    ensure!(
        output.status.success(),
        CommandSnafu {
            command: command_line,
            code: output.status.code(),
            stderr,
        }
    );

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr,
    })
}
