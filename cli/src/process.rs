use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use interpreter::{CommandRunner, CompletionRequest, TextCompletion};
use tracing::debug;

use crate::settings::{EnvVar, LlmSettings};

/// Hands each prompt to an external program on stdin and reads the reply
/// from its stdout.
///
/// Provider and model travel as `LIVEDOC_PROVIDER` / `LIVEDOC_MODEL`, media
/// paths as one `LIVEDOC_MEDIA` entry per line.
pub struct ProcessCompletion {
    command: Option<String>,
    args: Vec<String>,
}

impl ProcessCompletion {
    pub fn new(settings: &LlmSettings) -> Self {
        ProcessCompletion {
            command: settings.command.clone(),
            args: settings.args.clone(),
        }
    }
}

impl TextCompletion for ProcessCompletion {
    fn complete_text(&mut self, request: &CompletionRequest) -> Result<String, String> {
        let program = self
            .command
            .as_deref()
            .ok_or("no completion command configured ([llm] command in settings.toml)")?;
        let media = request
            .media
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let mut command = Command::new(program);
        command
            .args(&self.args)
            .env("LIVEDOC_MEDIA", media)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(provider) = &request.provider {
            command.env("LIVEDOC_PROVIDER", provider);
        }
        if let Some(model) = &request.model {
            command.env("LIVEDOC_MODEL", model);
        }
        debug!(program, "spawning completion process");

        let mut child = command
            .spawn()
            .map_err(|e| format!("cannot start '{}': {}", program, e))?;
        // Fed from its own thread so a child that answers while still
        // reading cannot fill stdout and stall both sides.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = request.prompt.clone();
            thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });
        let output = child
            .wait_with_output()
            .map_err(|e| format!("'{}' failed: {}", program, e))?;
        if let Some(writer) = writer {
            let sent = writer
                .join()
                .map_err(|_| format!("prompt writer for '{}' panicked", program))?;
            // A program may answer without reading all of its input.
            match sent {
                Err(e) if e.kind() != io::ErrorKind::BrokenPipe => {
                    return Err(format!("cannot send prompt to '{}': {}", program, e));
                }
                _ => {}
            }
        }

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(format!(
                "'{}' exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

/// Runs `@shell` commands through `sh -c`.
pub struct ShellRunner {
    environment: Vec<EnvVar>,
}

impl ShellRunner {
    pub fn new(environment: Vec<EnvVar>) -> Self {
        ShellRunner { environment }
    }
}

impl CommandRunner for ShellRunner {
    /// Stdout followed by stderr. A non-zero exit status is not an error;
    /// the output becomes document content either way.
    fn run_command(&mut self, command: &str) -> Result<String, String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .envs(self.environment.iter().map(|v| (&v.key, &v.value)))
            .output()
            .map_err(|e| format!("cannot run '{}': {}", command, e))?;
        debug!(command, status = %output.status, "shell finished");

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}
