//! Builder for executing external tool commands.

use crate::template::TemplateContext;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

/// Configured invocation of an external tool: a program plus argument templates.
///
/// Arguments may reference `{var}` placeholders that are expanded per unit with a
/// [`TemplateContext`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolSpec {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Expand the placeholders and build a runnable command.
    pub fn render(&self, ctx: &TemplateContext) -> ToolCommand {
        let mut cmd = ToolCommand::new(PathBuf::from(ctx.substitute(&self.program)));
        cmd.args(ctx.substitute_all(&self.args));
        cmd
    }
}

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use mstseg_tools::ToolCommand;
/// use std::path::PathBuf;
///
/// let output = ToolCommand::new(PathBuf::from("dcm2bids"))
///     .arg("-d").arg("/data/sourcedata")
///     .arg("-p").arg("RR215")
///     .execute()?;
/// println!("{}", output.stdout);
/// # Ok::<(), mstseg_tools::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Run the process in `dir`.
    pub fn current_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Short program name used in errors and logs.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - Returns [`Error::ToolNotFound`] if the program cannot be spawned because it
    ///   does not exist.
    /// - Returns [`Error::ToolFailed`] if spawning fails otherwise, or if the process
    ///   exits with a non-zero status (message includes stderr).
    pub fn execute(&self) -> Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!("exec: {}", self);

        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(program_name.clone())
            } else {
                Error::tool_failed(program_name.clone(), format!("failed to spawn: {e}"))
            }
        })?;

        let tool_output = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() {
            return Err(Error::tool_failed(
                program_name,
                format!(
                    "exited with status {}: {}",
                    output.status,
                    tool_output.stderr.trim()
                ),
            ));
        }

        Ok(tool_output)
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_spec() {
        let spec = ToolSpec::new("dcm2bids", &["-p", "{participant}", "-s", "{session_label}"]);
        let ctx = TemplateContext::new()
            .with_var("participant", "RR215")
            .with_var("session_label", "20180605");
        let cmd = spec.render(&ctx);
        assert_eq!(cmd.program_name(), "dcm2bids");
        assert_eq!(cmd.get_args(), &["-p", "RR215", "-s", "20180605"]);
        assert_eq!(cmd.to_string(), "dcm2bids -p RR215 -s 20180605");
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_echo() {
        let output = ToolCommand::new(PathBuf::from("sh"))
            .arg("-c")
            .arg("echo hello")
            .execute()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_nonzero_exit() {
        let err = ToolCommand::new(PathBuf::from("sh"))
            .arg("-c")
            .arg("echo broken >&2; exit 3")
            .execute()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("broken"), "unexpected error: {msg}");
        assert!(matches!(err, Error::ToolFailed { .. }));
    }

    #[test]
    fn test_execute_nonexistent_tool() {
        let err = ToolCommand::new(PathBuf::from("nonexistent_tool_xyz_12345"))
            .execute()
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = ToolCommand::new(PathBuf::from("sh"))
            .arg("-c")
            .arg("pwd")
            .current_dir(dir.path())
            .execute()
            .unwrap();
        let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }
}
