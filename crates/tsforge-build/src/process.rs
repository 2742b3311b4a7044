//! Blocking child-process invocation with captured output
//!
//! Every external tool call is synchronous: the parent waits for exit and
//! captures both streams fully before proceeding. The child environment is
//! replaced wholesale by the mapping the caller built.

use crate::error::{BuildError, BuildResult};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};

/// Captured result of one finished child process
#[derive(Debug)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `program args...` in `cwd` with exactly `env` as environment.
///
/// Returns the captured output regardless of exit code; callers decide
/// whether a non-zero exit is an error.
pub fn run_tool(
    program: &Path,
    args: &[String],
    env: &BTreeMap<String, String>,
    cwd: &Path,
    verbose: bool,
) -> BuildResult<ExecOutput> {
    if verbose {
        echo_invocation(program, args, env, cwd);
    }

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| BuildError::io(program, e))?;

    let result = ExecOutput {
        exit_code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };

    if verbose {
        if !result.stdout.is_empty() {
            eprintln!("exec stdout:\n{}", result.stdout.green());
        }
        if !result.stderr.is_empty() {
            eprintln!("exec stderr:\n{}", result.stderr.yellow());
        }
    }

    Ok(result)
}

/// Render `program args...` as a single shell-style line
pub fn command_line(program: &Path, args: &[String]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

fn echo_invocation(program: &Path, args: &[String], env: &BTreeMap<String, String>, cwd: &Path) {
    eprintln!();
    for (key, value) in env {
        let escaped = value.replace('"', "\\\"").replace('$', "\\$");
        eprintln!("{} {key}=\"{escaped}\"", "export".green());
    }
    eprintln!(
        "cd {} && {}\n",
        cwd.display().to_string().cyan(),
        command_line(program, args).magenta()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sh(script: &str) -> BuildResult<ExecOutput> {
        run_tool(
            Path::new("/bin/sh"),
            &["-c".to_string(), script.to_string()],
            &BTreeMap::new(),
            Path::new("/tmp"),
            false,
        )
    }

    #[test]
    fn test_run_tool_captures_stdout() {
        let out = sh("echo hello").unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_run_tool_captures_failure() {
        let out = sh("echo 'type error' >&2; exit 2").unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 2);
        assert_eq!(out.stderr.trim(), "type error");
    }

    #[test]
    fn test_run_tool_uses_given_environment_only() {
        let mut env = BTreeMap::new();
        env.insert("ONLY_VAR".to_string(), "42".to_string());
        let out = run_tool(
            Path::new("/bin/sh"),
            &["-c".to_string(), "echo ${ONLY_VAR}-${HOME:-unset}".to_string()],
            &env,
            Path::new("/tmp"),
            false,
        )
        .unwrap();
        assert_eq!(out.stdout.trim(), "42-unset");
    }

    #[test]
    fn test_command_line() {
        assert_eq!(
            command_line(Path::new("/usr/bin/node"), &["tsc.js".into(), "--pretty".into()]),
            "/usr/bin/node tsc.js --pretty"
        );
    }
}
