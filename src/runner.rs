//! Emulator runner.
//!
//! Spawns the emulator as `<emulator> <executable> <args...>` with a cleared
//! environment carrying only the two variables the emulator recognizes:
//!
//! - `SYMCC_OUTPUT_DIR`: directory the emulator writes new test cases into
//! - `SYMCC_INPUT_FILE`: file whose bytes are treated as symbolic input
//!
//! stdout and stderr go to anonymous scratch files rather than pipes, so a
//! child that writes a lot can never stall on a full pipe while we wait on
//! it. They are kept for diagnostics and never echoed to the console.

use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::error::{HarnessError, Result};
use crate::fixture::Fixture;

/// Environment variable naming the output directory.
pub const OUTPUT_DIR_VAR: &str = "SYMCC_OUTPUT_DIR";
/// Environment variable naming the symbolic input file.
pub const INPUT_FILE_VAR: &str = "SYMCC_INPUT_FILE";

/// Poll interval while waiting on a child with a timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One emulator invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Target executable.
    pub executable: PathBuf,
    /// Arguments with the placeholder already substituted.
    pub arguments: Vec<OsString>,
    /// Existing, writable directory for generated test cases.
    pub output_dir: PathBuf,
    /// Seed input exported as `SYMCC_INPUT_FILE`, if any.
    pub input_file: Option<PathBuf>,
}

impl RunRequest {
    /// Build the request for a fixture writing into `output_dir`.
    ///
    /// The output directory is made absolute since the emulator only sees it
    /// through the environment.
    pub fn for_fixture(fixture: &Fixture, output_dir: &Path) -> Self {
        Self {
            executable: fixture.executable.clone(),
            arguments: fixture.resolved_args(),
            output_dir: std::path::absolute(output_dir)
                .unwrap_or_else(|_| output_dir.to_path_buf()),
            input_file: Some(fixture.input.clone()),
        }
    }

    /// The two contract variables, in a fixed order.
    pub fn environment(&self) -> Vec<(&'static str, OsString)> {
        let mut env = vec![(OUTPUT_DIR_VAR, self.output_dir.clone().into_os_string())];
        if let Some(input) = &self.input_file {
            env.push((INPUT_FILE_VAR, input.clone().into_os_string()));
        }
        env
    }
}

/// Result of a successful emulator run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Rendered command line.
    pub command: String,
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

/// Runs the emulator.
#[derive(Debug, Clone)]
pub struct EmulatorRunner {
    /// Emulator executable (e.g. `build/qemu-x86_64`).
    emulator: PathBuf,
    /// Kill the child after this long. `None` waits forever.
    timeout: Option<Duration>,
}

impl EmulatorRunner {
    /// Create a runner with no timeout.
    pub fn new(emulator: impl Into<PathBuf>) -> Self {
        Self {
            emulator: emulator.into(),
            timeout: None,
        }
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn emulator(&self) -> &Path {
        &self.emulator
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Render the command line for logs and errors.
    pub fn command_line(&self, request: &RunRequest) -> String {
        let mut parts = vec![
            self.emulator.display().to_string(),
            request.executable.display().to_string(),
        ];
        parts.extend(
            request
                .arguments
                .iter()
                .map(|a| a.to_string_lossy().to_string()),
        );
        parts.join(" ")
    }

    /// Run one request to completion.
    ///
    /// Fails with [`HarnessError::EmulatorRunFailed`] on a non-zero exit and
    /// [`HarnessError::EmulatorTimedOut`] when the timeout expires.
    pub fn run(&self, request: &RunRequest) -> Result<RunOutcome> {
        let command_line = self.command_line(request);
        log::info!("about to run command: {}", command_line);
        log::debug!("with environment variables: {:?}", request.environment());

        let spawn_failed = |source: std::io::Error| HarnessError::EmulatorSpawnFailed {
            command: command_line.clone(),
            source,
        };

        let mut stdout_file = tempfile::tempfile().map_err(&spawn_failed)?;
        let mut stderr_file = tempfile::tempfile().map_err(&spawn_failed)?;

        let mut command = Command::new(&self.emulator);
        command
            .arg(&request.executable)
            .args(&request.arguments)
            .env_clear()
            .envs(request.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.try_clone().map_err(&spawn_failed)?))
            .stderr(Stdio::from(stderr_file.try_clone().map_err(&spawn_failed)?));

        let started = Instant::now();
        let mut child = command.spawn().map_err(&spawn_failed)?;
        // Drop the parent's handles on the child's stdio.
        drop(command);

        let status = match self.timeout {
            None => child.wait().map_err(&spawn_failed)?,
            Some(timeout) => match wait_with_timeout(&mut child, timeout).map_err(&spawn_failed)? {
                Some(status) => status,
                None => {
                    log::warn!("{} timed out after {:?}, killed", command_line, timeout);
                    return Err(HarnessError::EmulatorTimedOut {
                        command: command_line,
                        timeout,
                    });
                }
            },
        };
        let elapsed = started.elapsed();

        let stdout = read_capture(&mut stdout_file).map_err(&spawn_failed)?;
        let stderr = read_capture(&mut stderr_file).map_err(&spawn_failed)?;
        log::trace!("stdout: {}", String::from_utf8_lossy(&stdout));
        log::trace!("stderr: {}", String::from_utf8_lossy(&stderr));

        if !status.success() {
            return Err(HarnessError::EmulatorRunFailed {
                command: command_line,
                exit_code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).to_string(),
            });
        }

        log::debug!("{} finished in {:?}", command_line, elapsed);
        Ok(RunOutcome {
            command: command_line,
            exit_code: status.code().unwrap_or(0),
            stdout,
            stderr,
            elapsed,
        })
    }

    /// Run a fixture writing into `output_dir`.
    pub fn run_fixture(&self, fixture: &Fixture, output_dir: &Path) -> Result<RunOutcome> {
        self.run(&RunRequest::for_fixture(fixture, output_dir))
    }
}

/// Poll the child until it exits or `timeout` passes. On timeout the child
/// is killed, reaped, and `None` is returned.
fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= timeout {
            if let Err(e) = child.kill() {
                log::debug!("kill of pid {} failed: {}", child.id(), e);
            }
            if let Err(e) = child.wait() {
                log::warn!("failed to reap timed-out pid {}: {}", child.id(), e);
            }
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn read_capture(file: &mut File) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// `/bin/sh` stands in for the emulator: it runs the "executable" as a script.
    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("binary");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn request(executable: PathBuf, output_dir: &Path, args: &[&str]) -> RunRequest {
        RunRequest {
            executable,
            arguments: args.iter().map(OsString::from).collect(),
            output_dir: output_dir.to_path_buf(),
            input_file: Some(PathBuf::from("/seed/input")),
        }
    }

    #[test]
    fn test_environment_contract() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        // HOME is set in any normal parent environment; it must not leak through.
        let exe = script(
            dir.path(),
            "printf '%s|%s|%s' \"$SYMCC_OUTPUT_DIR\" \"$SYMCC_INPUT_FILE\" \"${HOME:-unset}\" > \"$SYMCC_OUTPUT_DIR/env\"\n",
        );

        EmulatorRunner::new("/bin/sh")
            .run(&request(exe, out.path(), &[]))
            .unwrap();

        let env = std::fs::read_to_string(out.path().join("env")).unwrap();
        assert_eq!(env, format!("{}|/seed/input|unset", out.path().display()));
    }

    #[test]
    fn test_input_var_omitted_without_seed() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let exe = script(
            dir.path(),
            "printf '%s' \"${SYMCC_INPUT_FILE-none}\" > \"$SYMCC_OUTPUT_DIR/input\"\n",
        );
        let mut req = request(exe, out.path(), &[]);
        req.input_file = None;
        assert_eq!(req.environment().len(), 1);

        EmulatorRunner::new("/bin/sh").run(&req).unwrap();
        let seen = std::fs::read_to_string(out.path().join("input")).unwrap();
        assert_eq!(seen, "none");
    }

    #[test]
    fn test_arguments_passed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let exe = script(
            dir.path(),
            "printf '%s\\n' \"$@\" > \"$SYMCC_OUTPUT_DIR/args\"\n",
        );

        EmulatorRunner::new("/bin/sh")
            .run(&request(exe, out.path(), &["-x", "/seed/input", "tail"]))
            .unwrap();

        let args = std::fs::read_to_string(out.path().join("args")).unwrap();
        assert_eq!(args, "-x\n/seed/input\ntail\n");
    }

    #[test]
    fn test_output_captured_not_streamed() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "printf 'hello'\nprintf 'oops' >&2\n");

        let outcome = EmulatorRunner::new("/bin/sh")
            .run(&request(exe, out.path(), &[]))
            .unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, b"hello");
        assert_eq!(outcome.stderr, b"oops");
    }

    #[test]
    fn test_nonzero_exit_is_run_failure() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "printf 'bad things' >&2\nexit 1\n");

        let err = EmulatorRunner::new("/bin/sh")
            .run(&request(exe.clone(), out.path(), &["arg"]))
            .unwrap_err();
        match err {
            HarnessError::EmulatorRunFailed {
                command,
                exit_code,
                stderr,
            } => {
                assert_eq!(command, format!("/bin/sh {} arg", exe.display()));
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "bad things");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "while :; do :; done\n");

        let started = Instant::now();
        let err = EmulatorRunner::new("/bin/sh")
            .with_timeout(Some(Duration::from_millis(200)))
            .run(&request(exe, out.path(), &[]))
            .unwrap_err();
        assert!(matches!(err, HarnessError::EmulatorTimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_emulator_is_spawn_failure() {
        let out = tempfile::tempdir().unwrap();
        let err = EmulatorRunner::new("/nonexistent/qemu-x86_64")
            .run(&request(PathBuf::from("/bin/true"), out.path(), &[]))
            .unwrap_err();
        assert!(matches!(err, HarnessError::EmulatorSpawnFailed { .. }));
    }
}
