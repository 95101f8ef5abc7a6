//! Solver subprocess runner.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use cf_config::SolverEnv;

use crate::{RunError, RunResult};

/// An external solver (or utility) invocation inside a case directory.
///
/// Output is captured to a log file so it can be fed to the log
/// processor afterwards. When `num_ranks > 1` the executable is wrapped
/// in `mpiexec` and given the `-parallel` flag.
#[derive(Debug, Clone)]
pub struct SolverCmd {
    exe: String,
    args: Vec<String>,
    casedir: PathBuf,
    parallel: bool,
    num_ranks: usize,
    mpi_extra_args: Vec<String>,
    log_file: Option<String>,
}

impl SolverCmd {
    pub fn new(exe: impl Into<String>, casedir: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            args: Vec::new(),
            casedir: casedir.into(),
            parallel: false,
            num_ranks: 1,
            mpi_extra_args: Vec::new(),
            log_file: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Request `num_ranks` MPI ranks. Anything above one switches the
    /// invocation to parallel mode.
    pub fn num_ranks(mut self, num_ranks: usize) -> Self {
        self.num_ranks = num_ranks.max(1);
        if self.num_ranks > 1 {
            self.parallel = true;
        }
        self
    }

    pub fn mpi_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mpi_extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn log_file(mut self, name: impl Into<String>) -> Self {
        self.log_file = Some(name.into());
        self
    }

    /// Name of the log file output is captured to. Defaults to the
    /// executable's file stem with a `.log` suffix.
    pub fn log_name(&self) -> String {
        match &self.log_file {
            Some(name) => name.clone(),
            None => {
                let stem = Path::new(&self.exe)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| self.exe.clone());
                format!("{stem}.log")
            }
        }
    }

    /// Full command line, for diagnostics.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::new();
        if self.parallel {
            parts.push("mpiexec".to_string());
            parts.push("-np".to_string());
            parts.push(self.num_ranks.to_string());
            parts.extend(self.mpi_extra_args.iter().cloned());
        }
        parts.push(self.exe.clone());
        if self.parallel {
            parts.push("-parallel".to_string());
        }
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn build_command(&self, env: Option<&SolverEnv>) -> Command {
        let mut cmd = if self.parallel {
            let mut cmd = Command::new("mpiexec");
            cmd.arg("-np").arg(self.num_ranks.to_string());
            cmd.args(&self.mpi_extra_args);
            cmd.arg(&self.exe).arg("-parallel");
            cmd
        } else {
            Command::new(&self.exe)
        };
        cmd.args(&self.args);
        cmd.current_dir(&self.casedir);
        if let Some(env) = env {
            for (key, value) in env.environ() {
                cmd.env(key, value);
            }
        }
        cmd
    }

    /// Run the command to completion, capturing stdout and stderr to the
    /// log file inside the case directory.
    pub fn run(&self, env: Option<&SolverEnv>) -> RunResult<()> {
        let log_path = self.casedir.join(self.log_name());
        let log = File::create(&log_path)?;
        let log_err = log.try_clone()?;

        let command_line = self.command_line();
        tracing::info!(
            case = %self.casedir.display(),
            log = %log_path.display(),
            "running: {command_line}"
        );

        let status = self
            .build_command(env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(RunError::Execution {
                command: command_line,
                status: status.code().unwrap_or(-1),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_name_comes_from_the_executable() {
        let cmd = SolverCmd::new("simpleSolver", "/tmp/case");
        assert_eq!(cmd.log_name(), "simpleSolver.log");
        let cmd = SolverCmd::new("/opt/bin/pisoSolver", "/tmp/case").log_file("run1.log");
        assert_eq!(cmd.log_name(), "run1.log");
    }

    #[test]
    fn parallel_invocations_are_wrapped_in_mpiexec() {
        let cmd = SolverCmd::new("simpleSolver", "/tmp/case")
            .num_ranks(4)
            .mpi_extra_args(["--bind-to", "core"])
            .args(["-noFunctionObjects"]);
        assert_eq!(
            cmd.command_line(),
            "mpiexec -np 4 --bind-to core simpleSolver -parallel -noFunctionObjects"
        );
    }

    #[test]
    fn single_rank_stays_serial() {
        let cmd = SolverCmd::new("blockMesh", "/tmp/case").num_ranks(1);
        assert_eq!(cmd.command_line(), "blockMesh");
    }

    #[test]
    fn captured_output_lands_in_the_log_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cmd = SolverCmd::new("sh", tmp.path())
            .args(["-c", "echo hello"])
            .log_file("echo.log");
        cmd.run(None).unwrap();
        let text = std::fs::read_to_string(tmp.path().join("echo.log")).unwrap();
        assert_eq!(text.trim(), "hello");
    }

    #[test]
    fn nonzero_exit_is_an_execution_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cmd = SolverCmd::new("sh", tmp.path()).args(["-c", "exit 3"]);
        match cmd.run(None) {
            Err(RunError::Execution { status, .. }) => assert_eq!(status, 3),
            other => panic!("expected execution error, got {other:?}"),
        }
    }
}
