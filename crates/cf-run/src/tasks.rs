//! YAML task workflow engine.
//!
//! A task file is a YAML document with a top-level `tasks` list; each
//! entry is a single-key mapping naming the task kind:
//!
//! ```yaml
//! tasks:
//!   - run_command:
//!       cmd_name: blockMesh
//!   - run_command:
//!       cmd_name: simpleSolver
//!       num_ranks: 4
//!   - process_logs:
//!       log_file: simpleSolver.log
//! ```
//!
//! Tasks execute in order and the first failure halts the run, reported
//! with the failing task's index and kind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cf_config::SolverEnv;
use cf_post::LogProcessor;

use crate::cmd::SolverCmd;
use crate::core::{clean_case, CleanOptions};
use crate::{RunError, RunResult};

pub const DEFAULT_TASK_FILE: &str = "caseflow_tasks.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Run an executable in the case directory, output captured to a log.
    RunCommand {
        cmd_name: String,
        #[serde(default)]
        cmd_args: Vec<String>,
        #[serde(default)]
        num_ranks: usize,
        #[serde(default)]
        mpi_extra_args: Vec<String>,
        #[serde(default)]
        log_file: Option<String>,
    },

    /// Copy files matching a glob pattern. A literal (non-wildcard)
    /// source that does not exist is an error; a wildcard that expands to
    /// nothing is tolerated.
    CopyFiles { src: String, dest: String },

    /// Copy a directory tree, replacing any existing destination.
    CopyTree {
        src: String,
        dest: String,
        #[serde(default)]
        ignore_patterns: Vec<String>,
        #[serde(default)]
        preserve_symlinks: bool,
    },

    /// Remove solver outputs from the case directory.
    CleanCase {
        #[serde(default)]
        remove_zero: bool,
        #[serde(default)]
        remove_mesh: bool,
        #[serde(default)]
        preserve: Vec<String>,
    },

    /// Extract residual histories from a solver log.
    ProcessLogs {
        log_file: String,
        #[serde(default)]
        plot_residuals: bool,
        #[serde(default)]
        residuals_plot_file: Option<String>,
    },

    /// Run a nested task list, optionally inside a subdirectory.
    TaskSet {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        case_dir: Option<String>,
        tasks: Vec<Task>,
    },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::RunCommand { .. } => "run_command",
            Task::CopyFiles { .. } => "copy_files",
            Task::CopyTree { .. } => "copy_tree",
            Task::CleanCase { .. } => "clean_case",
            Task::ProcessLogs { .. } => "process_logs",
            Task::TaskSet { .. } => "task_set",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFile {
    pub tasks: Vec<Task>,
}

impl TaskFile {
    pub fn load(path: &Path) -> RunResult<Self> {
        if !path.is_file() {
            return Err(RunError::NotFound {
                kind: "task file",
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

/// Executes a task list inside a case directory.
pub struct TaskRunner<'a> {
    casedir: PathBuf,
    env: Option<&'a SolverEnv>,
}

impl<'a> TaskRunner<'a> {
    pub fn new(casedir: impl Into<PathBuf>, env: Option<&'a SolverEnv>) -> Self {
        Self {
            casedir: casedir.into(),
            env,
        }
    }

    /// Run every task in order; the first failure aborts the run and is
    /// reported with its position in the list.
    pub fn execute(&self, tasks: &[Task]) -> RunResult<()> {
        for (index, task) in tasks.iter().enumerate() {
            tracing::info!(
                case = %self.casedir.display(),
                task = task.kind(),
                index,
                "executing task"
            );
            self.run_task(task).map_err(|source| RunError::Task {
                index,
                kind: task.kind(),
                source: Box::new(source),
            })?;
        }
        Ok(())
    }

    fn run_task(&self, task: &Task) -> RunResult<()> {
        match task {
            Task::RunCommand {
                cmd_name,
                cmd_args,
                num_ranks,
                mpi_extra_args,
                log_file,
            } => {
                let mut cmd = SolverCmd::new(cmd_name, &self.casedir)
                    .args(cmd_args.iter().cloned())
                    .num_ranks((*num_ranks).max(1))
                    .mpi_extra_args(mpi_extra_args.iter().cloned());
                if let Some(log_file) = log_file {
                    cmd = cmd.log_file(log_file);
                }
                cmd.run(self.env)
            }
            Task::CopyFiles { src, dest } => self.copy_files(src, dest),
            Task::CopyTree {
                src,
                dest,
                ignore_patterns,
                preserve_symlinks,
            } => self.copy_tree(src, dest, ignore_patterns, *preserve_symlinks),
            Task::CleanCase {
                remove_zero,
                remove_mesh,
                preserve,
            } => clean_case(
                &self.casedir,
                &CleanOptions {
                    remove_zero: *remove_zero,
                    remove_mesh: *remove_mesh,
                    preserve_patterns: preserve.clone(),
                },
            ),
            Task::ProcessLogs {
                log_file,
                plot_residuals,
                residuals_plot_file,
            } => self.process_logs(log_file, *plot_residuals, residuals_plot_file.as_deref()),
            Task::TaskSet {
                name,
                case_dir,
                tasks,
            } => {
                let dir = match case_dir {
                    Some(sub) => self.casedir.join(sub),
                    None => self.casedir.clone(),
                };
                if !dir.is_dir() {
                    return Err(RunError::NotFound {
                        kind: "task set directory",
                        path: dir,
                    });
                }
                if let Some(name) = name {
                    tracing::info!(set = %name, dir = %dir.display(), "entering task set");
                }
                TaskRunner::new(dir, self.env).execute(tasks)
            }
        }
    }

    fn copy_files(&self, src: &str, dest: &str) -> RunResult<()> {
        let pattern = self.casedir.join(src);
        let pattern_str = pattern.to_string_lossy().into_owned();
        let matches: Vec<PathBuf> = glob::glob(&pattern_str)
            .map_err(RunError::Pattern)?
            .filter_map(Result::ok)
            .collect();
        let is_wildcard = src.contains(['*', '?', '[']);
        if matches.is_empty() {
            if is_wildcard {
                tracing::warn!(pattern = src, "copy_files pattern matched nothing");
                return Ok(());
            }
            return Err(RunError::NotFound {
                kind: "file",
                path: pattern,
            });
        }

        let dest_path = self.casedir.join(dest);
        if matches.len() > 1 || dest.ends_with('/') {
            fs::create_dir_all(&dest_path)?;
        }
        for path in matches {
            let target = if dest_path.is_dir() {
                dest_path.join(entry_name(&path))
            } else {
                dest_path.clone()
            };
            if path.is_dir() {
                crate::core::copy_tree(&path, &target, &[])?;
            } else {
                fs::copy(&path, &target)?;
            }
        }
        Ok(())
    }

    fn copy_tree(
        &self,
        src: &str,
        dest: &str,
        ignore_patterns: &[String],
        preserve_symlinks: bool,
    ) -> RunResult<()> {
        let src_path = self.casedir.join(src);
        let dest_path = self.casedir.join(dest);
        if !src_path.is_dir() {
            return Err(RunError::NotFound {
                kind: "directory",
                path: src_path,
            });
        }
        if dest_path.exists() {
            fs::remove_dir_all(&dest_path)?;
        }
        let ignore = ignore_patterns
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        copy_tree_filtered(&src_path, &dest_path, &ignore, preserve_symlinks)
    }

    fn process_logs(
        &self,
        log_file: &str,
        plot_residuals: bool,
        residuals_plot_file: Option<&str>,
    ) -> RunResult<()> {
        LogProcessor::new(&self.casedir, log_file)?.process()?;
        // Marker file so visualization tools pick up the case.
        let case_name = entry_name(&self.casedir);
        fs::write(self.casedir.join(format!("{case_name}.foam")), "")?;
        if plot_residuals {
            let log = cf_post::SolverLog::load(&self.casedir)?;
            let plot_name = residuals_plot_file.unwrap_or("residuals.svg");
            cf_post::render_residual_plot(&log, &self.casedir.join(plot_name))?;
        }
        Ok(())
    }
}

fn copy_tree_filtered(
    src: &Path,
    dest: &Path,
    ignore: &[glob::Pattern],
    preserve_symlinks: bool,
) -> RunResult<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry_name(&path);
        if ignore.iter().any(|p| p.matches(&name)) {
            continue;
        }
        let target = dest.join(&name);
        let file_type = entry.file_type()?;
        if preserve_symlinks && file_type.is_symlink() {
            #[cfg(unix)]
            std::os::unix::fs::symlink(fs::read_link(&path)?, &target)?;
            #[cfg(not(unix))]
            fs::copy(&path, &target)?;
        } else if path.is_dir() {
            copy_tree_filtered(&path, &target, ignore, preserve_symlinks)?;
        } else {
            fs::copy(&path, &target)?;
        }
    }
    Ok(())
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
