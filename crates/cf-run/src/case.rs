//! Per-case simulation lifecycle.
//!
//! A [`Simulation`] owns one case directory and walks it through the
//! setup / prep / solve / post stages, persisting its progress flags to
//! a state file inside the case so a later invocation (or the CLI)
//! picks up where the previous one stopped.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cf_config::SolverEnv;
use cf_dict::dictfile::{DecomposeParDict, DictFile};
use cf_dict::value::{Dictionary, Value};

use crate::cmd::SolverCmd;
use crate::core::proc_dir_count;
use crate::tasks::{Task, TaskRunner};
use crate::{RunError, RunResult};

pub const CASE_STATE_FILE: &str = ".caseflow_case.json";

/// Progress markers persisted with the case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunFlags {
    #[serde(default)]
    pub updated: bool,
    #[serde(default)]
    pub prepped: bool,
    #[serde(default)]
    pub solve_completed: bool,
    #[serde(default)]
    pub post_done: bool,
    #[serde(default)]
    pub failed: bool,
}

/// Lifecycle stage derived from the flags. Failure dominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimStatus {
    Setup,
    Prepped,
    Solved,
    Done,
    Failed,
}

impl fmt::Display for SimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SimStatus::Setup => "SETUP",
            SimStatus::Prepped => "PREPPED",
            SimStatus::Solved => "SOLVED",
            SimStatus::Done => "DONE",
            SimStatus::Failed => "FAILED",
        };
        f.write_str(text)
    }
}

/// One solver invocation within the solve stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOpts {
    pub solver: String,
    #[serde(default)]
    pub solver_args: Vec<String>,
    #[serde(default)]
    pub log_file: Option<String>,
}

/// The `solve` entry accepts a bare solver name, a single solver block,
/// or a list of solver blocks run in sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SolveOpts {
    Name(String),
    One(SolverOpts),
    Many(Vec<SolverOpts>),
}

impl SolveOpts {
    pub fn solvers(&self) -> Vec<SolverOpts> {
        match self {
            SolveOpts::Name(name) => vec![SolverOpts {
                solver: name.clone(),
                solver_args: Vec::new(),
                log_file: None,
            }],
            SolveOpts::One(opts) => vec![opts.clone()],
            SolveOpts::Many(list) => list.clone(),
        }
    }
}

fn default_num_ranks() -> usize {
    1
}

/// Declarative description of how to run one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_num_ranks")]
    pub num_ranks: usize,
    /// Reconstruct the decomposed fields after a parallel solve.
    #[serde(default)]
    pub reconstruct: bool,
    pub solve: SolveOpts,
    #[serde(default)]
    pub prep: Vec<Task>,
    #[serde(default)]
    pub post: Vec<Task>,
    /// Input-file overrides applied at update time, keyed by
    /// case-relative filename.
    #[serde(default)]
    pub change_inputs: serde_yaml::Mapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    pub name: String,
    #[serde(skip)]
    casedir: PathBuf,
    pub run_config: RunConfig,
    #[serde(default)]
    pub flags: RunFlags,
    #[serde(default)]
    pub logfile: Option<String>,
}

impl Simulation {
    pub fn new(name: impl Into<String>, casedir: impl Into<PathBuf>, run_config: RunConfig) -> Self {
        Self {
            name: name.into(),
            casedir: casedir.into(),
            run_config,
            flags: RunFlags::default(),
            logfile: None,
        }
    }

    /// Load a previously saved simulation from its case directory.
    pub fn load(casedir: &Path) -> RunResult<Self> {
        let state = casedir.join(CASE_STATE_FILE);
        if !state.is_file() {
            return Err(RunError::NotFound {
                kind: "case state file",
                path: state,
            });
        }
        let mut sim: Simulation = serde_json::from_str(&fs::read_to_string(state)?)?;
        sim.casedir = casedir.to_path_buf();
        Ok(sim)
    }

    pub fn save(&self) -> RunResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(self.casedir.join(CASE_STATE_FILE), text)?;
        Ok(())
    }

    pub fn casedir(&self) -> &Path {
        &self.casedir
    }

    pub fn status(&self) -> SimStatus {
        if self.flags.failed {
            SimStatus::Failed
        } else if self.flags.post_done {
            SimStatus::Done
        } else if self.flags.solve_completed {
            SimStatus::Solved
        } else if self.flags.prepped {
            SimStatus::Prepped
        } else {
            SimStatus::Setup
        }
    }

    /// Apply the `change_inputs` overrides to the case's input files.
    pub fn update(&mut self) -> RunResult<()> {
        for (file, overrides) in self.run_config.change_inputs.clone() {
            let (file, overrides) = match (file.as_str(), overrides.as_mapping()) {
                (Some(file), Some(map)) => (file.to_string(), map.clone()),
                _ => {
                    return Err(RunError::Settings(
                        "change_inputs entries must map filenames to key/value tables".to_string(),
                    ))
                }
            };
            let mut dict = DictFile::read_if_present(&self.casedir, &file)?;
            dict.data.merge(&yaml_mapping_to_dict(&overrides));
            dict.write(&self.casedir)?;
            tracing::info!(case = %self.name, file, "updated input file");
        }
        self.flags.updated = true;
        self.save()
    }

    /// Run the prep tasks and, for parallel cases, decompose the domain.
    pub fn prep(&mut self, env: Option<&SolverEnv>) -> RunResult<()> {
        if !self.flags.updated {
            self.update()?;
        }
        TaskRunner::new(&self.casedir, env).execute(&self.run_config.prep)?;
        if self.run_config.num_ranks > 1 {
            self.decompose(env)?;
        }
        self.flags.prepped = true;
        self.save()
    }

    fn decompose(&self, env: Option<&SolverEnv>) -> RunResult<()> {
        let mut dict = DecomposeParDict::read_if_present(&self.casedir)?;
        dict.set_number_of_subdomains(self.run_config.num_ranks as i64);
        dict.write(&self.casedir)?;
        if proc_dir_count(&self.casedir)? != self.run_config.num_ranks {
            SolverCmd::new("decomposePar", &self.casedir)
                .args(["-force"])
                .run(env)?;
        }
        Ok(())
    }

    /// Run the configured solver(s). Preps first if that stage has not
    /// happened yet; a failed solver marks the case failed before the
    /// error propagates.
    pub fn solve(&mut self, env: Option<&SolverEnv>) -> RunResult<()> {
        if !self.flags.prepped {
            tracing::info!(case = %self.name, "case not prepped; prepping first");
            self.prep(env)?;
        }
        for opts in self.run_config.solve.solvers() {
            let mut cmd = SolverCmd::new(&opts.solver, &self.casedir)
                .args(opts.solver_args.iter().cloned())
                .num_ranks(self.run_config.num_ranks);
            if let Some(log_file) = &opts.log_file {
                cmd = cmd.log_file(log_file);
            }
            self.logfile = Some(cmd.log_name());
            if let Err(err) = cmd.run(env) {
                self.flags.failed = true;
                self.save()?;
                return Err(err);
            }
        }
        self.flags.solve_completed = true;
        self.save()
    }

    /// Reconstruct (if requested) and run the post tasks. Skipped with a
    /// warning when the solve stage has not completed.
    pub fn post(&mut self, env: Option<&SolverEnv>) -> RunResult<()> {
        match self.status() {
            SimStatus::Solved | SimStatus::Done => {}
            status => {
                tracing::warn!(case = %self.name, %status, "solve not complete; skipping post");
                return Ok(());
            }
        }
        if self.run_config.reconstruct && self.run_config.num_ranks > 1 {
            SolverCmd::new("reconstructPar", &self.casedir)
                .args(["-latestTime"])
                .run(env)?;
        }
        TaskRunner::new(&self.casedir, env).execute(&self.run_config.post)?;
        self.flags.post_done = true;
        self.save()
    }
}

/// Convert a YAML key/value table into dictionary entries.
pub fn yaml_mapping_to_dict(map: &serde_yaml::Mapping) -> Dictionary {
    let mut dict = Dictionary::new();
    for (key, value) in map {
        let key = match key.as_str() {
            Some(key) => key,
            None => continue,
        };
        if let Some(value) = yaml_to_value(value) {
            dict.insert(key, value);
        }
    }
    dict
}

fn yaml_to_value(value: &serde_yaml::Value) -> Option<Value> {
    match value {
        serde_yaml::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(Value::Float)
            }
        }
        serde_yaml::Value::String(s) => Some(Value::from(s.as_str())),
        serde_yaml::Value::Sequence(seq) => {
            Some(Value::List(seq.iter().filter_map(yaml_to_value).collect()))
        }
        serde_yaml::Value::Mapping(map) => Some(Value::Dict(yaml_mapping_to_dict(map))),
        serde_yaml::Value::Null | serde_yaml::Value::Tagged(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_case(root: &Path, name: &str) -> PathBuf {
        let case = root.join(name);
        fs::create_dir_all(case.join("system")).unwrap();
        fs::create_dir_all(case.join("constant")).unwrap();
        fs::write(
            case.join("system").join("controlDict"),
            "application simpleSolver;\nendTime 10;\n",
        )
        .unwrap();
        case
    }

    fn shell_solver(script: &str) -> SolveOpts {
        SolveOpts::One(SolverOpts {
            solver: "sh".to_string(),
            solver_args: vec!["-c".to_string(), script.to_string()],
            log_file: Some("solver.log".to_string()),
        })
    }

    fn run_config(solve: SolveOpts) -> RunConfig {
        RunConfig {
            num_ranks: 1,
            reconstruct: false,
            solve,
            prep: Vec::new(),
            post: Vec::new(),
            change_inputs: serde_yaml::Mapping::new(),
        }
    }

    #[test]
    fn run_configs_accept_all_three_solve_shapes() {
        let one: RunConfig = serde_yaml::from_str("solve: simpleSolver\n").unwrap();
        assert_eq!(one.solvers_for_test(), ["simpleSolver"]);
        let block: RunConfig =
            serde_yaml::from_str("solve:\n  solver: pisoSolver\n  solver_args: [-noFunctionObjects]\n")
                .unwrap();
        assert_eq!(block.solvers_for_test(), ["pisoSolver"]);
        let many: RunConfig =
            serde_yaml::from_str("solve:\n  - solver: potentialSolver\n  - solver: simpleSolver\n")
                .unwrap();
        assert_eq!(many.solvers_for_test(), ["potentialSolver", "simpleSolver"]);
        assert_eq!(one.num_ranks, 1);
    }

    impl RunConfig {
        fn solvers_for_test(&self) -> Vec<String> {
            self.solve.solvers().into_iter().map(|s| s.solver).collect()
        }
    }

    #[test]
    fn change_inputs_rewrite_the_input_files() {
        let tmp = tempfile::tempdir().unwrap();
        let case = make_case(tmp.path(), "run1");
        let overrides: serde_yaml::Mapping = serde_yaml::from_str(
            "system/controlDict:\n  endTime: 100\n  writeInterval: 25\n",
        )
        .unwrap();
        let mut config = run_config(shell_solver("true"));
        config.change_inputs = overrides;
        let mut sim = Simulation::new("run1", &case, config);
        sim.update().unwrap();

        let dict = DictFile::load(&case, "system/controlDict").unwrap();
        assert_eq!(dict.data.get("endTime").and_then(Value::as_int), Some(100));
        assert_eq!(
            dict.data.get("writeInterval").and_then(Value::as_int),
            Some(25)
        );
        assert_eq!(
            dict.data.get("application").and_then(Value::as_str),
            Some("simpleSolver")
        );
    }

    #[test]
    fn solve_without_prep_runs_the_prep_stage_first() {
        let tmp = tempfile::tempdir().unwrap();
        let case = make_case(tmp.path(), "run1");
        let mut sim = Simulation::new("run1", &case, run_config(shell_solver("echo End")));
        assert_eq!(sim.status(), SimStatus::Setup);
        sim.solve(None).unwrap();
        assert!(sim.flags.prepped);
        assert_eq!(sim.status(), SimStatus::Solved);

        let reloaded = Simulation::load(&case).unwrap();
        assert!(reloaded.flags.prepped);
        assert!(reloaded.flags.solve_completed);
    }

    #[test]
    fn failed_solves_mark_the_case_failed_after_prep() {
        let tmp = tempfile::tempdir().unwrap();
        let case = make_case(tmp.path(), "run1");
        let mut sim = Simulation::new("run1", &case, run_config(shell_solver("exit 1")));
        assert!(sim.solve(None).is_err());

        // The prep stage still happened and was recorded before the
        // solver failure overrode the status.
        let reloaded = Simulation::load(&case).unwrap();
        assert!(reloaded.flags.prepped);
        assert!(!reloaded.flags.solve_completed);
        assert_eq!(reloaded.status(), SimStatus::Failed);
    }

    #[test]
    fn post_is_skipped_until_the_solve_completes() {
        let tmp = tempfile::tempdir().unwrap();
        let case = make_case(tmp.path(), "run1");
        let mut sim = Simulation::new("run1", &case, run_config(shell_solver("true")));
        sim.post(None).unwrap();
        assert!(!sim.flags.post_done);

        sim.solve(None).unwrap();
        sim.post(None).unwrap();
        assert_eq!(sim.status(), SimStatus::Done);
    }

    #[test]
    fn status_ladder_reflects_the_flags() {
        let tmp = tempfile::tempdir().unwrap();
        let case = make_case(tmp.path(), "run1");
        let mut sim = Simulation::new("run1", &case, run_config(shell_solver("true")));
        assert_eq!(sim.status(), SimStatus::Setup);
        sim.flags.prepped = true;
        assert_eq!(sim.status(), SimStatus::Prepped);
        sim.flags.solve_completed = true;
        assert_eq!(sim.status(), SimStatus::Solved);
        sim.flags.post_done = true;
        assert_eq!(sim.status(), SimStatus::Done);
        sim.flags.failed = true;
        assert_eq!(sim.status(), SimStatus::Failed);
    }
}
