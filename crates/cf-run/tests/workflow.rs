//! End-to-end workflow: clone a template into a parametric analysis,
//! run a scripted "solver" through every case, and post-process the
//! logs.

use std::fs;
use std::path::{Path, PathBuf};

use cf_dict::dictfile::DictFile;
use cf_dict::value::Value;
use cf_post::SolverLog;
use cf_run::{ParametricRun, SimStatus, Task, TaskFile, TaskRunner};

fn make_template(root: &Path) -> PathBuf {
    let case = root.join("template");
    fs::create_dir_all(case.join("system")).unwrap();
    fs::create_dir_all(case.join("constant")).unwrap();
    fs::write(
        case.join("system").join("controlDict"),
        "application simpleSolver;\nendTime 10;\n",
    )
    .unwrap();
    // The "solver" emits a short residual history and exits cleanly.
    fs::create_dir_all(case.join("scripts")).unwrap();
    fs::write(
        case.join("scripts").join("fake_solver.sh"),
        "#!/bin/sh
for t in 1 2 3; do
  echo \"Time = $t\"
  echo \"GAMG:  Solving for p, Initial residual = 0.$t, Final residual = 0.0$t, No Iterations 4\"
done
echo End
",
    )
    .unwrap();
    case
}

const SIM_FILE: &str = "\
simulation:
  sim_name: sweep
  template:
    path: template
  simulation_setup:
    case_format: \"aoa_{aoa:03d}\"
    run_matrix:
      - aoa:
          start: 0
          stop: 2
          step: 1
  run_configuration:
    solve:
      solver: sh
      solver_args: [scripts/fake_solver.sh]
      log_file: solver.log
    change_inputs:
      system/controlDict:
        endTime: 50
    post:
      - process_logs:
          log_file: solver.log
";

#[test]
fn parametric_setup_solve_post_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    make_template(tmp.path());
    fs::write(tmp.path().join("caseflow_sim.yaml"), SIM_FILE).unwrap();

    let options = ParametricRun::load_options(&tmp.path().join("caseflow_sim.yaml")).unwrap();
    let run = ParametricRun::setup(tmp.path(), options).unwrap();
    assert_eq!(run.case_names(), ["aoa_000", "aoa_001", "aoa_002"]);

    // Input overrides applied at setup time.
    let dict = DictFile::load(&run.root().join("aoa_001"), "system/controlDict").unwrap();
    assert_eq!(dict.data.get("endTime").and_then(Value::as_int), Some(50));

    assert_eq!(run.solve(None, None).unwrap(), 0);
    assert_eq!(run.post(None, None).unwrap(), 0);
    for (_, status) in run.status().unwrap() {
        assert_eq!(status, SimStatus::Done);
    }

    // Post stage extracted one residual sample per time step.
    let log = SolverLog::load(&run.root().join("aoa_002")).unwrap();
    assert_eq!(log.fields(), ["p"]);
    let samples = log.residuals("p").unwrap();
    assert_eq!(samples.len(), 3);
    assert!((samples[2].initial - 0.3).abs() < 1e-12);
}

#[test]
fn task_files_drive_a_case_without_a_matrix() {
    let tmp = tempfile::tempdir().unwrap();
    let case = make_template(tmp.path());
    fs::write(
        case.join("caseflow_tasks.yaml"),
        "\
tasks:
  - run_command:
      cmd_name: sh
      cmd_args: [scripts/fake_solver.sh]
      log_file: solver.log
  - process_logs:
      log_file: solver.log
",
    )
    .unwrap();

    let tasks = TaskFile::load(&case.join("caseflow_tasks.yaml")).unwrap();
    assert_eq!(tasks.tasks.len(), 2);
    assert!(matches!(tasks.tasks[1], Task::ProcessLogs { .. }));
    TaskRunner::new(&case, None).execute(&tasks.tasks).unwrap();
    assert!(case.join("logs").join("p.dat").is_file());
}
