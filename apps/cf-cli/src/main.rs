use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use cf_config::{resolve_env, Config, SolverEnv};
use cf_post::{LogProcessor, SolverLog};
use cf_run::{
    clean_case, clone_case, CleanOptions, CloneOptions, ParametricRun, RunResult, SimStatus,
    Simulation, SolverCmd, TaskFile, TaskRunner,
};

#[derive(Parser)]
#[command(name = "caseflow")]
#[command(about = "CaseFlow - CFD case automation tool", long_about = None)]
struct Cli {
    /// Solver version to run against (defaults to the configured one)
    #[arg(long, global = true)]
    version: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Cfg {
        /// Write the configuration to a file instead of stdout
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Clone a case directory's inputs into a new case
    Clone {
        /// Template case directory
        template: PathBuf,
        /// Destination directory
        dest: PathBuf,
        /// Do not copy the mesh
        #[arg(long)]
        skip_mesh: bool,
        /// Do not copy the initial conditions directory
        #[arg(long)]
        skip_zero: bool,
        /// Extra top-level glob patterns to copy
        #[arg(short, long)]
        extra: Vec<String>,
    },
    /// Execute a task file in a case directory
    Tasks {
        /// Task file to execute
        #[arg(short, long, default_value = cf_run::tasks::DEFAULT_TASK_FILE)]
        file: PathBuf,
        /// Case directory (defaults to the current directory)
        #[arg(short = 'd', long, default_value = ".")]
        case_dir: PathBuf,
    },
    /// Run an executable in a case directory, output captured to a log
    Run {
        /// Case directory
        #[arg(short = 'd', long, default_value = ".")]
        case_dir: PathBuf,
        /// Number of MPI ranks (above one runs in parallel)
        #[arg(short, long, default_value_t = 1)]
        num_ranks: usize,
        /// Log file name (defaults to "<command>.log")
        #[arg(short, long)]
        log_file: Option<String>,
        /// Executable name
        cmd_name: String,
        /// Arguments passed through to the executable
        #[arg(trailing_var_arg = true)]
        cmd_args: Vec<String>,
    },
    /// Process a solver log into residual histories
    Logs {
        /// Case directory
        #[arg(short = 'd', long, default_value = ".")]
        case_dir: PathBuf,
        /// Keep watching the log until the solver finishes
        #[arg(short, long)]
        watch: bool,
        /// Render a residual convergence plot to this file
        #[arg(short, long, value_name = "FILE")]
        plot: Option<PathBuf>,
        /// Log file to process
        log_file: String,
    },
    /// Remove solver outputs from a case directory
    Clean {
        /// Case directory
        #[arg(short = 'd', long, default_value = ".")]
        case_dir: PathBuf,
        /// Also remove the initial conditions directory
        #[arg(long)]
        remove_zero: bool,
        /// Also remove the mesh
        #[arg(long)]
        remove_mesh: bool,
        /// Glob patterns naming entries to keep
        #[arg(short, long)]
        preserve: Vec<String>,
    },
    /// Manage a parametric analysis
    #[command(subcommand)]
    Sim(SimCommands),
}

#[derive(Subcommand)]
enum SimCommands {
    /// Expand the run matrix into case directories
    Setup {
        /// Analysis file
        #[arg(short, long, default_value = "caseflow_sim.yaml")]
        file: PathBuf,
    },
    /// Run the prep stage across the cases
    Prep {
        /// Glob pattern selecting a subset of cases
        #[arg(short, long)]
        case: Option<String>,
        /// Analysis directory
        #[arg(short = 'd', long, default_value = ".")]
        sim_dir: PathBuf,
    },
    /// Run the solve stage across the cases
    Solve {
        /// Glob pattern selecting a subset of cases
        #[arg(short, long)]
        case: Option<String>,
        /// Analysis directory
        #[arg(short = 'd', long, default_value = ".")]
        sim_dir: PathBuf,
    },
    /// Run the post stage across the cases
    Post {
        /// Glob pattern selecting a subset of cases
        #[arg(short, long)]
        case: Option<String>,
        /// Analysis directory
        #[arg(short = 'd', long, default_value = ".")]
        sim_dir: PathBuf,
    },
    /// Show the status of every case
    Status {
        /// Analysis directory
        #[arg(short = 'd', long, default_value = ".")]
        sim_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("caseflow: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> RunResult<()> {
    let version = cli.version.as_deref();
    match cli.command {
        Commands::Cfg { file } => cmd_cfg(file.as_deref()),
        Commands::Clone {
            template,
            dest,
            skip_mesh,
            skip_zero,
            extra,
        } => cmd_clone(&template, &dest, skip_mesh, skip_zero, extra),
        Commands::Tasks { file, case_dir } => cmd_tasks(&file, &case_dir, version),
        Commands::Run {
            case_dir,
            num_ranks,
            log_file,
            cmd_name,
            cmd_args,
        } => cmd_run(&case_dir, num_ranks, log_file, &cmd_name, cmd_args, version),
        Commands::Logs {
            case_dir,
            watch,
            plot,
            log_file,
        } => cmd_logs(&case_dir, &log_file, watch, plot.as_deref()),
        Commands::Clean {
            case_dir,
            remove_zero,
            remove_mesh,
            preserve,
        } => cmd_clean(&case_dir, remove_zero, remove_mesh, preserve),
        Commands::Sim(sim) => match sim {
            SimCommands::Setup { file } => cmd_sim_setup(&file),
            SimCommands::Prep { case, sim_dir } => {
                cmd_sim_stage(&sim_dir, case.as_deref(), version, Stage::Prep)
            }
            SimCommands::Solve { case, sim_dir } => {
                cmd_sim_stage(&sim_dir, case.as_deref(), version, Stage::Solve)
            }
            SimCommands::Post { case, sim_dir } => {
                cmd_sim_stage(&sim_dir, case.as_deref(), version, Stage::Post)
            }
            SimCommands::Status { sim_dir } => cmd_sim_status(&sim_dir),
        },
    }
}

/// Resolve the solver environment, or proceed without one when no
/// install can be found.
fn solver_env(version: Option<&str>) -> RunResult<Option<SolverEnv>> {
    let cfg = Config::load()?;
    match resolve_env(&cfg, version) {
        Ok(env) => {
            tracing::debug!(version = %env.version, "using solver install");
            Ok(Some(env))
        }
        Err(err) => {
            tracing::warn!("no solver install found ({err}); running with the ambient environment");
            Ok(None)
        }
    }
}

fn cmd_cfg(file: Option<&Path>) -> RunResult<()> {
    let cfg = Config::load()?;
    let text = serde_yaml::to_string(&cfg).map_err(cf_run::RunError::Yaml)?;
    match file {
        Some(path) => {
            std::fs::write(path, text)?;
            println!("✓ Wrote configuration to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn cmd_clone(
    template: &Path,
    dest: &Path,
    skip_mesh: bool,
    skip_zero: bool,
    extra: Vec<String>,
) -> RunResult<()> {
    let opts = CloneOptions {
        copy_mesh: !skip_mesh,
        copy_zero: !skip_zero,
        extra_patterns: extra,
        ..CloneOptions::default()
    };
    clone_case(template, dest, &opts)?;
    println!("✓ Cloned {} -> {}", template.display(), dest.display());
    Ok(())
}

fn cmd_tasks(file: &Path, case_dir: &Path, version: Option<&str>) -> RunResult<()> {
    let tasks = TaskFile::load(&case_dir.join(file))?;
    let env = solver_env(version)?;
    TaskRunner::new(case_dir, env.as_ref()).execute(&tasks.tasks)?;
    println!("✓ Completed {} task(s)", tasks.tasks.len());
    Ok(())
}

fn cmd_run(
    case_dir: &Path,
    num_ranks: usize,
    log_file: Option<String>,
    cmd_name: &str,
    cmd_args: Vec<String>,
    version: Option<&str>,
) -> RunResult<()> {
    let env = solver_env(version)?;
    let mut cmd = SolverCmd::new(cmd_name, case_dir)
        .args(cmd_args)
        .num_ranks(num_ranks);
    if let Some(log_file) = log_file {
        cmd = cmd.log_file(log_file);
    }
    let log_name = cmd.log_name();
    cmd.run(env.as_ref())?;
    println!("✓ {} completed; output in {}", cmd_name, log_name);
    Ok(())
}

fn cmd_logs(case_dir: &Path, log_file: &str, watch: bool, plot: Option<&Path>) -> RunResult<()> {
    let mut processor = LogProcessor::new(case_dir, log_file)?;
    if watch {
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupted);
        if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            tracing::warn!("could not install interrupt handler: {err}");
        }
        processor.watch(Duration::from_millis(500), |_| {
            interrupted.load(Ordering::SeqCst)
        })?;
    } else {
        processor.process_incremental()?;
    }

    let log = SolverLog::load(case_dir)?;
    println!("Fields: {}", log.fields().join(", "));
    if let Some(plot) = plot {
        let out = case_dir.join(plot);
        cf_post::render_residual_plot(&log, &out)?;
        println!("✓ Wrote {}", out.display());
    }
    Ok(())
}

fn cmd_clean(
    case_dir: &Path,
    remove_zero: bool,
    remove_mesh: bool,
    preserve: Vec<String>,
) -> RunResult<()> {
    clean_case(
        case_dir,
        &CleanOptions {
            remove_zero,
            remove_mesh,
            preserve_patterns: preserve,
        },
    )?;
    println!("✓ Cleaned {}", case_dir.display());
    Ok(())
}

fn cmd_sim_setup(file: &Path) -> RunResult<()> {
    let options = ParametricRun::load_options(file)?;
    let parent = file.parent().filter(|p| !p.as_os_str().is_empty());
    let run = ParametricRun::setup(parent.unwrap_or(Path::new(".")), options)?;
    println!(
        "✓ Set up {} case(s) under {}",
        run.case_names().len(),
        run.root().display()
    );
    Ok(())
}

enum Stage {
    Prep,
    Solve,
    Post,
}

fn cmd_sim_stage(
    sim_dir: &Path,
    case: Option<&str>,
    version: Option<&str>,
    stage: Stage,
) -> RunResult<()> {
    let run = ParametricRun::open(sim_dir)?;
    let env = solver_env(version)?;
    let failures = match stage {
        Stage::Prep => run.prep(case, env.as_ref())?,
        Stage::Solve => run.solve(case, env.as_ref())?,
        Stage::Post => run.post(case, env.as_ref())?,
    };
    if failures == 0 {
        println!("✓ All cases completed");
        Ok(())
    } else {
        Err(cf_run::RunError::Settings(format!(
            "{failures} case(s) failed; see the logs above"
        )))
    }
}

fn cmd_sim_status(sim_dir: &Path) -> RunResult<()> {
    if let Ok(run) = ParametricRun::open(sim_dir) {
        for (name, status) in run.status()? {
            println!("  {:<24} {}", name, status);
        }
        return Ok(());
    }
    // Not an analysis root; maybe a single case.
    let sim = Simulation::load(sim_dir)?;
    println!("  {:<24} {}", sim.name, sim.status());
    if sim.status() == SimStatus::Failed {
        if let Some(logfile) = &sim.logfile {
            println!("  (solver output in {logfile})");
        }
    }
    Ok(())
}
