//! Parametric run manager.
//!
//! Fans a template case out into a matrix of cases. The analysis is
//! described in a YAML file:
//!
//! ```yaml
//! simulation:
//!   sim_name: aoa_sweep
//!   template:
//!     path: template_case
//!   simulation_setup:
//!     case_format: "aoa_{aoa:+06.1f}"
//!     constant_parameters:
//!       velocity: 30.0
//!     run_matrix:
//!       - aoa:
//!           start: 0
//!           stop: 3
//!           step: 1
//!       - aoa: [10, 20]
//!   run_configuration:
//!     solve: simpleSolver
//! ```
//!
//! Each `run_matrix` entry is an independent group; within a group the
//! cartesian product of its variables is taken, and the groups'
//! case lists are concatenated. Parameter values land in the case's
//! `simControls` file, so input files can pull them in with macros.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cf_config::SolverEnv;
use cf_dict::dictfile::SimControls;
use cf_dict::value::Value;

use crate::case::{RunConfig, SimStatus, Simulation};
use crate::core::{clone_case, CloneOptions};
use crate::{RunError, RunResult};

pub const SIM_MANIFEST: &str = "caseflow_sim.yaml";

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    fn to_dict_value(&self) -> Value {
        match self {
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Int(i) => Value::Int(*i),
            ParamValue::Float(f) => Value::Float(*f),
            ParamValue::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

/// A run-matrix variable: a numeric range, an explicit list, or a single
/// value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarSpec {
    Range {
        start: f64,
        stop: f64,
        #[serde(default = "default_step")]
        step: f64,
    },
    List(Vec<ParamValue>),
    Scalar(ParamValue),
}

fn default_step() -> f64 {
    1.0
}

impl VarSpec {
    /// Expand to the concrete value list. Ranges include the stop value
    /// when it lands on a step boundary, and integral endpoints with an
    /// integral step expand to integers.
    pub fn values(&self) -> Vec<ParamValue> {
        match self {
            VarSpec::Range { start, stop, step } => {
                let integral =
                    start.fract() == 0.0 && stop.fract() == 0.0 && step.fract() == 0.0;
                let mut out = Vec::new();
                let limit = stop + 0.5 * step;
                let mut x = *start;
                let mut n = 0u32;
                while (*step > 0.0 && x < limit) || (*step < 0.0 && x > limit) {
                    if integral {
                        out.push(ParamValue::Int(x as i64));
                    } else {
                        out.push(ParamValue::Float(x));
                    }
                    n += 1;
                    x = start + step * f64::from(n);
                }
                out
            }
            VarSpec::List(values) => values.clone(),
            VarSpec::Scalar(value) => vec![value.clone()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateOpts {
    pub path: PathBuf,
    /// Extra top-level glob patterns to carry over when cloning.
    #[serde(default)]
    pub extra_patterns: Vec<String>,
}

fn default_case_format() -> String {
    "case_{idx:04d}".to_string()
}

/// The `simulation_setup` block: case naming and the run matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupOpts {
    #[serde(default = "default_case_format")]
    pub case_format: String,
    #[serde(default)]
    pub constant_parameters: serde_yaml::Mapping,
    #[serde(default)]
    pub run_matrix: Vec<serde_yaml::Mapping>,
    /// Inline-code parameter transform hook carried by the source file
    /// format. Accepted so such files deserialize, but not executable
    /// here; setup refuses it with a clear diagnostic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_transforms: Option<serde_yaml::Value>,
}

/// The `simulation` block of an analysis file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimOptions {
    #[serde(rename = "sim_name", alias = "name")]
    pub sim_name: String,
    pub template: TemplateOpts,
    pub simulation_setup: SetupOpts,
    #[serde(rename = "run_configuration", alias = "run_config")]
    pub run_config: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimManifest {
    simulation: SimOptions,
    #[serde(default)]
    case_names: Vec<String>,
}

/// Parameter assignment for one case in the matrix.
#[derive(Debug, Clone)]
pub struct CaseParams {
    /// Position across the whole matrix.
    pub idx: usize,
    /// Run-matrix group this case came from.
    pub gid: usize,
    /// Position within the group.
    pub cid: usize,
    pub params: Vec<(String, ParamValue)>,
}

impl CaseParams {
    fn lookup(&self, key: &str) -> Option<ParamValue> {
        match key {
            "idx" => Some(ParamValue::Int(self.idx as i64)),
            "gid" => Some(ParamValue::Int(self.gid as i64)),
            "cid" => Some(ParamValue::Int(self.cid as i64)),
            _ => self
                .params
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()),
        }
    }
}

/// Expand the run matrix into per-case parameter assignments: the
/// cartesian product within each group, groups concatenated, constants
/// applied last (so they win on collision). The global `idx` counter is
/// one-based.
pub fn iter_case_params(options: &SimOptions) -> RunResult<Vec<CaseParams>> {
    let setup = &options.simulation_setup;
    if setup.apply_transforms.is_some() {
        return Err(RunError::Settings(
            "apply_transforms blocks are not supported; precompute derived parameters \
             in the run matrix or constant_parameters"
                .to_string(),
        ));
    }
    let constants = parse_param_table(&setup.constant_parameters)?;
    let mut cases = Vec::new();
    let mut idx = 1;
    for (gid, group) in setup.run_matrix.iter().enumerate() {
        let mut variables = Vec::new();
        for (key, spec) in group {
            let key = key.as_str().ok_or_else(|| {
                RunError::Settings("run_matrix parameter names must be strings".to_string())
            })?;
            let spec: VarSpec = serde_yaml::from_value(spec.clone()).map_err(|err| {
                RunError::Settings(format!("bad run_matrix entry for '{key}': {err}"))
            })?;
            variables.push((key.to_string(), spec.values()));
        }
        for (cid, combo) in cartesian(&variables).into_iter().enumerate() {
            let mut params = combo;
            params.extend(constants.clone());
            cases.push(CaseParams {
                idx,
                gid,
                cid,
                params,
            });
            idx += 1;
        }
    }
    Ok(cases)
}

fn parse_param_table(map: &serde_yaml::Mapping) -> RunResult<Vec<(String, ParamValue)>> {
    let mut out = Vec::new();
    for (key, value) in map {
        let key = key.as_str().ok_or_else(|| {
            RunError::Settings("parameter names must be strings".to_string())
        })?;
        let value: ParamValue = serde_yaml::from_value(value.clone())
            .map_err(|err| RunError::Settings(format!("bad parameter '{key}': {err}")))?;
        out.push((key.to_string(), value));
    }
    Ok(out)
}

fn cartesian(variables: &[(String, Vec<ParamValue>)]) -> Vec<Vec<(String, ParamValue)>> {
    let mut combos = vec![Vec::new()];
    for (key, values) in variables {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut combo = combo.clone();
                combo.push((key.clone(), value.clone()));
                next.push(combo);
            }
        }
        combos = next;
    }
    combos
}

/// Render a case-name template like `"aoa_{aoa:+06.1f}"` against a
/// parameter assignment. Supported conversions: `d` (integer), `f`
/// (fixed-point), `e` (scientific), or none (plain display); with
/// optional `+`, zero-padding, width, and precision.
pub fn format_case_name(template: &str, params: &CaseParams) -> RunResult<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut field = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            field.push(c);
        }
        if !closed {
            return Err(RunError::Settings(format!(
                "unbalanced braces in case format '{template}'"
            )));
        }
        let (key, spec) = match field.split_once(':') {
            Some((key, spec)) => (key, spec),
            None => (field.as_str(), ""),
        };
        let value = params.lookup(key).ok_or_else(|| {
            RunError::Settings(format!("case format references unknown parameter '{key}'"))
        })?;
        out.push_str(&format_param(&value, spec, template)?);
    }
    Ok(out)
}

fn format_param(value: &ParamValue, spec: &str, template: &str) -> RunResult<String> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    let bad_spec =
        || RunError::Settings(format!("bad format spec '{spec}' in case format '{template}'"));

    let mut rest = spec;
    let plus = rest.starts_with('+');
    if plus {
        rest = &rest[1..];
    }
    let zero = rest.starts_with('0');
    if zero {
        rest = &rest[1..];
    }
    let width_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let width: usize = if width_end > 0 {
        rest[..width_end].parse().map_err(|_| bad_spec())?
    } else {
        0
    };
    rest = &rest[width_end..];
    let precision = if let Some(stripped) = rest.strip_prefix('.') {
        let end = stripped
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(stripped.len());
        let p: usize = stripped[..end].parse().map_err(|_| bad_spec())?;
        rest = &stripped[end..];
        Some(p)
    } else {
        None
    };

    let body = match rest {
        "d" => {
            let v = value.as_i64().ok_or_else(bad_spec)?;
            if plus {
                format!("{v:+}")
            } else {
                format!("{v}")
            }
        }
        "f" => {
            let v = value.as_f64().ok_or_else(bad_spec)?;
            let prec = precision.unwrap_or(6);
            if plus {
                format!("{v:+.prec$}")
            } else {
                format!("{v:.prec$}")
            }
        }
        "e" => {
            let v = value.as_f64().ok_or_else(bad_spec)?;
            let prec = precision.unwrap_or(6);
            format!("{v:.prec$e}")
        }
        "" => value.to_string(),
        _ => return Err(bad_spec()),
    };
    Ok(if zero { pad_zeros(&body, width) } else { body })
}

/// Zero-pad after any sign, e.g. `+10.0` to `+010.0`.
fn pad_zeros(body: &str, width: usize) -> String {
    if body.len() >= width {
        return body.to_string();
    }
    let (sign, digits) = match body.strip_prefix(['+', '-']) {
        Some(digits) => (&body[..1], digits),
        None => ("", body),
    };
    let zeros = "0".repeat(width - body.len());
    format!("{sign}{zeros}{digits}")
}

/// A set of cases generated from one template, rooted in a directory
/// named after the analysis.
#[derive(Debug)]
pub struct ParametricRun {
    root: PathBuf,
    options: SimOptions,
    case_names: Vec<String>,
}

impl ParametricRun {
    /// Read the `simulation` block from an analysis file.
    pub fn load_options(path: &Path) -> RunResult<SimOptions> {
        if !path.is_file() {
            return Err(RunError::NotFound {
                kind: "analysis file",
                path: path.to_path_buf(),
            });
        }
        let manifest: SimManifest = serde_yaml::from_str(&fs::read_to_string(path)?)?;
        Ok(manifest.simulation)
    }

    /// Expand the matrix, clone the template per case, inject parameters
    /// into each case's `simControls`, and write the manifest. Refuses to
    /// reuse an existing analysis directory.
    pub fn setup(parent: &Path, options: SimOptions) -> RunResult<Self> {
        let root = parent.join(&options.sim_name);
        if root.exists() {
            return Err(RunError::AlreadyExists(root));
        }
        let template = if options.template.path.is_absolute() {
            options.template.path.clone()
        } else {
            parent.join(&options.template.path)
        };
        fs::create_dir_all(&root)?;

        let clone_opts = CloneOptions {
            extra_patterns: options.template.extra_patterns.clone(),
            ..CloneOptions::default()
        };
        let mut case_names = Vec::new();
        for case in iter_case_params(&options)? {
            let name = format_case_name(&options.simulation_setup.case_format, &case)?;
            let casedir = root.join(&name);
            clone_case(&template, &casedir, &clone_opts)?;

            let mut controls = SimControls::read_if_present(&casedir)?;
            for (key, value) in &case.params {
                controls.data_mut().insert(key, value.to_dict_value());
            }
            controls.write(&casedir)?;

            let mut sim = Simulation::new(&name, &casedir, options.run_config.clone());
            sim.update()?;
            tracing::info!(case = %name, "set up case");
            case_names.push(name);
        }

        let run = Self {
            root,
            options,
            case_names,
        };
        run.write_manifest()?;
        Ok(run)
    }

    /// Reopen a previously set-up analysis from its root directory.
    pub fn open(root: &Path) -> RunResult<Self> {
        let path = root.join(SIM_MANIFEST);
        if !path.is_file() {
            return Err(RunError::NotFound {
                kind: "analysis manifest",
                path,
            });
        }
        let manifest: SimManifest = serde_yaml::from_str(&fs::read_to_string(path)?)?;
        Ok(Self {
            root: root.to_path_buf(),
            options: manifest.simulation,
            case_names: manifest.case_names,
        })
    }

    fn write_manifest(&self) -> RunResult<()> {
        let manifest = SimManifest {
            simulation: self.options.clone(),
            case_names: self.case_names.clone(),
        };
        fs::write(
            self.root.join(SIM_MANIFEST),
            serde_yaml::to_string(&manifest)?,
        )?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn case_names(&self) -> &[String] {
        &self.case_names
    }

    pub fn prep(&self, filter: Option<&str>, env: Option<&SolverEnv>) -> RunResult<usize> {
        self.each_case(filter, env, "prep", |sim, env| sim.prep(env))
    }

    pub fn solve(&self, filter: Option<&str>, env: Option<&SolverEnv>) -> RunResult<usize> {
        self.each_case(filter, env, "solve", |sim, env| sim.solve(env))
    }

    pub fn post(&self, filter: Option<&str>, env: Option<&SolverEnv>) -> RunResult<usize> {
        self.each_case(filter, env, "post", |sim, env| sim.post(env))
    }

    /// Status of every case, in matrix order.
    pub fn status(&self) -> RunResult<Vec<(String, SimStatus)>> {
        let mut out = Vec::new();
        for name in &self.case_names {
            let sim = Simulation::load(&self.root.join(name))?;
            out.push((name.clone(), sim.status()));
        }
        Ok(out)
    }

    /// Run one lifecycle stage across the (optionally filtered) cases. A
    /// failing case is logged and counted but does not stop its siblings.
    fn each_case<F>(
        &self,
        filter: Option<&str>,
        env: Option<&SolverEnv>,
        stage: &str,
        mut f: F,
    ) -> RunResult<usize>
    where
        F: FnMut(&mut Simulation, Option<&SolverEnv>) -> RunResult<()>,
    {
        let matcher = match filter {
            Some(pattern) => Some(glob::Pattern::new(pattern)?),
            None => None,
        };
        let mut failures = 0;
        for name in &self.case_names {
            if let Some(matcher) = &matcher {
                if !matcher.matches(name) {
                    continue;
                }
            }
            let mut sim = Simulation::load(&self.root.join(name))?;
            if let Err(err) = f(&mut sim, env) {
                tracing::error!(case = %name, stage, "stage failed: {err}");
                failures += 1;
            }
        }
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{SolveOpts, SolverOpts};

    fn options_from(yaml: &str) -> SimOptions {
        let manifest: SimManifest = serde_yaml::from_str(yaml).unwrap();
        manifest.simulation
    }

    const SWEEP: &str = "\
simulation:
  sim_name: aoa_sweep
  template:
    path: template
  simulation_setup:
    case_format: \"aoa_{aoa:+06.1f}\"
    constant_parameters:
      velocity: 30.0
    run_matrix:
      - aoa:
          start: 0
          stop: 3
          step: 1
      - aoa: [10, 20]
  run_configuration:
    solve:
      solver: sh
      solver_args: [-c, \"echo End\"]
      log_file: solver.log
";

    #[test]
    fn run_matrix_groups_concatenate() {
        let options = options_from(SWEEP);
        let cases = iter_case_params(&options).unwrap();
        assert_eq!(cases.len(), 6);
        assert_eq!(cases[0].idx, 1);
        assert_eq!(cases[3].gid, 0);
        assert_eq!(cases[3].cid, 3);
        assert_eq!(cases[4].gid, 1);
        assert_eq!(cases[4].cid, 0);
        assert_eq!(cases[5].idx, 6);
        assert_eq!(cases[0].lookup("aoa"), Some(ParamValue::Int(0)));
        assert_eq!(cases[4].lookup("aoa"), Some(ParamValue::Int(10)));
        assert_eq!(cases[0].lookup("velocity"), Some(ParamValue::Float(30.0)));
    }

    #[test]
    fn group_cartesian_product_covers_all_combinations() {
        let options = options_from(
            "\
simulation:
  sim_name: grid
  template:
    path: template
  simulation_setup:
    run_matrix:
      - aoa: [0, 5]
        mach: [0.3, 0.5, 0.7]
  run_configuration:
    solve: simpleSolver
",
        );
        let cases = iter_case_params(&options).unwrap();
        assert_eq!(cases.len(), 6);
        assert_eq!(cases[0].lookup("aoa"), Some(ParamValue::Int(0)));
        assert_eq!(cases[0].lookup("mach"), Some(ParamValue::Float(0.3)));
        assert_eq!(cases[5].lookup("aoa"), Some(ParamValue::Int(5)));
        assert_eq!(cases[5].lookup("mach"), Some(ParamValue::Float(0.7)));
    }

    // The analysis-file schema as emitted by the upstream tooling: nested
    // simulation_setup, sim_name, run_configuration.
    #[test]
    fn airfoil_style_analysis_files_deserialize() {
        let options = options_from(
            "\
simulation:
  sim_name: airfoil_demo
  template:
    path: template
  simulation_setup:
    case_format: \"Re_{Re:.1e}/aoa_{aoa:+06.2f}\"
    run_matrix:
      - Re: [1.0e6, 2.0e6]
        aoa:
          start: 0.0
          stop: 2.0
          step: 2.0
    constant_parameters:
      density: 1.225
      Uinf: 15.0
  run_configuration:
    num_ranks: 1
    reconstruct: false
    solve: simpleSolver
",
        );
        assert_eq!(options.sim_name, "airfoil_demo");
        let cases = iter_case_params(&options).unwrap();
        assert_eq!(cases.len(), 4);
        let names: Vec<String> = cases
            .iter()
            .map(|c| format_case_name(&options.simulation_setup.case_format, c).unwrap())
            .collect();
        assert_eq!(names[0], "Re_1.0e6/aoa_+00.00");
        assert_eq!(names[3], "Re_2.0e6/aoa_+02.00");
    }

    #[test]
    fn constant_parameters_override_matrix_values() {
        let options = options_from(
            "\
simulation:
  sim_name: pinned
  template:
    path: template
  simulation_setup:
    constant_parameters:
      aoa: 99
    run_matrix:
      - aoa: [0, 2]
  run_configuration:
    solve: simpleSolver
",
        );
        let cases = iter_case_params(&options).unwrap();
        assert_eq!(cases.len(), 2);
        for case in &cases {
            assert_eq!(case.lookup("aoa"), Some(ParamValue::Int(99)));
        }
    }

    #[test]
    fn apply_transforms_blocks_are_refused() {
        let options = options_from(
            "\
simulation:
  sim_name: transformed
  template:
    path: template
  simulation_setup:
    run_matrix:
      - aoa: [0, 2]
    apply_transforms:
      transform_type: code
      code: \"Ux = Uinf\"
  run_configuration:
    solve: simpleSolver
",
        );
        match iter_case_params(&options) {
            Err(RunError::Settings(msg)) => assert!(msg.contains("apply_transforms")),
            other => panic!("expected a settings error, got {other:?}"),
        }
    }

    #[test]
    fn default_case_names_count_from_one() {
        let options = options_from(
            "\
simulation:
  sim_name: plain
  template:
    path: template
  simulation_setup:
    run_matrix:
      - aoa: [0, 2, 4]
  run_configuration:
    solve: simpleSolver
",
        );
        let cases = iter_case_params(&options).unwrap();
        let names: Vec<String> = cases
            .iter()
            .map(|c| format_case_name(&options.simulation_setup.case_format, c).unwrap())
            .collect();
        assert_eq!(names, ["case_0001", "case_0002", "case_0003"]);
    }

    #[test]
    fn fractional_ranges_include_the_stop_value() {
        let spec = VarSpec::Range {
            start: 0.0,
            stop: 1.0,
            step: 0.25,
        };
        let values: Vec<f64> = spec
            .values()
            .iter()
            .filter_map(ParamValue::as_f64)
            .collect();
        assert_eq!(values, [0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn case_names_render_python_style_format_specs() {
        let case = CaseParams {
            idx: 3,
            gid: 0,
            cid: 3,
            params: vec![
                ("aoa".to_string(), ParamValue::Float(10.0)),
                ("mach".to_string(), ParamValue::Float(0.5)),
                ("label".to_string(), ParamValue::Str("coarse".to_string())),
            ],
        };
        assert_eq!(
            format_case_name("case_{idx:04d}", &case).unwrap(),
            "case_0003"
        );
        assert_eq!(
            format_case_name("aoa_{aoa:+06.1f}", &case).unwrap(),
            "aoa_+010.0"
        );
        assert_eq!(
            format_case_name("m{mach:.2e}", &case).unwrap(),
            "m5.00e-1"
        );
        assert_eq!(
            format_case_name("{label}_g{gid}", &case).unwrap(),
            "coarse_g0"
        );
        assert!(format_case_name("{missing}", &case).is_err());
        assert!(format_case_name("{aoa:q}", &case).is_err());
    }

    fn make_template(root: &Path) -> PathBuf {
        let case = root.join("template");
        fs::create_dir_all(case.join("system")).unwrap();
        fs::create_dir_all(case.join("constant")).unwrap();
        fs::write(
            case.join("system").join("controlDict"),
            "application simpleSolver;\n",
        )
        .unwrap();
        case
    }

    #[test]
    fn setup_clones_one_case_per_matrix_entry() {
        let tmp = tempfile::tempdir().unwrap();
        make_template(tmp.path());
        let options = options_from(SWEEP);
        let run = ParametricRun::setup(tmp.path(), options).unwrap();
        assert_eq!(run.case_names().len(), 6);
        assert_eq!(run.case_names()[0], "aoa_+000.0");
        assert_eq!(run.case_names()[4], "aoa_+010.0");

        // Parameters landed in each case's simControls.
        let controls = SimControls::load(&run.root().join("aoa_+003.0")).unwrap();
        assert_eq!(
            controls.data().get("aoa").and_then(Value::as_int),
            Some(3)
        );
        assert_eq!(
            controls.data().get("velocity").and_then(Value::as_float),
            Some(30.0)
        );

        // Re-running setup over the same directory is refused.
        let options = options_from(SWEEP);
        assert!(matches!(
            ParametricRun::setup(tmp.path(), options),
            Err(RunError::AlreadyExists(_))
        ));

        // The manifest round-trips.
        let reopened = ParametricRun::open(run.root()).unwrap();
        assert_eq!(reopened.case_names(), run.case_names());
        for (_, status) in reopened.status().unwrap() {
            assert_eq!(status, SimStatus::Setup);
        }
    }

    #[test]
    fn one_failing_case_does_not_stop_its_siblings() {
        let tmp = tempfile::tempdir().unwrap();
        make_template(tmp.path());
        let mut options = options_from(SWEEP);
        // Solver fails only where a FAIL marker exists.
        options.run_config.solve = SolveOpts::One(SolverOpts {
            solver: "sh".to_string(),
            solver_args: vec!["-c".to_string(), "test ! -f FAIL".to_string()],
            log_file: Some("solver.log".to_string()),
        });
        let run = ParametricRun::setup(tmp.path(), options).unwrap();
        fs::write(run.root().join("aoa_+002.0").join("FAIL"), "").unwrap();

        let failures = run.solve(None, None).unwrap();
        assert_eq!(failures, 1);
        let status = run.status().unwrap();
        for (name, st) in status {
            if name == "aoa_+002.0" {
                assert_eq!(st, SimStatus::Failed);
            } else {
                assert_eq!(st, SimStatus::Solved);
            }
        }
    }

    #[test]
    fn filters_select_a_subset_of_cases() {
        let tmp = tempfile::tempdir().unwrap();
        make_template(tmp.path());
        let options = options_from(SWEEP);
        let run = ParametricRun::setup(tmp.path(), options).unwrap();
        run.solve(Some("aoa_+0[12]0.0"), None).unwrap();
        let status = run.status().unwrap();
        let solved: Vec<_> = status
            .iter()
            .filter(|(_, st)| *st == SimStatus::Solved)
            .map(|(name, _)| name.clone())
            .collect();
        assert_eq!(solved, ["aoa_+010.0", "aoa_+020.0"]);
    }
}
