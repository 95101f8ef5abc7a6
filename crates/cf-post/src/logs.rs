//! Solver log scanning.
//!
//! [`LogProcessor`] reads a solver log line by line and extracts residual
//! histories plus run markers (completion, convergence, failure). Each
//! field's samples are appended to `logs/<field>.dat` in a whitespace
//! tabular format, and the scan position is persisted to
//! `logs/.log_state.json` so an in-progress run can be re-scanned
//! incrementally instead of from the start. [`SolverLog`] is the read side,
//! serving previously processed data.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{PostError, PostResult};

const STATE_FILE: &str = ".log_state.json";
const LOGS_DIR: &str = "logs";

/// One residual report from the solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualSample {
    pub time: f64,
    /// 1-based predictor sub-iteration within the timestep.
    pub subiter: u32,
    pub initial: f64,
    pub final_residual: f64,
    pub iterations: u32,
}

/// Persisted scan state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogState {
    /// Log file name this state was extracted from.
    pub logfile: String,
    /// Last simulated time seen.
    pub time: f64,
    pub converged: bool,
    pub solve_completed: bool,
    pub failed: bool,
    /// Iteration at which a steady solver reported convergence, -1 if none.
    pub converged_time: i64,
    /// Fields with residual output, in first-seen order.
    pub fields: Vec<String>,
    /// Byte offset of the first unprocessed line.
    pub offset: u64,
}

impl LogState {
    fn new(logfile: &str) -> Self {
        LogState {
            logfile: logfile.to_string(),
            time: 0.0,
            converged: false,
            solve_completed: false,
            failed: false,
            converged_time: -1,
            fields: Vec::new(),
            offset: 0,
        }
    }

    /// Read the persisted state from a logs directory, if any.
    pub fn load(logs_dir: &Path) -> PostResult<Option<LogState>> {
        let path = logs_dir.join(STATE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save(&self, logs_dir: &Path) -> PostResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(logs_dir.join(STATE_FILE), text)?;
        Ok(())
    }
}

struct Patterns {
    time: Regex,
    residual: Regex,
    convergence: Regex,
    completion: Regex,
    exiting: Regex,
    fatal_error: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Patterns {
            time: Regex::new(r"^Time = (\S+)")?,
            residual: Regex::new(
                r"(\S+): *Solving for (\S+), Initial residual = (\S+), Final residual = (\S+), No Iterations (\S+)",
            )?,
            convergence: Regex::new(r"(\S+) solution converged in (\S+) iterations")?,
            completion: Regex::new(r"^End$")?,
            exiting: Regex::new(r"^.*(CAELUS|OpenFOAM).*exiting")?,
            fatal_error: Regex::new(r"^.*(CAELUS|OpenFOAM).*FATAL ERROR")?,
        })
    }
}

/// Scans solver logs into per-field residual files and a state record.
pub struct LogProcessor {
    logs_dir: PathBuf,
    logfile: PathBuf,
    patterns: Patterns,
    state: LogState,
    /// Sub-iteration counters, reset at each `Time =` boundary.
    subiter: HashMap<String, u32>,
    series: BTreeMap<String, Vec<ResidualSample>>,
    writers: HashMap<String, BufWriter<File>>,
    time_str: String,
    append: bool,
}

impl LogProcessor {
    /// Processor for `logfile` (relative to `case_dir`), writing extracted
    /// data under `<case_dir>/logs/`.
    pub fn new(case_dir: &Path, logfile: &str) -> PostResult<Self> {
        let logs_dir = case_dir.join(LOGS_DIR);
        fs::create_dir_all(&logs_dir)?;
        Ok(LogProcessor {
            logs_dir,
            logfile: case_dir.join(logfile),
            patterns: Patterns::compile()?,
            state: LogState::new(logfile),
            subiter: HashMap::new(),
            series: BTreeMap::new(),
            writers: HashMap::new(),
            time_str: "0".to_string(),
            append: false,
        })
    }

    /// Process the log file from the beginning, replacing previously
    /// extracted data.
    pub fn process(&mut self) -> PostResult<&LogState> {
        let logfile = self.logfile_name();
        self.state = LogState::new(&logfile);
        self.subiter.clear();
        self.series.clear();
        self.writers.clear();
        self.time_str = "0".to_string();
        self.append = false;
        self.scan()
    }

    /// Process only log content appended since the last scan.
    ///
    /// Falls back to a full scan when no saved state exists, the state
    /// belongs to a different log file, or the log shrank (a restarted run).
    pub fn process_incremental(&mut self) -> PostResult<&LogState> {
        let saved = LogState::load(&self.logs_dir)?;
        let file_len = fs::metadata(&self.logfile)
            .map(|m| m.len())
            .unwrap_or(0);
        match saved {
            Some(state) if state.logfile == self.logfile_name() && state.offset <= file_len => {
                self.state = state;
                self.append = true;
                self.scan()
            }
            _ => self.process(),
        }
    }

    /// Poll the log file until the run completes, fails, or `stop` returns
    /// true. The state after each scan pass is handed to `stop`.
    pub fn watch(
        &mut self,
        poll: Duration,
        mut stop: impl FnMut(&LogState) -> bool,
    ) -> PostResult<LogState> {
        loop {
            self.process_incremental()?;
            if self.state.solve_completed || self.state.failed || stop(&self.state) {
                return Ok(self.state.clone());
            }
            std::thread::sleep(poll);
        }
    }

    pub fn state(&self) -> &LogState {
        &self.state
    }

    /// Residual samples collected during this processor's scans.
    pub fn residuals(&self, field: &str) -> Option<&[ResidualSample]> {
        self.series.get(field).map(Vec::as_slice)
    }

    fn logfile_name(&self) -> String {
        self.logfile
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn scan(&mut self) -> PostResult<&LogState> {
        let file = File::open(&self.logfile)
            .map_err(|_| PostError::LogNotFound(self.logfile.clone()))?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(self.state.offset))?;
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            // a partial trailing line belongs to the next scan pass
            if !line.ends_with('\n') {
                break;
            }
            self.state.offset += read as u64;
            self.process_line(line.trim_end())?;
        }
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        self.state.save(&self.logs_dir)?;
        Ok(&self.state)
    }

    fn process_line(&mut self, line: &str) -> PostResult<()> {
        if let Some(caps) = self.patterns.time.captures(line) {
            if let Ok(time) = caps[1].parse::<f64>() {
                self.state.time = time;
                self.time_str = caps[1].to_string();
                self.subiter.clear();
            }
            return Ok(());
        }
        if let Some(caps) = self.patterns.residual.captures(line) {
            return self.record_residual(&caps);
        }
        if let Some(caps) = self.patterns.convergence.captures(line) {
            if let Ok(iter) = caps[2].parse::<i64>() {
                self.state.converged = true;
                self.state.converged_time = iter;
            }
            return Ok(());
        }
        if self.patterns.completion.is_match(line) {
            self.state.solve_completed = true;
            return Ok(());
        }
        if self.patterns.fatal_error.is_match(line) || self.patterns.exiting.is_match(line) {
            self.state.failed = true;
            self.state.converged = false;
            self.state.solve_completed = false;
        }
        Ok(())
    }

    fn record_residual(&mut self, caps: &regex::Captures<'_>) -> PostResult<()> {
        let solver = &caps[1];
        let field = caps[2].to_string();
        // malformed numbers: skip the line rather than aborting the scan
        let (initial, final_residual, iterations) = match (
            caps[3].parse::<f64>(),
            caps[4].parse::<f64>(),
            caps[5].parse::<u32>(),
        ) {
            (Ok(i), Ok(f), Ok(n)) => (i, f, n),
            _ => {
                tracing::debug!(line = %&caps[0], "skipping malformed residual line");
                return Ok(());
            }
        };

        let counter = self.subiter.entry(field.clone()).or_insert(0);
        *counter += 1;
        let subiter = *counter;

        if !self.state.fields.contains(&field) {
            self.state.fields.push(field.clone());
        }
        let sample = ResidualSample {
            time: self.state.time,
            subiter,
            initial,
            final_residual,
            iterations,
        };
        self.series.entry(field.clone()).or_default().push(sample);

        let time_str = self.time_str.clone();
        let writer = self.writer_for(&field, solver)?;
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}",
            time_str, subiter, &caps[3], &caps[4], &caps[5]
        )?;
        Ok(())
    }

    fn writer_for(&mut self, field: &str, solver: &str) -> PostResult<&mut BufWriter<File>> {
        match self.writers.entry(field.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(slot) => {
                let path = self.logs_dir.join(format!("{}.dat", field));
                let fresh = !self.append || !path.exists();
                let file = if fresh {
                    File::create(&path)?
                } else {
                    OpenOptions::new().append(true).open(&path)?
                };
                let mut writer = BufWriter::new(file);
                if fresh {
                    writeln!(writer, "# Field: {}; Solver: {}", field, solver)?;
                    writeln!(
                        writer,
                        "Time SubIteration InitialResidual FinalResidual NoIterations"
                    )?;
                }
                Ok(slot.insert(writer))
            }
        }
    }
}

/// Read access to previously processed log data.
pub struct SolverLog {
    logs_dir: PathBuf,
    pub state: LogState,
}

impl SolverLog {
    /// Load the processed data for a case. Errors when the case has no
    /// processed logs yet.
    pub fn load(case_dir: &Path) -> PostResult<Self> {
        let logs_dir = case_dir.join(LOGS_DIR);
        let state =
            LogState::load(&logs_dir)?.ok_or_else(|| PostError::NoState(logs_dir.clone()))?;
        if state.failed {
            tracing::warn!(case = %case_dir.display(), "log reports a failed run");
        } else if !state.solve_completed {
            tracing::warn!(case = %case_dir.display(), "solve has not completed");
        }
        Ok(SolverLog { logs_dir, state })
    }

    pub fn fields(&self) -> &[String] {
        &self.state.fields
    }

    /// Residual time history for a field, read from its `.dat` file.
    pub fn residuals(&self, field: &str) -> PostResult<Vec<ResidualSample>> {
        if !self.state.fields.iter().any(|f| f == field) {
            return Err(PostError::UnknownField {
                field: field.to_string(),
                available: self.state.fields.clone(),
            });
        }
        let path = self.logs_dir.join(format!("{}.dat", field));
        let text = fs::read_to_string(path)?;
        let mut samples = Vec::new();
        for line in text.lines() {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() != 5 {
                continue;
            }
            let parsed = (
                cols[0].parse::<f64>(),
                cols[1].parse::<u32>(),
                cols[2].parse::<f64>(),
                cols[3].parse::<f64>(),
                cols[4].parse::<u32>(),
            );
            if let (Ok(time), Ok(subiter), Ok(initial), Ok(final_residual), Ok(iterations)) = parsed
            {
                samples.push(ResidualSample {
                    time,
                    subiter,
                    initial,
                    final_residual,
                    iterations,
                });
            }
        }
        Ok(samples)
    }
}
