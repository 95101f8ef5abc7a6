//! Solver installation discovery and execution environments.
//!
//! Installed solver versions live under a root directory as `caelus-VERSION`
//! trees. An installation is resolved either from the configured version
//! list or by scanning the root, and exposes the environment variables a
//! solver process needs (`PATH`, library path, project variables).

use std::cmp::Ordering;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::{Config, SolverVersionCfg};
use crate::{ConfigError, ConfigResult};

/// A resolved solver installation.
#[derive(Debug, Clone)]
pub struct SolverEnv {
    pub version: String,
    /// Install tree, e.g. `~/Caelus/caelus-10.11`.
    pub project_dir: PathBuf,
    mpi_root: Option<PathBuf>,
    build_dir: Option<PathBuf>,
}

impl SolverEnv {
    fn new(version: String, project_dir: PathBuf, mpi_root: Option<PathBuf>) -> Self {
        let build_dir = find_build_dir(&project_dir);
        SolverEnv {
            version,
            project_dir,
            mpi_root,
            build_dir,
        }
    }

    fn from_cfg(cfg: &SolverVersionCfg, root: &Path) -> Self {
        let project_dir = cfg
            .path
            .clone()
            .unwrap_or_else(|| root.join(format!("caelus-{}", cfg.version)));
        Self::new(cfg.version.clone(), project_dir, cfg.mpi_root.clone())
    }

    /// Directory holding solver executables.
    pub fn bin_dir(&self) -> PathBuf {
        match &self.build_dir {
            Some(build) => build.join("bin"),
            None => self.project_dir.join("bin"),
        }
    }

    /// Directory holding solver shared libraries.
    pub fn lib_dir(&self) -> PathBuf {
        match &self.build_dir {
            Some(build) => build.join("lib"),
            None => self.project_dir.join("lib"),
        }
    }

    /// MPI installation used by this solver build.
    pub fn mpi_dir(&self) -> Option<PathBuf> {
        if let Some(root) = &self.mpi_root {
            return Some(root.clone());
        }
        let pattern = self.project_dir.join("external").join("*").join("openmpi-*");
        glob::glob(&pattern.to_string_lossy())
            .ok()
            .and_then(|mut paths| paths.find_map(Result::ok))
    }

    pub fn mpi_bindir(&self) -> Option<PathBuf> {
        self.mpi_dir().map(|d| d.join("bin"))
    }

    pub fn mpi_libdir(&self) -> Option<PathBuf> {
        self.mpi_dir().map(|d| d.join("lib"))
    }

    /// Environment variables for launching solver executables: solver and
    /// MPI directories prepended to the search paths, plus the project
    /// variables solver scripts expect.
    pub fn environ(&self) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = Vec::new();
        if let Some(root) = self.project_dir.parent() {
            vars.push(("PROJECT_DIR".into(), root.to_string_lossy().into_owned()));
        }
        vars.push(("PROJECT".into(), format!("caelus-{}", self.version)));
        vars.push((
            "CAELUS_PROJECT_DIR".into(),
            self.project_dir.to_string_lossy().into_owned(),
        ));
        vars.push(("MPI_BUFFER_SIZE".into(), "20000000".into()));
        if let Some(mpi) = self.mpi_dir() {
            vars.push(("OPAL_PREFIX".into(), mpi.to_string_lossy().into_owned()));
        }

        let mut path_entries = vec![self.bin_dir()];
        path_entries.extend(self.mpi_bindir());
        vars.push(("PATH".into(), prepend_paths(path_entries, "PATH")));

        let mut lib_entries = vec![self.lib_dir()];
        lib_entries.extend(self.mpi_libdir());
        vars.push((
            "LD_LIBRARY_PATH".into(),
            prepend_paths(lib_entries, "LD_LIBRARY_PATH"),
        ));
        vars
    }

    fn dir_mtime(&self) -> SystemTime {
        fs::metadata(&self.project_dir)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

fn prepend_paths(entries: Vec<PathBuf>, var: &str) -> String {
    let existing = env::var_os(var);
    let tail = existing
        .as_ref()
        .map(|v| env::split_paths(v).collect::<Vec<_>>())
        .unwrap_or_default();
    let joined = env::join_paths(entries.into_iter().chain(tail))
        .unwrap_or_default();
    joined.to_string_lossy().into_owned()
}

/// Pick the newest-looking platform build directory, preferring optimized
/// builds.
fn find_build_dir(project_dir: &Path) -> Option<PathBuf> {
    let base = project_dir.join("platforms");
    let mut dirs: Vec<PathBuf> = fs::read_dir(&base)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs.iter()
        .find(|d| {
            d.file_name()
                .map(|n| n.to_string_lossy().ends_with("Opt"))
                .unwrap_or(false)
        })
        .cloned()
        .or_else(|| dirs.into_iter().next())
}

/// Scan `root` for `caelus-*` installation directories.
pub fn discover_versions(root: &Path) -> Vec<SolverEnv> {
    let pattern = root.join("[Cc]aelus-*");
    let mut found = Vec::new();
    let paths = match glob::glob(&pattern.to_string_lossy()) {
        Ok(paths) => paths,
        Err(err) => {
            tracing::warn!(%err, root = %root.display(), "bad discovery pattern");
            return found;
        }
    };
    for path in paths.filter_map(Result::ok) {
        if !path.is_dir() {
            continue;
        }
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };
        let version = match name.rsplit('-').next() {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => continue,
        };
        found.push(SolverEnv::new(version, path, None));
    }
    found
}

/// Resolve a solver environment from the configuration.
///
/// Explicitly configured versions take precedence over directory scanning;
/// entries whose install directory does not exist are dropped. With no
/// version requested, the configured default applies, and `latest` selects
/// the highest version (numeric component order, falling back to directory
/// modification time for versions that do not parse).
pub fn resolve_env(cfg: &Config, version: Option<&str>) -> ConfigResult<SolverEnv> {
    let root = cfg.solver_root()?;
    let mut candidates: Vec<SolverEnv> = cfg
        .solver
        .versions
        .iter()
        .map(|v| SolverEnv::from_cfg(v, &root))
        .filter(|env| env.project_dir.is_dir())
        .collect();
    if candidates.is_empty() {
        candidates = discover_versions(&root);
    }
    if candidates.is_empty() {
        return Err(ConfigError::NoVersions(root));
    }

    let requested = version
        .map(str::to_string)
        .unwrap_or_else(|| cfg.solver.default.clone());
    if requested != "latest" {
        return candidates
            .into_iter()
            .find(|env| env.version == requested)
            .ok_or(ConfigError::UnknownVersion(requested));
    }

    candidates.sort_by(compare_versions);
    let latest = candidates.pop().ok_or(ConfigError::NoVersions(root))?;
    tracing::debug!(version = %latest.version, "resolved latest solver version");
    Ok(latest)
}

fn compare_versions(a: &SolverEnv, b: &SolverEnv) -> Ordering {
    match (version_components(&a.version), version_components(&b.version)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.dir_mtime().cmp(&b.dir_mtime()),
    }
}

/// Numeric dotted-version components, or None when any part is not a
/// number.
fn version_components(version: &str) -> Option<Vec<u64>> {
    version
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_install(root: &Path, version: &str) -> PathBuf {
        let dir = root.join(format!("caelus-{}", version));
        fs::create_dir_all(dir.join("platforms/linux64g++DPOpt/bin")).unwrap();
        dir
    }

    fn cfg_with_root(root: &Path) -> Config {
        let mut cfg = Config::default();
        cfg.solver.root = Some(root.to_path_buf());
        cfg
    }

    #[test]
    fn discovery_finds_installs() {
        let tmp = tempfile::tempdir().unwrap();
        make_install(tmp.path(), "7.04");
        make_install(tmp.path(), "10.11");
        let mut found = discover_versions(tmp.path());
        found.sort_by(compare_versions);
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].version, "10.11");
    }

    #[test]
    fn latest_compares_numerically_not_lexically() {
        let tmp = tempfile::tempdir().unwrap();
        make_install(tmp.path(), "9.04");
        make_install(tmp.path(), "10.11");
        let cfg = cfg_with_root(tmp.path());
        let env = resolve_env(&cfg, None).unwrap();
        assert_eq!(env.version, "10.11");
    }

    #[test]
    fn explicit_version_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        make_install(tmp.path(), "10.11");
        let cfg = cfg_with_root(tmp.path());
        assert!(resolve_env(&cfg, Some("10.11")).is_ok());
        assert!(matches!(
            resolve_env(&cfg, Some("8.20")),
            Err(ConfigError::UnknownVersion(_))
        ));
    }

    #[test]
    fn configured_versions_take_precedence_over_discovery() {
        let tmp = tempfile::tempdir().unwrap();
        make_install(tmp.path(), "10.11");
        let custom = tmp.path().join("custom-build");
        fs::create_dir_all(&custom).unwrap();

        let mut cfg = cfg_with_root(tmp.path());
        cfg.solver.versions.push(SolverVersionCfg {
            version: "dev".to_string(),
            path: Some(custom.clone()),
            mpi_root: None,
        });
        let env = resolve_env(&cfg, Some("dev")).unwrap();
        assert_eq!(env.project_dir, custom);
    }

    #[test]
    fn missing_configured_paths_fall_back_to_discovery() {
        let tmp = tempfile::tempdir().unwrap();
        make_install(tmp.path(), "10.11");
        let mut cfg = cfg_with_root(tmp.path());
        cfg.solver.versions.push(SolverVersionCfg {
            version: "99.0".to_string(),
            path: Some(tmp.path().join("nowhere")),
            mpi_root: None,
        });
        let env = resolve_env(&cfg, None).unwrap();
        assert_eq!(env.version, "10.11");
    }

    #[test]
    fn environ_prepends_solver_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = make_install(tmp.path(), "10.11");
        let env = SolverEnv::new("10.11".to_string(), dir.clone(), None);
        let vars = env.environ();
        let path = vars
            .iter()
            .find(|(k, _)| k == "PATH")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(path.contains("linux64g++DPOpt"));
        let project = vars.iter().find(|(k, _)| k == "CAELUS_PROJECT_DIR").unwrap();
        assert_eq!(project.1, dir.to_string_lossy());
    }
}
