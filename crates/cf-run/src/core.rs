//! Case directory utilities: clone, clean, discovery.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{RunError, RunResult};

/// What to carry over when cloning a case directory.
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Copy the `0/` (or `0.orig/`) initial conditions directory.
    pub copy_zero: bool,
    /// Copy a `scripts/` directory if the template has one.
    pub copy_scripts: bool,
    /// Copy the mesh under `constant/polyMesh`.
    pub copy_mesh: bool,
    /// Additional top-level glob patterns to copy, e.g. `"*.yaml"`.
    pub extra_patterns: Vec<String>,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            copy_zero: true,
            copy_scripts: true,
            copy_mesh: true,
            extra_patterns: Vec::new(),
        }
    }
}

/// What to remove when cleaning a case directory.
#[derive(Debug, Clone)]
pub struct CleanOptions {
    /// Also remove the `0/` directory.
    pub remove_zero: bool,
    /// Also remove `constant/polyMesh`.
    pub remove_mesh: bool,
    /// Glob patterns naming entries that must survive the clean.
    pub preserve_patterns: Vec<String>,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            remove_zero: false,
            remove_mesh: false,
            preserve_patterns: Vec::new(),
        }
    }
}

/// Does `path` look like a solver case directory?
///
/// The check is structural: `system/` and `constant/` subdirectories and
/// a `system/controlDict` file.
pub fn is_case_dir(path: &Path) -> bool {
    path.is_dir()
        && path.join("system").is_dir()
        && path.join("constant").is_dir()
        && path.join("system").join("controlDict").is_file()
}

/// Recursively collect case directories under `root`, up to `depth`
/// levels deep. A directory that is itself a case is not descended into.
pub fn find_case_dirs(root: &Path, depth: usize) -> RunResult<Vec<PathBuf>> {
    let mut cases = Vec::new();
    if !root.is_dir() {
        return Err(RunError::NotFound {
            kind: "directory",
            path: root.to_path_buf(),
        });
    }
    walk_cases(root, depth, &mut cases)?;
    cases.sort();
    Ok(cases)
}

fn walk_cases(dir: &Path, depth: usize, cases: &mut Vec<PathBuf>) -> RunResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if is_case_dir(&path) {
            cases.push(path);
        } else if depth > 0 {
            walk_cases(&path, depth - 1, cases)?;
        }
    }
    Ok(())
}

/// Number of `processor*` decomposition directories in a case.
pub fn proc_dir_count(casedir: &Path) -> RunResult<usize> {
    let mut count = 0;
    for entry in fs::read_dir(casedir)? {
        let path = entry?.path();
        if path.is_dir()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("processor"))
        {
            count += 1;
        }
    }
    Ok(count)
}

/// Clone the input structure of `template` into a fresh `dest` directory.
///
/// Copies `system/`, and optionally `constant/` (mesh included or not),
/// `0/`, `0.orig/`, `scripts/` and anything matched by the extra
/// patterns. Refuses to overwrite an existing destination.
pub fn clone_case(template: &Path, dest: &Path, opts: &CloneOptions) -> RunResult<()> {
    if !is_case_dir(template) {
        return Err(RunError::NotFound {
            kind: "case directory",
            path: template.to_path_buf(),
        });
    }
    if dest.exists() {
        return Err(RunError::AlreadyExists(dest.to_path_buf()));
    }
    fs::create_dir_all(dest)?;

    copy_tree(&template.join("system"), &dest.join("system"), &[])?;
    let constant_ignore: &[&str] = if opts.copy_mesh { &[] } else { &["polyMesh"] };
    copy_tree(
        &template.join("constant"),
        &dest.join("constant"),
        constant_ignore,
    )?;
    if opts.copy_zero {
        for zero in ["0", "0.orig"] {
            let src = template.join(zero);
            if src.is_dir() {
                copy_tree(&src, &dest.join(zero), &[])?;
            }
        }
    }
    if opts.copy_scripts {
        let scripts = template.join("scripts");
        if scripts.is_dir() {
            copy_tree(&scripts, &dest.join("scripts"), &[])?;
        }
    }
    for pattern in &opts.extra_patterns {
        let matcher = glob::Pattern::new(pattern)?;
        for entry in fs::read_dir(template)? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if !matcher.matches(&name) {
                continue;
            }
            let target = dest.join(&name);
            if path.is_dir() {
                if !target.exists() {
                    copy_tree(&path, &target, &[])?;
                }
            } else {
                fs::copy(&path, &target)?;
            }
        }
    }
    tracing::info!(
        template = %template.display(),
        dest = %dest.display(),
        "cloned case"
    );
    Ok(())
}

/// Remove solver outputs from a case directory: time directories,
/// `processor*` decompositions, `logs/`, log files and `.foam` markers.
///
/// The input structure (`system/`, `constant/`, `0/`, YAML files) is kept
/// unless the options say otherwise, and preserve patterns always win.
pub fn clean_case(casedir: &Path, opts: &CleanOptions) -> RunResult<()> {
    if !casedir.is_dir() {
        return Err(RunError::NotFound {
            kind: "case directory",
            path: casedir.to_path_buf(),
        });
    }
    let preserve = opts
        .preserve_patterns
        .iter()
        .map(|p| glob::Pattern::new(p))
        .collect::<Result<Vec<_>, _>>()?;

    for entry in fs::read_dir(casedir)? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if preserve.iter().any(|p| p.matches(&name)) {
            continue;
        }
        let remove = if path.is_dir() {
            match name.as_str() {
                "system" | "constant" | "scripts" => false,
                "0" | "0.orig" => opts.remove_zero,
                "logs" => true,
                _ => name.starts_with("processor") || is_time_dir(&name),
            }
        } else {
            name.ends_with(".log") || name.ends_with(".foam")
        };
        if remove {
            tracing::debug!(entry = %path.display(), "removing");
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
    }
    if opts.remove_mesh {
        let mesh = casedir.join("constant").join("polyMesh");
        if mesh.is_dir() {
            fs::remove_dir_all(&mesh)?;
        }
    }
    tracing::info!(case = %casedir.display(), "cleaned case");
    Ok(())
}

/// Time directories are fully numeric names other than `0`: `0.5`,
/// `100`, `1e-05`.
fn is_time_dir(name: &str) -> bool {
    name != "0" && name.parse::<f64>().is_ok()
}

/// Recursive directory copy, skipping top-level entries named in
/// `ignore`. Follows symlinks.
pub(crate) fn copy_tree(src: &Path, dest: &Path, ignore: &[&str]) -> RunResult<()> {
    if !src.is_dir() {
        return Err(RunError::NotFound {
            kind: "directory",
            path: src.to_path_buf(),
        });
    }
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if ignore.contains(&name.as_str()) {
            continue;
        }
        let target = dest.join(&name);
        if path.is_dir() {
            copy_subtree(&path, &target)?;
        } else {
            fs::copy(&path, &target)?;
        }
    }
    Ok(())
}

fn copy_subtree(src: &Path, dest: &Path) -> RunResult<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let path = entry?.path();
        let name = entry_name(&path);
        let target = dest.join(&name);
        if path.is_dir() {
            copy_subtree(&path, &target)?;
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
