//! Portable interpreter lines and permissions for generated scripts

use anyhow::{bail, Result};
use dockprep_core::fs::FileType;
use dockprep_core::FileSystem;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SHEBANG: &[u8] = b"#!";
const SOURCE_RUNTIME: &str = "ruby";

/// Outcome of a normalization pass. Files without an interpreter line are
/// not listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub rewritten: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
}

/// Rewrites a `#!` line whose interpreter is Ruby to `#!/usr/bin/env <install_name>`.
///
/// Interpreter arguments survive. For `env` lines, `env` flags and variable
/// assignments before the interpreter are dropped. Returns `None` for
/// anything else.
pub fn portable_shebang(line: &str, install_name: &str) -> Option<String> {
    let mut tokens = line.strip_prefix("#!")?.split_whitespace();
    let mut interpreter = tokens.next()?;

    if file_name(interpreter) == "env" {
        interpreter = tokens.find(|t| !t.starts_with('-') && !t.contains('='))?;
    }

    if !file_name(interpreter).contains(SOURCE_RUNTIME) {
        return None;
    }

    let mut rewritten = format!("#!/usr/bin/env {}", install_name);
    for arg in tokens {
        rewritten.push(' ');
        rewritten.push_str(arg);
    }
    Some(rewritten)
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Normalized bytes of a script that starts with `#!`.
fn normalize_script(content: &[u8], install_name: &str) -> Vec<u8> {
    let (first, rest) = match content.iter().position(|&b| b == b'\n') {
        Some(idx) => (&content[..idx], Some(&content[idx + 1..])),
        None => (content, None),
    };

    let first: Vec<u8> = first.iter().copied().filter(|&b| b != b'\r').collect();
    let mut out = match std::str::from_utf8(&first)
        .ok()
        .and_then(|line| portable_shebang(line, install_name))
    {
        Some(line) => line.into_bytes(),
        None => first,
    };

    if let Some(rest) = rest {
        out.push(b'\n');
        out.extend(rest.iter().copied().filter(|&b| b != b'\r'));
    }
    out
}

fn collect_files(dir: &Path, fs: &dyn FileSystem, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs.read_dir(dir)? {
        match entry.file_type() {
            FileType::Directory => collect_files(entry.path(), fs, out)?,
            FileType::File => out.push(entry.path().to_path_buf()),
            FileType::Symlink => debug!("Skipping symlink {}", entry.path().display()),
        }
    }
    Ok(())
}

/// Normalizes every script under `dir`.
///
/// Each file with an interpreter line gets a portable `#!` line, loses its
/// carriage returns and ends up with mode `0o777 & !umask`. Scripts that are
/// already clean keep their exact bytes.
pub fn normalize_binstubs(
    dir: &Path,
    install_name: &str,
    umask: u32,
    fs: &dyn FileSystem,
) -> Result<NormalizeReport> {
    if !fs.is_dir(dir) {
        bail!("Scripts directory {} does not exist", dir.display());
    }

    let mut report = NormalizeReport::default();

    let mut files = Vec::new();
    collect_files(dir, fs, &mut files)?;

    let mode = 0o777 & !umask;
    for path in files {
        let prefix = fs.read_bytes(&path, SHEBANG.len())?;
        if prefix != SHEBANG {
            debug!("{} has no interpreter line, leaving it alone", path.display());
            continue;
        }

        let content = fs.read(&path)?;
        let normalized = normalize_script(&content, install_name);

        if normalized == content {
            fs.set_mode(&path, mode)?;
            report.unchanged.push(path);
        } else {
            fs.write_atomic(&path, &normalized)?;
            fs.set_mode(&path, mode)?;
            debug!("Rewrote {}", path.display());
            report.rewritten.push(path);
        }
    }

    info!(
        "Normalized scripts in {}: {} rewritten, {} unchanged",
        dir.display(),
        report.rewritten.len(),
        report.unchanged.len()
    );
    Ok(report)
}
