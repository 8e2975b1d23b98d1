//! Generational backup rotation of the destination directory
//!
//! `dest` is generation 0, `dest.001` generation 1, and so on. Rotation
//! shifts every generation one step older and discards anything that would
//! age past the retention limit, so at most `retention` suffixed generations
//! remain afterwards.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::MirrorError;
use crate::logger::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u16);

impl Generation {
    pub const MAX: u16 = 999;

    /// Sibling directory of `base` holding this generation; a trailing
    /// separator on `base` is ignored.
    pub fn path_for(self, base: &Path) -> PathBuf {
        let mut name = base.file_name().map(OsString::from).unwrap_or_default();
        name.push(format!(".{:03}", self.0));
        base.with_file_name(name)
    }

    /// Parse `<base_name>.NNN`, exactly three ASCII digits.
    pub fn from_file_name(base_name: &str, file_name: &str) -> Option<Self> {
        let suffix = file_name.strip_prefix(base_name)?.strip_prefix('.')?;
        if suffix.len() != 3 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse().ok().map(Generation)
    }

    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RotationReport {
    /// (from, to) in the order performed
    pub renamed: Vec<(PathBuf, PathBuf)>,
    pub removed: Vec<PathBuf>,
}

/// Existing generation directories of `dest`, oldest first.
pub fn list_generations(dest: &Path) -> Result<Vec<(Generation, PathBuf)>, MirrorError> {
    let (parent, base_name) = split_dest(dest)?;
    let read = match fs::read_dir(&parent) {
        Ok(r) => r,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(MirrorError::RotationFailed { path: parent, source }),
    };
    let mut found = Vec::new();
    for entry in read {
        let entry = entry.map_err(|source| MirrorError::RotationFailed {
            path: parent.clone(),
            source,
        })?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(gen) = Generation::from_file_name(&base_name, file_name) else {
            continue;
        };
        if entry.path().is_dir() {
            found.push((gen, entry.path()));
        }
    }
    found.sort();
    Ok(found)
}

/// Shift `dest` into generation 1 and every older generation one slot back.
pub fn rotate(dest: &Path, retention: u32, logger: &dyn Logger) -> Result<RotationReport, MirrorError> {
    let (parent, base_name) = split_dest(dest)?;
    let dest = parent.join(base_name);
    let dest = dest.as_path();
    let mut report = RotationReport::default();
    match fs::metadata(dest) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(MirrorError::RotationFailed {
                path: dest.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, "destination is not a directory"),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
        Err(source) => {
            return Err(MirrorError::RotationFailed {
                path: dest.to_path_buf(),
                source,
            })
        }
    }
    let limit = retention.min(u32::from(Generation::MAX));

    for (gen, path) in list_generations(dest)?.into_iter().rev() {
        if u32::from(gen.0) >= limit {
            fs::remove_dir_all(&path).map_err(|source| MirrorError::RotationFailed {
                path: path.clone(),
                source,
            })?;
            logger.pruned(&path);
            report.removed.push(path);
        } else {
            let to = gen.next().path_for(dest);
            rename(&path, &to, logger, &mut report)?;
        }
    }
    rename(dest, &Generation(1).path_for(dest), logger, &mut report)?;
    Ok(report)
}

fn rename(from: &Path, to: &Path, logger: &dyn Logger, report: &mut RotationReport) -> Result<(), MirrorError> {
    fs::rename(from, to).map_err(|source| MirrorError::RotationFailed {
        path: from.to_path_buf(),
        source,
    })?;
    logger.rotated(from, to);
    report.renamed.push((from.to_path_buf(), to.to_path_buf()));
    Ok(())
}

fn split_dest(dest: &Path) -> Result<(PathBuf, String), MirrorError> {
    let invalid = || MirrorError::RotationFailed {
        path: dest.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "destination has no usable file name"),
    };
    let base_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(invalid)?
        .to_string();
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, base_name))
}
