//! Output locator
//!
//! The scanner writes one `dcx-scan-<timestamp>` directory per run under
//! `<scanner_dir>/output`. Names embed the timestamp, so the greatest name is
//! the latest scan.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

/// Naming convention for scan directories.
pub const SCAN_DIR_PREFIX: &str = "dcx-scan-";

/// Where the latest scan landed, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanLocation {
    Found { scan_id: String, path: PathBuf },
    NotFound,
}

impl ScanLocation {
    pub fn scan_id(&self) -> Option<&str> {
        match self {
            ScanLocation::Found { scan_id, .. } => Some(scan_id),
            ScanLocation::NotFound => None,
        }
    }
}

/// Lists candidate directory names under an output root.
pub trait OutputRepository: Send + Sync {
    /// Names of the directories directly under `root`.
    fn list_dirs(&self, root: &Path) -> std::io::Result<Vec<String>>;
}

/// Reads the real output tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOutputRepository;

impl OutputRepository for FsOutputRepository {
    fn list_dirs(&self, root: &Path) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }
}

/// Greatest name carrying the scan prefix.
pub fn select_latest<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter(|n| n.starts_with(SCAN_DIR_PREFIX) && n.len() > SCAN_DIR_PREFIX.len())
        .max()
}

pub struct OutputLocator<'a> {
    repo: &'a dyn OutputRepository,
}

impl<'a> OutputLocator<'a> {
    pub fn new(repo: &'a dyn OutputRepository) -> Self {
        OutputLocator { repo }
    }

    /// Find the latest scan directory. Never fails: a listing error is a miss.
    pub fn locate(&self, root: &Path) -> ScanLocation {
        let names = match self.repo.list_dirs(root) {
            Ok(names) => names,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(root = %root.display(), "Output root does not exist");
                return ScanLocation::NotFound;
            }
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Could not list output root");
                return ScanLocation::NotFound;
            }
        };

        match select_latest(names.iter().map(String::as_str)) {
            Some(latest) => ScanLocation::Found {
                scan_id: latest.to_string(),
                path: root.join(latest),
            },
            None => ScanLocation::NotFound,
        }
    }
}
