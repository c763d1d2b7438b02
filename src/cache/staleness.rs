//! VL-016: Staleness detection: compare recorded dependency times and the
//! stage2 hash against what is on disk.

use crate::core::fileio;
use crate::core::state::{self, STAGE2_SUFFIX};
use crate::core::types::Stage1;
use crate::cache::hasher;
use std::fmt;
use std::path::{Path, PathBuf};

/// Why a compiled artifact pair can't be used as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    DependencyChanged {
        path: PathBuf,
        recorded: u64,
        current: u64,
    },
    DependencyMissing {
        path: PathBuf,
    },
    Stage2Missing {
        path: PathBuf,
    },
    Stage2Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    Unreadable {
        path: PathBuf,
        detail: String,
    },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyChanged { path, .. } => write!(f, "{} changed", path.display()),
            Self::DependencyMissing { path } => write!(f, "{} no longer exists", path.display()),
            Self::Stage2Missing { path } => write!(f, "stage2 {} is missing", path.display()),
            Self::Stage2Mismatch { path, .. } => {
                write!(f, "stage2 {} does not match its stage1", path.display())
            }
            Self::Unreadable { path, detail } => {
                write!(f, "stage1 {} is unreadable: {}", path.display(), detail)
            }
        }
    }
}

/// Check a single dependency entry.
pub fn check_dependency(path: &Path, recorded: u64) -> Option<StaleReason> {
    match fileio::file_mtime(path) {
        Err(_) => Some(StaleReason::DependencyMissing {
            path: path.to_path_buf(),
        }),
        Ok(current) if current > recorded => Some(StaleReason::DependencyChanged {
            path: path.to_path_buf(),
            recorded,
            current,
        }),
        Ok(_) => None,
    }
}

/// First reason a stage1 can't vouch for its stage2, if any.
pub fn check_stage1(stage1: &Stage1) -> Option<StaleReason> {
    for (path, recorded) in stage1.dependencies.iter() {
        if let Some(reason) = check_dependency(path, *recorded) {
            return Some(reason);
        }
    }

    if !stage1.stage2.exists() {
        return Some(StaleReason::Stage2Missing {
            path: stage1.stage2.clone(),
        });
    }
    let actual = hasher::hash_file(&stage1.stage2).unwrap_or_else(|e| format!("ERROR:{}", e));
    if actual != stage1.stage2_hash {
        return Some(StaleReason::Stage2Mismatch {
            path: stage1.stage2.clone(),
            expected: stage1.stage2_hash.clone(),
            actual,
        });
    }
    None
}

/// One compiled template found in a cache directory.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub stage1_path: PathBuf,
    pub template: Option<String>,
    pub dependencies: usize,
    pub stale: Option<StaleReason>,
}

impl CacheEntry {
    pub fn is_fresh(&self) -> bool {
        self.stale.is_none()
    }
}

/// Stage1 artifacts in a cache directory, sorted by path.
pub fn stage1_files(cache_dir: &Path) -> Result<Vec<PathBuf>, String> {
    let pattern = cache_dir.join("tpl-*");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| format!("non-UTF-8 cache path {}", cache_dir.display()))?;
    let mut files: Vec<PathBuf> = glob::glob(pattern)
        .map_err(|e| format!("bad cache pattern {}: {}", pattern, e))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.ends_with(STAGE2_SUFFIX) && !n.ends_with(".tmp"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Check every compiled template in a cache directory.
pub fn scan_cache(cache_dir: &Path) -> Result<Vec<CacheEntry>, String> {
    let mut entries = Vec::new();
    for path in stage1_files(cache_dir)? {
        let entry = match state::load_stage1(&path) {
            Ok(Some(stage1)) => CacheEntry {
                stale: check_stage1(&stage1),
                template: Some(stage1.template),
                dependencies: stage1.dependencies.len(),
                stage1_path: path,
            },
            Ok(None) => continue,
            Err(e) => CacheEntry {
                stale: Some(StaleReason::Unreadable {
                    path: path.clone(),
                    detail: e,
                }),
                template: None,
                dependencies: 0,
                stage1_path: path,
            },
        };
        entries.push(entry);
    }
    Ok(entries)
}
