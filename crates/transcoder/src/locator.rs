//! Locating the external encoder and probe executables.
//!
//! A tool is looked up first in the bundle directory (next to the running
//! application unless configured otherwise) and then on the platform search
//! path. Lookups never prompt or wait; the result is cached per tool name until
//! [`ToolLocator::recheck`] is called.

use crate::config::ToolsConfig;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Error returned when a tool cannot be found anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("{tool} not found (searched {} and the system PATH)", display_dir(.bundle_dir))]
    NotFound {
        tool: String,
        bundle_dir: Option<PathBuf>,
    },
}

fn display_dir(dir: &Option<PathBuf>) -> String {
    match dir {
        Some(dir) => dir.display().to_string(),
        None => "no bundle directory".to_string(),
    }
}

/// Finds external tools and remembers what it found.
#[derive(Debug)]
pub struct ToolLocator {
    bundle_dir: Option<PathBuf>,
    /// Overrides the PATH environment variable; used for hermetic lookups.
    search_path: Option<OsString>,
    cache: Mutex<HashMap<String, Result<PathBuf, LocateError>>>,
}

impl ToolLocator {
    pub fn new(bundle_dir: Option<PathBuf>) -> Self {
        Self {
            bundle_dir,
            search_path: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Locator using the configured bundle directory, or the directory of the
    /// running executable when none is configured.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        let bundle_dir = tools.bundle_dir.clone().or_else(executable_dir);
        Self::new(bundle_dir)
    }

    /// Search `path` (PATH syntax) instead of the process environment.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn bundle_dir(&self) -> Option<&Path> {
        self.bundle_dir.as_deref()
    }

    /// Locate `tool`, using the cached result when one exists.
    pub fn locate(&self, tool: &str) -> Result<PathBuf, LocateError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get(tool) {
                return cached.clone();
            }
        }
        self.recheck(tool)
    }

    /// Probe the filesystem again for `tool` and refresh the cache.
    pub fn recheck(&self, tool: &str) -> Result<PathBuf, LocateError> {
        let result = find_tool(self.bundle_dir.as_deref(), self.search_path.as_ref(), tool);
        match &result {
            Ok(path) => tracing::debug!(tool, path = %path.display(), "located tool"),
            Err(e) => tracing::debug!(tool, error = %e, "tool lookup failed"),
        }
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(tool.to_string(), result.clone());
        }
        result
    }
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Names a bundled copy of `tool` may have on this platform.
fn bundled_candidates(dir: &Path, tool: &str) -> Vec<PathBuf> {
    let mut candidates = vec![dir.join(tool)];
    if cfg!(windows) && Path::new(tool).extension().is_none() {
        candidates.push(dir.join(format!("{}.exe", tool)));
    }
    candidates
}

fn find_tool(
    bundle_dir: Option<&Path>,
    search_path: Option<&OsString>,
    tool: &str,
) -> Result<PathBuf, LocateError> {
    // An explicit path is taken as-is.
    let as_path = Path::new(tool);
    if as_path.components().count() > 1 {
        if as_path.is_file() {
            return Ok(as_path.to_path_buf());
        }
        return Err(LocateError::NotFound {
            tool: tool.to_string(),
            bundle_dir: bundle_dir.map(Path::to_path_buf),
        });
    }

    if let Some(dir) = bundle_dir {
        if let Some(found) = bundled_candidates(dir, tool)
            .into_iter()
            .find(|candidate| candidate.is_file())
        {
            return Ok(found);
        }
    }

    let on_path = match search_path {
        Some(paths) => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            which::which_in(tool, Some(paths), cwd)
        }
        None => which::which(tool),
    };

    on_path.map_err(|_| LocateError::NotFound {
        tool: tool.to_string(),
        bundle_dir: bundle_dir.map(Path::to_path_buf),
    })
}
