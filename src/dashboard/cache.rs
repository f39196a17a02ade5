use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{dashboard::DashboardData, error::PipelineError, persist};

/// Memoized dashboard table. The Parquet file is re-read only when the
/// requested path differs from the cached one or its modification time has
/// changed.
#[derive(Debug, Default)]
pub struct TableCache {
    entry: Option<CacheEntry>,
    loads: usize,
}

#[derive(Debug)]
struct CacheEntry {
    path: PathBuf,
    modified: SystemTime,
    data: Arc<DashboardData>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &Path) -> Result<Arc<DashboardData>> {
        let modified = modified_time(path)?;
        if let Some(entry) = &self.entry {
            if entry.path == path && entry.modified == modified {
                debug!("Serving cached table for {path:?}");
                return Ok(Arc::clone(&entry.data));
            }
        }

        let data = Arc::new(load(path)?);
        self.loads += 1;
        info!(
            "Loaded {} order line(s) for the dashboard from {path:?}",
            data.lines().len()
        );
        self.entry = Some(CacheEntry {
            path: path.to_path_buf(),
            modified,
            data: Arc::clone(&data),
        });
        Ok(data)
    }

    /// Number of times the table has been read from disk.
    pub fn loads(&self) -> usize {
        self.loads
    }
}

fn modified_time(path: &Path) -> Result<SystemTime> {
    if !path.exists() {
        return Err(PipelineError::missing_input(path).into());
    }
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("Reading modification time of {path:?}"))
}

fn load(path: &Path) -> Result<DashboardData> {
    let mut frame = persist::read_parquet(path)?;
    persist::coerce_timestamps(&mut frame);
    Ok(DashboardData::from_frame(frame))
}
