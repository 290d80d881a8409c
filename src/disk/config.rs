use std::path::{Path, PathBuf};

use snafu::Snafu;

/// Errors that can occur while building a [`CacheConfig`].
#[derive(Debug, Snafu)]
pub enum BuildError {
    #[snafu(display("`value_count` must be greater than zero"))]
    InvalidValueCount,
    #[snafu(display("`max_size` must be greater than zero"))]
    InvalidMaxSize,
}

/// Immutable configuration for an opened [`super::Cache`].
///
/// Grounded on `DiskBufferConfig`/`DiskBufferConfigBuilder`
/// (`variants/disk_v2/common.rs` in the teacher crate): a plain data struct
/// built through a fallible builder rather than a constructor with many
/// positional arguments.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub(crate) dir: PathBuf,
    pub(crate) app_version: u32,
    pub(crate) value_count: usize,
    pub(crate) max_size: u64,
    pub(crate) delete_dirty_file: bool,
    pub(crate) is_append_mode: bool,
}

impl CacheConfig {
    pub fn builder(dir: impl Into<PathBuf>) -> CacheConfigBuilder {
        CacheConfigBuilder {
            dir: dir.into(),
            app_version: 1,
            value_count: 1,
            max_size: 0,
            delete_dirty_file: true,
            is_append_mode: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn value_count(&self) -> usize {
        self.value_count
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}

/// Builder for [`CacheConfig`]. See spec §6's constructor option table:
/// `delete_dirty_file` (default `true`) and `is_append_mode` (default
/// `false`) are the two canonical knobs this crate exposes.
#[derive(Debug, Clone)]
pub struct CacheConfigBuilder {
    dir: PathBuf,
    app_version: u32,
    value_count: usize,
    max_size: u64,
    delete_dirty_file: bool,
    is_append_mode: bool,
}

impl CacheConfigBuilder {
    pub fn app_version(mut self, app_version: u32) -> Self {
        self.app_version = app_version;
        self
    }

    pub fn value_count(mut self, value_count: usize) -> Self {
        self.value_count = value_count;
        self
    }

    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Whether dangling dirty files found at open are deleted (default) or
    /// preserved for a later edit to pick up.
    pub fn delete_dirty_file(mut self, delete_dirty_file: bool) -> Self {
        self.delete_dirty_file = delete_dirty_file;
        self
    }

    /// When `true`, an editor initialized from a prior dirty file continues
    /// appending to it rather than starting from empty.
    pub fn is_append_mode(mut self, is_append_mode: bool) -> Self {
        self.is_append_mode = is_append_mode;
        self
    }

    pub fn build(self) -> Result<CacheConfig, BuildError> {
        if self.value_count == 0 {
            return Err(BuildError::InvalidValueCount);
        }
        if self.max_size == 0 {
            return Err(BuildError::InvalidMaxSize);
        }
        Ok(CacheConfig {
            dir: self.dir,
            app_version: self.app_version,
            value_count: self.value_count,
            max_size: self.max_size,
            delete_dirty_file: self.delete_dirty_file,
            is_append_mode: self.is_append_mode,
        })
    }
}
