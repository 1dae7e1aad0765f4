//! Configuration for a Sediment database.
//!
//! Centralized configuration with sensible defaults, built through
//! [`Config::builder`] and checked by [`Config::validate`] before the engine
//! touches the filesystem.

use std::path::PathBuf;
use std::time::Duration;

use codec::Comparator;
use thiserror::Error;

/// How the database directory is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Create the directory when it does not exist.
    pub create: bool,
    /// Recover without modifying anything and reject every mutation.
    pub read_only: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            create: true,
            read_only: false,
        }
    }
}

/// Main configuration for a database instance.
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage
    // -------------------------------------------------------------------------
    /// Directory holding the `<epoch>.log` / `<epoch>.db` files.
    pub dir: PathBuf,

    pub flags: OpenFlags,

    /// Key order shared by the index, the pages and the catalog.
    pub comparator: Comparator,

    /// Maximum records per page. Even, at least 2.
    pub page_size: usize,

    // -------------------------------------------------------------------------
    // Merge
    // -------------------------------------------------------------------------
    /// Updates between merge wakeups, and the index size that triggers a
    /// merge round. At least 2.
    pub merge_watermark: usize,

    /// Run the background merge thread.
    pub merge: bool,

    /// Merge thread timer when no watermark wakeup arrives.
    pub merge_interval: Duration,

    /// Delete and compact obsolete db files.
    pub gc: bool,

    /// Live-page ratio below which a db file is compacted. In `(0, 1]`.
    pub gc_factor: f64,

    // -------------------------------------------------------------------------
    // Files
    // -------------------------------------------------------------------------
    /// Initial buffer size for a new db file, in bytes.
    pub grow: usize,

    /// Buffer growth factor for a new db file. At least 1.0.
    pub grow_factor: f64,

    /// fsync the log after every append (a flush always happens).
    pub log_sync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./sediment_data"),
            flags: OpenFlags::default(),
            comparator: Comparator::bytewise(),
            page_size: 2048,
            merge_watermark: 100_000,
            merge: true,
            merge_interval: Duration::from_secs(1),
            gc: true,
            gc_factor: 0.5,
            grow: 128 * 1024,
            grow_factor: 2.0,
            log_sync: false,
        }
    }
}

/// A configuration value outside its allowed range.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("page_size must be even and at least 2, got {0}")]
    PageSize(usize),

    #[error("merge_watermark must be at least 2, got {0}")]
    MergeWatermark(usize),

    #[error("gc_factor must be in (0, 1], got {0}")]
    GcFactor(f64),

    #[error("grow must be positive")]
    Grow,

    #[error("grow_factor must be at least 1.0, got {0}")]
    GrowFactor(f64),

    #[error("directory path is empty")]
    Dir,
}

impl Config {
    /// Create a new config builder for the database in `dir`.
    pub fn builder(dir: impl Into<PathBuf>) -> ConfigBuilder {
        ConfigBuilder {
            config: Config {
                dir: dir.into(),
                ..Config::default()
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::Dir);
        }
        if self.page_size < 2 || self.page_size % 2 != 0 {
            return Err(ConfigError::PageSize(self.page_size));
        }
        if self.merge_watermark < 2 {
            return Err(ConfigError::MergeWatermark(self.merge_watermark));
        }
        if !(self.gc_factor > 0.0 && self.gc_factor <= 1.0) {
            return Err(ConfigError::GcFactor(self.gc_factor));
        }
        if self.grow == 0 {
            return Err(ConfigError::Grow);
        }
        if !(self.grow_factor >= 1.0) {
            return Err(ConfigError::GrowFactor(self.grow_factor));
        }
        Ok(())
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create the directory when missing.
    pub fn create(mut self, yes: bool) -> Self {
        self.config.flags.create = yes;
        self
    }

    /// Open without modifying the directory.
    pub fn read_only(mut self, yes: bool) -> Self {
        self.config.flags.read_only = yes;
        self
    }

    pub fn comparator(mut self, cmp: Comparator) -> Self {
        self.config.comparator = cmp;
        self
    }

    /// Set the maximum records per page.
    pub fn page_size(mut self, records: usize) -> Self {
        self.config.page_size = records;
        self
    }

    pub fn merge_watermark(mut self, updates: usize) -> Self {
        self.config.merge_watermark = updates;
        self
    }

    /// Enable or disable the background merge thread.
    pub fn merge(mut self, enabled: bool) -> Self {
        self.config.merge = enabled;
        self
    }

    pub fn merge_interval(mut self, interval: Duration) -> Self {
        self.config.merge_interval = interval;
        self
    }

    pub fn gc(mut self, enabled: bool) -> Self {
        self.config.gc = enabled;
        self
    }

    pub fn gc_factor(mut self, factor: f64) -> Self {
        self.config.gc_factor = factor;
        self
    }

    /// Set the initial db file buffer size (in bytes)
    pub fn grow(mut self, bytes: usize) -> Self {
        self.config.grow = bytes;
        self
    }

    pub fn grow_factor(mut self, factor: f64) -> Self {
        self.config.grow_factor = factor;
        self
    }

    pub fn log_sync(mut self, yes: bool) -> Self {
        self.config.log_sync = yes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
