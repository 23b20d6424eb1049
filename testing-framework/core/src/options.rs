use std::{fs::File, io, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::assert::{AssertLevel, ParseAssertLevelError};

/// How a suite places its workloads in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// One workload at a time; each owns the database while it runs.
    #[default]
    Serial,
    /// All workloads share one setup phase, one running phase and one
    /// teardown phase.
    Parallel,
}

/// Which collection each workload of a suite runs against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// Everyone uses the fixture's collection.
    Shared,
    /// Workload `w` uses `<collection>_<w>`.
    #[default]
    PerWorkload,
}

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to open run options at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse run options: {source}")]
    Yaml {
        #[source]
        source: serde_yaml::Error,
    },
    #[error("FSM_SEED must be an unsigned 64-bit integer, got '{value}'")]
    InvalidSeed { value: String },
    #[error("FSM_ASSERT_LEVEL is invalid: {source}")]
    InvalidAssertLevel {
        #[source]
        source: ParseAssertLevelError,
    },
}

/// Knobs of a run or suite that are not part of any workload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunOptions {
    /// Base seed; random when unset. Always reported.
    pub seed: Option<u64>,
    pub assert_level: AssertLevel,
    pub synchronized_start: bool,
    pub schedule: Schedule,
    pub collection_mode: CollectionMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            seed: None,
            assert_level: AssertLevel::default(),
            synchronized_start: true,
            schedule: Schedule::default(),
            collection_mode: CollectionMode::default(),
        }
    }
}

impl RunOptions {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, OptionsError> {
        serde_yaml::from_str(yaml).map_err(|source| OptionsError::Yaml { source })
    }

    pub fn from_path(path: &Path) -> Result<Self, OptionsError> {
        debug!(path = %path.display(), "loading run options");
        let file = File::open(path).map_err(|source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_reader(file).map_err(|source| OptionsError::Yaml { source })
    }

    /// Options from the file named by `FSM_RUN_CONFIG`, if any, with the
    /// `FSM_SEED` and `FSM_ASSERT_LEVEL` overrides applied on top.
    pub fn from_env() -> Result<Self, OptionsError> {
        let options = match fsm_framework_env::fsm_run_config() {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        options.apply_env()
    }

    pub fn apply_env(self) -> Result<Self, OptionsError> {
        self.with_overrides(
            fsm_framework_env::fsm_seed().as_deref(),
            fsm_framework_env::fsm_assert_level().as_deref(),
        )
    }

    fn with_overrides(
        mut self,
        seed: Option<&str>,
        assert_level: Option<&str>,
    ) -> Result<Self, OptionsError> {
        if let Some(value) = seed {
            self.seed = Some(value.trim().parse().map_err(|_| OptionsError::InvalidSeed {
                value: value.to_owned(),
            })?);
        }
        if let Some(value) = assert_level {
            self.assert_level = value
                .parse()
                .map_err(|source| OptionsError::InvalidAssertLevel { source })?;
        }
        Ok(self)
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub const fn with_assert_level(mut self, level: AssertLevel) -> Self {
        self.assert_level = level;
        self
    }

    #[must_use]
    pub const fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    #[must_use]
    pub const fn with_collection_mode(mut self, mode: CollectionMode) -> Self {
        self.collection_mode = mode;
        self
    }

    #[must_use]
    pub const fn with_synchronized_start(mut self, enabled: bool) -> Self {
        self.synchronized_start = enabled;
        self
    }
}
