use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ownership guarantee a run gives its workloads, ordered from weakest to
/// strongest.
///
/// A check tagged with level `L` is evaluated only when `L` is at most the
/// run's level, so `Always` checks run under any interleaving while `OwnColl`
/// checks run only when no other workload touches the collection.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AssertLevel {
    Always,
    OwnColl,
    #[default]
    OwnDb,
}

impl AssertLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::OwnColl => "own_coll",
            Self::OwnDb => "own_db",
        }
    }
}

impl fmt::Display for AssertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown assert level '{0}' (expected always, own_coll or own_db)")]
pub struct ParseAssertLevelError(String);

impl FromStr for AssertLevel {
    type Err = ParseAssertLevelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "own_coll" => Ok(Self::OwnColl),
            "own_db" => Ok(Self::OwnDb),
            _ => Err(ParseAssertLevelError(raw.to_owned())),
        }
    }
}

/// A violated invariant raised by a [`Check`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("assertion ({level}) failed: {message}")]
pub struct AssertionFailure {
    pub level: AssertLevel,
    pub message: String,
}

/// One kind of check, bound to the ownership level of the current run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Check {
    level: AssertLevel,
    enabled: bool,
}

impl Check {
    #[must_use]
    pub const fn level(&self) -> AssertLevel {
        self.level
    }

    /// Whether this check is evaluated in the current run. Disabled checks
    /// pass without evaluating their message.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn that(
        &self,
        condition: bool,
        message: impl FnOnce() -> String,
    ) -> Result<(), AssertionFailure> {
        if !self.enabled || condition {
            return Ok(());
        }
        Err(AssertionFailure {
            level: self.level,
            message: message(),
        })
    }

    pub fn equals<T>(&self, actual: T, expected: T, what: &str) -> Result<(), AssertionFailure>
    where
        T: PartialEq + fmt::Debug,
    {
        self.that(actual == expected, || {
            format!("{what}: expected {expected:?}, got {actual:?}")
        })
    }

    pub fn gte<T>(&self, actual: T, bound: T, what: &str) -> Result<(), AssertionFailure>
    where
        T: PartialOrd + fmt::Debug,
    {
        self.that(actual >= bound, || {
            format!("{what}: expected at least {bound:?}, got {actual:?}")
        })
    }
}

/// Hands out the check kinds available to a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assertions {
    run_level: AssertLevel,
}

impl Assertions {
    #[must_use]
    pub const fn new(run_level: AssertLevel) -> Self {
        Self { run_level }
    }

    #[must_use]
    pub const fn run_level(&self) -> AssertLevel {
        self.run_level
    }

    #[must_use]
    pub fn check(&self, level: AssertLevel) -> Check {
        Check {
            level,
            enabled: level <= self.run_level,
        }
    }

    /// Invariants that must hold under any interleaving.
    #[must_use]
    pub fn always(&self) -> Check {
        self.check(AssertLevel::Always)
    }

    /// Invariants that hold only while this workload owns its collection.
    #[must_use]
    pub fn when_own_coll(&self) -> Check {
        self.check(AssertLevel::OwnColl)
    }

    #[must_use]
    pub fn when_own_db(&self) -> Check {
        self.check(AssertLevel::OwnDb)
    }
}
