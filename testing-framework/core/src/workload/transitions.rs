use std::collections::BTreeMap;

use rand::Rng;
use thiserror::Error;

/// Raw transition rows as written in a workload: `from -> (to -> weight)`.
pub type TransitionRows = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no transition row for state '{state}'")]
    MissingRow { state: String },
}

/// One weighted row of the table. Zero-weight candidates are dropped when the
/// row is built, so they can never be selected.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionRow {
    candidates: Vec<(String, f64)>,
    total: f64,
}

impl TransitionRow {
    /// Builds a row from raw weights. Returns `None` when no candidate carries
    /// a positive weight. Callers validate weights beforehand.
    #[must_use]
    pub fn from_weights(weights: &BTreeMap<String, f64>) -> Option<Self> {
        let candidates: Vec<(String, f64)> = weights
            .iter()
            .filter(|(_, weight)| **weight > 0.0)
            .map(|(state, weight)| (state.clone(), *weight))
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let total = candidates.iter().map(|(_, weight)| weight).sum();
        Some(Self { candidates, total })
    }

    #[must_use]
    pub fn candidates(&self) -> &[(String, f64)] {
        &self.candidates
    }

    #[must_use]
    pub const fn total_weight(&self) -> f64 {
        self.total
    }

    /// Normalized probability of moving to `state`.
    #[must_use]
    pub fn probability(&self, state: &str) -> f64 {
        self.candidates
            .iter()
            .find(|(candidate, _)| candidate == state)
            .map_or(0.0, |(_, weight)| weight / self.total)
    }

    /// Maps a uniform draw in `[0, 1)` onto the row's categorical distribution.
    #[must_use]
    pub fn select(&self, draw: f64) -> &str {
        select_weighted(&self.candidates, self.total, draw)
    }
}

/// Cumulative-weight selection over positive weights.
///
/// `draw` is scaled by `total`, so rows need not sum to one. Out-of-range
/// draws are clamped and float rounding at the top end falls back to the last
/// candidate.
#[must_use]
pub fn select_weighted(candidates: &[(String, f64)], total: f64, draw: f64) -> &str {
    let target = draw.clamp(0.0, 1.0) * total;
    let mut cumulative = 0.0;

    for (state, weight) in candidates {
        cumulative += weight;
        if target < cumulative {
            return state;
        }
    }

    candidates.last().map_or("", |(state, _)| state.as_str())
}

/// Immutable weighted graph over state names, shared read-only by all agents
/// of a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionTable {
    rows: BTreeMap<String, TransitionRow>,
}

impl TransitionTable {
    pub(crate) const fn new(rows: BTreeMap<String, TransitionRow>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn row(&self, state: &str) -> Option<&TransitionRow> {
        self.rows.get(state)
    }

    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Picks the next state after `current` using one draw from `rng`.
    pub fn next<R: Rng + ?Sized>(&self, current: &str, rng: &mut R) -> Result<&str, TransitionError> {
        let row = self.row(current).ok_or_else(|| TransitionError::MissingRow {
            state: current.to_owned(),
        })?;
        let draw: f64 = rng.r#gen();
        Ok(row.select(draw))
    }
}
