//! Lag-window rules: the nested feature sets the backtest sweeps over.

use itertools::Itertools;
use serde::{Serialize, Serializer};
use std::fmt;

/// A set of lag offsets used together as model features, held in ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LagRule {
    lags: Vec<u32>,
}

impl LagRule {
    pub fn new(lags: impl IntoIterator<Item = u32>) -> Self {
        Self {
            lags: lags.into_iter().sorted_unstable().dedup().collect(),
        }
    }

    pub fn lags(&self) -> &[u32] {
        &self.lags
    }

    pub fn contains(&self, lag: u32) -> bool {
        self.lags.binary_search(&lag).is_ok()
    }

    /// The `+`-joined token naming this rule, e.g. `lag2+lag3+lag4`.
    pub fn label(&self) -> String {
        self.lags.iter().map(|lag| format!("lag{lag}")).join("+")
    }
}

impl fmt::Display for LagRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for LagRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One rule per available offset `m`, taken from the largest down: the rule holds every
/// offset `>= m`. For `[1, 2, 3, 4]` that is `lag4`, `lag3+lag4`, `lag2+lag3+lag4`,
/// `lag1+lag2+lag3+lag4`.
pub fn enumerate_lag_rules(lags: &[u32]) -> Vec<LagRule> {
    let available: Vec<u32> = lags.iter().copied().sorted_unstable().dedup().collect();
    available
        .iter()
        .rev()
        .map(|&min_lag| LagRule::new(available.iter().copied().filter(|&l| l >= min_lag)))
        .collect()
}
