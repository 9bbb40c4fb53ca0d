//! Expanding-window season splits.

use crate::panel::types::Season;

/// Row indices on either side of one season cutoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonSplit {
    pub cutoff: Season,
    /// Rows with `season < cutoff`.
    pub train: Vec<usize>,
    /// Rows with `season >= cutoff`.
    pub test: Vec<usize>,
}

/// Every cutoff from `min_season + 1` through `max_season`, ascending.
pub fn cutoff_seasons(min_season: Season, max_season: Season) -> Vec<Season> {
    (min_season + 1..=max_season).collect()
}

/// Partitions row indices by their season relative to `cutoff`. Row order is preserved
/// within each side.
pub fn split_by_season(seasons: &[Season], cutoff: Season) -> SeasonSplit {
    let (train, test): (Vec<usize>, Vec<usize>) =
        (0..seasons.len()).partition(|&i| seasons[i] < cutoff);
    SeasonSplit {
        cutoff,
        train,
        test,
    }
}
