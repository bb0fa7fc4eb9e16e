use rand::seq::SliceRandom;
use rand::Rng;

use crate::favorites::FavoriteEntry;
use crate::history::PlaybackHistory;

/// Pick a favorite uniformly at random, preferring entries not in `history`.
///
/// When every entry was played recently the whole list is the pool again.
/// Returns `None` only for an empty `favorites` slice.
pub fn select_random<'a, R: Rng + ?Sized>(
    favorites: &'a [FavoriteEntry],
    history: &PlaybackHistory,
    rng: &mut R,
) -> Option<&'a FavoriteEntry> {
    let eligible: Vec<&FavoriteEntry> = favorites
        .iter()
        .filter(|entry| !history.contains(&entry.href))
        .collect();

    if eligible.is_empty() {
        favorites.choose(rng)
    } else {
        eligible.choose(rng).copied()
    }
}
