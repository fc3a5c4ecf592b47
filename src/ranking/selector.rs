//! Picks the next pair of tracks to compare out of a candidate pool.
//!
//! Track A favours tracks that have been compared the least, Track B is one
//! of the tracks whose rating is closest to A's. Both picks are random within
//! their window so repeated calls on the same pool give some variety.

use super::models::pair_key;
use super::settings::RankingSettings;
use crate::rating_store::PoolEntry;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    Matched {
        track_a_id: String,
        track_b_id: String,
        pair_key: String,
        degraded: bool,
    },
    NotEnoughCandidates,
}

fn pick<'a, R: Rng + ?Sized>(candidates: &[&'a PoolEntry], rng: &mut R) -> &'a PoolEntry {
    candidates[rng.random_range(0..candidates.len())]
}

/// Track A candidates in the order they should be tried. The first one is
/// the random pick, the rest only matter when it has no allowed rival.
fn track_a_candidates<'a, R: Rng + ?Sized>(
    pool: &'a [PoolEntry],
    seed_track_id: Option<&str>,
    exploration_window: usize,
    rng: &mut R,
) -> (Vec<&'a PoolEntry>, bool) {
    if let Some(seed) = seed_track_id {
        if let Some(entry) = pool.iter().find(|e| e.track_id == seed) {
            return (vec![entry], false);
        }
        let everything: Vec<&PoolEntry> = pool.iter().collect();
        return (vec![pick(&everything, rng)], true);
    }

    // sort_by_key is stable, ties keep the pool order
    let mut by_games: Vec<&PoolEntry> = pool.iter().collect();
    by_games.sort_by_key(|e| e.games);
    let rest = by_games.split_off(exploration_window.max(1).min(by_games.len()));
    let mut window = by_games;

    let first = window.swap_remove(rng.random_range(0..window.len()));
    window.shuffle(rng);

    let mut candidates = Vec::with_capacity(pool.len());
    candidates.push(first);
    candidates.extend(window);
    candidates.extend(rest);
    (candidates, false)
}

/// Every other track of the pool, closest rating to `track_a` first.
fn rivals_by_distance<'a>(pool: &'a [PoolEntry], track_a: &PoolEntry) -> Vec<&'a PoolEntry> {
    let mut rivals: Vec<&PoolEntry> = pool
        .iter()
        .filter(|e| e.track_id != track_a.track_id)
        .collect();
    rivals.sort_by(|x, y| {
        let dx = (x.rating - track_a.rating).abs();
        let dy = (y.rating - track_a.rating).abs();
        dx.total_cmp(&dy)
    });
    rivals
}

fn is_allowed(exclude_pair_keys: &HashSet<String>, a: &PoolEntry, b: &PoolEntry) -> bool {
    !exclude_pair_keys.contains(&pair_key(&a.track_id, &b.track_id))
}

/// A random rival among the `rival_window` closest that doesn't form an
/// excluded pair with `track_a`.
fn select_track_b<'a, R: Rng + ?Sized>(
    rivals: &[&'a PoolEntry],
    track_a: &PoolEntry,
    exclude_pair_keys: &HashSet<String>,
    rival_window: usize,
    rng: &mut R,
) -> Option<&'a PoolEntry> {
    let window = &rivals[..rival_window.max(1).min(rivals.len())];
    let candidate = pick(window, rng);
    if is_allowed(exclude_pair_keys, track_a, candidate) {
        return Some(candidate);
    }

    let allowed: Vec<&PoolEntry> = window
        .iter()
        .copied()
        .filter(|e| is_allowed(exclude_pair_keys, track_a, e))
        .collect();
    if allowed.is_empty() {
        None
    } else {
        Some(pick(&allowed, rng))
    }
}

fn matched_pair(track_a: &PoolEntry, track_b: &PoolEntry, degraded: bool) -> Selection {
    Selection::Matched {
        track_a_id: track_a.track_id.clone(),
        track_b_id: track_b.track_id.clone(),
        pair_key: pair_key(&track_a.track_id, &track_b.track_id),
        degraded,
    }
}

/// Selects two distinct tracks from `pool`.
///
/// When `seed_track_id` is given and present in the pool it is always Track A,
/// when it isn't a random track takes its place and the selection is flagged
/// as degraded. Pools with fewer than two entries give
/// [`Selection::NotEnoughCandidates`].
///
/// Without a seed an excluded pair is only returned when every pair of the
/// pool is excluded. With a seed, Track A is fixed and the closest rival is
/// repeated once all of its pairs are excluded.
pub fn select_match<R: Rng + ?Sized>(
    pool: &[PoolEntry],
    seed_track_id: Option<&str>,
    exclude_pair_keys: &HashSet<String>,
    settings: &RankingSettings,
    rng: &mut R,
) -> Selection {
    if pool.len() < 2 {
        return Selection::NotEnoughCandidates;
    }

    let (candidates, degraded) =
        track_a_candidates(pool, seed_track_id, settings.exploration_window, rng);

    for track_a in &candidates {
        let rivals = rivals_by_distance(pool, track_a);
        if let Some(track_b) =
            select_track_b(&rivals, track_a, exclude_pair_keys, settings.rival_window, rng)
        {
            return matched_pair(track_a, track_b, degraded);
        }
    }

    // Nothing inside the rival windows, take the closest allowed pair anywhere
    for track_a in &candidates {
        let rivals = rivals_by_distance(pool, track_a);
        if let Some(track_b) = rivals
            .iter()
            .find(|b| is_allowed(exclude_pair_keys, track_a, b))
        {
            return matched_pair(track_a, track_b, degraded);
        }
    }

    // Every pair was seen recently, repeating the closest one is still better
    // than a lopsided matchup.
    let track_a = candidates[0];
    let rivals = rivals_by_distance(pool, track_a);
    matched_pair(track_a, rivals[0], degraded)
}
