use super::models::Matchup;
use std::collections::VecDeque;

/// Rolling memory of recently shown matchups, kept by whoever drives the
/// ranking loop and sent back as exclusion lists with every request.
///
/// Both the track ids and the pair keys are bounded by `capacity`, so the
/// track memory covers roughly the last `capacity / 2` matchups while pair
/// keys are remembered for `capacity` matchups.
#[derive(Clone, Debug)]
pub struct HistoryWindow {
    capacity: usize,
    track_ids: VecDeque<String>,
    pair_keys: VecDeque<String>,
}

fn push_bounded(queue: &mut VecDeque<String>, value: &str, capacity: usize) {
    if let Some(pos) = queue.iter().position(|v| v == value) {
        queue.remove(pos);
    }
    queue.push_back(value.to_string());
    while queue.len() > capacity {
        queue.pop_front();
    }
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        HistoryWindow {
            capacity,
            track_ids: VecDeque::with_capacity(capacity),
            pair_keys: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push_matchup(&mut self, matchup: &Matchup) {
        self.push_matchup_except(matchup, None);
    }

    /// Like [`push_matchup`](Self::push_matchup), but never remembers `keep`
    /// as a recent track. A seeded session passes its seed here, since the
    /// seed is meant to show up in every matchup.
    pub fn push_matchup_except(&mut self, matchup: &Matchup, keep: Option<&str>) {
        for id in [&matchup.track_a.id, &matchup.track_b.id] {
            if keep != Some(id.as_str()) {
                push_bounded(&mut self.track_ids, id, self.capacity);
            }
        }
        push_bounded(&mut self.pair_keys, &matchup.pair_key, self.capacity);
    }

    pub fn excluded_track_ids(&self) -> Vec<String> {
        self.track_ids.iter().cloned().collect()
    }

    pub fn excluded_pair_keys(&self) -> Vec<String> {
        self.pair_keys.iter().cloned().collect()
    }

    /// Forgets the tracks but keeps the pairs, for when the vault is too
    /// small to honour the track exclusions.
    pub fn forget_tracks(&mut self) {
        self.track_ids.clear();
    }

    pub fn clear(&mut self) {
        self.track_ids.clear();
        self.pair_keys.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.track_ids.is_empty() && self.pair_keys.is_empty()
    }
}
