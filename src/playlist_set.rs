//! Set operations over ordered lists of track ids.
//!
//! A playlist is handled as a list of ids where order matters for the output
//! but not for membership. Every operation dedupes and keeps first-seen order.

use std::collections::{BTreeSet, HashMap, HashSet};

use regex::Regex;

use crate::clients::{entities::Track, errors::Result};

/// Ids in first-seen order, without repeats
#[must_use]
pub fn dedup(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Ids present in every list, ordered as in the first one
#[must_use]
pub fn intersection(lists: &[Vec<String>]) -> Vec<String> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    let rest: Vec<HashSet<&str>> = rest
        .iter()
        .map(|l| l.iter().map(String::as_str).collect())
        .collect();
    dedup(first)
        .into_iter()
        .filter(|id| rest.iter().all(|set| set.contains(id.as_str())))
        .collect()
}

/// Every id of every list, once
#[must_use]
pub fn union(lists: &[Vec<String>]) -> Vec<String> {
    let all: Vec<String> = lists.iter().flatten().cloned().collect();
    dedup(&all)
}

/// Ids of `base` that are absent from all `others`
#[must_use]
pub fn difference(base: &[String], others: &[Vec<String>]) -> Vec<String> {
    let excluded: HashSet<&str> = others.iter().flatten().map(String::as_str).collect();
    dedup(base)
        .into_iter()
        .filter(|id| !excluded.contains(id.as_str()))
        .collect()
}

/// Ids of the given tracks, in order
#[must_use]
pub fn track_ids(tracks: &[Track]) -> Vec<String> {
    tracks.iter().map(|t| t.id.clone()).collect()
}

/// Which playlists each track belongs to
#[derive(Debug, Default, Clone)]
pub struct MembershipIndex {
    playlists_by_track: HashMap<String, BTreeSet<String>>,
}

impl MembershipIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, playlist_id: &str, tracks: &[Track]) {
        for track in tracks {
            self.playlists_by_track
                .entry(track.id.clone())
                .or_default()
                .insert(playlist_id.to_string());
        }
    }

    /// Playlists containing the track, empty if none was recorded
    #[must_use]
    pub fn playlists_of(&self, track_id: &str) -> Vec<&str> {
        self.playlists_by_track
            .get(track_id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_in_any(&self, track_id: &str, playlist_ids: &HashSet<String>) -> bool {
        self.playlists_by_track
            .get(track_id)
            .is_some_and(|set| set.iter().any(|id| playlist_ids.contains(id)))
    }

    pub fn clear(&mut self) {
        self.playlists_by_track.clear();
    }
}

/// Compile a pattern that has to match at the start of the text.
/// An empty pattern disables the filter.
pub fn anchored_regex(pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern {
        Some(p) if !p.is_empty() => Ok(Some(Regex::new(&format!("^(?:{p})"))?)),
        _ => Ok(None),
    }
}
