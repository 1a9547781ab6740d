use rand::seq::SliceRandom;
use std::{
    collections::{HashSet, VecDeque},
    time::Duration,
};
use tracing::{debug, info};

use super::track::Track;

/// What happens to a track that ends naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Track => "track",
            LoopMode::Queue => "queue",
        }
    }
}

impl std::str::FromStr for LoopMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(LoopMode::Off),
            "track" | "song" => Ok(LoopMode::Track),
            "queue" => Ok(LoopMode::Queue),
            other => anyhow::bail!("Unknown loop mode: {other}"),
        }
    }
}

/// Ordered play queue of one guild (FIFO).
#[derive(Debug, Default, Clone)]
pub struct GuildQueue {
    items: VecDeque<Track>,
}

impl GuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track at the tail
    pub fn push(&mut self, track: Track) {
        debug!("➕ Queued: {}", track.title);
        self.items.push_back(track);
    }

    /// Appends a playlist in the order received; returns how many were added
    pub fn extend(&mut self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let before = self.items.len();
        self.items.extend(tracks);
        let added = self.items.len() - before;
        info!("➕ Queued {} tracks", added);
        added
    }

    /// Next track (FIFO)
    pub fn pop(&mut self) -> Option<Track> {
        self.items.pop_front()
    }

    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        cleared
    }

    /// Shuffles in place
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
    }

    /// Keeps the first occurrence of every track identity, in order.
    ///
    /// Returns how many tracks were removed.
    pub fn remove_duplicates(&mut self) -> usize {
        let mut seen = HashSet::new();
        let original_len = self.items.len();

        self.items
            .retain(|track| seen.insert(track.identifier.clone()));

        original_len - self.items.len()
    }

    pub fn snapshot(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().map(|track| track.duration).sum()
    }
}
