use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One playable item as resolved by the audio node.
///
/// `encoded` is the node's opaque handle used to start playback; `identifier`
/// is the track identity used for duplicate detection and loop bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub encoded: String,
    pub identifier: String,
    pub title: String,
    pub author: String,
    pub uri: Option<String>,
    pub duration: Duration,
    /// Playback position reported by the node. Informational only.
    pub position: Duration,
    pub is_stream: bool,
}

impl Track {
    /// Time left before the track ends naturally.
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.position)
    }

    /// Same track, rewound to the start.
    pub fn rewound(&self) -> Self {
        Self {
            position: Duration::ZERO,
            ..self.clone()
        }
    }

    pub fn thumbnail_url(&self) -> String {
        format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", self.identifier)
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title)
    }
}

#[cfg(test)]
pub(crate) fn test_track(identifier: &str, secs: u64) -> Track {
    Track {
        encoded: format!("enc-{identifier}"),
        identifier: identifier.to_string(),
        title: format!("Track {identifier}"),
        author: "Tester".to_string(),
        uri: Some(format!("https://example.com/{identifier}")),
        duration: Duration::from_secs(secs),
        position: Duration::ZERO,
        is_stream: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_saturates() {
        let mut track = test_track("a", 100);
        track.position = Duration::from_secs(40);
        assert_eq!(track.remaining(), Duration::from_secs(60));

        track.position = Duration::from_secs(140);
        assert_eq!(track.remaining(), Duration::ZERO);
        assert_eq!(track.rewound().position, Duration::ZERO);
    }
}
