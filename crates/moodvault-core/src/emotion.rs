use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of labels an emotion classifier may assign to a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Anger,
    Disgust,
    Fear,
    Joy,
    Neutral,
    Sadness,
    Surprise,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Anger,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Joy,
        EmotionLabel::Neutral,
        EmotionLabel::Sadness,
        EmotionLabel::Surprise,
    ];

    /// Lowercase name, as written to the corpus file.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Anger => "anger",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Joy => "joy",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Surprise => "surprise",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown emotion label: {0:?}")]
pub struct UnknownLabel(pub String);

impl FromStr for EmotionLabel {
    type Err = UnknownLabel;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        EmotionLabel::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownLabel(raw.to_string()))
    }
}

/// Per-label counts over a corpus.
///
/// Only labels that actually occurred are present; there is no zero-filling,
/// so iterating yields the observed distribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmotionTally {
    counts: BTreeMap<EmotionLabel, usize>,
}

impl EmotionTally {
    pub fn from_labels<I>(labels: I) -> Self
    where
        I: IntoIterator<Item = EmotionLabel>,
    {
        let mut tally = Self::default();
        for label in labels {
            tally.record(label);
        }
        tally
    }

    pub fn record(&mut self, label: EmotionLabel) {
        *self.counts.entry(label).or_insert(0) += 1;
    }

    /// Count for `label`; zero when it never occurred.
    pub fn get(&self, label: EmotionLabel) -> usize {
        self.counts.get(&label).copied().unwrap_or(0)
    }

    pub fn contains(&self, label: EmotionLabel) -> bool {
        self.counts.contains_key(&label)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct labels seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Iterate in label order.
    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, usize)> + '_ {
        self.counts.iter().map(|(label, count)| (*label, *count))
    }

    /// Highest count; ties resolve to the earliest label in label order.
    pub fn most_common(&self) -> Option<(EmotionLabel, usize)> {
        self.iter().fold(None, |best, (label, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((label, count)),
        })
    }
}
