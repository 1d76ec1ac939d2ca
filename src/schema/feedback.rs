use serde::{Deserialize, Serialize};

/// One player's reaction to a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rating {
    Positive,
    Neutral,
    Negative,
}

impl Rating {
    /// Parse the short forms used by the preview shell and the web demo.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "+" | "up" | "positive" | "like" => Some(Self::Positive),
            "0" | "meh" | "neutral" => Some(Self::Neutral),
            "-" | "down" | "negative" | "dislike" => Some(Self::Negative),
            _ => None,
        }
    }
}

/// Feedback counts collected for one shown card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeedbackTally {
    pub positive: u32,
    pub neutral: u32,
    pub negative: u32,
}

impl FeedbackTally {
    pub fn new(positive: u32, neutral: u32, negative: u32) -> Self {
        Self {
            positive,
            neutral,
            negative,
        }
    }

    pub fn add(&mut self, rating: Rating) {
        match rating {
            Rating::Positive => self.positive = self.positive.saturating_add(1),
            Rating::Neutral => self.neutral = self.neutral.saturating_add(1),
            Rating::Negative => self.negative = self.negative.saturating_add(1),
        }
    }

    /// Sum of all three counts, widened so it cannot overflow.
    pub fn total(&self) -> u64 {
        u64::from(self.positive) + u64::from(self.neutral) + u64::from(self.negative)
    }
}

impl FromIterator<Rating> for FeedbackTally {
    fn from_iter<I: IntoIterator<Item = Rating>>(iter: I) -> Self {
        let mut tally = Self::default();
        for rating in iter {
            tally.add(rating);
        }
        tally
    }
}
