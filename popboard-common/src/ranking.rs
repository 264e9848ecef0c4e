//! Ranking computation
//!
//! Rankings are derived from the full record set every time they are needed;
//! nothing here is cached or updated incrementally. Order is score descending,
//! with equal scores ordered by identity ascending (byte order) so the result
//! does not depend on record creation order.

use serde::Serialize;
use std::cmp::Ordering;

use crate::events::{PlayerScore, Scoreboard};
use crate::store::ScoreRecord;

/// Default size of the leaderboard projection
pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;

/// One row of a ranking, with its 1-based rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub identity: String,
    pub score: u64,
}

/// Where one identity sits in the full ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub identity: String,
    pub score: u64,
    /// None when the identity has no record
    pub rank: Option<usize>,
    /// Number of ranked identities
    pub total: usize,
}

/// All records sorted into ranking order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankingSnapshot {
    entries: Vec<ScoreRecord>,
}

fn ranking_order(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.identity.cmp(&b.identity))
}

impl RankingSnapshot {
    pub fn from_records(records: impl IntoIterator<Item = ScoreRecord>) -> Self {
        let mut entries: Vec<ScoreRecord> = records.into_iter().collect();
        entries.sort_by(ranking_order);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest-ranked record, if any
    pub fn leader(&self) -> Option<&ScoreRecord> {
        self.entries.first()
    }

    /// Every record with its rank
    pub fn ranked(&self) -> impl Iterator<Item = RankedEntry> + '_ {
        self.entries.iter().enumerate().map(|(i, record)| RankedEntry {
            rank: i + 1,
            identity: record.identity.clone(),
            score: record.score,
        })
    }

    /// Leaderboard projection: the first `n` ranked records
    pub fn top(&self, n: usize) -> Vec<RankedEntry> {
        self.ranked().take(n).collect()
    }

    /// Rank and score of `identity` within the entire set
    pub fn standing(&self, identity: &str) -> Standing {
        let position = self
            .entries
            .iter()
            .position(|record| record.identity == identity);

        Standing {
            identity: identity.to_string(),
            score: position.map(|i| self.entries[i].score).unwrap_or(0),
            rank: position.map(|i| i + 1),
            total: self.entries.len(),
        }
    }

    /// Wire form broadcast to clients: identity -> { score }
    pub fn to_scoreboard(&self) -> Scoreboard {
        self.entries
            .iter()
            .map(|record| (record.identity.clone(), PlayerScore { score: record.score }))
            .collect()
    }
}
