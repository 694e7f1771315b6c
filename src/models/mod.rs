use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a voting cycle is about. Also tags which table a candidate id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Category,
    Book,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Category => "category",
            Phase::Book => "book",
        }
    }

    /// The phase that follows this one.
    pub fn next(self) -> Phase {
        match self {
            Phase::Category => Phase::Book,
            Phase::Book => Phase::Category,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "category" => Ok(Phase::Category),
            "book" => Ok(Phase::Book),
            other => Err(format!("Unknown phase: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub category_id: Option<i64>,
}

/// Something a ballot can name, in either phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub kind: Phase,
    pub name: String,
    /// Owning category, only ever set for books.
    pub category_id: Option<i64>,
}

impl From<Category> for Candidate {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            kind: Phase::Category,
            name: category.name,
            category_id: None,
        }
    }
}

impl From<Book> for Candidate {
    fn from(book: Book) -> Self {
        let name = if book.author.is_empty() {
            book.name
        } else {
            format!("{} ({})", book.name, book.author)
        };
        Self {
            id: book.id,
            kind: Phase::Book,
            name,
            category_id: book.category_id,
        }
    }
}

/// Ordered first/second/third preference.
pub type Triple = [i64; 3];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub cycle_id: i64,
    pub voter_id: i64,
    pub choices: Triple,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingCycle {
    pub id: i64,
    pub phase: Phase,
    pub starts_at: DateTime<Utc>,
    pub finishes_at: DateTime<Utc>,
    pub finalized: bool,
}

impl VotingCycle {
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.finishes_at > now
    }
}

/// Answer to "what is being voted on?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "cycle", rename_all = "snake_case")]
pub enum CycleStatus {
    NoVoting,
    Now(VotingCycle),
    Last(VotingCycle),
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::NoVoting => "no_voting",
            CycleStatus::Now(_) => "now",
            CycleStatus::Last(_) => "last",
        }
    }

    pub fn cycle(&self) -> Option<&VotingCycle> {
        match self {
            CycleStatus::NoVoting => None,
            CycleStatus::Now(cycle) | CycleStatus::Last(cycle) => Some(cycle),
        }
    }
}

/// A distinct ranked triple and how many ballots carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedBallotGroup {
    pub choices: Triple,
    pub weight: u64,
}

/// Tie-groups, best first. Together they partition the candidate set.
pub type Ranking = Vec<Vec<i64>>;

/// Cached top places of a cycle. Always reproducible from that cycle's ballots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle_id: i64,
    pub phase: Phase,
    pub places: Vec<i64>,
    pub computed_at: DateTime<Utc>,
}
