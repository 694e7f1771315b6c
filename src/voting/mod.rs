pub mod aggregate;
pub mod schulze;

use crate::error::VoteError;
use crate::models::{Candidate, Ranking, Triple, VotingCycle};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref DIGIT_RUN: Regex = Regex::new(r"[0-9]+").unwrap();
}

/// Pulls a ranked triple out of free-form ballot text. Only digit runs count,
/// everything else is noise, and there must be exactly three of them.
pub fn parse_ballot_text(text: &str) -> Result<Triple, VoteError> {
    let mut ids = Vec::with_capacity(3);
    for run in DIGIT_RUN.find_iter(text) {
        let id = run
            .as_str()
            .parse::<i64>()
            .map_err(|_| VoteError::Input(format!("number {} is too large", run.as_str())))?;
        ids.push(id);
    }

    <Triple>::try_from(ids.as_slice()).map_err(|_| {
        VoteError::Input(format!(
            "expected exactly three numbers, found {} in {:?}",
            ids.len(),
            text
        ))
    })
}

/// Current standings of a cycle as handed to reporting.
#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    pub cycle: VotingCycle,
    pub ballots_cast: usize,
    pub leaders: Vec<Candidate>,
    pub ranking: Ranking,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_digit_runs_from_free_text() {
        assert_eq!(parse_ballot_text("3, 14 and 1").unwrap(), [3, 14, 1]);
        assert_eq!(parse_ballot_text("first:2\nsecond:5\nthird:9").unwrap(), [2, 5, 9]);
        assert_eq!(parse_ballot_text("4 4 4").unwrap(), [4, 4, 4]);
    }

    #[test]
    fn rejects_wrong_number_of_values() {
        assert!(matches!(parse_ballot_text("12a"), Err(VoteError::Input(_))));
        assert!(matches!(parse_ballot_text(""), Err(VoteError::Input(_))));
        assert!(matches!(parse_ballot_text("1 2 3 4"), Err(VoteError::Input(_))));
        assert!(matches!(
            parse_ballot_text("1 2 99999999999999999999999"),
            Err(VoteError::Input(_))
        ));
    }
}
