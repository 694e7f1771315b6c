use crate::models::{Ballot, Triple, WeightedBallotGroup};
use std::collections::HashMap;

/// Collapses ballots with the exact same ranked triple into one weighted group.
/// Groups come out in order of first appearance.
pub fn group(ballots: &[Ballot]) -> Vec<WeightedBallotGroup> {
    let mut position: HashMap<Triple, usize> = HashMap::new();
    let mut groups: Vec<WeightedBallotGroup> = Vec::new();

    for ballot in ballots {
        match position.get(&ballot.choices) {
            Some(&index) => groups[index].weight += 1,
            None => {
                position.insert(ballot.choices, groups.len());
                groups.push(WeightedBallotGroup {
                    choices: ballot.choices,
                    weight: 1,
                });
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ballot(voter_id: i64, choices: Triple) -> Ballot {
        Ballot {
            cycle_id: 1,
            voter_id,
            choices,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn identical_triples_share_a_group() {
        let ballots = vec![
            ballot(1, [1, 2, 3]),
            ballot(2, [2, 1, 3]),
            ballot(3, [1, 2, 3]),
            ballot(4, [1, 2, 3]),
        ];
        let groups = group(&ballots);
        assert_eq!(
            groups,
            vec![
                WeightedBallotGroup { choices: [1, 2, 3], weight: 3 },
                WeightedBallotGroup { choices: [2, 1, 3], weight: 1 },
            ]
        );
    }

    #[test]
    fn order_within_triple_matters() {
        let groups = group(&[ballot(1, [1, 2, 3]), ballot(2, [3, 2, 1])]);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.weight == 1));
    }

    #[test]
    fn no_ballots_no_groups() {
        assert!(group(&[]).is_empty());
    }
}
