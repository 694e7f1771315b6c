//! Schulze method over top-3 ballots.
//!
//! A ballot `(a, b, c)` says `a > b`, `a > c` and `b > c`. Candidates it does not
//! name get no preference either way from that ballot. Ids that are not part of
//! the candidate set are ignored.

use crate::models::{Ranking, WeightedBallotGroup};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashMap};

/// Orders `candidates` into tie-groups, best first.
pub fn compute_ranking(candidates: &[i64], groups: &[WeightedBallotGroup]) -> Ranking {
    let mut ids: Vec<i64> = Vec::with_capacity(candidates.len());
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(candidates.len());
    for &id in candidates {
        if !index.contains_key(&id) {
            index.insert(id, ids.len());
            ids.push(id);
        }
    }

    let d = preference_tally(&index, groups);
    let p = strongest_paths(&d);
    rank_by_wins(&ids, &p)
}

/// `d[a][b]`: total weight of ballots ranking `a` strictly above `b`.
fn preference_tally(index: &HashMap<i64, usize>, groups: &[WeightedBallotGroup]) -> Vec<Vec<u64>> {
    let n = index.len();
    let mut d = vec![vec![0u64; n]; n];

    for group in groups {
        // Only the first mention of a candidate counts.
        let mut ranked: Vec<usize> = Vec::with_capacity(3);
        for id in group.choices {
            if let Some(&i) = index.get(&id) {
                if !ranked.contains(&i) {
                    ranked.push(i);
                }
            }
        }

        for (pos, &above) in ranked.iter().enumerate() {
            for &below in &ranked[pos + 1..] {
                d[above][below] += group.weight;
            }
        }
    }

    d
}

/// Widest-path closure over the pairwise defeats.
fn strongest_paths(d: &[Vec<u64>]) -> Vec<Vec<u64>> {
    let n = d.len();
    let mut p = vec![vec![0u64; n]; n];

    for a in 0..n {
        for b in 0..n {
            if a != b && d[a][b] > d[b][a] {
                p[a][b] = d[a][b];
            }
        }
    }

    for k in 0..n {
        for a in 0..n {
            if a == k {
                continue;
            }
            for b in 0..n {
                if b == a || b == k {
                    continue;
                }
                let via = p[a][k].min(p[k][b]);
                if via > p[a][b] {
                    p[a][b] = via;
                }
            }
        }
    }

    p
}

/// Groups candidates by how many others they beat on strongest paths.
fn rank_by_wins(ids: &[i64], p: &[Vec<u64>]) -> Ranking {
    let mut by_wins: BTreeMap<usize, Vec<i64>> = BTreeMap::new();

    for a in 0..ids.len() {
        let wins = (0..ids.len()).filter(|&b| b != a && p[a][b] > p[b][a]).count();
        by_wins.entry(wins).or_default().push(ids[a]);
    }

    by_wins
        .into_values()
        .rev()
        .map(|mut tie_group| {
            tie_group.sort_unstable();
            tie_group
        })
        .collect()
}

/// Takes the best `n` candidates. Whole tie-groups are taken while they fit;
/// the group that would overflow is sampled uniformly with `rng`.
pub fn top_n<R: Rng + ?Sized>(ranking: &[Vec<i64>], n: usize, rng: &mut R) -> Vec<i64> {
    let mut leaders = Vec::with_capacity(n);

    for tie_group in ranking {
        let remaining = n - leaders.len();
        if remaining == 0 {
            break;
        }
        if tie_group.len() <= remaining {
            leaders.extend(tie_group.iter().copied());
        } else {
            leaders.extend(tie_group.choose_multiple(rng, remaining).copied());
        }
    }

    leaders
}
