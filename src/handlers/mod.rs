//! Operations the front ends call: ballots from voters, cycle administration,
//! and result reporting.

use crate::config::CACHED_PLACES;
use crate::cycles::{self, Closing};
use crate::db::{self, Database, cycles as rows};
use crate::error::VoteError;
use crate::models::{Ballot, CycleResult, CycleStatus, VotingCycle};
use crate::voting::schulze::{compute_ranking, top_n};
use crate::voting::{Leaderboard, aggregate, parse_ballot_text};
use log::{debug, info, warn};
use rand::Rng;

/// Records a voter's ranked triple for an open cycle and refreshes its standings.
pub async fn submit_ballot<R: Rng + ?Sized>(
    db: &Database,
    cycle_id: i64,
    voter_id: i64,
    text: &str,
    rng: &mut R,
) -> Result<Ballot, VoteError> {
    let choices = parse_ballot_text(text).inspect_err(|e| {
        warn!("Rejected ballot from voter {}: {}", voter_id, e);
    })?;

    let cycle = cycles::cycle(db, cycle_id).await?;
    let now = db::now();
    if !cycle.is_open_at(now) {
        return Err(VoteError::NoActiveCycle);
    }

    let universe = cycles::candidate_universe(db, &cycle).await?;
    if let Some(unknown) = choices
        .iter()
        .find(|id| !universe.iter().any(|candidate| candidate.id == **id))
    {
        warn!(
            "Rejected ballot from voter {}: {} is not a {} of cycle {}",
            voter_id, unknown, cycle.phase, cycle.id
        );
        return Err(VoteError::Input(format!(
            "{} is not a {} on this ballot",
            unknown, cycle.phase
        )));
    }

    let ballot = Ballot {
        cycle_id: cycle.id,
        voter_id,
        choices,
        submitted_at: now,
    };
    db.register_voter(voter_id).await?;
    db.upsert_ballot(&ballot).await?;
    info!("Ballot accepted: cycle={}, voter={}, choices={:?}", cycle.id, voter_id, choices);

    recompute_results(db, &cycle, rng).await?;
    Ok(ballot)
}

/// Like `submit_ballot`, into whichever cycle is open right now.
pub async fn vote<R: Rng + ?Sized>(
    db: &Database,
    voter_id: i64,
    text: &str,
    rng: &mut R,
) -> Result<Ballot, VoteError> {
    let cycle = cycles::open_cycle(db).await?;
    submit_ballot(db, cycle.id, voter_id, text, rng).await
}

/// Ranks the cycle's current ballots and caches the top places.
/// Returns `None`, and stores nothing, while the cycle has no ballots.
pub async fn recompute_results<R: Rng + ?Sized>(
    db: &Database,
    cycle: &VotingCycle,
    rng: &mut R,
) -> Result<Option<CycleResult>, VoteError> {
    let ballots = db.ballots(cycle.id).await?;
    if ballots.is_empty() {
        debug!("Cycle {} has no ballots, nothing to rank", cycle.id);
        return Ok(None);
    }

    let candidates: Vec<i64> = cycles::candidate_universe(db, cycle)
        .await?
        .iter()
        .map(|candidate| candidate.id)
        .collect();
    let ranking = compute_ranking(&candidates, &aggregate::group(&ballots));

    let result = CycleResult {
        cycle_id: cycle.id,
        phase: cycle.phase,
        places: top_n(&ranking, CACHED_PLACES, rng),
        computed_at: db::now(),
    };
    db.store_result(&result).await?;
    info!(
        "Results for cycle {} updated from {} ballots: {:?}",
        cycle.id,
        ballots.len(),
        result.places
    );

    Ok(Some(result))
}

/// Cached standings of a cycle.
pub async fn cached_result(db: &Database, cycle_id: i64) -> Result<CycleResult, VoteError> {
    db.result(cycle_id)
        .await?
        .ok_or_else(|| VoteError::NotFound(format!("results of cycle {}", cycle_id)))
}

pub async fn start_cycle(
    db: &Database,
    start_text: &str,
    finish_text: &str,
) -> Result<VotingCycle, VoteError> {
    let starts_at = cycles::parse_date(start_text)?;
    let finishes_at = cycles::parse_date(finish_text)?;
    cycles::start(db, starts_at, finishes_at).await
}

/// Ends the open cycle. `false` when nothing was open.
pub async fn close_cycle<R: Rng + ?Sized>(db: &Database, rng: &mut R) -> Result<bool, VoteError> {
    match cycles::close(db).await? {
        Some(Closing::Closed(cycle)) => {
            finalize_cycle(db, &cycle, rng).await?;
            Ok(true)
        }
        Some(Closing::Cancelled(_)) => Ok(true),
        None => Ok(false),
    }
}

/// Last ranking of a finished cycle, after which it is never recomputed by the closer.
pub async fn finalize_cycle<R: Rng + ?Sized>(
    db: &Database,
    cycle: &VotingCycle,
    rng: &mut R,
) -> Result<Option<CycleResult>, VoteError> {
    let result = recompute_results(db, cycle, rng).await?;
    rows::mark_finalized(db.pool(), cycle.id).await?;
    info!("Voting cycle {} finalized", cycle.id);
    Ok(result)
}

pub async fn current_or_last_cycle(db: &Database) -> Result<CycleStatus, VoteError> {
    cycles::current_or_last(db).await
}

/// Fresh top-`n` leaderboard computed from the cycle's latest ballots.
pub async fn current_results<R: Rng + ?Sized>(
    db: &Database,
    cycle_id: i64,
    n: usize,
    rng: &mut R,
) -> Result<Leaderboard, VoteError> {
    let cycle = cycles::cycle(db, cycle_id).await?;
    let ballots = db.ballots(cycle.id).await?;
    if ballots.is_empty() {
        return Err(VoteError::NoData(cycle.id));
    }

    let universe = cycles::candidate_universe(db, &cycle).await?;
    let candidates: Vec<i64> = universe.iter().map(|candidate| candidate.id).collect();
    let ranking = compute_ranking(&candidates, &aggregate::group(&ballots));
    let leaders = top_n(&ranking, n, rng)
        .into_iter()
        .filter_map(|id| universe.iter().find(|candidate| candidate.id == id).cloned())
        .collect();

    Ok(Leaderboard {
        cycle,
        ballots_cast: ballots.len(),
        leaders,
        ranking,
    })
}
