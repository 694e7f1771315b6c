//! Voting cycle lifecycle: at most one open cycle, phases alternating between
//! categories and books, closing explicitly or once the finish date passes.

use crate::config::DATE_FORMAT;
use crate::db::{self, Database, cycles as rows};
use crate::error::VoteError;
use crate::models::{Candidate, Category, CycleStatus, Phase, VotingCycle};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use log::{info, warn};

/// What `close` did to the open cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closing {
    Closed(VotingCycle),
    /// The cycle had not reached its start date yet and was dropped.
    Cancelled(VotingCycle),
}

/// Parses a `dd.mm.yyyy` date as midnight UTC.
pub fn parse_date(text: &str) -> Result<DateTime<Utc>, VoteError> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|e| VoteError::Input(format!("bad date {:?}: {}", text, e)))
}

/// Splits admin input of the form `<start>-<finish>`.
pub fn split_date_range(text: &str) -> Result<(&str, &str), VoteError> {
    text.split_once('-')
        .ok_or_else(|| VoteError::Input(format!("expected <start>-<finish>, got {:?}", text)))
}

pub async fn start(
    db: &Database,
    starts_at: DateTime<Utc>,
    finishes_at: DateTime<Utc>,
) -> Result<VotingCycle, VoteError> {
    if finishes_at <= starts_at {
        return Err(VoteError::Input(format!(
            "cycle must finish after it starts ({} is not after {})",
            finishes_at.date_naive(),
            starts_at.date_naive()
        )));
    }

    let now = db::now();
    if finishes_at <= now {
        return Err(VoteError::Input(format!(
            "cycle would already be over ({} is in the past)",
            finishes_at.date_naive()
        )));
    }

    let mut tx = db.pool().begin().await?;

    if let Some(open) = rows::open_cycle(&mut *tx, now).await? {
        warn!(
            "Refusing to start a cycle at {}: cycle {} is open until {}",
            starts_at, open.id, open.finishes_at
        );
        return Err(VoteError::Overlap {
            open_cycle: open.id,
            finishes_at: open.finishes_at,
        });
    }

    let last = rows::last_closed_cycle(&mut *tx, now).await?;
    // A new cycle may begin on the day the last one finished, never earlier
    if let Some(last) = &last {
        if starts_at.date_naive() < last.finishes_at.date_naive() {
            warn!(
                "Refusing to start a cycle at {}: cycle {} only finished at {}",
                starts_at, last.id, last.finishes_at
            );
            return Err(VoteError::Input(format!(
                "cycle must not start before {}, when cycle {} finished",
                last.finishes_at.date_naive(),
                last.id
            )));
        }
    }
    let phase = match last {
        Some(last) => last.phase.next(),
        None => Phase::Category,
    };

    let cycle = rows::insert_cycle(&mut *tx, phase, starts_at, finishes_at).await?;
    tx.commit().await?;

    info!(
        "Voting cycle {} started: phase={}, start={}, finish={}",
        cycle.id, cycle.phase, cycle.starts_at, cycle.finishes_at
    );
    Ok(cycle)
}

/// Ends the open cycle now. `None` when nothing was open.
pub async fn close(db: &Database) -> Result<Option<Closing>, VoteError> {
    let now = db::now();
    let mut tx = db.pool().begin().await?;

    let Some(mut cycle) = rows::open_cycle(&mut *tx, now).await? else {
        info!("No open voting cycle to close");
        return Ok(None);
    };

    if now <= cycle.starts_at {
        rows::delete_cycle(&mut *tx, cycle.id).await?;
        tx.commit().await?;
        info!("Voting cycle {} cancelled before its start", cycle.id);
        return Ok(Some(Closing::Cancelled(cycle)));
    }

    rows::set_finish(&mut *tx, cycle.id, now).await?;
    tx.commit().await?;

    cycle.finishes_at = now;
    info!("Voting cycle {} closed at {}", cycle.id, now);
    Ok(Some(Closing::Closed(cycle)))
}

pub async fn current_or_last(db: &Database) -> Result<CycleStatus, VoteError> {
    let now = db::now();
    if let Some(open) = rows::open_cycle(db.pool(), now).await? {
        return Ok(CycleStatus::Now(open));
    }
    Ok(match rows::last_closed_cycle(db.pool(), now).await? {
        Some(last) => CycleStatus::Last(last),
        None => CycleStatus::NoVoting,
    })
}

pub async fn open_cycle(db: &Database) -> Result<VotingCycle, VoteError> {
    rows::open_cycle(db.pool(), db::now())
        .await?
        .ok_or(VoteError::NoActiveCycle)
}

pub async fn cycle(db: &Database, cycle_id: i64) -> Result<VotingCycle, VoteError> {
    rows::cycle(db.pool(), cycle_id)
        .await?
        .ok_or_else(|| VoteError::NotFound(format!("voting cycle {}", cycle_id)))
}

/// Candidates a cycle's ballots may name. A book cycle only offers books from the
/// categories that won the category cycle before it.
pub async fn candidate_universe(
    db: &Database,
    cycle: &VotingCycle,
) -> Result<Vec<Candidate>, VoteError> {
    match cycle.phase {
        Phase::Category => db.candidates(Phase::Category).await,
        Phase::Book => {
            let winners = winning_categories_before(db, cycle.id).await?;
            if winners.is_empty() {
                warn!("Book cycle {} has no winning categories to draw books from", cycle.id);
            }
            let books = db.books_in_categories(&winners).await?;
            Ok(books.into_iter().map(Candidate::from).collect())
        }
    }
}

async fn winning_categories_before(db: &Database, cycle_id: i64) -> Result<Vec<i64>, VoteError> {
    let Some(previous) = rows::previous_cycle_of_phase(db.pool(), Phase::Category, cycle_id).await?
    else {
        return Ok(Vec::new());
    };
    Ok(db
        .result(previous.id)
        .await?
        .map(|result| result.places)
        .unwrap_or_default())
}

/// Categories that won the most recently closed category cycle, best first.
pub async fn category_leaders(db: &Database) -> Result<Vec<Category>, VoteError> {
    let now = db::now();
    let Some(last) = rows::last_closed_cycle(db.pool(), now).await? else {
        return Ok(Vec::new());
    };
    let category_cycle = if last.phase == Phase::Category {
        Some(last)
    } else {
        rows::previous_cycle_of_phase(db.pool(), Phase::Category, last.id).await?
    };
    let Some(category_cycle) = category_cycle else {
        return Ok(Vec::new());
    };

    let places = match db.result(category_cycle.id).await? {
        Some(result) => result.places,
        None => return Ok(Vec::new()),
    };
    let categories = db.categories().await?;
    Ok(places
        .iter()
        .filter_map(|id| categories.iter().find(|c| c.id == *id).cloned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CycleResult;
    use chrono::{Duration, TimeZone};

    fn days_from_now(days: i64) -> DateTime<Utc> {
        db::now() + Duration::days(days)
    }

    fn today() -> DateTime<Utc> {
        db::now().date_naive().and_time(NaiveTime::MIN).and_utc()
    }

    async fn expect_closed(db: &Database) -> VotingCycle {
        match close(db).await.unwrap() {
            Some(Closing::Closed(cycle)) => cycle,
            other => panic!("expected a closed cycle, got {:?}", other),
        }
    }

    #[test]
    fn parses_admin_dates() {
        let (start, finish) = split_date_range("01.02.2026-15.02.2026").unwrap();
        assert_eq!(
            parse_date(start).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date(finish).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date(" 3.4.2026 ").unwrap(),
            Utc.with_ymd_and_hms(2026, 4, 3, 0, 0, 0).unwrap()
        );

        assert!(matches!(split_date_range("01.02.2026"), Err(VoteError::Input(_))));
        assert!(matches!(parse_date("2026-02-01"), Err(VoteError::Input(_))));
        assert!(matches!(parse_date("31.02.2026"), Err(VoteError::Input(_))));
    }

    #[tokio::test]
    async fn phases_alternate_across_cycles() {
        let db = Database::in_memory().await;

        let first = start(&db, days_from_now(-10), days_from_now(10)).await.unwrap();
        assert_eq!(first.phase, Phase::Category);
        expect_closed(&db).await;

        let second = start(&db, today(), days_from_now(10)).await.unwrap();
        assert_eq!(second.phase, Phase::Book);
        expect_closed(&db).await;

        let third = start(&db, today(), days_from_now(10)).await.unwrap();
        assert_eq!(third.phase, Phase::Category);
    }

    #[tokio::test]
    async fn overlapping_start_is_rejected() {
        let db = Database::in_memory().await;
        let open = start(&db, days_from_now(-1), days_from_now(7)).await.unwrap();

        let result = start(&db, days_from_now(3), days_from_now(14)).await;
        assert!(matches!(
            result,
            Err(VoteError::Overlap { open_cycle, .. }) if open_cycle == open.id
        ));
        assert_eq!(current_or_last(&db).await.unwrap(), CycleStatus::Now(open));
    }

    #[tokio::test]
    async fn start_before_last_finish_is_rejected() {
        let db = Database::in_memory().await;
        let categories = start(&db, days_from_now(-10), days_from_now(10)).await.unwrap();
        let closed = expect_closed(&db).await;
        assert_eq!(closed.id, categories.id);

        let stale = start(&db, days_from_now(-3), days_from_now(5)).await;
        assert!(matches!(stale, Err(VoteError::Input(_))));

        let past = start(&db, days_from_now(-400), days_from_now(-399)).await;
        assert!(matches!(past, Err(VoteError::Input(_))));
        assert_eq!(current_or_last(&db).await.unwrap(), CycleStatus::Last(closed));

        // The rejected attempts took no phase
        let books = start(&db, today(), days_from_now(5)).await.unwrap();
        assert_eq!(books.phase, Phase::Book);
    }

    #[tokio::test]
    async fn finish_must_be_ahead() {
        let db = Database::in_memory().await;
        let result = start(&db, days_from_now(-9), days_from_now(-2)).await;
        assert!(matches!(result, Err(VoteError::Input(_))));
        assert_eq!(current_or_last(&db).await.unwrap(), CycleStatus::NoVoting);
    }

    #[tokio::test]
    async fn finish_must_follow_start() {
        let db = Database::in_memory().await;
        let at = days_from_now(3);
        let result = start(&db, at, at).await;
        assert!(matches!(result, Err(VoteError::Input(_))));
        assert_eq!(current_or_last(&db).await.unwrap(), CycleStatus::NoVoting);
    }

    #[tokio::test]
    async fn status_moves_from_nothing_to_now_to_last() {
        let db = Database::in_memory().await;
        assert_eq!(current_or_last(&db).await.unwrap(), CycleStatus::NoVoting);
        assert!(matches!(open_cycle(&db).await, Err(VoteError::NoActiveCycle)));

        let cycle = start(&db, days_from_now(-2), days_from_now(5)).await.unwrap();
        assert_eq!(current_or_last(&db).await.unwrap().as_str(), "now");
        assert_eq!(open_cycle(&db).await.unwrap(), cycle);

        let closed = expect_closed(&db).await;
        assert!(closed.finishes_at <= db::now());
        assert_eq!(current_or_last(&db).await.unwrap(), CycleStatus::Last(closed));
    }

    #[tokio::test]
    async fn close_without_open_cycle_is_a_no_op() {
        let db = Database::in_memory().await;
        assert_eq!(close(&db).await.unwrap(), None);

        start(&db, days_from_now(-2), days_from_now(5)).await.unwrap();
        expect_closed(&db).await;
        assert_eq!(close(&db).await.unwrap(), None);
    }

    #[tokio::test]
    async fn closing_before_start_cancels_the_cycle() {
        let db = Database::in_memory().await;
        let scheduled = start(&db, days_from_now(2), days_from_now(9)).await.unwrap();

        assert_eq!(close(&db).await.unwrap(), Some(Closing::Cancelled(scheduled)));
        assert_eq!(current_or_last(&db).await.unwrap(), CycleStatus::NoVoting);

        // Nothing was closed, so the next cycle is still about categories
        let next = start(&db, days_from_now(-1), days_from_now(9)).await.unwrap();
        assert_eq!(next.phase, Phase::Category);
    }

    #[tokio::test]
    async fn book_cycle_draws_from_winning_categories() {
        let db = Database::in_memory().await;
        let fiction = db.add_category("Fiction").await.unwrap();
        let history = db.add_category("History").await.unwrap();
        let poetry = db.add_category("Poetry").await.unwrap();
        let dune = db.add_book(fiction, "Dune", "Frank Herbert").await.unwrap();
        let spqr = db.add_book(history, "SPQR", "Mary Beard").await.unwrap();
        db.add_book(poetry, "Ariel", "Sylvia Plath").await.unwrap();

        let categories = start(&db, days_from_now(-3), days_from_now(3)).await.unwrap();
        let universe = candidate_universe(&db, &categories).await.unwrap();
        assert_eq!(universe.len(), 3);
        assert!(universe.iter().all(|c| c.kind == Phase::Category));

        db.store_result(&CycleResult {
            cycle_id: categories.id,
            phase: Phase::Category,
            places: vec![history, fiction],
            computed_at: db::now(),
        })
        .await
        .unwrap();
        expect_closed(&db).await;

        let leaders = category_leaders(&db).await.unwrap();
        assert_eq!(leaders.iter().map(|c| c.id).collect::<Vec<_>>(), vec![history, fiction]);

        let books = start(&db, today(), days_from_now(6)).await.unwrap();
        assert_eq!(books.phase, Phase::Book);
        let universe = candidate_universe(&db, &books).await.unwrap();
        assert_eq!(universe.iter().map(|c| c.id).collect::<Vec<_>>(), vec![dune, spqr]);
    }

    #[tokio::test]
    async fn book_cycle_without_category_results_is_empty() {
        let db = Database::in_memory().await;
        let fiction = db.add_category("Fiction").await.unwrap();
        db.add_book(fiction, "Dune", "").await.unwrap();

        start(&db, days_from_now(-3), days_from_now(3)).await.unwrap();
        expect_closed(&db).await;
        let books = start(&db, today(), days_from_now(6)).await.unwrap();

        assert!(candidate_universe(&db, &books).await.unwrap().is_empty());
    }
}
