//! Row access for voting cycles. Every function takes any executor, so the same
//! query runs against the pool or inside a caller's transaction.

use super::{from_db_time, to_db_time};
use crate::error::VoteError;
use crate::models::{Phase, VotingCycle};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

const CYCLE_COLUMNS: &str = "id, phase, starts_at, finishes_at, finalized";

pub async fn cycle<'e, E>(executor: E, cycle_id: i64) -> Result<Option<VotingCycle>, VoteError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!("SELECT {} FROM voting_cycles WHERE id = ?", CYCLE_COLUMNS))
        .bind(cycle_id)
        .fetch_optional(executor)
        .await?
        .map(cycle_from_row)
        .transpose()
}

/// The cycle whose finish date is still ahead of `now`, if any.
pub async fn open_cycle<'e, E>(
    executor: E,
    now: DateTime<Utc>,
) -> Result<Option<VotingCycle>, VoteError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!(
        "SELECT {} FROM voting_cycles WHERE finishes_at > ? ORDER BY finishes_at DESC LIMIT 1",
        CYCLE_COLUMNS
    ))
    .bind(to_db_time(now))
    .fetch_optional(executor)
    .await?
    .map(cycle_from_row)
    .transpose()
}

pub async fn last_closed_cycle<'e, E>(
    executor: E,
    now: DateTime<Utc>,
) -> Result<Option<VotingCycle>, VoteError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!(
        "SELECT {} FROM voting_cycles WHERE finishes_at <= ? ORDER BY finishes_at DESC, id DESC LIMIT 1",
        CYCLE_COLUMNS
    ))
    .bind(to_db_time(now))
    .fetch_optional(executor)
    .await?
    .map(cycle_from_row)
    .transpose()
}

/// Most recent cycle of `phase` created before cycle `before_id`.
pub async fn previous_cycle_of_phase<'e, E>(
    executor: E,
    phase: Phase,
    before_id: i64,
) -> Result<Option<VotingCycle>, VoteError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!(
        "SELECT {} FROM voting_cycles WHERE phase = ? AND id < ? ORDER BY id DESC LIMIT 1",
        CYCLE_COLUMNS
    ))
    .bind(phase.as_str())
    .bind(before_id)
    .fetch_optional(executor)
    .await?
    .map(cycle_from_row)
    .transpose()
}

/// Cycles past their finish date whose results were never finalized.
pub async fn expired_unfinalized<'e, E>(
    executor: E,
    now: DateTime<Utc>,
) -> Result<Vec<VotingCycle>, VoteError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!(
        "SELECT {} FROM voting_cycles WHERE finishes_at <= ? AND finalized = FALSE ORDER BY id",
        CYCLE_COLUMNS
    ))
    .bind(to_db_time(now))
    .fetch_all(executor)
    .await?
    .into_iter()
    .map(cycle_from_row)
    .collect()
}

pub async fn insert_cycle<'e, E>(
    executor: E,
    phase: Phase,
    starts_at: DateTime<Utc>,
    finishes_at: DateTime<Utc>,
) -> Result<VotingCycle, VoteError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = sqlx::query(
        r#"
        INSERT INTO voting_cycles (phase, starts_at, finishes_at, finalized)
        VALUES (?, ?, ?, FALSE)
        "#,
    )
    .bind(phase.as_str())
    .bind(to_db_time(starts_at))
    .bind(to_db_time(finishes_at))
    .execute(executor)
    .await?
    .last_insert_rowid();

    Ok(VotingCycle {
        id,
        phase,
        starts_at,
        finishes_at,
        finalized: false,
    })
}

pub async fn set_finish<'e, E>(
    executor: E,
    cycle_id: i64,
    finishes_at: DateTime<Utc>,
) -> Result<(), VoteError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE voting_cycles SET finishes_at = ? WHERE id = ?")
        .bind(to_db_time(finishes_at))
        .bind(cycle_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn mark_finalized<'e, E>(executor: E, cycle_id: i64) -> Result<(), VoteError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE voting_cycles SET finalized = TRUE WHERE id = ?")
        .bind(cycle_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Removes a cycle together with its ballots and cached result.
pub async fn delete_cycle<'e, E>(executor: E, cycle_id: i64) -> Result<(), VoteError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("DELETE FROM voting_cycles WHERE id = ?")
        .bind(cycle_id)
        .execute(executor)
        .await?;
    Ok(())
}

fn cycle_from_row(row: SqliteRow) -> Result<VotingCycle, VoteError> {
    let phase: String = row.try_get("phase")?;
    let starts_at: String = row.try_get("starts_at")?;
    let finishes_at: String = row.try_get("finishes_at")?;

    Ok(VotingCycle {
        id: row.try_get("id")?,
        phase: phase
            .parse()
            .map_err(|e: String| VoteError::Db(sqlx::Error::Decode(e.into())))?,
        starts_at: from_db_time(&starts_at)?,
        finishes_at: from_db_time(&finishes_at)?,
        finalized: row.try_get("finalized")?,
    })
}
