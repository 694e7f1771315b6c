use super::{Database, from_db_time, to_db_time};
use crate::error::VoteError;
use crate::models::Ballot;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

impl Database {
    /// Stores a ballot, replacing whatever the voter cast earlier in the same cycle.
    /// A single statement, so concurrent submissions of one voter never mix.
    pub async fn upsert_ballot(&self, ballot: &Ballot) -> Result<(), VoteError> {
        sqlx::query(
            r#"
            INSERT INTO ballots (cycle_id, voter_id, first_id, second_id, third_id, submitted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(cycle_id, voter_id)
            DO UPDATE SET first_id = excluded.first_id,
                          second_id = excluded.second_id,
                          third_id = excluded.third_id,
                          submitted_at = excluded.submitted_at
            "#,
        )
        .bind(ballot.cycle_id)
        .bind(ballot.voter_id)
        .bind(ballot.choices[0])
        .bind(ballot.choices[1])
        .bind(ballot.choices[2])
        .bind(to_db_time(ballot.submitted_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn ballots(&self, cycle_id: i64) -> Result<Vec<Ballot>, VoteError> {
        sqlx::query(
            r#"
            SELECT cycle_id, voter_id, first_id, second_id, third_id, submitted_at
            FROM ballots
            WHERE cycle_id = ?
            ORDER BY voter_id
            "#,
        )
        .bind(cycle_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ballot_from_row)
        .collect()
    }

    pub async fn ballot(&self, cycle_id: i64, voter_id: i64) -> Result<Option<Ballot>, VoteError> {
        sqlx::query(
            r#"
            SELECT cycle_id, voter_id, first_id, second_id, third_id, submitted_at
            FROM ballots
            WHERE cycle_id = ? AND voter_id = ?
            "#,
        )
        .bind(cycle_id)
        .bind(voter_id)
        .fetch_optional(&self.pool)
        .await?
        .map(ballot_from_row)
        .transpose()
    }
}

fn ballot_from_row(row: SqliteRow) -> Result<Ballot, VoteError> {
    let submitted_at: String = row.try_get("submitted_at")?;
    Ok(Ballot {
        cycle_id: row.try_get("cycle_id")?,
        voter_id: row.try_get("voter_id")?,
        choices: [
            row.try_get("first_id")?,
            row.try_get("second_id")?,
            row.try_get("third_id")?,
        ],
        submitted_at: from_db_time(&submitted_at)?,
    })
}
