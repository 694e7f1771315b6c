use super::{Database, from_db_time, to_db_time};
use crate::config::CACHED_PLACES;
use crate::error::VoteError;
use crate::models::CycleResult;
use sqlx::Row;

impl Database {
    /// Overwrites the cached standings of a cycle.
    pub async fn store_result(&self, result: &CycleResult) -> Result<(), VoteError> {
        if result.places.len() > CACHED_PLACES {
            return Err(VoteError::Input(format!(
                "at most {} places are cached, got {}",
                CACHED_PLACES,
                result.places.len()
            )));
        }
        let place = |i: usize| result.places.get(i).copied();

        sqlx::query(
            r#"
            INSERT INTO cycle_results (cycle_id, phase, first_id, second_id, third_id, computed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(cycle_id)
            DO UPDATE SET phase = excluded.phase,
                          first_id = excluded.first_id,
                          second_id = excluded.second_id,
                          third_id = excluded.third_id,
                          computed_at = excluded.computed_at
            "#,
        )
        .bind(result.cycle_id)
        .bind(result.phase.as_str())
        .bind(place(0))
        .bind(place(1))
        .bind(place(2))
        .bind(to_db_time(result.computed_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Cached standings, or `None` when nothing was ever computed for the cycle.
    pub async fn result(&self, cycle_id: i64) -> Result<Option<CycleResult>, VoteError> {
        let Some(row) = sqlx::query(
            r#"
            SELECT cycle_id, phase, first_id, second_id, third_id, computed_at
            FROM cycle_results
            WHERE cycle_id = ?
            "#,
        )
        .bind(cycle_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let phase: String = row.try_get("phase")?;
        let computed_at: String = row.try_get("computed_at")?;
        let mut places = Vec::with_capacity(CACHED_PLACES);
        for column in ["first_id", "second_id", "third_id"] {
            if let Some(id) = row.try_get::<Option<i64>, _>(column)? {
                places.push(id);
            }
        }

        Ok(Some(CycleResult {
            cycle_id: row.try_get("cycle_id")?,
            phase: phase
                .parse()
                .map_err(|e: String| VoteError::Db(sqlx::Error::Decode(e.into())))?,
            places,
            computed_at: from_db_time(&computed_at)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{cycles, now};
    use crate::models::Phase;
    use chrono::Duration;

    #[tokio::test]
    async fn stored_result_is_overwritten() {
        let db = Database::in_memory().await;
        let now = now();
        let cycle = cycles::insert_cycle(db.pool(), Phase::Category, now - Duration::days(1), now + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(db.result(cycle.id).await.unwrap(), None);

        let mut result = CycleResult {
            cycle_id: cycle.id,
            phase: Phase::Category,
            places: vec![3, 1, 2],
            computed_at: now,
        };
        db.store_result(&result).await.unwrap();
        assert_eq!(db.result(cycle.id).await.unwrap(), Some(result.clone()));

        result.places = vec![2];
        db.store_result(&result).await.unwrap();
        assert_eq!(db.result(cycle.id).await.unwrap().unwrap().places, vec![2]);
    }

    #[tokio::test]
    async fn more_than_three_places_are_refused() {
        let db = Database::in_memory().await;
        let result = CycleResult {
            cycle_id: 1,
            phase: Phase::Book,
            places: vec![1, 2, 3, 4],
            computed_at: now(),
        };
        assert!(matches!(db.store_result(&result).await, Err(VoteError::Input(_))));
    }
}
