use chrono::{DateTime, Utc};
use thiserror::Error;

/// Every failure the voting core can report. All of them are per-operation and
/// recoverable except `Db`, which wraps infrastructure failures at the storage boundary.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("voting cycle {open_cycle} is still open until {finishes_at}")]
    Overlap {
        open_cycle: i64,
        finishes_at: DateTime<Utc>,
    },
    #[error("there is no open voting cycle")]
    NoActiveCycle,
    #[error("no ballots have been cast in cycle {0}")]
    NoData(i64),
    #[error("concurrent write conflict: {0}")]
    PersistenceConflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("user {0} is not an admin")]
    Forbidden(i64),
    #[error("bad configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Db(sqlx::Error),
}

// SQLITE_BUSY, SQLITE_LOCKED and their extended codes
const CONFLICT_CODES: &[&str] = &["5", "6", "261", "262", "517"];

impl From<sqlx::Error> for VoteError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let busy = db_err
                .code()
                .is_some_and(|code| CONFLICT_CODES.contains(&&*code));
            if db_err.is_unique_violation() || busy {
                return VoteError::PersistenceConflict(db_err.message().to_string());
            }
        }
        VoteError::Db(err)
    }
}

impl VoteError {
    /// Whether the caller may simply run the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VoteError::PersistenceConflict(_))
    }
}
