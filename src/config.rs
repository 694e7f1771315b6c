use crate::error::VoteError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Number of places kept in the cached per-cycle result.
pub const CACHED_PLACES: usize = 3;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub leaderboard_size: usize,
    pub check_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, VoteError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:book_club.db".to_string());
        Self::from_values(
            database_url,
            parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            parse_var("LEADERBOARD_SIZE", 10)?,
            parse_var("CYCLE_CHECK_INTERVAL_SECONDS", 60)?,
        )
    }

    fn from_values(
        database_url: String,
        max_connections: u32,
        leaderboard_size: usize,
        check_interval_secs: u64,
    ) -> Result<Self, VoteError> {
        if max_connections == 0 {
            return Err(VoteError::Config("DATABASE_MAX_CONNECTIONS must be positive".into()));
        }
        // tokio's interval panics on a zero period
        if check_interval_secs == 0 {
            return Err(VoteError::Config("CYCLE_CHECK_INTERVAL_SECONDS must be positive".into()));
        }

        Ok(Self {
            database_url,
            max_connections,
            leaderboard_size,
            check_interval: Duration::from_secs(check_interval_secs),
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, VoteError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| VoteError::Config(format!("{} has an invalid value: {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let value: u64 = parse_var("BOOK_CLUB_VOTE_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn zero_counts_are_rejected() {
        let url = || "sqlite::memory:".to_string();
        assert!(matches!(Config::from_values(url(), 0, 10, 60), Err(VoteError::Config(_))));
        assert!(matches!(Config::from_values(url(), 5, 10, 0), Err(VoteError::Config(_))));

        let config = Config::from_values(url(), 5, 10, 60).unwrap();
        assert_eq!(config.check_interval, Duration::from_secs(60));
    }
}
