//! Command-line front end: the voter and admin actions a chat bot would forward.

use crate::config::Config;
use crate::cycles;
use crate::db::Database;
use crate::error::VoteError;
use crate::handlers;
use crate::models::Phase;
use crate::tasks::cycle_closer;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Book club voting: pick a category, then a book from the winning categories.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Keep running and finalize cycles once their finish date passes
    Serve,
    AddCategory {
        name: String,
    },
    AddBook {
        category_id: i64,
        name: String,
        #[arg(long, default_value = "")]
        author: String,
    },
    AddAdmin {
        user_id: i64,
    },
    /// List every category and book
    Candidates,
    /// Open a new cycle, dates given as "dd.mm.yyyy-dd.mm.yyyy"
    StartCycle {
        #[arg(long)]
        admin: i64,
        range: String,
    },
    CloseCycle {
        #[arg(long)]
        admin: i64,
    },
    /// Show the open cycle, or the last one if none is open
    Status,
    /// Cast a ballot in the open cycle, e.g. `vote 42 "3, 7, 1"`
    Vote {
        voter_id: i64,
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Show what a voter cast in the current or last cycle
    Ballot {
        voter_id: i64,
    },
    /// Leaderboard of a cycle (the current or last one by default)
    Results {
        #[arg(long)]
        cycle: Option<i64>,
        #[arg(long)]
        top: Option<usize>,
    },
    /// Categories that won the last category cycle
    Leaders,
}

pub async fn run(database: Arc<Database>, config: &Config, command: Command) -> Result<(), VoteError> {
    let db = database.as_ref();
    let mut rng = StdRng::from_entropy();

    match command {
        Command::Serve => {
            let task = tokio::spawn(cycle_closer::check_expired_cycles_task(
                Arc::clone(&database),
                config.check_interval,
            ));
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            task.abort();
        }
        Command::AddCategory { name } => {
            let id = db.add_category(name.trim()).await?;
            print_json(&serde_json::json!({ "id": id, "name": name.trim() }));
        }
        Command::AddBook {
            category_id,
            name,
            author,
        } => {
            let id = db.add_book(category_id, name.trim(), author.trim()).await?;
            print_json(&serde_json::json!({ "id": id, "name": name.trim(), "category_id": category_id }));
        }
        Command::AddAdmin { user_id } => db.add_admin(user_id).await?,
        Command::Candidates => {
            print_json(&serde_json::json!({
                "categories": db.candidates(Phase::Category).await?,
                "books": db.candidates(Phase::Book).await?,
            }));
        }
        Command::StartCycle { admin, range } => {
            require_admin(db, admin).await?;
            let (start, finish) = cycles::split_date_range(&range)?;
            let cycle = retry_once(|| handlers::start_cycle(db, start, finish)).await?;
            print_json(&cycle);
        }
        Command::CloseCycle { admin } => {
            require_admin(db, admin).await?;
            let closed = retry_once(|| async move {
                let mut rng = StdRng::from_entropy();
                handlers::close_cycle(db, &mut rng).await
            })
            .await?;
            print_json(&serde_json::json!({ "closed": closed }));
        }
        Command::Status => {
            let status = handlers::current_or_last_cycle(db).await?;
            info!("Cycle status: {}", status.as_str());
            print_json(&status);
        }
        Command::Vote { voter_id, text } => {
            let ballot = handlers::vote(db, voter_id, &text.join(" "), &mut rng).await?;
            print_json(&ballot);
        }
        Command::Ballot { voter_id } => {
            let cycle_id = latest_cycle_id(db).await?;
            match db.ballot(cycle_id, voter_id).await? {
                Some(ballot) => print_json(&ballot),
                None => println!("Voter {} has no ballot in cycle {}", voter_id, cycle_id),
            }
        }
        Command::Results { cycle, top } => {
            let cycle_id = match cycle {
                Some(id) => id,
                None => latest_cycle_id(db).await?,
            };
            let n = top.unwrap_or(config.leaderboard_size);
            match handlers::current_results(db, cycle_id, n, &mut rng).await {
                Ok(board) => print_json(&board),
                Err(VoteError::NoData(id)) => println!("No results yet: nobody has voted in cycle {}", id),
                Err(e) => return Err(e),
            }
        }
        Command::Leaders => print_json(&cycles::category_leaders(db).await?),
    }

    Ok(())
}

async fn latest_cycle_id(db: &Database) -> Result<i64, VoteError> {
    let status = handlers::current_or_last_cycle(db).await?;
    status
        .cycle()
        .map(|cycle| cycle.id)
        .ok_or(VoteError::NoActiveCycle)
}

async fn require_admin(db: &Database, user_id: i64) -> Result<(), VoteError> {
    if db.is_admin(user_id).await? {
        Ok(())
    } else {
        Err(VoteError::Forbidden(user_id))
    }
}

/// Runs an admin write, and runs it once more if it collided with a concurrent one.
async fn retry_once<T, F, Fut>(mut op: F) -> Result<T, VoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VoteError>>,
{
    match op().await {
        Err(e) if e.is_retryable() => {
            warn!("Write conflicted, retrying once: {}", e);
            op().await
        }
        other => other,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retry_once_retries_conflicts_only() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = retry_once(move || async move {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(VoteError::PersistenceConflict("busy".into())),
                _ => Ok(7),
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), VoteError> = retry_once(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(VoteError::NoActiveCycle)
        })
        .await;
        assert!(matches!(result, Err(VoteError::NoActiveCycle)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parses_vote_command() {
        let args = Args::try_parse_from(["book-club-vote", "vote", "42", "3,", "7", "1"]).unwrap();
        match args.command {
            Command::Vote { voter_id, text } => {
                assert_eq!(voter_id, 42);
                assert_eq!(text.join(" "), "3, 7 1");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn admin_commands_require_an_admin() {
        let db = Database::in_memory().await;
        assert!(matches!(require_admin(&db, 9).await, Err(VoteError::Forbidden(9))));
        db.add_admin(9).await.unwrap();
        assert!(require_admin(&db, 9).await.is_ok());
    }

    #[tokio::test]
    async fn close_cycle_command_closes_the_open_cycle() {
        let db = Arc::new(Database::in_memory().await);
        let config = Config {
            database_url: "sqlite::memory:".into(),
            max_connections: 1,
            leaderboard_size: 10,
            check_interval: std::time::Duration::from_secs(60),
        };
        db.add_admin(9).await.unwrap();
        let now = crate::db::now();
        cycles::start(&db, now - chrono::Duration::days(1), now + chrono::Duration::days(6))
            .await
            .unwrap();

        run(Arc::clone(&db), &config, Command::CloseCycle { admin: 9 }).await.unwrap();
        assert!(matches!(
            handlers::current_or_last_cycle(&db).await.unwrap(),
            crate::models::CycleStatus::Last(cycle) if cycle.finalized
        ));
    }
}
