use crate::db::{self, Database, cycles as rows};
use crate::error::VoteError;
use crate::handlers;
use crate::models::CycleResult;
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Periodically finalizes cycles whose finish date has passed on its own.
pub async fn check_expired_cycles_task(database: Arc<Database>, every: Duration) {
    info!("Starting background task to check for expired voting cycles...");
    let mut interval = interval(every);
    let mut rng = StdRng::from_entropy();

    loop {
        interval.tick().await;
        match finalize_expired_cycles(&database, &mut rng).await {
            Ok(finalized) if !finalized.is_empty() => {
                info!("Finalized {} expired voting cycle(s)", finalized.len());
            }
            Ok(_) => {}
            Err(e) => error!("Failed to finalize expired voting cycles: {}", e),
        }
    }
}

/// One sweep: every expired, unfinalized cycle gets its final ranking.
/// Returns each finalized cycle's id with its final result.
pub async fn finalize_expired_cycles(
    database: &Database,
    rng: &mut StdRng,
) -> Result<Vec<(i64, Option<CycleResult>)>, VoteError> {
    let expired = rows::expired_unfinalized(database.pool(), db::now()).await?;
    let mut finalized = Vec::with_capacity(expired.len());

    for cycle in expired {
        info!("Processing expired voting cycle {}", cycle.id);
        match handlers::finalize_cycle(database, &cycle, rng).await {
            Ok(result) => finalized.push((cycle.id, result)),
            Err(e) => error!("Error finalizing voting cycle {}: {}", cycle.id, e),
        }
    }

    Ok(finalized)
}
