//! Sweeper jobs
//!
//! Both sweepers loop in bounded batches (one short transaction each) until
//! a batch comes back smaller than the bound, so lock windows stay short no
//! matter how large the backlog. Both are idempotent: rerunning or
//! overlapping invocations only ever repeats no-op work.

use sqlx::PgPool;

use crate::data::postgres::PostgresError;
use crate::data::postgres::repositories::message::{self, StuckSweep};

/// Delete acked messages older than `older_than_secs`. Returns the total
/// number of rows removed.
pub async fn run_acked_cleanup(
    pool: &PgPool,
    older_than_secs: u64,
    batch_size: u32,
) -> Result<u64, PostgresError> {
    let mut total = 0u64;
    loop {
        let deleted = message::sweep_acked(pool, older_than_secs, batch_size).await?;
        total += deleted;
        tracing::debug!(deleted, total, "Acked cleanup batch");
        if deleted < u64::from(batch_size) {
            break;
        }
    }

    tracing::info!(total, older_than_secs, "Acked cleanup finished");
    Ok(total)
}

/// Recover messages whose lease outlived `lock_timeout_secs`. Returns the
/// aggregate outcome across batches.
pub async fn run_stuck_cleanup(
    pool: &PgPool,
    lock_timeout_secs: u64,
    batch_size: u32,
) -> Result<StuckSweep, PostgresError> {
    let mut total = StuckSweep::default();
    loop {
        let sweep = message::sweep_stuck(pool, lock_timeout_secs, batch_size).await?;
        total.recovered += sweep.recovered;
        total.dead_lettered += sweep.dead_lettered;
        tracing::debug!(
            recovered = sweep.recovered,
            dead_lettered = sweep.dead_lettered,
            "Stuck cleanup batch"
        );
        if sweep.total() < u64::from(batch_size) {
            break;
        }
    }

    tracing::info!(
        recovered = total.recovered,
        dead_lettered = total.dead_lettered,
        lock_timeout_secs,
        "Stuck cleanup finished"
    );
    Ok(total)
}
