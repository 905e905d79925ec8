//! Leader election over a PostgreSQL advisory lock.
//!
//! Replicas sharing a database elect one leader that runs the periodic health scan. Advisory
//! locks are session-scoped, so the leader keeps the connection that took the lock for as long
//! as it leads; losing that connection releases the lock.

use sqlx::PgPool;
use sqlx::pool::PoolConnection;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Lock id shared by every replica ("WIZARDSC" in ASCII).
pub const LEADER_LOCK_ID: i64 = 0x5749_5A41_5244_5343;

const ELECTION_INTERVAL: Duration = Duration::from_secs(30);

/// Try to become (or stay) leader every 30 seconds until `shutdown` is cancelled.
///
/// `on_gain` runs each time this replica takes the lock and `on_lose` each time it loses it,
/// including on shutdown while leading.
#[instrument(skip_all, fields(lock_id = lock_id))]
pub async fn leader_election_task<G, L, GF, LF>(
    pool: PgPool,
    is_leader: Arc<AtomicBool>,
    lock_id: i64,
    shutdown: CancellationToken,
    mut on_gain: G,
    mut on_lose: L,
) where
    G: FnMut() -> GF + Send,
    L: FnMut() -> LF + Send,
    GF: Future<Output = anyhow::Result<()>> + Send,
    LF: Future<Output = anyhow::Result<()>> + Send,
{
    let mut ticker = tokio::time::interval(ELECTION_INTERVAL);
    let mut leader_conn: Option<PoolConnection<sqlx::Postgres>> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match leader_conn.as_mut() {
            None => {
                if let Some(conn) = try_acquire(&pool, lock_id).await {
                    info!("Gained leadership");
                    leader_conn = Some(conn);
                    is_leader.store(true, Ordering::Relaxed);
                    if let Err(e) = on_gain().await {
                        error!("Failed to start leader services: {:#}", e);
                    }
                }
            }
            Some(conn) => {
                if let Err(e) = sqlx::query("SELECT 1").execute(&mut **conn).await {
                    warn!(error = %e, "Lost leadership, lock connection died");
                    leader_conn = None;
                    is_leader.store(false, Ordering::Relaxed);
                    if let Err(e) = on_lose().await {
                        error!("Failed to stop leader services: {:#}", e);
                    }
                } else {
                    debug!("Leadership renewed");
                }
            }
        }
    }

    if let Some(mut conn) = leader_conn.take() {
        // The connection goes back to the pool, so the session lock must be released explicitly
        if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(lock_id)
            .execute(&mut *conn)
            .await
        {
            warn!(error = %e, "Failed to release leader lock");
        }
        is_leader.store(false, Ordering::Relaxed);
        if let Err(e) = on_lose().await {
            error!("Failed to stop leader services: {:#}", e);
        }
        info!("Released leadership on shutdown");
    }
}

/// Take the advisory lock on a fresh connection. `None` if another replica holds it or the
/// database is unreachable.
async fn try_acquire(pool: &PgPool, lock_id: i64) -> Option<PoolConnection<sqlx::Postgres>> {
    let mut conn = match pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            error!(error = %e, "Failed to acquire connection for leader election");
            return None;
        }
    };

    match sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
        .bind(lock_id)
        .fetch_one(&mut *conn)
        .await
    {
        Ok(true) => Some(conn),
        Ok(false) => {
            debug!("Following, another replica leads");
            None
        }
        Err(e) => {
            error!(error = %e, "Failed to check leader lock");
            None
        }
    }
}
