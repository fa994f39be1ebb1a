//! Per-device TCP connection pool with LIFO idle reuse, a concurrency cap
//! enforced by a semaphore, and TTL-based idle reaping.
//!
//! Modeled on the bus/worker-pool style of `timer-core`'s client workers,
//! generalized to own both the socket and its `SessionDriver` so a leased
//! connection always comes back already at `SessionState::Established`.

use crate::error::GatewayError;
use crate::session::SessionDriver;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::debug;

struct PooledConnection<D> {
    stream: TcpStream,
    driver: D,
    last_used: Instant,
}

/// A pool of established connections to a single device endpoint.
pub struct ConnectionPool<D: SessionDriver + Default + 'static> {
    endpoint: (String, u16),
    idle: Mutex<Vec<PooledConnection<D>>>,
    semaphore: Arc<Semaphore>,
    max_size: usize,
    max_idle: usize,
    acquire_timeout: Duration,
    idle_ttl: Duration,
}

impl<D: SessionDriver + Default + 'static> ConnectionPool<D> {
    /// `max_size` bounds concurrent active leases (the semaphore cap). The
    /// idle list is bounded by the same value until `with_max_idle` narrows
    /// it — a device's `max_active` and `max_idle` are often set equal, so
    /// this keeps the common case a 4-argument call.
    pub fn new(
        endpoint: (String, u16),
        max_size: usize,
        acquire_timeout: Duration,
        idle_ttl: Duration,
    ) -> Self {
        ConnectionPool {
            endpoint,
            idle: Mutex::new(Vec::new()),
            semaphore: Arc::new(Semaphore::new(max_size)),
            max_size,
            max_idle: max_size,
            acquire_timeout,
            idle_ttl,
        }
    }

    /// Bounds the idle list independently of `max_size` (the active-lease
    /// cap) — a device's `[pool]` config sets these separately.
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Leases a connection, reusing the most-recently-idle one (LIFO) when
    /// one is available, dialing a fresh one otherwise. Blocks on the
    /// concurrency semaphore up to `acquire_timeout` before failing with
    /// `PoolExhausted`.
    pub async fn acquire(self: &Arc<Self>) -> Result<Lease<D>, GatewayError> {
        let permit = timeout(self.acquire_timeout, self.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| {
                GatewayError::PoolExhausted(format!("{}:{}", self.endpoint.0, self.endpoint.1))
            })?
            .expect("pool semaphore is never closed");

        let existing = self.lock_idle().pop();
        let conn = match existing {
            Some(conn) => conn,
            None => self.dial().await?,
        };

        Ok(Lease {
            pool: Arc::clone(self),
            permit: Some(permit),
            conn: Some(conn),
        })
    }

    async fn dial(&self) -> Result<PooledConnection<D>, GatewayError> {
        debug!(host = %self.endpoint.0, port = self.endpoint.1, "dialing new pooled connection");
        let mut stream = TcpStream::connect((self.endpoint.0.as_str(), self.endpoint.1))
            .await
            .map_err(GatewayError::Transport)?;
        let mut driver = D::default();
        driver.establish(&mut stream).await?;
        Ok(PooledConnection {
            stream,
            driver,
            last_used: Instant::now(),
        })
    }

    fn check_in(&self, conn: PooledConnection<D>) {
        let mut idle = self.lock_idle();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<PooledConnection<D>>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drops idle connections whose last use exceeds `idle_ttl`. Intended
    /// to run on a periodic background tick.
    pub fn reap_expired(&self) {
        let ttl = self.idle_ttl;
        self.lock_idle().retain(|c| c.last_used.elapsed() < ttl);
    }

    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }
}

/// A leased connection. Returns to its pool's idle list on drop unless
/// `discard` is called — always discard after an I/O error, since the
/// socket and session state are no longer trustworthy.
pub struct Lease<D: SessionDriver + Default + 'static> {
    pool: Arc<ConnectionPool<D>>,
    permit: Option<OwnedSemaphorePermit>,
    conn: Option<PooledConnection<D>>,
}

impl<D: SessionDriver + Default + 'static> Lease<D> {
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.conn.as_mut().expect("lease conn present").stream
    }

    pub fn driver(&self) -> &D {
        &self.conn.as_ref().expect("lease conn present").driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.conn.as_mut().expect("lease conn present").driver
    }

    /// Consumes the lease without returning the connection to the pool.
    pub fn discard(mut self) {
        self.conn = None;
        self.permit = None;
    }
}

impl<D: SessionDriver + Default + 'static> Drop for Lease<D> {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.last_used = Instant::now();
            self.pool.check_in(conn);
        }
    }
}
