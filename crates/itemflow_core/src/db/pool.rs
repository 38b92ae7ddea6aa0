//! Bounded SQLite connection pool.
//!
//! # Responsibility
//! - Hand out configured connections to concurrent callers.
//! - Keep at most `max_size` connections open; reuse idle ones first.
//!
//! # Invariants
//! - `open` never exceeds `max_size`.
//! - A connection returns to the idle list when its guard drops.
//! - Callers wait at most `checkout_timeout` for a free connection.

use super::{DbError, DbResult};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use rusqlite::Connection;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Opener = Box<dyn Fn() -> DbResult<Connection> + Send + Sync>;

struct PoolState {
    idle: Vec<Connection>,
    open: usize,
}

struct PoolInner {
    state: Mutex<PoolState>,
    available: Condvar,
    opener: Opener,
    max_size: usize,
    checkout_timeout: Duration,
}

/// Cloneable handle to a shared pool of SQLite connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionPool")
            .field("max_size", &self.inner.max_size)
            .field("open", &state.open)
            .field("idle", &state.idle.len())
            .field("checkout_timeout", &self.inner.checkout_timeout)
            .finish()
    }
}

impl ConnectionPool {
    /// Builds a pool around `opener`, eagerly opening `min_size` connections.
    ///
    /// `seed` is an already-open connection (typically the one migrations ran
    /// on) and counts towards `min_size`.
    pub(crate) fn new(
        seed: Connection,
        opener: Opener,
        min_size: usize,
        max_size: usize,
        checkout_timeout: Duration,
    ) -> DbResult<Self> {
        if max_size == 0 || min_size > max_size {
            return Err(DbError::InvalidPoolSize {
                min: min_size,
                max: max_size,
            });
        }

        let mut idle = Vec::with_capacity(max_size);
        idle.push(seed);
        while idle.len() < min_size {
            idle.push(opener()?);
        }

        let open = idle.len();
        Ok(Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState { idle, open }),
                available: Condvar::new(),
                opener,
                max_size,
                checkout_timeout,
            }),
        })
    }

    /// Checks out one connection, opening a new one if below `max_size`.
    ///
    /// # Errors
    /// - `DbError::PoolTimeout` when all connections stay busy past the
    ///   checkout timeout.
    /// - Open/bootstrap errors of a freshly created connection.
    pub fn get(&self) -> DbResult<PooledConnection<'_>> {
        let inner = self.inner.as_ref();
        let deadline = Instant::now() + inner.checkout_timeout;
        let mut state = inner.state.lock();

        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection {
                    pool: inner,
                    conn: Some(conn),
                });
            }

            if state.open < inner.max_size {
                state.open += 1;
                drop(state);
                return match (inner.opener)() {
                    Ok(conn) => {
                        debug!("event=db_pool_grow module=db status=ok max={}", inner.max_size);
                        Ok(PooledConnection {
                            pool: inner,
                            conn: Some(conn),
                        })
                    }
                    Err(err) => {
                        inner.state.lock().open -= 1;
                        inner.available.notify_one();
                        Err(err)
                    }
                };
            }

            if inner.available.wait_until(&mut state, deadline).timed_out() {
                warn!(
                    "event=db_pool_checkout module=db status=timeout timeout_ms={}",
                    inner.checkout_timeout.as_millis()
                );
                return Err(DbError::PoolTimeout(inner.checkout_timeout));
            }
        }
    }

    /// Number of connections currently open (idle or checked out).
    pub fn open_connections(&self) -> usize {
        self.inner.state.lock().open
    }

    /// Number of idle connections ready for checkout.
    pub fn idle_connections(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }
}

/// Connection checked out of a `ConnectionPool`.
pub struct PooledConnection<'pool> {
    pool: &'pool PoolInner,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `Drop` takes the connection out.
        self.conn.as_ref().expect("pooled connection present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.state.lock().idle.push(conn);
            self.pool.available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionPool;
    use crate::db::DbError;
    use rusqlite::Connection;
    use std::time::Duration;

    fn memory_pool(min: usize, max: usize, timeout: Duration) -> ConnectionPool {
        ConnectionPool::new(
            Connection::open_in_memory().unwrap(),
            Box::new(|| Ok(Connection::open_in_memory()?)),
            min,
            max,
            timeout,
        )
        .unwrap()
    }

    #[test]
    fn grows_lazily_up_to_max() {
        let pool = memory_pool(1, 2, Duration::from_millis(50));
        assert_eq!(pool.open_connections(), 1);

        let first = pool.get().unwrap();
        let second = pool.get().unwrap();
        assert_eq!(pool.open_connections(), 2);

        let err = pool.get().err().expect("pool should be exhausted");
        assert!(matches!(err, DbError::PoolTimeout(_)));

        drop(first);
        drop(second);
        assert_eq!(pool.idle_connections(), 2);
        assert!(pool.get().is_ok());
    }

    #[test]
    fn debug_reports_sizes_without_connections() {
        let pool = memory_pool(1, 3, Duration::from_millis(10));
        let _held = pool.get().unwrap();
        let text = format!("{pool:?}");
        assert!(text.contains("max_size: 3"), "{text}");
        assert!(text.contains("open: 1"), "{text}");
        assert!(text.contains("idle: 0"), "{text}");
    }

    #[test]
    fn rejects_min_above_max() {
        let err = ConnectionPool::new(
            Connection::open_in_memory().unwrap(),
            Box::new(|| Ok(Connection::open_in_memory()?)),
            3,
            2,
            Duration::from_millis(10),
        )
        .err()
        .expect("invalid sizing must fail");
        assert!(matches!(err, DbError::InvalidPoolSize { min: 3, max: 2 }));
    }
}
