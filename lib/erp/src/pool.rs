//! Bounded connection pool
//!
//! A free list behind one mutex. Connections are checked with a cheap liveness
//! probe on every acquire and dropped when the probe fails; a checked-out
//! connection belongs to exactly one guard until the guard is dropped.

use parking_lot::{Condvar, Mutex};
use routewise_core::{Error, Result};
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Opens and probes connections for a [`ConnectionPool`]
pub trait Connector: Send + Sync {
    type Connection: Send;

    fn connect(&self) -> Result<Self::Connection>;

    /// Liveness probe run before a pooled connection is handed out
    fn is_alive(&self, conn: &mut Self::Connection) -> bool;
}

struct PoolState<T> {
    idle: Vec<T>,
    open: usize,
}

/// Point-in-time pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    pub open: usize,
    pub idle: usize,
}

pub struct ConnectionPool<C: Connector> {
    connector: C,
    max_size: usize,
    acquire_timeout: Duration,
    state: Mutex<PoolState<C::Connection>>,
    released: Condvar,
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C, max_size: usize, acquire_timeout: Duration) -> Result<Self> {
        if max_size == 0 {
            return Err(Error::InvalidConfig("connection pool size must be positive".into()));
        }
        Ok(Self {
            connector,
            max_size,
            acquire_timeout,
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(max_size),
                open: 0,
            }),
            released: Condvar::new(),
        })
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        PoolStatus {
            max_size: self.max_size,
            open: state.open,
            idle: state.idle.len(),
        }
    }

    /// Check out a live connection, opening one if the pool has room.
    ///
    /// Blocks up to the acquire timeout when every connection is in use.
    pub fn acquire(&self) -> Result<PooledConnection<'_, C>> {
        let deadline = Instant::now() + self.acquire_timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(mut conn) = state.idle.pop() {
                drop(state);
                if self.connector.is_alive(&mut conn) {
                    return Ok(PooledConnection::new(self, conn));
                }
                warn!("evicting broken pooled connection");
                drop(conn);
                state = self.state.lock();
                state.open -= 1;
                continue;
            }

            if state.open < self.max_size {
                state.open += 1;
                drop(state);
                return match self.connector.connect() {
                    Ok(conn) => {
                        debug!("opened new pooled connection");
                        Ok(PooledConnection::new(self, conn))
                    }
                    Err(e) => {
                        self.state.lock().open -= 1;
                        self.released.notify_one();
                        Err(e)
                    }
                };
            }

            if Instant::now() >= deadline {
                return Err(Error::DatabaseUnavailable(format!(
                    "no connection available within {:?} (pool size {})",
                    self.acquire_timeout, self.max_size
                )));
            }
            self.released.wait_until(&mut state, deadline);
        }
    }

    fn release(&self, conn: Option<C::Connection>) {
        let mut state = self.state.lock();
        match conn {
            Some(conn) => state.idle.push(conn),
            None => state.open -= 1,
        }
        drop(state);
        self.released.notify_one();
    }
}

/// A checked-out connection; returned to the pool on drop
pub struct PooledConnection<'a, C: Connector> {
    pool: &'a ConnectionPool<C>,
    conn: Option<C::Connection>,
    broken: bool,
}

impl<'a, C: Connector> PooledConnection<'a, C> {
    fn new(pool: &'a ConnectionPool<C>, conn: C::Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
            broken: false,
        }
    }

    /// Close this connection instead of returning it to the pool
    pub fn invalidate(&mut self) {
        self.broken = true;
    }
}

impl<C: Connector> Deref for PooledConnection<'_, C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is present until drop"),
        }
    }
}

impl<C: Connector> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is present until drop"),
        }
    }
}

impl<C: Connector> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        let conn = self.conn.take();
        if self.broken {
            drop(conn);
            self.pool.release(None);
        } else {
            self.pool.release(conn);
        }
    }
}
