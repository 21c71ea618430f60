//! Bounded cache of ready connections for one endpoint. Acquire hands out
//! sole ownership through a guard; release re-shelves or retires under the
//! same mutex; a background sweeper retires idle sessions during quiet
//! periods. Saturated acquires block on a condition variable with no
//! deadline and re-check their predicate on every wake.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::config::ConnectionParams;
use crate::errors::Error;

use super::connection::Connection;

// -----------------------------------------------------------------------------
// ----- ClientPool ------------------------------------------------------------

#[derive(Debug)]
pub struct ClientPool {
    shared: Arc<PoolShared>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct PoolShared {
    params: ConnectionParams,
    state: Mutex<PoolState>,
    /// Signalled on every capacity change: a re-shelved connection or a
    /// retired slot both let one waiter make progress.
    available: Condvar,
}

#[derive(Debug)]
struct PoolState {
    idle: VecDeque<IdleEntry>,
    /// Live connections, idle and borrowed alike. Never exceeds
    /// `max_pool_size`.
    created: u32,
    disposed: bool,
}

#[derive(Debug)]
struct IdleEntry {
    conn: Connection,
    created_at: Instant,
    last_used: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
    pub created: u32,
    pub max: u32,
}

// -----------------------------------------------------------------------------
// ----- ClientPool: Static ----------------------------------------------------

impl ClientPool {
    /// Validates the pool bounds and starts the idle sweeper (when the
    /// inactivity timeout is non-zero) before any connection is opened.
    pub fn new(params: ConnectionParams) -> Result<Self, Error> {
        params.validate()?;

        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                created: 0,
                disposed: false,
            }),
            available: Condvar::new(),
            params,
        });

        let sweeper = if shared.params.inactivity_timeout.is_zero() {
            None
        } else {
            Some(Self::spawn_sweeper(&shared)?)
        };

        info!(
            server = %shared.params.server,
            port = shared.params.port,
            max = shared.params.max_pool_size,
            "connection pool ready"
        );

        Ok(Self {
            shared,
            sweeper: Mutex::new(sweeper),
        })
    }

    fn spawn_sweeper(shared: &Arc<PoolShared>) -> Result<JoinHandle<()>, Error> {
        let weak: Weak<PoolShared> = Arc::downgrade(shared);
        let interval = shared.params.inactivity_timeout;
        thread::Builder::new()
            .name("qlink-pool-sweeper".into())
            .spawn(move || loop {
                thread::park_timeout(interval);
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if !shared.sweep() {
                    return;
                }
            })
            .map_err(|e| Error::Config(format!("cannot start pool sweeper: {e}")))
    }
}

// -----------------------------------------------------------------------------
// ----- ClientPool: Public ----------------------------------------------------

impl ClientPool {
    pub fn params(&self) -> &ConnectionParams {
        &self.shared.params
    }

    /// Borrows a connection, blocking with no deadline while the pool is
    /// saturated. The guard returns it on drop.
    pub fn acquire(&self) -> Result<PooledConnection, Error> {
        let shared = &self.shared;
        let mut state = shared.state.lock();

        loop {
            if state.disposed {
                return Err(Error::PoolDisposed);
            }

            // Idle entries get the same eviction check as release; a stale
            // one is retired and the next candidate tried.
            while let Some(entry) = state.idle.pop_front() {
                if shared.should_retire(&entry.conn, entry.created_at) {
                    shared.retire(&mut state, entry.conn, "stale at acquire");
                    continue;
                }
                return Ok(PooledConnection::new(
                    shared.clone(),
                    entry.conn,
                    entry.created_at,
                ));
            }

            if state.created < shared.params.max_pool_size {
                // Reserve the slot before connecting so the cap holds while
                // the handshake runs outside the lock.
                state.created += 1;
                drop(state);
                match Connection::open(&shared.params) {
                    Ok(conn) => {
                        return Ok(PooledConnection::new(shared.clone(), conn, Instant::now()));
                    }
                    Err(e) => {
                        let mut state = shared.state.lock();
                        state.created -= 1;
                        shared.available.notify_one();
                        return Err(e);
                    }
                }
            }

            // Saturated: wait, then re-check both predicates. Wakeups may be
            // spurious or raced away by another acquirer.
            shared.available.wait(&mut state);
        }
    }

    /// Opens connections up to the configured minimum and shelves them
    /// idle, stopping at the first failure.
    pub fn warm_min(&self) {
        let shared = &self.shared;
        loop {
            {
                let mut state = shared.state.lock();
                if state.disposed || state.created >= shared.params.min_pool_size {
                    return;
                }
                state.created += 1;
            }

            match Connection::open(&shared.params) {
                Ok(conn) => {
                    let mut state = shared.state.lock();
                    if state.disposed {
                        let mut conn = conn;
                        conn.close();
                        state.created -= 1;
                        return;
                    }
                    let now = Instant::now();
                    state.idle.push_back(IdleEntry {
                        conn,
                        created_at: now,
                        last_used: now,
                    });
                    shared.available.notify_one();
                }
                Err(e) => {
                    shared.state.lock().created -= 1;
                    warn!(
                        server = %shared.params.server,
                        port = shared.params.port,
                        "pool warm-up connection failed: {e}"
                    );
                    return;
                }
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            idle: state.idle.len(),
            in_use: state.created as usize - state.idle.len(),
            created: state.created,
            max: self.shared.params.max_pool_size,
        }
    }

    /// Closes every idle connection exactly once and fails all waiters.
    /// Borrowed connections close at release when their guard observes the
    /// disposed flag. Safe to call repeatedly.
    pub fn dispose(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            while let Some(entry) = state.idle.pop_front() {
                let mut conn = entry.conn;
                conn.close();
                state.created -= 1;
            }
            self.shared.available.notify_all();
        }

        info!(
            server = %self.shared.params.server,
            port = self.shared.params.port,
            "connection pool disposed"
        );

        // Kick the sweeper so it observes the disposed flag promptly.
        if let Some(handle) = self.sweeper.lock().take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for ClientPool {
    fn drop(&mut self) {
        self.dispose();
    }
}

// -----------------------------------------------------------------------------
// ----- PoolShared ------------------------------------------------------------

impl PoolShared {
    /// Release-time eviction rule, also applied when popping idle entries.
    fn should_retire(&self, conn: &Connection, created_at: Instant) -> bool {
        if !conn.is_connected() {
            return true;
        }
        let lb = self.params.load_balance_timeout;
        !lb.is_zero() && created_at.elapsed() > lb
    }

    fn retire(&self, state: &mut PoolState, mut conn: Connection, why: &str) {
        conn.close();
        state.created -= 1;
        debug!(
            server = %self.params.server,
            port = self.params.port,
            created = state.created,
            "retired pooled connection: {why}"
        );
    }

    fn release(&self, mut conn: Connection, created_at: Instant) {
        let mut state = self.state.lock();

        if state.disposed {
            conn.close();
            state.created -= 1;
        } else if self.should_retire(&conn, created_at) {
            self.retire(&mut state, conn, "stale at release");
        } else {
            state.idle.push_back(IdleEntry {
                conn,
                created_at,
                last_used: Instant::now(),
            });
        }

        // One waiter re-validates; on the retire paths the freed slot lets
        // it open a replacement.
        self.available.notify_one();
    }

    /// One sweep pass; returns false once the pool is disposed. Mutation
    /// happens under the pool mutex, so membership is re-verified at the
    /// moment of disposal and a concurrent acquire can never see the same
    /// entry.
    fn sweep(&self) -> bool {
        let window = self.params.inactivity_timeout;
        let mut state = self.state.lock();
        if state.disposed {
            return false;
        }

        let before = state.idle.len();
        let mut kept = VecDeque::with_capacity(before);
        let mut retired = 0u32;
        while let Some(entry) = state.idle.pop_front() {
            if entry.last_used.elapsed() > window {
                let mut conn = entry.conn;
                conn.close();
                state.created -= 1;
                retired += 1;
            } else {
                kept.push_back(entry);
            }
        }
        state.idle = kept;

        if retired > 0 {
            debug!(
                server = %self.params.server,
                port = self.params.port,
                retired,
                remaining = state.created,
                "idle sweep retired quiet connections"
            );
            // Freed slots; let blocked acquirers open replacements.
            self.available.notify_all();
        }
        true
    }
}

// -----------------------------------------------------------------------------
// ----- PooledConnection ------------------------------------------------------

/// Sole-ownership borrow of one pooled connection. Dropping it runs the
/// release path: re-shelve when healthy, retire when fatal, expired, or the
/// pool is gone.
#[derive(Debug)]
pub struct PooledConnection {
    shared: Arc<PoolShared>,
    conn: Option<Connection>,
    created_at: Instant,
}

impl PooledConnection {
    fn new(shared: Arc<PoolShared>, conn: Connection, created_at: Instant) -> Self {
        Self {
            shared,
            conn: Some(conn),
            created_at,
        }
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.release(conn, self.created_at);
        }
    }
}
