use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ConnectionParams;
use crate::errors::Error;
use crate::wire::{FromValue, Value};

use super::connection::Connection;
use super::dispatcher::ConnectionDispatcher;
use super::pool::ClientPool;
use super::registry::PoolRegistry;

// -----------------------------------------------------------------------------
// ----- ConnectionSource ------------------------------------------------------

/// Where a [`Client`] gets the connection for each operation.
#[derive(Debug)]
pub enum ConnectionSource {
    /// One owned session, serialized behind a mutex.
    Dedicated(Mutex<Connection>),
    /// Borrow from a shared pool per operation.
    Pooled(Arc<ClientPool>),
    /// Round-robin an endpoint, then borrow from that endpoint's pool.
    Dispatched {
        dispatcher: ConnectionDispatcher,
        registry: Arc<PoolRegistry>,
    },
}

// -----------------------------------------------------------------------------
// ----- Client ----------------------------------------------------------------

#[derive(Debug)]
pub struct Client {
    source: ConnectionSource,
}

// -----------------------------------------------------------------------------
// ----- Client: Static --------------------------------------------------------

impl Client {
    /// Opens one dedicated session, regardless of the descriptor's
    /// `pooling` flag. [`Client::from_params`] honors the flag.
    pub fn connect(params: &ConnectionParams) -> Result<Self, Error> {
        params.validate()?;
        let conn = Connection::open(params)?;
        Ok(Self {
            source: ConnectionSource::Dedicated(Mutex::new(conn)),
        })
    }

    /// Builds the client the descriptor asks for: borrowing from the
    /// registry's shared pool when `pooling` is set, one dedicated session
    /// otherwise.
    pub fn from_params(
        params: &ConnectionParams,
        registry: &Arc<PoolRegistry>,
    ) -> Result<Self, Error> {
        if params.pooling {
            Ok(Self::pooled(registry.pool(params)?))
        } else {
            Self::connect(params)
        }
    }

    pub fn pooled(pool: Arc<ClientPool>) -> Self {
        Self {
            source: ConnectionSource::Pooled(pool),
        }
    }

    pub fn dispatched(dispatcher: ConnectionDispatcher, registry: Arc<PoolRegistry>) -> Self {
        Self {
            source: ConnectionSource::Dispatched {
                dispatcher,
                registry,
            },
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Client: Public --------------------------------------------------------

impl Client {
    pub fn execute_query(&self, query: &str, args: &[Value]) -> Result<Value, Error> {
        self.with_connection(|conn| conn.execute_query(query, args))
    }

    pub fn execute_scalar<T: FromValue>(&self, query: &str, args: &[Value]) -> Result<T, Error> {
        self.with_connection(|conn| conn.execute_scalar(query, args))
    }

    pub fn execute_non_query(&self, query: &str, args: &[Value]) -> Result<(), Error> {
        self.with_connection(|conn| conn.execute_non_query(query, args))
    }

    pub fn execute_one_way(&self, query: &str, args: &[Value]) -> Result<(), Error> {
        self.with_connection(|conn| conn.execute_one_way(query, args))
    }

    /// Blocks for the next inbound message on the checked-out connection.
    /// Meaningful for a dedicated source after publishing a subscription;
    /// with a pooled source the subscribe and the receive must happen on one
    /// checkout, so prefer a dedicated client for pub/sub.
    pub fn receive<T: FromValue>(&self) -> Result<T, Error> {
        self.with_connection(|conn| conn.receive())
    }
}

// -----------------------------------------------------------------------------
// ----- Client: Private -------------------------------------------------------

impl Client {
    fn with_connection<R>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<R, Error>,
    ) -> Result<R, Error> {
        match &self.source {
            ConnectionSource::Dedicated(conn) => op(&mut conn.lock()),
            ConnectionSource::Pooled(pool) => {
                let mut borrowed = pool.acquire()?;
                op(&mut borrowed)
            }
            ConnectionSource::Dispatched {
                dispatcher,
                registry,
            } => {
                let params = dispatcher.next_endpoint();
                let pool = registry.pool(&params)?;
                let mut borrowed = pool.acquire()?;
                op(&mut borrowed)
            }
        }
    }
}
