use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::config::{ConnectionParams, PoolKey};
use crate::errors::Error;

use super::pool::ClientPool;

// -----------------------------------------------------------------------------
// ----- PoolRegistry ----------------------------------------------------------

#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: RwLock<HashMap<PoolKey, Arc<ClientPool>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the shared pool for these parameters, creating it on first
    /// use. Read-path hit is lock-shared; creation double-checks under the
    /// write lock so racing callers converge on one pool.
    pub fn pool(&self, params: &ConnectionParams) -> Result<Arc<ClientPool>, Error> {
        let key = params.pool_key();

        if let Some(pool) = self.pools.read().get(&key) {
            return Ok(pool.clone());
        }

        let mut pools = self.pools.write();
        if let Some(pool) = pools.get(&key) {
            return Ok(pool.clone());
        }

        info!(
            server = %params.server,
            port = params.port,
            "creating shared pool for new parameter key"
        );
        let pool = Arc::new(ClientPool::new(params.clone())?);
        pools.insert(key, pool.clone());
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }

    /// Disposes every pool and forgets it. Subsequent calls to `pool` start
    /// fresh. Dropping the registry does the same.
    pub fn shutdown(&self) {
        let drained: Vec<Arc<ClientPool>> = {
            let mut pools = self.pools.write();
            pools.drain().map(|(_, pool)| pool).collect()
        };
        for pool in drained {
            pool.dispose();
        }
    }
}

impl Drop for PoolRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
