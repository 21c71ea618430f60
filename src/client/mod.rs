pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod pool;
pub mod registry;

pub use client::{Client, ConnectionSource};
pub use connection::{Connection, ConnectionState};
pub use dispatcher::ConnectionDispatcher;
pub use pool::{ClientPool, PoolStats, PooledConnection};
pub use registry::PoolRegistry;
