//! Client driver for a column-oriented, in-memory analytical engine
//! speaking a proprietary binary IPC protocol over TCP.
//!
//! The crate is built from three layers: the [`wire`] codec (tagged values,
//! framing, block compression), the [`client`] layer (blocking connections,
//! a bounded pool, a pool registry, round-robin dispatch), and the
//! [`config`] descriptor they both consume.

pub mod client;
pub mod config;
pub mod errors;
pub mod wire;

pub use client::{Client, ClientPool, Connection, ConnectionDispatcher, PoolRegistry};
pub use config::ConnectionParams;
pub use errors::Error;
pub use wire::{Dict, Table, Value};
