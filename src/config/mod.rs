pub mod params;

pub use params::{ConnectionParams, ParamsEntry, PoolKey};
