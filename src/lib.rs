pub mod advanced;
pub mod config;
pub mod dates;
pub mod dimensions;
pub mod facts;
pub mod games;
pub mod keys;
pub mod pipeline;
pub mod provider;
pub mod records;
pub mod schema;
pub mod shot_zones;
pub mod summary;
pub mod telemetry;
pub mod upsert;
pub mod warehouse;

pub use warehouse::{Warehouse, WarehouseError};
