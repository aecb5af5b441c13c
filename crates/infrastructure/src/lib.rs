pub mod database;
pub mod observability;
pub mod trigger_engine;

pub use database::*;
pub use observability::*;
pub use trigger_engine::LocalTriggerEngine;
