pub mod handler;
pub mod trigger_engine;

pub use handler::*;
pub use trigger_engine::*;
