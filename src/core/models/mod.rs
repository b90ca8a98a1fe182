pub mod cost;
pub mod snapshot;
