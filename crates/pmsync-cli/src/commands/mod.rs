pub mod changes;
pub mod common;
pub mod config;
pub mod entity;
pub mod snapshot;
pub mod status;
pub mod sync;
