pub mod config;
pub mod now;
pub mod status;
pub mod sync;
