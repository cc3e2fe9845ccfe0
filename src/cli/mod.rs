pub mod config;
pub mod context;
pub mod memory;
pub mod network;
