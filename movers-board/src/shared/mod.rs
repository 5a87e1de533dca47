/// Shared modules for the movers board
pub mod config;
pub mod error;
pub mod movers;
pub mod parse;
pub mod types;
