// Core modules
pub mod api;
pub mod config;
pub mod db;
pub mod execution;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use models::*;
