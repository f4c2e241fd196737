pub mod api;
pub mod clients;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod models;
pub mod processor;
pub mod retry;
pub mod telemetry;
pub mod worker;
