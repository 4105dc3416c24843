// src/lib.rs

pub mod api;
pub mod clock;
pub mod coerce;
pub mod config;
pub mod connecteam_client;
pub mod error;
pub mod export;
pub mod models;
pub mod payroll;
pub mod roster;
pub mod store;
pub mod supabase_store;
pub mod sync;
pub mod timesheets;
pub mod week;

#[cfg(test)]
mod test_support;


pub use error::AppError;
