// src/lib.rs
pub mod banner;
pub mod config;
pub mod errors;
pub mod inputs;
pub mod report;
pub mod submission;
pub mod transport;
