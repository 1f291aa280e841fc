pub mod config;
pub mod duck;
pub mod report;
