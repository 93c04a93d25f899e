//! Integration tests for the question engine and scoring aggregator

mod concurrent_scoring;
mod config_integration;
mod homework_assessment;
mod loader_single_flight;
mod store_integration;
