//! Property-based tests for determinism and scoring invariants

mod determinism;
mod scoring;
