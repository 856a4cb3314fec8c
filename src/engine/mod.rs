//! Core engine — cycles, round execution, bookkeeping and the main loop.

pub mod accountant;
pub mod cycle;
pub mod executor;
pub mod runner;

pub use runner::{Engine, EngineSettings, HaltReason, Step};
