// src/services/mod.rs

pub mod chart;
pub mod evaluator;
pub mod export;
pub mod jobs;
pub mod notifier;
pub mod reminders;
pub mod report;
pub mod rollup;
pub mod scheduler;
pub mod statistics;
