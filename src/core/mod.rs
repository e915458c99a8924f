// src/core/mod.rs

pub mod cache;
pub mod checks;
pub mod content;
pub mod crawler;
pub mod error;
pub mod invoker;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod sink;
